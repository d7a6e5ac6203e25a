use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use evalbatch_core::{
    BatchState, DerivedInfo, JobScheduler, Result, RunConfig, RunContext, SubmissionReport,
    SubmissionResult, SubmitPacing,
};
use evalbatch_domain::partition;
use tracing::{debug, error, info, warn};

use crate::template::JobScriptRenderer;

/// 提交编排器
///
/// 按批次顺序渲染并提交作业。单个批次提交失败只记录，不会中断后续批次，也不重试。
pub struct SubmissionOrchestrator {
    renderer: JobScriptRenderer,
    scheduler: Arc<dyn JobScheduler>,
    pacing: SubmitPacing,
    dry_run: bool,
}

impl SubmissionOrchestrator {
    pub fn new(
        renderer: JobScriptRenderer,
        scheduler: Arc<dyn JobScheduler>,
        pacing: SubmitPacing,
    ) -> Self {
        Self {
            renderer,
            scheduler,
            pacing,
            dry_run: false,
        }
    }

    /// 只生成脚本，不提交
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn run(
        &self,
        config: &RunConfig,
        derived: &DerivedInfo,
        ctx: &RunContext,
        results_dir: PathBuf,
    ) -> Result<SubmissionReport> {
        let batches = partition(config.total_tasks, config.tasks_per_job)?;
        self.renderer.layout().create_dirs()?;
        if results_dir.exists() {
            warn!(
                "结果目录已存在，本次结果会与已有结果写在一起: {}",
                results_dir.display()
            );
        }
        fs::create_dir_all(&results_dir)?;

        info!(
            "开始提交: {} 个作业, 每个作业 {} 个任务, 调度器={}, dry_run={}",
            batches.len(),
            config.tasks_per_job,
            self.scheduler.name(),
            self.dry_run
        );

        let mut report =
            SubmissionReport::new(ctx.clone(), &derived.model_name, results_dir, self.dry_run);
        let mut consecutive_failures = 0u32;

        for (position, batch) in batches.iter().enumerate() {
            let mut state = BatchState::Pending;
            debug!("批次 {} [{}, {}): {:?}", batch.index, batch.start_idx, batch.end_idx, state);

            let script = self.renderer.write(batch, ctx, derived, config)?;
            state = BatchState::Rendered;
            debug!("批次 {}: {:?} -> {}", batch.index, state, script.path.display());

            if !self.dry_run {
                state = match self.scheduler.submit(&script.path).await {
                    Ok(job_id) => {
                        consecutive_failures = 0;
                        info!(
                            "批次 {} [{}, {}) 已提交: job_id={}",
                            batch.index, batch.start_idx, batch.end_idx, job_id
                        );
                        BatchState::Submitted { job_id }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        error!(
                            "批次 {} [{}, {}) 提交失败: {e}",
                            batch.index, batch.start_idx, batch.end_idx
                        );
                        BatchState::SubmitFailed {
                            reason: e.to_string(),
                        }
                    }
                };
            }

            report.record(SubmissionResult {
                batch: *batch,
                script_path: Some(script.path),
                state,
            });

            let is_last = position + 1 == batches.len();
            if !self.dry_run && !is_last {
                let delay = self.pacing.delay_after(consecutive_failures);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let report_path = self.renderer.layout().job_scripts_dir.join(format!(
            "submissions_{}_{}.json",
            ctx.timestamp, ctx.run_id
        ));
        fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
        info!(
            "提交结束: 成功 {}/{}, 报告已写入 {}",
            report.success_count(),
            report.results.len(),
            report_path.display()
        );

        Ok(report)
    }
}
