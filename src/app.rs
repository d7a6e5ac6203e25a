use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use evalbatch_core::{LauncherDefaults, Result, RunContext, SubmissionReport, SubmitPacing};
use evalbatch_dispatcher::{render_summary, JobScriptRenderer, ScriptLayout, SubmissionOrchestrator};
use evalbatch_domain::{ExtractorKind, MergeOutcome, ParameterResolver, ResultMerger};
use evalbatch_infrastructure::QsubScheduler;
use tracing::{info, warn};

use crate::cli::{MergeArgs, SubmitArgs};

/// 汇总中提示的合并命令
pub const MERGE_COMMAND: &str = "evalbatch-merge";

/// 解析参数、生成脚本并提交所有批次
pub async fn run_submit(args: SubmitArgs) -> Result<SubmissionReport> {
    let defaults = LauncherDefaults::load(args.launcher_config.as_deref())?;
    let extractor: ExtractorKind = args.extractor.parse()?;

    let resolver = ParameterResolver::new(defaults.clone(), extractor.build());
    let mut run = resolver.resolve(args.overrides())?;

    // 作业可能在其它节点上执行，使用绝对路径
    if let Ok(absolute) = fs::canonicalize(&run.config.config_path) {
        run.config.config_path = absolute;
    }

    let work_dir = env::current_dir()?;
    let ctx = RunContext::now();
    let layout = ScriptLayout {
        job_scripts_dir: work_dir.join(&defaults.job_scripts_dir),
        log_dir: work_dir.join(&defaults.log_dir),
        work_dir: work_dir.clone(),
    };
    let results_dir = run_results_dir(
        &work_dir.join(&defaults.results_dir),
        &ctx,
        &run.derived.results_model_name,
    );

    let renderer = JobScriptRenderer::new(layout, &defaults.eval_command, &defaults.job_name_prefix);
    let scheduler = QsubScheduler::new(&defaults.qsub_command)?.with_working_dir(&work_dir);
    let pacing = if args.dry_run {
        SubmitPacing::immediate()
    } else {
        defaults.pacing.clone()
    };

    info!(
        "运行ID: {} (timestamp={}), 结果目录: {}",
        ctx.run_id,
        ctx.timestamp,
        results_dir.display()
    );

    let report = SubmissionOrchestrator::new(renderer, Arc::new(scheduler), pacing)
        .with_dry_run(args.dry_run)
        .run(&run.config, &run.derived, &ctx, results_dir)
        .await?;

    if !report.failed_batches().is_empty() {
        warn!("有 {} 个批次提交失败", report.failed_batches().len());
    }
    println!("{}", render_summary(&report, MERGE_COMMAND));

    Ok(report)
}

/// 评测程序写结果的目录 `<results_dir>/<timestamp>_<model>`
///
/// `model` 需按评测程序的规则处理，见 `DerivedInfo::results_model_name`。
pub fn run_results_dir(base: &Path, ctx: &RunContext, results_model: &str) -> PathBuf {
    base.join(format!("{}_{}", ctx.timestamp, results_model))
}

/// 合并结果目录并输出统计信息
pub fn run_merge(args: &MergeArgs) -> anyhow::Result<MergeOutcome> {
    let merger = ResultMerger::new(&args.results_dir)
        .with_context(|| format!("无法打开结果目录: {}", args.results_dir.display()))?;

    let outcome = merger.run().context("合并结果失败")?;

    match &outcome.statistics {
        Some(statistics) => {
            print!("{}", statistics.render());
            if let Some(ref output) = args.stats_output {
                merger
                    .write_statistics(statistics, output)
                    .with_context(|| format!("保存统计信息失败: {}", output.display()))?;
            }
        }
        None => warn!("没有可统计的结果"),
    }

    Ok(outcome)
}
