use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 一次提交运行的完整参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub total_tasks: u32,
    pub tasks_per_job: u32,
    pub config_path: PathBuf,
    pub group_id: String,
    pub resource_type: String,
    pub wall_time: String,
    pub select_count: u32,
}

/// 从评测配置文件中派生出的信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedInfo {
    pub model_name: String,
    /// 作业脚本文件名中使用的模型名
    pub sanitized_model_name: String,
    /// 评测程序结果子目录中使用的模型名
    pub results_model_name: String,
    /// 仅用于告警，不会修改 RunConfig
    pub config_task_end_idx: Option<u64>,
}

impl DerivedInfo {
    pub fn new(model_name: impl Into<String>, config_task_end_idx: Option<u64>) -> Self {
        let model_name = model_name.into();
        Self {
            sanitized_model_name: sanitize_model_name(&model_name),
            results_model_name: results_model_name(&model_name),
            model_name,
            config_task_end_idx,
        }
    }
}

/// 将路径分隔符替换为下划线
pub fn sanitize_model_name(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

/// 评测程序写结果时的目录名规则: `/` 替换为 `-`
pub fn results_model_name(name: &str) -> String {
    name.replace('/', "-")
}

/// 一个作业负责的连续任务区间 [start_idx, end_idx)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobBatch {
    pub index: u32,
    pub start_idx: u32,
    pub end_idx: u32,
}

impl JobBatch {
    pub fn len(&self) -> u32 {
        self.end_idx - self.start_idx
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 单次运行的标识
///
/// `timestamp` 用于作业ID与结果目录，`run_id` 只出现在脚本、日志和报告的文件名中。
/// 同一分钟内对同一模型重复执行时，脚本不会互相覆盖，但评测结果写入同一个结果目录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub timestamp: String,
    pub run_id: String,
}

impl RunContext {
    pub fn new(now: DateTime<Local>) -> Self {
        let run_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            timestamp: now.format("%m%d_%H%M").to_string(),
            run_id,
        }
    }

    pub fn now() -> Self {
        Self::new(Local::now())
    }

    /// 作业内使用的 JOB_ID，评测程序据此推断结果目录
    pub fn job_id(&self, batch_index: u32) -> String {
        format!("{}_job{}", self.timestamp, batch_index)
    }
}

/// 批次状态: Pending -> Rendered -> Submitted | SubmitFailed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BatchState {
    Pending,
    Rendered,
    Submitted { job_id: String },
    SubmitFailed { reason: String },
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchState::Submitted { .. } | BatchState::SubmitFailed { .. }
        )
    }
}

/// 单个批次的提交结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub batch: JobBatch,
    pub script_path: Option<PathBuf>,
    pub state: BatchState,
}

impl SubmissionResult {
    pub fn job_id(&self) -> Option<&str> {
        match &self.state {
            BatchState::Submitted { job_id } => Some(job_id),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, BatchState::SubmitFailed { .. })
    }
}

/// 整次运行的提交报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub context: RunContext,
    pub model_name: String,
    pub results_dir: PathBuf,
    pub dry_run: bool,
    pub results: Vec<SubmissionResult>,
}

impl SubmissionReport {
    pub fn new(
        context: RunContext,
        model_name: impl Into<String>,
        results_dir: PathBuf,
        dry_run: bool,
    ) -> Self {
        Self {
            context,
            model_name: model_name.into(),
            results_dir,
            dry_run,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, result: SubmissionResult) {
        self.results.push(result);
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.job_id().is_some()).count()
    }

    pub fn job_ids(&self) -> Vec<&str> {
        self.results.iter().filter_map(|r| r.job_id()).collect()
    }

    pub fn failed_batches(&self) -> Vec<u32> {
        self.results
            .iter()
            .filter(|r| r.is_failed())
            .map(|r| r.batch.index)
            .collect()
    }

    pub fn script_paths(&self) -> Vec<&PathBuf> {
        self.results
            .iter()
            .filter_map(|r| r.script_path.as_ref())
            .collect()
    }
}
