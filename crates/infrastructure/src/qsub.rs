use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use async_trait::async_trait;
use evalbatch_core::{BatchError, JobScheduler, Result};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// 通过 `qsub` 命令提交作业的PBS调度器
#[derive(Debug, Clone)]
pub struct QsubScheduler {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl QsubScheduler {
    /// `command` 可以带固定参数，例如 `"qsub -V"`
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| BatchError::Configuration("qsub命令不能为空".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            working_dir: None,
        })
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl JobScheduler for QsubScheduler {
    async fn submit(&self, script_path: &Path) -> Result<String> {
        let start_time = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.arg(script_path);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(
            "执行提交命令: {} {:?} {}",
            self.program,
            self.args,
            script_path.display()
        );

        let output = cmd.output().await.map_err(|e| {
            BatchError::Submission(format!("启动提交命令 {} 失败: {e}", self.program))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let detail = stderr.trim();
            let status = describe_status(output.status);
            warn!(
                "提交命令返回失败: script={}, {}, stderr={}",
                script_path.display(),
                status,
                detail
            );
            return Err(BatchError::Submission(format!(
                "{} {}: {}",
                self.program,
                status,
                if detail.is_empty() { "(无输出)" } else { detail }
            )));
        }

        let job_id = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                BatchError::Submission(format!("{} 没有返回作业ID", self.program))
            })?;

        info!(
            "作业已提交: job_id={}, script={}, duration={}ms",
            job_id,
            script_path.display(),
            start_time.elapsed().as_millis()
        );

        Ok(job_id)
    }

    fn name(&self) -> &str {
        "qsub"
    }
}

fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("退出码 {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("被信号 {signal} 终止");
        }
    }
    "异常退出".to_string()
}
