use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::{BatchError, Result};

/// 默认的启动器配置文件搜索路径
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["config/evalbatch.toml", "evalbatch.toml"];

/// 提交节奏策略
///
/// 两次提交之间的等待时间。连续失败时按倍数退避，成功后回到基础间隔。
/// 失败的提交不会被重试。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitPacing {
    /// 基础间隔（毫秒）
    pub base_delay_ms: u64,
    /// 每次连续失败的退避倍数
    pub backoff_multiplier: f64,
    /// 最大间隔（毫秒）
    pub max_delay_ms: u64,
}

impl Default for SubmitPacing {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl SubmitPacing {
    /// 不等待，测试和dry-run使用
    pub fn immediate() -> Self {
        Self {
            base_delay_ms: 0,
            backoff_multiplier: 1.0,
            max_delay_ms: 0,
        }
    }

    /// 根据连续失败次数计算下一次提交前的等待时间
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        let base = self.base_delay_ms as f64;
        let exponent = consecutive_failures.min(i32::MAX as u32) as i32;
        let delay = (base * self.backoff_multiplier.powi(exponent)).min(self.max_delay_ms as f64);
        Duration::from_millis(delay.max(0.0) as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.backoff_multiplier >= 1.0) {
            return Err(BatchError::Configuration(format!(
                "pacing.backoff_multiplier 必须 >= 1.0, 当前值: {}",
                self.backoff_multiplier
            )));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(BatchError::Configuration(format!(
                "pacing.max_delay_ms ({}) 不能小于 pacing.base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        Ok(())
    }
}

/// 启动器默认参数
///
/// 命令行覆盖项会叠加在这些值之上。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherDefaults {
    pub total_tasks: u32,
    pub tasks_per_job: u32,
    pub config_path: String,
    pub group_id: Option<String>,
    /// 无法从命令行或YAML中得到资源类型时使用的哨兵值
    pub resource_type: String,
    pub wall_time: String,
    pub select_count: u32,
    /// 无法从YAML中得到模型名时使用的占位符
    pub unknown_model: String,
    pub results_dir: String,
    pub log_dir: String,
    pub job_scripts_dir: String,
    /// 作业内执行的评测命令，后面会追加 --config 等参数
    pub eval_command: String,
    pub job_name_prefix: String,
    pub qsub_command: String,
    pub pacing: SubmitPacing,
}

impl Default for LauncherDefaults {
    fn default() -> Self {
        Self {
            total_tasks: 200,
            tasks_per_job: 5,
            config_path: "configs/default.yaml".to_string(),
            group_id: None,
            resource_type: "rt_HG".to_string(),
            wall_time: "1:00:00".to_string(),
            select_count: 1,
            unknown_model: "unknown".to_string(),
            results_dir: "webshop_evaluator/results".to_string(),
            log_dir: "logs/abci".to_string(),
            job_scripts_dir: "job_scripts".to_string(),
            eval_command: "python eval_webshop.py".to_string(),
            job_name_prefix: "webshop".to_string(),
            qsub_command: "qsub".to_string(),
            pacing: SubmitPacing::default(),
        }
    }
}

impl LauncherDefaults {
    /// 加载启动器配置
    ///
    /// 优先级从低到高: 内置默认值、TOML文件、`EVALBATCH_` 前缀的环境变量。
    /// 显式指定的文件必须存在；未指定时按默认路径探测，找不到则只用内置默认值。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            ConfigBuilder::builder().add_source(ConfigBuilder::try_from(&Self::default())?);

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(BatchError::Configuration(format!(
                    "启动器配置文件不存在: {path}"
                )));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("EVALBATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let defaults: LauncherDefaults = builder.build()?.try_deserialize()?;
        defaults.validate()?;
        Ok(defaults)
    }

    pub fn validate(&self) -> Result<()> {
        if self.total_tasks == 0 {
            return Err(BatchError::Configuration(
                "total_tasks 必须大于0".to_string(),
            ));
        }
        if self.tasks_per_job == 0 {
            return Err(BatchError::Configuration(
                "tasks_per_job 必须大于0".to_string(),
            ));
        }
        if self.select_count == 0 {
            return Err(BatchError::Configuration(
                "select_count 必须大于0".to_string(),
            ));
        }
        if !is_valid_wall_time(&self.wall_time) {
            return Err(BatchError::Configuration(format!(
                "wall_time 格式无效 (应为 H:MM:SS): {}",
                self.wall_time
            )));
        }
        if !is_safe_directive_value(&self.job_name_prefix) {
            return Err(BatchError::Configuration(format!(
                "job_name_prefix 含有不允许的字符: {:?}",
                self.job_name_prefix
            )));
        }
        if !is_safe_directive_value(&self.resource_type) {
            return Err(BatchError::Configuration(format!(
                "resource_type 含有不允许的字符: {:?}",
                self.resource_type
            )));
        }
        if self.eval_command.trim().is_empty() {
            return Err(BatchError::Configuration(
                "eval_command 不能为空".to_string(),
            ));
        }
        if self.qsub_command.trim().is_empty() {
            return Err(BatchError::Configuration(
                "qsub_command 不能为空".to_string(),
            ));
        }
        self.pacing.validate()
    }
}

/// `#PBS` 指令参数只允许字母、数字和 `_-.@:+=/`
pub fn is_safe_directive_value(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-.@:+=/".contains(c))
}

/// 检查 `H:MM:SS` 格式的作业时长
pub fn is_valid_wall_time(value: &str) -> bool {
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return false;
    }
    if !parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit())) {
        return false;
    }
    let minutes_ok = parts[1].len() == 2 && parts[1] < "60";
    let seconds_ok = parts[2].len() == 2 && parts[2] < "60";
    minutes_ok && seconds_ok
}
