use std::path::{Path, PathBuf};

use evalbatch_core::config::{is_safe_directive_value, is_valid_wall_time};
use evalbatch_core::{BatchError, DerivedInfo, LauncherDefaults, Result, RunConfig};
use tracing::{debug, info, warn};

use crate::extract::FieldExtractor;

/// 命令行覆盖项，未指定的字段使用 LauncherDefaults 中的值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub total_tasks: Option<u32>,
    pub tasks_per_job: Option<u32>,
    pub config_path: Option<PathBuf>,
    pub group_id: Option<String>,
    pub resource_type: Option<String>,
    pub wall_time: Option<String>,
    pub select_count: Option<u32>,
}

/// 解析完成的运行参数
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRun {
    pub config: RunConfig,
    pub derived: DerivedInfo,
}

/// 参数解析器
///
/// 将命令行覆盖项叠加到默认值上，并从评测配置文件中派生模型名等信息。
pub struct ParameterResolver {
    defaults: LauncherDefaults,
    extractor: Box<dyn FieldExtractor>,
}

impl ParameterResolver {
    pub fn new(defaults: LauncherDefaults, extractor: Box<dyn FieldExtractor>) -> Self {
        Self {
            defaults,
            extractor,
        }
    }

    pub fn defaults(&self) -> &LauncherDefaults {
        &self.defaults
    }

    pub fn resolve(&self, overrides: Overrides) -> Result<ResolvedRun> {
        let group_id = overrides
            .group_id
            .or_else(|| self.defaults.group_id.clone())
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .ok_or(BatchError::MissingGroup)?;
        if !is_safe_directive_value(&group_id) {
            return Err(BatchError::InvalidParameter(format!(
                "group id 含有不允许的字符: {group_id:?}"
            )));
        }

        let config_path = overrides
            .config_path
            .unwrap_or_else(|| PathBuf::from(&self.defaults.config_path));
        if !config_path.is_file() {
            return Err(BatchError::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let total_tasks = overrides.total_tasks.unwrap_or(self.defaults.total_tasks);
        let tasks_per_job = overrides
            .tasks_per_job
            .unwrap_or(self.defaults.tasks_per_job);
        let select_count = overrides
            .select_count
            .unwrap_or(self.defaults.select_count);
        for (name, value) in [
            ("total-tasks", total_tasks),
            ("tasks-per-job", tasks_per_job),
            ("select", select_count),
        ] {
            if value == 0 {
                return Err(BatchError::InvalidParameter(format!(
                    "--{name} 必须是正整数"
                )));
            }
        }

        debug!(
            "使用 {} 方式读取配置字段: {}",
            self.extractor.name(),
            config_path.display()
        );
        let derived = self.derive_info(&config_path, total_tasks)?;

        let resource_type = match non_empty(overrides.resource_type) {
            Some(resource_type) => resource_type,
            None => match self.field(&config_path, "job", "queue")? {
                Some(queue) => queue,
                None => {
                    warn!(
                        "未指定资源类型，且配置文件中没有 job.queue，使用默认值: {}",
                        self.defaults.resource_type
                    );
                    self.defaults.resource_type.clone()
                }
            },
        };

        if !is_safe_directive_value(&resource_type) {
            return Err(BatchError::InvalidParameter(format!(
                "资源类型含有不允许的字符: {resource_type:?}"
            )));
        }

        let wall_time = match non_empty(overrides.wall_time) {
            Some(wall_time) => wall_time,
            None => self
                .field(&config_path, "job", "walltime")?
                .unwrap_or_else(|| self.defaults.wall_time.clone()),
        };
        if !is_valid_wall_time(&wall_time) {
            return Err(BatchError::InvalidParameter(format!(
                "walltime 格式无效 (应为 H:MM:SS): {wall_time}"
            )));
        }

        let config = RunConfig {
            total_tasks,
            tasks_per_job,
            config_path,
            group_id,
            resource_type,
            wall_time,
            select_count,
        };

        info!(
            "运行参数: total_tasks={}, tasks_per_job={}, group={}, resource_type={}, walltime={}, model={}",
            config.total_tasks,
            config.tasks_per_job,
            config.group_id,
            config.resource_type,
            config.wall_time,
            derived.model_name
        );

        Ok(ResolvedRun { config, derived })
    }

    fn derive_info(&self, config_path: &Path, total_tasks: u32) -> Result<DerivedInfo> {
        let model_name = match self.field(config_path, "model", "name")? {
            Some(name) => name,
            None => {
                warn!(
                    "配置文件中没有 model.name，使用占位符: {}",
                    self.defaults.unknown_model
                );
                self.defaults.unknown_model.clone()
            }
        };

        let config_task_end_idx = self
            .field(config_path, "evaluation", "task_end_idx")?
            .and_then(|raw| match raw.parse::<u64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    debug!("evaluation.task_end_idx 不是整数，忽略: {raw}");
                    None
                }
            });

        if let Some(end_idx) = config_task_end_idx {
            if end_idx < u64::from(total_tasks) {
                warn!(
                    "配置文件中的 evaluation.task_end_idx ({end_idx}) 小于 total_tasks ({total_tasks})"
                );
            }
        }

        Ok(DerivedInfo::new(model_name, config_task_end_idx))
    }

    fn field(&self, path: &Path, top: &str, nested: &str) -> Result<Option<String>> {
        self.extractor.extract(path, top, nested)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
