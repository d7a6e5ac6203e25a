use std::fs;
use std::path::{Path, PathBuf};

use evalbatch_core::config::is_safe_directive_value;
use evalbatch_core::{BatchError, DerivedInfo, JobBatch, Result, RunConfig, RunContext};
use serde::Serialize;
use tera::{Context, Tera};
use tracing::debug;

use crate::shell::sh_filter;

const TEMPLATE_NAME: &str = "job.sh";

/// PBS作业脚本模板
///
/// 路径和模型名等自由文本经 `sh` 过滤器引用；`#PBS` 指令参数不经过shell，渲染前单独校验。
/// `eval_command` 来自启动器配置，按shell代码原样写入。
pub const DEFAULT_JOB_TEMPLATE: &str = r#"#!/bin/bash
#PBS -q {{ resource_type }}
#PBS -l select={{ select_count }}
#PBS -l walltime={{ wall_time }}
#PBS -P {{ group_id }}
#PBS -N {{ job_name }}
#PBS -j oe
#PBS -o {{ log_path }}

cd {{ work_dir | sh }}

export CONFIG_FILE={{ config_path | sh }}
export START_IDX={{ start_idx }}
export END_IDX={{ end_idx }}
export JOB_ID={{ job_id | sh }}
MODEL_NAME={{ model_name | sh }}

echo "Job ${JOB_ID}: model=${MODEL_NAME}, tasks ${START_IDX}-${END_IDX}"

if [ ! -f "$CONFIG_FILE" ]; then
    echo "Error: config file not found: $CONFIG_FILE" >&2
    exit 1
fi

{{ eval_command }} \
    --config "$CONFIG_FILE" \
    --task-start-idx "$START_IDX" \
    --task-end-idx "$END_IDX" \
    --job-id "$JOB_ID"
EXIT_CODE=$?

echo "Job ${JOB_ID} finished with exit code ${EXIT_CODE}"
exit $EXIT_CODE
"#;

/// 生成文件所在的目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLayout {
    pub job_scripts_dir: PathBuf,
    pub log_dir: PathBuf,
    /// 作业启动后切换到的工作目录
    pub work_dir: PathBuf,
}

impl ScriptLayout {
    pub fn create_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.job_scripts_dir)?;
        fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}

/// 已写入磁盘的作业脚本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedScript {
    pub batch: JobBatch,
    pub path: PathBuf,
    pub job_name: String,
    pub job_id: String,
}

#[derive(Serialize)]
struct TemplateVars<'a> {
    resource_type: &'a str,
    select_count: u32,
    wall_time: &'a str,
    group_id: &'a str,
    job_name: &'a str,
    log_path: String,
    work_dir: String,
    config_path: String,
    start_idx: u32,
    end_idx: u32,
    job_id: &'a str,
    model_name: &'a str,
    eval_command: &'a str,
}

/// 作业脚本渲染器
#[derive(Debug, Clone)]
pub struct JobScriptRenderer {
    layout: ScriptLayout,
    eval_command: String,
    job_name_prefix: String,
    template: String,
}

impl JobScriptRenderer {
    pub fn new(
        layout: ScriptLayout,
        eval_command: impl Into<String>,
        job_name_prefix: impl Into<String>,
    ) -> Self {
        Self {
            layout,
            eval_command: eval_command.into(),
            job_name_prefix: job_name_prefix.into(),
            template: DEFAULT_JOB_TEMPLATE.to_string(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn layout(&self) -> &ScriptLayout {
        &self.layout
    }

    /// `job_<timestamp>_<run_id>_<model>_<i>.sh`
    pub fn script_path(&self, batch: &JobBatch, ctx: &RunContext, derived: &DerivedInfo) -> PathBuf {
        self.layout.job_scripts_dir.join(format!(
            "job_{}_{}_{}_{}.sh",
            ctx.timestamp, ctx.run_id, derived.sanitized_model_name, batch.index
        ))
    }

    pub fn job_name(&self, batch: &JobBatch) -> String {
        format!("{}_{}", self.job_name_prefix, batch.index)
    }

    fn log_path(&self, batch: &JobBatch, ctx: &RunContext) -> PathBuf {
        self.layout.log_dir.join(format!(
            "{}_{}_{}_{}.log",
            self.job_name_prefix, ctx.timestamp, ctx.run_id, batch.index
        ))
    }

    pub fn render(
        &self,
        batch: &JobBatch,
        ctx: &RunContext,
        derived: &DerivedInfo,
        config: &RunConfig,
    ) -> Result<String> {
        let job_name = self.job_name(batch);
        let job_id = ctx.job_id(batch.index);
        let vars = TemplateVars {
            resource_type: &config.resource_type,
            select_count: config.select_count,
            wall_time: &config.wall_time,
            group_id: &config.group_id,
            job_name: &job_name,
            log_path: display(&self.log_path(batch, ctx)),
            work_dir: display(&self.layout.work_dir),
            config_path: display(&config.config_path),
            start_idx: batch.start_idx,
            end_idx: batch.end_idx,
            job_id: &job_id,
            model_name: &derived.model_name,
            eval_command: &self.eval_command,
        };

        for (name, value) in [
            ("resource_type", vars.resource_type),
            ("group_id", vars.group_id),
            ("job_name", vars.job_name),
            ("wall_time", vars.wall_time),
            ("log_path", vars.log_path.as_str()),
        ] {
            if !is_safe_directive_value(value) {
                return Err(BatchError::Template(format!(
                    "#PBS 指令参数 {name} 含有不允许的字符: {value:?}"
                )));
            }
        }

        let context = Context::from_serialize(&vars)
            .map_err(|e| BatchError::Template(format!("构建模板上下文失败: {e}")))?;

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.register_filter("sh", sh_filter);
        tera.add_raw_template(TEMPLATE_NAME, &self.template)
            .map_err(|e| BatchError::Template(format!("解析作业脚本模板失败: {e}")))?;
        tera.render(TEMPLATE_NAME, &context)
            .map_err(|e| BatchError::Template(format!("渲染作业脚本失败 (批次 {}): {e}", batch.index)))
    }

    /// 渲染并写入作业脚本，同名文件会被覆盖
    pub fn write(
        &self,
        batch: &JobBatch,
        ctx: &RunContext,
        derived: &DerivedInfo,
        config: &RunConfig,
    ) -> Result<GeneratedScript> {
        let content = self.render(batch, ctx, derived, config)?;
        let path = self.script_path(batch, ctx, derived);

        fs::write(&path, content)?;
        make_executable(&path)?;
        debug!("作业脚本已写入: {}", path.display());

        Ok(GeneratedScript {
            batch: *batch,
            path,
            job_name: self.job_name(batch),
            job_id: ctx.job_id(batch.index),
        })
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (JobScriptRenderer, RunContext, DerivedInfo, RunConfig) {
        let renderer = JobScriptRenderer::new(
            ScriptLayout {
                job_scripts_dir: PathBuf::from("job_scripts"),
                log_dir: PathBuf::from("logs/abci"),
                work_dir: PathBuf::from("/home/user/webshop"),
            },
            "python eval_webshop.py",
            "webshop",
        );
        let ctx = RunContext {
            timestamp: "0610_2255".to_string(),
            run_id: "1a2b3c4d".to_string(),
        };
        let derived = DerivedInfo::new("openai/o4-mini", Some(200));
        let config = RunConfig {
            total_tasks: 7,
            tasks_per_job: 5,
            config_path: PathBuf::from("/home/user/webshop/configs/o4-mini.yaml"),
            group_id: "gaa50000".to_string(),
            resource_type: "rt_HF".to_string(),
            wall_time: "2:00:00".to_string(),
            select_count: 1,
        };
        (renderer, ctx, derived, config)
    }

    #[test]
    fn test_render_embeds_directives_and_exports() {
        let (renderer, ctx, derived, config) = fixture();
        let batch = JobBatch {
            index: 1,
            start_idx: 5,
            end_idx: 7,
        };

        let script = renderer.render(&batch, &ctx, &derived, &config).unwrap();

        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("#PBS -q rt_HF\n"));
        assert!(script.contains("#PBS -l select=1\n"));
        assert!(script.contains("#PBS -l walltime=2:00:00\n"));
        assert!(script.contains("#PBS -P gaa50000\n"));
        assert!(script.contains("#PBS -N webshop_1\n"));
        assert!(script.contains("#PBS -o logs/abci/webshop_0610_2255_1a2b3c4d_1.log\n"));
        assert!(script.contains("cd '/home/user/webshop'\n"));
        assert!(script.contains("export CONFIG_FILE='/home/user/webshop/configs/o4-mini.yaml'\n"));
        assert!(script.contains("export START_IDX=5\n"));
        assert!(script.contains("export END_IDX=7\n"));
        assert!(script.contains("export JOB_ID='0610_2255_job1'\n"));
        assert!(script.contains("MODEL_NAME='openai/o4-mini'\n"));
        assert!(script.contains("if [ ! -f \"$CONFIG_FILE\" ]; then"));
        assert!(script.contains("python eval_webshop.py \\\n    --config \"$CONFIG_FILE\""));
        assert!(script.contains("--task-start-idx \"$START_IDX\""));
        assert!(script.contains("--task-end-idx \"$END_IDX\""));
        assert!(script.contains("--job-id \"$JOB_ID\""));
        assert!(script.trim_end().ends_with("exit $EXIT_CODE"));
    }

    #[test]
    fn test_free_text_values_are_shell_quoted() {
        let (renderer, ctx, _, mut config) = fixture();
        let derived = DerivedInfo::new("evil\"; touch /tmp/pwned; echo \"", None);
        config.config_path = PathBuf::from("/data/it's $(id)/o4-mini.yaml");
        let batch = JobBatch {
            index: 0,
            start_idx: 0,
            end_idx: 5,
        };

        let script = renderer.render(&batch, &ctx, &derived, &config).unwrap();

        assert!(script.contains("MODEL_NAME='evil\"; touch /tmp/pwned; echo \"'\n"));
        assert!(script.contains("export CONFIG_FILE='/data/it'\\''s $(id)/o4-mini.yaml'\n"));
        assert!(script.contains("echo \"Job ${JOB_ID}: model=${MODEL_NAME}, tasks ${START_IDX}-${END_IDX}\"\n"));
        assert!(!script.contains("model=evil"));
    }

    #[test]
    fn test_unsafe_directive_value_is_template_error() {
        let (renderer, ctx, derived, mut config) = fixture();
        config.group_id = "gaa50000\nrm -rf ~".to_string();
        let batch = JobBatch {
            index: 0,
            start_idx: 0,
            end_idx: 5,
        };

        assert!(matches!(
            renderer.render(&batch, &ctx, &derived, &config),
            Err(BatchError::Template(_))
        ));
    }

    #[test]
    fn test_script_path_uses_sanitized_model_and_run_id() {
        let (renderer, ctx, derived, _) = fixture();
        let batch = JobBatch {
            index: 3,
            start_idx: 15,
            end_idx: 20,
        };

        assert_eq!(
            renderer.script_path(&batch, &ctx, &derived),
            PathBuf::from("job_scripts/job_0610_2255_1a2b3c4d_openai_o4-mini_3.sh")
        );
    }

    #[test]
    fn test_invalid_template_is_template_error() {
        let (renderer, ctx, derived, config) = fixture();
        let renderer = renderer.with_template("{{ unclosed");
        let batch = JobBatch {
            index: 0,
            start_idx: 0,
            end_idx: 5,
        };

        assert!(matches!(
            renderer.render(&batch, &ctx, &derived, &config),
            Err(BatchError::Template(_))
        ));
    }
}
