use std::path::PathBuf;

use clap::Parser;
use evalbatch_domain::Overrides;

/// 批量提交工具参数
#[derive(Parser, Debug, Clone)]
#[command(name = "evalbatch-submit")]
#[command(version = "1.0.0")]
#[command(about = "将评测任务切分为批次，并为每个批次提交一个PBS作业")]
pub struct SubmitArgs {
    /// 任务总数
    #[arg(long, value_name = "N")]
    pub total_tasks: Option<u32>,

    /// 每个作业处理的任务数
    #[arg(long, value_name = "N")]
    pub tasks_per_job: Option<u32>,

    /// 评测配置文件 (YAML)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// 项目/组ID (必需)
    #[arg(long, value_name = "ID")]
    pub group: Option<String>,

    /// 资源类型，未指定时读取配置中的 job.queue
    #[arg(long, value_name = "TYPE")]
    pub resource_type: Option<String>,

    /// 作业最长运行时间
    #[arg(long, value_name = "H:MM:SS")]
    pub walltime: Option<String>,

    /// 每个作业申请的资源数量
    #[arg(long, value_name = "N")]
    pub select: Option<u32>,

    /// 只生成作业脚本，不提交
    #[arg(long)]
    pub dry_run: bool,

    /// 配置字段的读取方式
    #[arg(long, value_name = "MODE", default_value = "structured", value_parser = ["structured", "line-scan"])]
    pub extractor: String,

    /// 启动器默认参数文件 (TOML)
    #[arg(long, value_name = "FILE")]
    pub launcher_config: Option<String>,

    /// 日志级别
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: String,

    /// 日志格式
    #[arg(long, value_name = "FORMAT", default_value = "text", value_parser = ["json", "pretty", "text"])]
    pub log_format: String,
}

impl SubmitArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            total_tasks: self.total_tasks,
            tasks_per_job: self.tasks_per_job,
            config_path: self.config.clone(),
            group_id: self.group.clone(),
            resource_type: self.resource_type.clone(),
            wall_time: self.walltime.clone(),
            select_count: self.select,
        }
    }
}

/// 结果合并工具参数
#[derive(Parser, Debug, Clone)]
#[command(name = "evalbatch-merge")]
#[command(version = "1.0.0")]
#[command(about = "合并批量作业的结果并输出统计信息")]
#[command(long_about = "目录中已有 merged.jsonl 时只输出统计信息，否则先合并所有 *.jsonl 文件")]
pub struct MergeArgs {
    /// 结果文件所在目录
    pub results_dir: PathBuf,

    /// 统计信息输出文件，相对路径以结果目录为基准
    #[arg(long, value_name = "FILE")]
    pub stats_output: Option<PathBuf>,

    /// 日志级别
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: String,

    /// 日志格式
    #[arg(long, value_name = "FORMAT", default_value = "text", value_parser = ["json", "pretty", "text"])]
    pub log_format: String,
}
