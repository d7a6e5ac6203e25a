//! 作业脚本生成与提交
//!
//! 按批次顺序渲染PBS作业脚本、写入磁盘并交给调度器提交，最后汇总结果。

pub mod orchestrator;
pub mod shell;
pub mod summary;
pub mod template;

pub use orchestrator::SubmissionOrchestrator;
pub use shell::sh_escape;
pub use summary::render_summary;
pub use template::{GeneratedScript, JobScriptRenderer, ScriptLayout, DEFAULT_JOB_TEMPLATE};
