use anyhow::Result;
use evalbatch::app::run_merge;
use evalbatch::cli::MergeArgs;
use evalbatch::common::{init_logging, parse_args};
use tracing::info;

fn main() -> Result<()> {
    let args = parse_args::<MergeArgs>();
    init_logging(&args.log_level, &args.log_format)?;

    let outcome = run_merge(&args)?;
    info!(
        "处理完成: 模式={:?}, 读取文件 {} 个, 记录 {} 条",
        outcome.mode,
        outcome.files_read,
        outcome.records.len()
    );
    Ok(())
}
