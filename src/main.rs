use evalbatch::app::run_submit;
use evalbatch::cli::SubmitArgs;
use evalbatch::common::{init_logging, parse_args};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = parse_args::<SubmitArgs>();

    if let Err(e) = init_logging(&args.log_level, &args.log_format) {
        eprintln!("错误: {e:#}");
        std::process::exit(1);
    }

    info!("启动批量提交, 日志级别: {}", args.log_level);

    match run_submit(args).await {
        Ok(report) => {
            info!(
                "运行 {} 结束: {}/{} 个作业成功",
                report.context.run_id,
                report.success_count(),
                report.results.len()
            );
        }
        Err(e) => {
            error!("批量提交失败: {e}");
            eprintln!("错误: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
