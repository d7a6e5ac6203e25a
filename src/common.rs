use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use evalbatch_core::{LogLevel, OutputFormat};

/// 解析命令行参数
///
/// `--help`/`--version` 以0退出；其它解析错误打印错误和完整的选项列表后以1退出。
pub fn parse_args<T: Parser>() -> T {
    match T::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                let _ = e.print();
                let mut command = T::command();
                eprintln!("\n{}", command.render_help());
                std::process::exit(1);
            }
        },
    }
}

/// 初始化日志系统
pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let level: LogLevel = log_level.parse().context("解析日志级别失败")?;
    let format: OutputFormat = log_format.parse().context("解析日志格式失败")?;
    evalbatch_core::init_logging(level, format).context("初始化日志系统失败")?;
    Ok(())
}
