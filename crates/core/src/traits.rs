use std::path::Path;

use async_trait::async_trait;

use crate::errors::Result;

/// 外部作业调度系统接口
///
/// 接收已写入磁盘的作业脚本，返回调度系统分配的作业ID。
#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn submit(&self, script_path: &Path) -> Result<String>;

    fn name(&self) -> &str;
}
