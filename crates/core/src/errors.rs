use thiserror::Error;

/// 批量提交工具的错误类型定义
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("用法错误: {0}")]
    Usage(String),

    #[error("缺少必需参数: 未指定group id (--group)")]
    MissingGroup,

    #[error("配置文件不存在: {path}")]
    ConfigNotFound { path: String },

    #[error("无效的参数: {0}")]
    InvalidParameter(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("模板渲染错误: {0}")]
    Template(String),

    #[error("作业提交失败: {0}")]
    Submission(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

impl BatchError {
    /// 进程退出码
    ///
    /// 用法错误为1；配置类错误互不相同，便于调用方区分失败原因。
    pub fn exit_code(&self) -> i32 {
        match self {
            BatchError::Usage(_) => 1,
            BatchError::MissingGroup => 2,
            BatchError::ConfigNotFound { .. } => 3,
            BatchError::InvalidParameter(_) => 4,
            _ => 1,
        }
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(err: serde_json::Error) -> Self {
        BatchError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for BatchError {
    fn from(err: config::ConfigError) -> Self {
        BatchError::Configuration(err.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, BatchError>;
