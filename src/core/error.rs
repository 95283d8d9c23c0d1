use thiserror::Error;

#[derive(Error, Debug)]
pub enum TradingError {
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("YAML配置错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("API错误: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("认证错误: {0}")]
    AuthError(String),

    #[error("合约代码错误: {0}")]
    SymbolError(String),

    #[error("订单错误: {0}")]
    OrderError(String),

    #[error("速率限制: {0}")]
    RateLimitError(String, Option<u64>),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("参数验证错误: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("数据解析错误: {0}")]
    ParseError(String),

    #[error("CSV读写错误: {0}")]
    CsvError(#[from] csv::Error),

    #[error("数据不可用: {0}")]
    DataUnavailable(String),

    #[error("历史数据不足: 需要 {required} 根K线, 实际 {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("状态持久化错误: {0}")]
    PersistenceError(String),

    #[error("超时错误: 操作 '{operation}' 超时 ({timeout_seconds}秒)")]
    TimeoutError {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("其他错误: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TradingError>;

/// 错误严重程度，决定策略层的日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl TradingError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        TradingError::ValidationError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 判断错误是否可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TradingError::Io(_) => true,
            TradingError::TimeoutError { .. } => true,
            TradingError::RateLimitError(_, _) => true,
            TradingError::ApiError { code, .. } => {
                // HTTP 5xx 错误通常可以重试
                *code >= 500 && *code < 600
            }
            _ => false,
        }
    }

    /// 获取建议的重试等待时间(秒)
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            TradingError::RateLimitError(_, retry_after) => *retry_after,
            TradingError::Io(_) => Some(1),
            TradingError::TimeoutError { .. } => Some(2),
            TradingError::ApiError { code, .. } if *code >= 500 => Some(5),
            _ => None,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TradingError::DataUnavailable(_) | TradingError::InsufficientHistory { .. } => {
                ErrorSeverity::Info
            }
            TradingError::RateLimitError(..) | TradingError::TimeoutError { .. } => {
                ErrorSeverity::Warning
            }
            TradingError::AuthError(_)
            | TradingError::ConfigError(_)
            | TradingError::PersistenceError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }
}
