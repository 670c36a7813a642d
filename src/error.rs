//! 错误类型
//!
//! 按层划分：
//! - `ModelError` - 外部模型调用失败（带状态码，供重试分类器使用）
//! - `ParseError` - 模型输出无法恢复为 JSON
//! - `StoreError` - 题库存储读写失败
//! - `ConfigError` - 配置加载或校验失败
//! - `ExtractError` - 整条流水线对调用方暴露的硬错误
//!
//! 每个对外错误都有稳定的机器标签（`kind()`），以及给运维看的文字说明。

use serde::Serialize;

// ========== 模型调用错误 ==========

/// 模型调用错误
///
/// 状态码在传输层能给出时才有值；消息原样保留，重试分类器会在里面找关键字。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "模型调用失败{}: {}",
    .status_code.map(|code| format!(" (状态码: {})", code)).unwrap_or_default(),
    .message
)]
pub struct ModelError {
    pub status_code: Option<u16>,
    pub message: String,
}

/// 模型错误的大类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// 503 / overloaded / unavailable，暂时性故障
    Unavailable,
    /// 429 且消息提到配额
    QuotaExceeded,
    /// 其他 429
    RateLimited,
    /// 其余错误
    Other,
}

impl ModelError {
    pub fn new(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    /// 没有状态码的错误（例如网络断开、响应结构异常）
    pub fn without_status(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    /// 消息里是否带有“服务暂时不可用”的标记
    pub fn has_unavailable_marker(&self) -> bool {
        let lower = self.message.to_lowercase();
        lower.contains("overloaded") || lower.contains("unavailable")
    }

    /// 粗分类
    ///
    /// 配额 / 限流的区分只能靠服务商的措辞，属于尽力而为的判断。
    pub fn kind(&self) -> ModelErrorKind {
        let lower = self.message.to_lowercase();
        match self.status_code {
            Some(429) if lower.contains("quota") || lower.contains("billing") => {
                ModelErrorKind::QuotaExceeded
            }
            Some(429) => ModelErrorKind::RateLimited,
            Some(503) => ModelErrorKind::Unavailable,
            _ if self.has_unavailable_marker() => ModelErrorKind::Unavailable,
            _ => ModelErrorKind::Other,
        }
    }
}

// ========== 解析错误 ==========

/// 模型输出解析错误
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 文本里连一个 `{` ... `}` 都找不到
    #[error("模型输出中没有找到 JSON 对象")]
    NoJsonObject,
    /// 修复与截断恢复都失败后，返回最初的解析错误
    #[error("JSON 解析失败: {0}")]
    Invalid(#[from] serde_json::Error),
}

// ========== 存储错误 ==========

/// 题库存储错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("读写题库文件失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("题库文件格式错误 ({path}): {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("题库存储不可用: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<String>, source: serde_json::Error) -> Self {
        StoreError::Json {
            path: path.into(),
            source,
        }
    }
}

// ========== 配置错误 ==========

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("配置项 {field} 无效: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("配置文件 TOML 解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 流水线错误 ==========

/// 整体失败时归纳出的主要原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    ModelUnavailable,
    QuotaExceeded,
    RateLimited,
    ModelError,
    ParseError,
    EmptyResponse,
}

impl FailureCause {
    /// 机器可读标签
    pub fn tag(self) -> &'static str {
        match self {
            FailureCause::ModelUnavailable => "model_unavailable",
            FailureCause::QuotaExceeded => "quota_exceeded",
            FailureCause::RateLimited => "rate_limited",
            FailureCause::ModelError => "model_error",
            FailureCause::ParseError => "parse_error",
            FailureCause::EmptyResponse => "empty_response",
        }
    }

    /// 给调用方的处理建议
    pub fn hint(self) -> &'static str {
        match self {
            FailureCause::ModelUnavailable => {
                "模型服务暂时过载或不可用，这是暂时性问题，请稍后重试。"
            }
            FailureCause::QuotaExceeded => {
                "模型 API 配额已用尽。请检查账号的用量与计费设置，提升配额或更换 API Key 后再重试。"
            }
            FailureCause::RateLimited => {
                "请求频率超过模型 API 的限制。请降低并发批次数（MAX_CONCURRENT_BATCHES）或等待一段时间后重试。"
            }
            FailureCause::ModelError => "模型调用失败，请检查模型名称、API 地址与 API Key 配置。",
            FailureCause::ParseError => {
                "模型输出无法解析为题目 JSON，可尝试减小批次大小（BATCH_SIZE）以避免输出被截断。"
            }
            FailureCause::EmptyResponse => "模型返回了空内容，请确认输入文档包含可识别的题目。",
        }
    }

    /// 多个批次原因并存时，越靠前越值得告诉用户
    pub fn priority(self) -> u8 {
        match self {
            FailureCause::QuotaExceeded => 0,
            FailureCause::ModelUnavailable => 1,
            FailureCause::RateLimited => 2,
            FailureCause::ModelError => 3,
            FailureCause::ParseError => 4,
            FailureCause::EmptyResponse => 5,
        }
    }
}

impl From<ModelErrorKind> for FailureCause {
    fn from(kind: ModelErrorKind) -> Self {
        match kind {
            ModelErrorKind::Unavailable => FailureCause::ModelUnavailable,
            ModelErrorKind::QuotaExceeded => FailureCause::QuotaExceeded,
            ModelErrorKind::RateLimited => FailureCause::RateLimited,
            ModelErrorKind::Other => FailureCause::ModelError,
        }
    }
}

/// 流水线硬错误
///
/// 单个批次的失败不会走到这里，只会降级为空结果。
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// 没有页面，或者文本、图片两类都为空
    #[error("输入无效: {0}")]
    InvalidInput(String),
    /// 所有批次都没有产出有效题目
    #[error("全部 {total_batches} 个批次都未提取到有效题目")]
    TotalExtractionFailure {
        total_batches: usize,
        cause: Option<FailureCause>,
    },
    #[error("提取已取消")]
    Cancelled,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ExtractError {
    /// 机器可读标签
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::InvalidInput(_) => "invalid_input",
            ExtractError::TotalExtractionFailure { .. } => "total_extraction_failure",
            ExtractError::Cancelled => "cancelled",
            ExtractError::Config(_) => "config",
        }
    }

    /// 归纳出的根因标签（仅整体失败时有）
    pub fn cause(&self) -> Option<FailureCause> {
        match self {
            ExtractError::TotalExtractionFailure { cause, .. } => *cause,
            _ => None,
        }
    }

    /// 给运维看的详细说明
    pub fn details(&self) -> String {
        match self {
            ExtractError::InvalidInput(reason) => {
                format!("{}。未调用模型。", reason)
            }
            ExtractError::TotalExtractionFailure {
                total_batches,
                cause: Some(cause),
            } => format!(
                "{} 个批次全部失败，主要原因: {}。{}",
                total_batches,
                cause.tag(),
                cause.hint()
            ),
            ExtractError::TotalExtractionFailure {
                total_batches,
                cause: None,
            } => format!(
                "{} 个批次均未返回符合格式的题目，请确认文档内容包含选择题。",
                total_batches
            ),
            ExtractError::Cancelled => "调用方取消了本次提取，未保存任何结果。".to_string(),
            ExtractError::Config(e) => e.to_string(),
        }
    }

    /// 创建输入无效错误
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        ExtractError::InvalidInput(reason.into())
    }
}

// ========== Result 类型别名 ==========

/// 流水线结果类型
pub type ExtractResult<T> = Result<T, ExtractError>;
