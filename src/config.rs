use crate::error::ConfigError;
use crate::services::RetryPolicy;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 程序配置
///
/// 所有字段都是启动时确定的常量，运行期间不会修改。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 每批文本页数
    pub batch_size: usize,
    /// 每批最多附带的图片页数
    pub max_images_per_batch: usize,
    /// 同时在途的批次（模型调用）数量
    pub max_concurrent_batches: usize,
    /// 批次临时 ID 的间隔，批次 i 从 i × 间隔 + 1 开始编号
    pub batch_id_spacing: usize,
    // --- 重试策略 ---
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub backoff_multiplier: f64,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    /// 单次请求超时（秒）
    pub llm_timeout_secs: u64,
    // --- 存储 ---
    /// 题库 JSON 文件路径
    pub store_path: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_images_per_batch: 5,
            max_concurrent_batches: 4,
            batch_id_spacing: 100,
            max_retries: 3,
            initial_retry_delay_ms: 1000,
            backoff_multiplier: 2.0,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_temperature: 0.2,
            llm_max_tokens: 8192,
            llm_timeout_secs: 300,
            store_path: "output/questions.json".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 在默认值上叠加环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取，缺失的键使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
                path: path.display().to_string(),
                source,
            })?;
        toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })
    }

    /// 启动时使用的加载顺序：`EXTRACT_CONFIG` 指向的 TOML 文件 → 环境变量 → 校验
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("EXTRACT_CONFIG") {
            Ok(path) => Self::from_toml_file(path)?,
            Err(_) => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 环境变量覆盖，无法解析的值保留原值
    pub fn with_env_overrides(self) -> Self {
        Self {
            batch_size: env_parse("BATCH_SIZE").unwrap_or(self.batch_size),
            max_images_per_batch: env_parse("MAX_IMAGES_PER_BATCH")
                .unwrap_or(self.max_images_per_batch),
            max_concurrent_batches: env_parse("MAX_CONCURRENT_BATCHES")
                .unwrap_or(self.max_concurrent_batches),
            batch_id_spacing: env_parse("BATCH_ID_SPACING").unwrap_or(self.batch_id_spacing),
            max_retries: env_parse("MAX_RETRIES").unwrap_or(self.max_retries),
            initial_retry_delay_ms: env_parse("INITIAL_RETRY_DELAY_MS")
                .unwrap_or(self.initial_retry_delay_ms),
            backoff_multiplier: env_parse("BACKOFF_MULTIPLIER").unwrap_or(self.backoff_multiplier),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            llm_temperature: env_parse("LLM_TEMPERATURE").unwrap_or(self.llm_temperature),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS").unwrap_or(self.llm_max_tokens),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS").unwrap_or(self.llm_timeout_secs),
            store_path: std::env::var("STORE_PATH").unwrap_or(self.store_path),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(self.verbose_logging),
        }
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "必须大于 0"));
        }
        if self.max_images_per_batch == 0 {
            return Err(invalid("max_images_per_batch", "必须大于 0"));
        }
        if self.max_concurrent_batches == 0 {
            return Err(invalid("max_concurrent_batches", "必须大于 0"));
        }
        if self.batch_id_spacing == 0 {
            return Err(invalid("batch_id_spacing", "必须大于 0"));
        }
        if !(self.backoff_multiplier >= 1.0) {
            return Err(invalid(
                "backoff_multiplier",
                format!("必须 >= 1.0，当前为 {}", self.backoff_multiplier),
            ));
        }
        if self.llm_model_name.trim().is_empty() {
            return Err(invalid("llm_model_name", "不能为空"));
        }
        Ok(())
    }

    /// 由配置生成重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_retry_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            ..RetryPolicy::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}
