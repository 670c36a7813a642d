//! 模型调用 - 业务能力层
//!
//! 在 `ModelClient` 外面包一层指数退避重试。调用本身与每次退避等待都可以被取消。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clients::{ModelClient, ModelRequest};
use crate::error::ModelError;

/// 重试策略
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub is_retryable: fn(&ModelError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            is_retryable: default_is_retryable,
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次失败（从 0 开始）之后的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay
            .mul_f64(self.backoff_multiplier.powi(attempt as i32))
    }
}

/// 429 / 503，或消息里带 overloaded / unavailable
pub fn default_is_retryable(err: &ModelError) -> bool {
    matches!(err.status_code, Some(429) | Some(503)) || err.has_unavailable_marker()
}

/// 调用失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// 不可重试，或重试耗尽后的最后一次错误
    Model(ModelError),
    Cancelled,
}

/// 带重试的模型调用器
#[derive(Clone)]
pub struct ModelInvoker {
    client: Arc<dyn ModelClient>,
    model_name: String,
    policy: RetryPolicy,
}

impl ModelInvoker {
    pub fn new(client: Arc<dyn ModelClient>, model_name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            client,
            model_name: model_name.into(),
            policy,
        }
    }

    /// 调用模型，可重试的错误按策略退避后重试
    pub async fn invoke(
        &self,
        request: &ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<String, InvokeError> {
        let mut attempt: u32 = 0;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(InvokeError::Cancelled),
                result = self.client.generate(&self.model_name, request) => result,
            };

            let err = match result {
                Ok(text) => {
                    if attempt > 0 {
                        debug!("第 {} 次重试成功", attempt);
                    }
                    return Ok(text);
                }
                Err(err) => err,
            };

            if !(self.policy.is_retryable)(&err) {
                debug!("不可重试的模型错误: {}", err);
                return Err(InvokeError::Model(err));
            }
            if attempt >= self.policy.max_retries {
                warn!(
                    "模型调用重试 {} 次后仍失败: {}",
                    self.policy.max_retries, err
                );
                return Err(InvokeError::Model(err));
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                "模型暂时不可用 ({})，{:?} 后进行第 {}/{} 次重试",
                err,
                delay,
                attempt + 1,
                self.policy.max_retries
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(InvokeError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// 按顺序返回预设结果，并记录每次调用的时间点
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<String, ModelError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<String, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn generate(&self, _model: &str, _request: &ModelRequest) -> Result<String, ModelError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::without_status("脚本已用完")))
        }
    }

    fn invoker(client: Arc<ScriptedClient>) -> ModelInvoker {
        ModelInvoker::new(client, "test-model", RetryPolicy::default())
    }

    fn unavailable() -> Result<String, ModelError> {
        Err(ModelError::new(Some(503), "Service Unavailable"))
    }

    #[test]
    fn test_default_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn test_default_is_retryable() {
        assert!(default_is_retryable(&ModelError::new(Some(429), "Too Many Requests")));
        assert!(default_is_retryable(&ModelError::new(Some(503), "x")));
        assert!(default_is_retryable(&ModelError::new(Some(500), "model is Overloaded")));
        assert!(default_is_retryable(&ModelError::without_status("UNAVAILABLE")));
        assert!(!default_is_retryable(&ModelError::new(Some(400), "bad request")));
        assert!(!default_is_retryable(&ModelError::new(Some(401), "invalid api key")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_exponential_backoff() {
        let client = ScriptedClient::new(vec![unavailable(), unavailable(), Ok("ok".to_string())]);
        let start = Instant::now();

        let text = invoker(client.clone())
            .invoke(&ModelRequest::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(text, "ok");
        let calls = client.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        // 1s 后第一次重试，再过 2s 第二次重试
        assert_eq!(calls[1] - start, Duration::from_secs(1));
        assert_eq!(calls[2] - start, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error() {
        let client = ScriptedClient::new(vec![
            unavailable(),
            unavailable(),
            unavailable(),
            Err(ModelError::new(Some(429), "rate limit, last one")),
        ]);

        let err = invoker(client.clone())
            .invoke(&ModelRequest::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(client.call_count(), 4);
        assert_eq!(
            err,
            InvokeError::Model(ModelError::new(Some(429), "rate limit, last one"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_propagates_immediately() {
        let client = ScriptedClient::new(vec![
            Err(ModelError::new(Some(401), "invalid api key")),
            Ok("never".to_string()),
        ]);

        let result = invoker(client.clone())
            .invoke(&ModelRequest::default(), &CancellationToken::new())
            .await;

        tokio_test::assert_err!(&result);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let client = ScriptedClient::new(vec![unavailable(), Ok("late".to_string())]);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let result = invoker(client.clone())
            .invoke(&ModelRequest::default(), &cancel)
            .await;

        assert_eq!(result, Err(InvokeError::Cancelled));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_custom_retry_predicate() {
        let client = ScriptedClient::new(vec![unavailable(), Ok("ok".to_string())]);
        let policy = RetryPolicy {
            is_retryable: |_| false,
            ..RetryPolicy::default()
        };

        let result = ModelInvoker::new(client.clone(), "m", policy)
            .invoke(&ModelRequest::default(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(InvokeError::Model(_))));
        assert_eq!(client.call_count(), 1);
    }
}
