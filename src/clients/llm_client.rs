//! LLM 客户端
//!
//! `ModelClient` 是流水线依赖的唯一模型接口：给定模型名与请求，返回一段文本。
//! `OpenAiClient` 用 `async-openai` 实现它，兼容任何 OpenAI 风格的服务
//! （OpenAI、Azure、Gemini 兼容端点、Doubao 等）。

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clients::request::{ModelRequest, RequestPart};
use crate::config::Config;
use crate::error::ModelError;

/// 单次模型调用
///
/// 实现方只负责一次调用，不做重试；重试由 `ModelInvoker` 统一处理。
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, model: &str, request: &ModelRequest) -> Result<String, ModelError>;
}

/// OpenAI 兼容接口的客户端
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    /// 创建客户端，启动时构造一次，之后注入到流水线
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("⚠️ 创建 HTTP 客户端失败，使用默认设置（无超时）: {}", e);
                reqwest::Client::new()
            });

        // 重试统一交给 ModelInvoker，关掉 async-openai 自带的退避重试
        let no_retry = ExponentialBackoff {
            max_elapsed_time: Some(Duration::ZERO),
            ..ExponentialBackoff::default()
        };

        Self {
            client: Client::with_config(openai_config)
                .with_http_client(http_client)
                .with_backoff(no_retry),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn generate(&self, model: &str, request: &ModelRequest) -> Result<String, ModelError> {
        debug!(
            "调用 LLM API，模型: {}，图片 {} 张",
            model,
            request.image_count()
        );

        let messages = build_messages(request).map_err(model_error_from_openai)?;

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(model_error_from_openai)?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| {
                warn!("LLM API 调用失败: {}", e);
                model_error_from_openai(e)
            })?;

        debug!("LLM API 调用成功");

        // 没有内容时返回空串，由批处理器按“空响应”处理
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

/// 把中立的请求结构转成一条用户消息（文本段 + 图片段）
fn build_messages(
    request: &ModelRequest,
) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> =
        Vec::with_capacity(request.parts.len());

    for part in &request.parts {
        match part {
            RequestPart::Text(text) => {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                    ChatCompletionRequestMessageContentPartText { text: text.clone() },
                ));
            }
            RequestPart::Image(image) => {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: image.to_data_url(),
                            detail: Some(ImageDetail::Auto),
                        },
                    },
                ));
            }
        }
    }

    let user_msg = ChatCompletionRequestUserMessageArgs::default()
        .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
        .build()?;

    Ok(vec![ChatCompletionRequestMessage::User(user_msg)])
}

/// 提取状态码：传输层给出的 HTTP 状态优先，否则从服务商错误码推断
pub(crate) fn model_error_from_openai(err: OpenAIError) -> ModelError {
    let status_code = match &err {
        OpenAIError::Reqwest(e) => e.status().map(|s| s.as_u16()),
        // 5xx 的响应体不一定是 JSON，async-openai 只保留原文，type 与 code 都为空
        OpenAIError::ApiError(api) if api.r#type.is_none() && api.code.is_none() => Some(503),
        OpenAIError::ApiError(api) => status_from_provider_code(api.code.as_deref())
            .or_else(|| status_from_provider_code(api.r#type.as_deref())),
        _ => None,
    };
    ModelError::new(status_code, err.to_string())
}

fn status_from_provider_code(code: Option<&str>) -> Option<u16> {
    let code = code?.to_lowercase();
    if code.contains("quota") || code.contains("rate_limit") || code == "429" {
        Some(429)
    } else if code.contains("overloaded") || code.contains("unavailable") || code == "503" {
        Some(503)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::request::ImageAttachment;

    #[test]
    fn test_status_from_provider_code() {
        assert_eq!(status_from_provider_code(Some("insufficient_quota")), Some(429));
        assert_eq!(status_from_provider_code(Some("rate_limit_exceeded")), Some(429));
        assert_eq!(status_from_provider_code(Some("model_overloaded")), Some(503));
        assert_eq!(status_from_provider_code(Some("invalid_api_key")), None);
        assert_eq!(status_from_provider_code(None), None);
    }

    #[test]
    fn test_build_messages_single_user_message() {
        let mut request = ModelRequest::default();
        request.push_text("提取题目");
        request.push_text("第 2 页（图片）：");
        request.push_image(ImageAttachment {
            page_number: 2,
            media_type: "image/png".to_string(),
            data: vec![0x89, 0x50],
        });

        let messages = build_messages(&request).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::User(_)));
    }

    use crate::error::ModelErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn http_response(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        )
    }

    /// 本地假服务：每个连接都回同一个响应，并记录连接次数
    async fn fake_server(response: String) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let response = response.clone();
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{}/v1", addr), hits)
    }

    /// 读完请求头和 Content-Length 指定的请求体
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);

            let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
            let body_len = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + body_len {
                return;
            }
        }
    }

    async fn generate_against(response: String) -> (ModelError, usize) {
        let (base_url, hits) = fake_server(response).await;
        let config = Config {
            llm_api_key: "test-key".to_string(),
            llm_api_base_url: base_url,
            ..Config::default()
        };
        let client = OpenAiClient::new(&config);

        let mut request = ModelRequest::default();
        request.push_text("提取题目");

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            client.generate("test-model", &request),
        )
        .await
        .expect("客户端内部不应自行重试")
        .unwrap_err();
        (err, hits.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_server_error_returns_after_one_request() {
        let (err, hits) =
            generate_against(http_response("503 Service Unavailable", "text/plain", "no capacity"))
                .await;

        assert_eq!(hits, 1);
        assert_eq!(err.status_code, Some(503));
        assert_eq!(err.kind(), ModelErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_rate_limit_returns_after_one_request() {
        let body = r#"{"error":{"message":"Rate limit reached for requests","type":"requests","param":null,"code":"rate_limit_exceeded"}}"#;
        let (err, hits) =
            generate_against(http_response("429 Too Many Requests", "application/json", body))
                .await;

        assert_eq!(hits, 1);
        assert_eq!(err.status_code, Some(429));
        assert_eq!(err.kind(), ModelErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn test_quota_error_classified() {
        let body = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","param":null,"code":null}}"#;
        let (err, hits) =
            generate_against(http_response("429 Too Many Requests", "application/json", body))
                .await;

        assert_eq!(hits, 1);
        assert_eq!(err.status_code, Some(429));
        assert_eq!(err.kind(), ModelErrorKind::QuotaExceeded);
    }

    /// 测试真实模型调用
    ///
    /// 运行方式：
    /// ```bash
    /// LLM_API_KEY=... cargo test test_generate_live -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_generate_live() {
        let _ = tracing_subscriber::fmt::try_init();

        let config = Config::from_env();
        let client = OpenAiClient::new(&config);

        let mut request = ModelRequest::default();
        request.push_text("只返回 JSON：{\"questions\": []}");

        let response = client
            .generate(&config.llm_model_name, &request)
            .await
            .expect("模型调用失败");
        println!("LLM 响应: {}", response);
        assert!(!response.is_empty());
    }
}
