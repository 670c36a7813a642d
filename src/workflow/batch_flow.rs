//! 批次处理流程 - 流程层
//!
//! 核心职责：定义“一个批次”的完整处理流程
//!
//! 流程顺序：
//! 1. 构建提示词
//! 2. 调用模型（带重试）
//! 3. 解析并修复 JSON
//! 4. 逐条校验，分配临时 ID
//!
//! 任何一步失败都只把本批次降级为空结果，不会中断整条流水线。

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::page::Batch;
use crate::models::question::{BatchFailure, BatchResult};
use crate::services::{parse_model_output, validate_records, InvokeError, ModelInvoker, PromptBuilder};
use crate::utils::logging::truncate_text;
use crate::workflow::batch_ctx::BatchCtx;

/// 批次处理器
///
/// - 不持有任何批次数据，可以在多个任务间共享
/// - 只依赖业务能力（services）
pub struct BatchProcessor {
    prompt_builder: PromptBuilder,
    invoker: ModelInvoker,
    verbose_logging: bool,
}

impl BatchProcessor {
    pub fn new(config: &Config, invoker: ModelInvoker) -> Self {
        Self {
            prompt_builder: PromptBuilder::new(config.max_images_per_batch),
            invoker,
            verbose_logging: config.verbose_logging,
        }
    }

    /// 处理一个批次，永不返回错误
    pub async fn process(
        &self,
        batch: &Batch,
        ctx: &BatchCtx,
        cancel: &CancellationToken,
    ) -> BatchResult {
        if let Some((first, last)) = batch.page_range() {
            info!(
                "{} 开始处理，页码 {}-{}，共 {} 页",
                ctx,
                first,
                last,
                batch.pages.len()
            );
        }

        // ========== 1. 构建提示词 ==========
        let request = self.prompt_builder.build(batch, ctx.starting_id);

        // ========== 2. 调用模型 ==========
        let response = match self.invoker.invoke(&request, cancel).await {
            Ok(text) => text,
            Err(InvokeError::Cancelled) => {
                warn!("{} 已取消", ctx);
                return BatchResult::degraded(ctx.batch_index, BatchFailure::Cancelled);
            }
            Err(InvokeError::Model(e)) => {
                error!("{} ❌ 模型调用失败，本批次放弃: {}", ctx, e);
                return BatchResult::degraded(ctx.batch_index, BatchFailure::Model(e));
            }
        };

        if response.trim().is_empty() {
            warn!("{} ⚠️ 模型返回内容为空", ctx);
            return BatchResult::degraded(ctx.batch_index, BatchFailure::EmptyResponse);
        }

        if self.verbose_logging {
            debug!("{} 模型输出: {}", ctx, truncate_text(&response, 200));
        }

        // ========== 3. 解析 ==========
        let parsed = match parse_model_output(&response) {
            Ok(value) => value,
            Err(e) => {
                error!(
                    "{} ❌ 输出无法解析: {} (输出开头: {})",
                    ctx,
                    e,
                    truncate_text(&response, 80)
                );
                return BatchResult::degraded(ctx.batch_index, BatchFailure::Parse(e.to_string()));
            }
        };

        let Some(candidates) = parsed.get("questions").and_then(Value::as_array) else {
            error!("{} ❌ 输出缺少 questions 数组", ctx);
            return BatchResult::degraded(ctx.batch_index, BatchFailure::MissingQuestions);
        };

        // ========== 4. 校验 ==========
        let (questions, dropped) = validate_records(candidates, ctx.starting_id);

        if dropped > 0 {
            warn!(
                "{} ⚠️ {} 条记录未通过校验，已丢弃",
                ctx, dropped
            );
        }
        info!(
            "{} ✓ 完成，有效题目 {} 道",
            ctx,
            questions.len()
        );

        BatchResult::new(ctx.batch_index, questions, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ModelClient, ModelRequest};
    use crate::error::ModelError;
    use crate::models::page::Page;
    use crate::services::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// 每次都返回同一个结果
    struct FixedClient(Result<String, ModelError>);

    #[async_trait]
    impl ModelClient for FixedClient {
        async fn generate(&self, _model: &str, _request: &ModelRequest) -> Result<String, ModelError> {
            self.0.clone()
        }
    }

    fn processor(response: Result<String, ModelError>) -> BatchProcessor {
        let policy = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        let invoker = ModelInvoker::new(Arc::new(FixedClient(response)), "test-model", policy);
        BatchProcessor::new(&Config::default(), invoker)
    }

    async fn run(response: Result<String, ModelError>) -> BatchResult {
        let batch = Batch::new(1, vec![Page::text(101, "一些题目")]);
        let ctx = BatchCtx::new(1, 2, 101);
        processor(response)
            .process(&batch, &ctx, &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_valid_records_get_provisional_ids() {
        let response = r#"```json
{"questions": [
  {"id": 1, "question": "q1", "options": {"A": "x", "B": "y"}, "correctAnswer": "A"},
  {"id": 2, "question": "q2", "options": {"A": "x", "B": "y"}},
  {"id": 3, "question": "q3", "options": {"A": "x", "B": "y"}, "correctAnswer": "b"}
]}
```"#;
        let result = run(Ok(response.to_string())).await;

        assert!(!result.is_degraded());
        assert_eq!(result.batch_index, 1);
        assert_eq!(result.dropped, 1);
        let ids: Vec<usize> = result.questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![101, 102]);
    }

    #[tokio::test]
    async fn test_empty_response_degrades() {
        let result = run(Ok("   ".to_string())).await;
        assert!(result.questions.is_empty());
        assert_eq!(result.failure, Some(BatchFailure::EmptyResponse));
    }

    #[tokio::test]
    async fn test_missing_questions_array_degrades() {
        let result = run(Ok(r#"{"items": []}"#.to_string())).await;
        assert_eq!(result.failure, Some(BatchFailure::MissingQuestions));
    }

    #[tokio::test]
    async fn test_unparsable_output_degrades() {
        let result = run(Ok("I cannot help with that.".to_string())).await;
        assert!(matches!(result.failure, Some(BatchFailure::Parse(_))));
        assert!(result.questions.is_empty());
    }

    #[tokio::test]
    async fn test_model_error_degrades() {
        let err = ModelError::new(Some(401), "invalid api key");
        let result = run(Err(err.clone())).await;
        assert_eq!(result.failure, Some(BatchFailure::Model(err)));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let batch = Batch::new(0, vec![Page::text(1, "x")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = processor(Ok("{}".to_string()))
            .process(&batch, &BatchCtx::new(0, 1, 1), &cancel)
            .await;
        assert_eq!(result.failure, Some(BatchFailure::Cancelled));
    }
}
