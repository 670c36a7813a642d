//! 题目提取器 - 编排层
//!
//! ## 职责
//!
//! 1. **缓存检查**：题库里已有题目时直接返回，不调用模型
//! 2. **切分批次**：文本、图片分开切块后组合成批次
//! 3. **并发控制**：Semaphore 限制同时在途的模型调用数
//! 4. **汇总**：按批次序号排序、展平、重新编号 1..N
//! 5. **持久化**：保存失败只记日志，不影响返回
//! 6. **进度**：每完成一个批次发一条 progress，最后恰好一个终止事件
//!
//! 不处理单个批次的细节，全部委托给 `BatchProcessor`。

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clients::ModelClient;
use crate::config::Config;
use crate::error::{ExtractError, ExtractResult, FailureCause};
use crate::models::page::{Batch, Page};
use crate::models::question::{BatchFailure, BatchResult, ExtractionOutcome, QuestionRecord};
use crate::orchestrator::batching::split_into_batches;
use crate::orchestrator::progress::{ProgressEmitter, ProgressEvent};
use crate::services::ModelInvoker;
use crate::store::QuestionStore;
use crate::utils::logging;
use crate::workflow::{BatchCtx, BatchProcessor};

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// 一次运行的统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub total_batches: usize,
    pub succeeded: usize,
    pub degraded: usize,
    pub questions: usize,
    pub dropped: usize,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn from_results(results: &[BatchResult], elapsed: Duration) -> Self {
        let degraded = results.iter().filter(|r| r.is_degraded()).count();
        Self {
            total_batches: results.len(),
            succeeded: results.len() - degraded,
            degraded,
            questions: results.iter().map(|r| r.questions.len()).sum(),
            dropped: results.iter().map(|r| r.dropped).sum(),
            elapsed,
        }
    }
}

/// 提取器
///
/// 模型客户端和题库在启动时构建一次后注入，之后每次提取共用。
pub struct Extractor {
    config: Config,
    processor: Arc<BatchProcessor>,
    store: Arc<dyn QuestionStore>,
}

impl Extractor {
    pub fn new(config: Config, client: Arc<dyn ModelClient>, store: Arc<dyn QuestionStore>) -> Self {
        let invoker = ModelInvoker::new(client, config.llm_model_name.clone(), config.retry_policy());
        let processor = Arc::new(BatchProcessor::new(&config, invoker));
        Self {
            config,
            processor,
            store,
        }
    }

    /// 缓冲模式：不发进度，直接返回最终结果
    pub async fn extract(&self, pages: &[Page]) -> ExtractResult<ExtractionOutcome> {
        self.run(pages, &CancellationToken::new(), ProgressEmitter::disabled())
            .await
    }

    /// 流式模式：后台运行，事件从返回的流里读
    ///
    /// 流以一个 `complete` 或 `error` 事件结束。
    pub fn extract_stream(
        self: Arc<Self>,
        pages: Vec<Page>,
        cancel: CancellationToken,
    ) -> ReceiverStream<ProgressEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let _ = self.run(&pages, &cancel, ProgressEmitter::new(tx)).await;
        });
        ReceiverStream::new(rx)
    }

    /// 运行一次提取，并通过 `emitter` 发出终止事件
    pub async fn run(
        &self,
        pages: &[Page],
        cancel: &CancellationToken,
        emitter: ProgressEmitter,
    ) -> ExtractResult<ExtractionOutcome> {
        match self.execute(pages, cancel, &emitter).await {
            Ok(outcome) => {
                emitter.complete(&outcome).await;
                Ok(outcome)
            }
            Err(e) => {
                error!("❌ 提取失败 [{}]: {}", e.kind(), e);
                emitter.error(&e).await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        pages: &[Page],
        cancel: &CancellationToken,
        emitter: &ProgressEmitter,
    ) -> ExtractResult<ExtractionOutcome> {
        let started_at = Instant::now();

        // 并发数为 0 时信号量永远拿不到许可，必须在派发前拦下
        self.config.validate()?;

        // ========== 1. 缓存 ==========
        if let Some(cached) = self.load_cached().await {
            info!("✓ 命中题库缓存，共 {} 道题，跳过模型调用", cached.len());
            return Ok(ExtractionOutcome::new(cached, true));
        }

        // ========== 2. 切分 ==========
        let batches = split_into_batches(
            pages,
            self.config.batch_size,
            self.config.max_images_per_batch,
        )?;
        let total_batches = batches.len();
        logging::log_batch_plan(
            pages.len(),
            total_batches,
            self.config.max_concurrent_batches,
        );
        emitter.started(total_batches).await;

        // ========== 3. 并发处理 ==========
        let results = self.dispatch(batches, cancel, emitter).await;

        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let stats = RunStats::from_results(&results, started_at.elapsed());
        logging::print_final_stats(
            stats.total_batches,
            stats.succeeded,
            stats.degraded,
            stats.questions,
            stats.dropped,
            stats.elapsed,
        );

        // ========== 4. 汇总 ==========
        let cause = dominant_cause(&results);
        let questions = merge_results(results);
        if questions.is_empty() {
            return Err(ExtractError::TotalExtractionFailure {
                total_batches,
                cause,
            });
        }

        // ========== 5. 保存 ==========
        match self.store.save(&questions).await {
            Ok(()) => info!("💾 已保存 {} 道题到题库", questions.len()),
            Err(e) => error!("❌ 保存题库失败（本次结果仍会返回）: {}", e),
        }

        Ok(ExtractionOutcome::new(questions, false))
    }

    /// 读取缓存，出错按未命中处理
    async fn load_cached(&self) -> Option<Vec<QuestionRecord>> {
        match self.store.exists().await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!("⚠️ 检查题库缓存失败，按未命中处理: {}", e);
                return None;
            }
        }

        match self.store.load().await {
            Ok(questions) if !questions.is_empty() => Some(questions),
            Ok(_) => None,
            Err(e) => {
                warn!("⚠️ 读取题库缓存失败，按未命中处理: {}", e);
                None
            }
        }
    }

    /// 每个批次一个任务，全部结束后按完成顺序返回
    async fn dispatch(
        &self,
        batches: Vec<Batch>,
        cancel: &CancellationToken,
        emitter: &ProgressEmitter,
    ) -> Vec<BatchResult> {
        let total_batches = batches.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_batches));
        let mut tasks = FuturesUnordered::new();

        for batch in batches {
            let index = batch.index;
            let ctx = BatchCtx::new(
                index,
                total_batches,
                index * self.config.batch_id_spacing + 1,
            );
            let processor = Arc::clone(&self.processor);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return BatchResult::degraded(index, BatchFailure::Cancelled);
                    }
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(e) => {
                            return BatchResult::degraded(
                                index,
                                BatchFailure::TaskAborted(e.to_string()),
                            );
                        }
                    },
                };
                processor.process(&batch, &ctx, &cancel).await
            });
            tasks.push(async move { (index, handle.await) });
        }

        let mut results = Vec::with_capacity(total_batches);
        let mut questions_extracted = 0;

        while let Some((index, joined)) = tasks.next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("[批次 {}/{}] 任务执行失败: {}", index + 1, total_batches, e);
                    BatchResult::degraded(index, BatchFailure::TaskAborted(e.to_string()))
                }
            };

            questions_extracted += result.questions.len();
            emitter
                .batch_completed(
                    results.len() + 1,
                    total_batches,
                    result.questions.len(),
                    questions_extracted,
                )
                .await;
            results.push(result);
        }

        results
    }
}

/// 按批次序号排序后展平，重新编号为 1..N
pub(crate) fn merge_results(mut results: Vec<BatchResult>) -> Vec<QuestionRecord> {
    results.sort_by_key(|r| r.batch_index);
    results
        .into_iter()
        .flat_map(|r| r.questions)
        .enumerate()
        .map(|(i, mut question)| {
            question.id = i + 1;
            question
        })
        .collect()
}

/// 各批次失败原因里最值得报告的一个
pub(crate) fn dominant_cause(results: &[BatchResult]) -> Option<FailureCause> {
    results
        .iter()
        .filter_map(|r| r.failure.as_ref())
        .filter_map(BatchFailure::cause)
        .min_by_key(|cause| cause.priority())
}
