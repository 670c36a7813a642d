//! 进度事件
//!
//! 一次提取产生一个有限、不可重放的事件序列：若干 `progress`，最后恰好一个
//! `complete` 或 `error`。终止事件由消耗 `ProgressEmitter` 的方法发出，
//! 发出后发送端随之丢弃，接收端的流自然结束。
//!
//! `progress` 按批次完成顺序发出，只作提示用；以终止事件的内容为准。

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{ExtractError, FailureCause};
use crate::models::question::ExtractionOutcome;

/// 批次进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    /// 已完成的批次数，0 表示尚未开始
    pub batch: usize,
    pub total_batches: usize,
    /// 到目前为止累计的有效题目数
    pub questions_extracted: usize,
    pub status: String,
}

/// 错误事件内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    /// 机器可读标签
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<FailureCause>,
    pub error: String,
    pub details: String,
}

impl From<&ExtractError> for ErrorPayload {
    fn from(err: &ExtractError) -> Self {
        Self {
            kind: err.kind().to_string(),
            cause: err.cause(),
            error: err.to_string(),
            details: err.details(),
        }
    }
}

/// 对外事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress(BatchProgress),
    Complete(ExtractionOutcome),
    Error(ErrorPayload),
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress(_))
    }

    /// 一行 NDJSON（不含换行符）
    pub fn to_ndjson(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// 事件发送端
///
/// 接收端被丢弃时静默忽略，提取照常完成。
pub struct ProgressEmitter {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressEmitter {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// 不发送任何事件（缓冲模式）
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// 批次开始前的第一条进度
    pub async fn started(&self, total_batches: usize) {
        self.send(ProgressEvent::Progress(BatchProgress {
            batch: 0,
            total_batches,
            questions_extracted: 0,
            status: format!("开始处理，共 {} 个批次", total_batches),
        }))
        .await;
    }

    /// 一个批次完成
    pub async fn batch_completed(
        &self,
        completed: usize,
        total_batches: usize,
        batch_questions: usize,
        questions_extracted: usize,
    ) {
        self.send(ProgressEvent::Progress(BatchProgress {
            batch: completed,
            total_batches,
            questions_extracted,
            status: format!(
                "已完成 {}/{} 个批次，本批 {} 道，累计 {} 道",
                completed, total_batches, batch_questions, questions_extracted
            ),
        }))
        .await;
    }

    /// 终止事件：成功
    pub async fn complete(self, outcome: &ExtractionOutcome) {
        self.send(ProgressEvent::Complete(outcome.clone())).await;
    }

    /// 终止事件：失败
    pub async fn error(self, err: &ExtractError) {
        self.send(ProgressEvent::Error(ErrorPayload::from(err))).await;
    }

    async fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }
}
