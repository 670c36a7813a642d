//! 题库存储
//!
//! 流水线只通过 `QuestionStore` 的三个操作接触持久化：是否已有结果、读取、保存。

pub mod json_file_store;
pub mod memory_store;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::question::QuestionRecord;

pub use json_file_store::JsonFileStore;
pub use memory_store::MemoryStore;

#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// 是否已有保存过的题目
    async fn exists(&self) -> Result<bool, StoreError>;

    async fn load(&self) -> Result<Vec<QuestionRecord>, StoreError>;

    async fn save(&self, questions: &[QuestionRecord]) -> Result<(), StoreError>;
}
