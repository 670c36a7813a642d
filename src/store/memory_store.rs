use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::models::question::QuestionRecord;
use crate::store::QuestionStore;

/// 进程内题库
///
/// 可设置为保存失败，用来验证持久化失败不影响返回结果。
#[derive(Default)]
pub struct MemoryStore {
    questions: Mutex<Option<Vec<QuestionRecord>>>,
    fail_saves: bool,
    save_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置已有题目
    pub fn with_questions(questions: Vec<QuestionRecord>) -> Self {
        Self {
            questions: Mutex::new(Some(questions)),
            ..Self::default()
        }
    }

    /// 每次保存都失败
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Option<Vec<QuestionRecord>> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vec<QuestionRecord>>> {
        // 持锁期间不会 panic，中毒的锁里数据仍然完整
        self.questions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn exists(&self) -> Result<bool, StoreError> {
        Ok(self.lock().as_ref().is_some_and(|q| !q.is_empty()))
    }

    async fn load(&self) -> Result<Vec<QuestionRecord>, StoreError> {
        Ok(self.lock().clone().unwrap_or_default())
    }

    async fn save(&self, questions: &[QuestionRecord]) -> Result<(), StoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves {
            return Err(StoreError::Unavailable("内存题库被设置为保存失败".to_string()));
        }
        *self.lock() = Some(questions.to_vec());
        Ok(())
    }
}
