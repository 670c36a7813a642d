use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::error::StoreError;
use crate::models::question::QuestionRecord;
use crate::store::QuestionStore;

/// 保存到磁盘的题库文档
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredQuestionBank {
    saved_at: String,
    count: usize,
    questions: Vec<QuestionRecord>,
}

/// 单个 JSON 文件形式的题库，一个文件对应一份数据集
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

#[async_trait]
impl QuestionStore for JsonFileStore {
    async fn exists(&self) -> Result<bool, StoreError> {
        match fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.is_file() && meta.len() > 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(self.display_path(), e)),
        }
    }

    async fn load(&self) -> Result<Vec<QuestionRecord>, StoreError> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| StoreError::io(self.display_path(), e))?;
        let bank: StoredQuestionBank = serde_json::from_str(&content)
            .map_err(|e| StoreError::json(self.display_path(), e))?;

        info!(
            "从 {} 读取 {} 道题目 (保存于 {})",
            self.display_path(),
            bank.questions.len(),
            bank.saved_at
        );
        Ok(bank.questions)
    }

    /// 先写临时文件再改名，避免中途失败留下半个文件
    async fn save(&self, questions: &[QuestionRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent.display().to_string(), e))?;
        }

        let bank = StoredQuestionBank {
            saved_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            count: questions.len(),
            questions: questions.to_vec(),
        };
        let json = serde_json::to_string_pretty(&bank)
            .map_err(|e| StoreError::json(self.display_path(), e))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .await
            .map_err(|e| StoreError::io(tmp_path.display().to_string(), e))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::io(self.display_path(), e))?;

        info!("已保存 {} 道题目到 {}", questions.len(), self.display_path());
        Ok(())
    }
}
