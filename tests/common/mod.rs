#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use question_extract::clients::{ModelClient, ModelRequest};
use question_extract::error::ModelError;
use question_extract::models::{AnswerLetter, Page, QuestionRecord};
use question_extract::Config;

/// 一次调用的预设结果
pub struct Scripted {
    pub delay: Duration,
    pub response: Result<String, ModelError>,
}

impl Scripted {
    pub fn ok(response: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            response: Ok(response.into()),
        }
    }

    pub fn err(status: u16, message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            response: Err(ModelError::new(Some(status), message)),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// 按批次序号返回预设结果，并记录调用次数
pub struct ScriptedClient {
    script: Box<dyn Fn(usize) -> Scripted + Send + Sync>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(script: impl Fn(usize) -> Scripted + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn generate(&self, _model: &str, request: &ModelRequest) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request.prompt().unwrap_or_default();
        let batch_index = (starting_id(prompt) - 1) / test_config().batch_id_spacing;
        let scripted = (self.script)(batch_index);
        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }
        scripted.response
    }
}

/// 从提示词里读出本批次的起始 ID
fn starting_id(prompt: &str) -> usize {
    let marker = "id 从 ";
    prompt
        .find(marker)
        .map(|pos| &prompt[pos + marker.len()..])
        .and_then(|rest| {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .unwrap_or(1)
}

/// 模型输出：`valid` 道合格题 + `invalid` 道缺少答案的题
pub fn questions_json(batch_index: usize, valid: usize, invalid: usize) -> String {
    let mut questions = Vec::new();
    for k in 0..valid {
        questions.push(json!({
            "id": k + 1,
            "question": format!("批次{}-第{}题", batch_index, k + 1),
            "options": {"A": "甲", "B": "乙", "C": "丙", "D": "丁"},
            "correctAnswer": "a",
            "explanation": "略",
        }));
    }
    for k in 0..invalid {
        questions.push(json!({
            "question": format!("批次{}-缺答案{}", batch_index, k + 1),
            "options": {"A": "甲", "B": "乙"},
        }));
    }
    format!("```json\n{}\n```", json!({ "questions": questions }))
}

pub fn text_pages(n: u32) -> Vec<Page> {
    (1..=n)
        .map(|i| Page::text(i, format!("第 {} 页：下列说法正确的是？", i)))
        .collect()
}

pub fn record(id: usize, question: &str) -> QuestionRecord {
    QuestionRecord {
        id,
        question: question.to_string(),
        options: BTreeMap::from([
            ("A".to_string(), "甲".to_string()),
            ("B".to_string(), "乙".to_string()),
        ]),
        correct_answer: AnswerLetter::B,
        explanation: String::new(),
        option_explanations: BTreeMap::new(),
    }
}

/// 重试快、等待短的配置
pub fn test_config() -> Config {
    Config {
        max_retries: 1,
        initial_retry_delay_ms: 10,
        ..Config::default()
    }
}
