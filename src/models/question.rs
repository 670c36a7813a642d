use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{FailureCause, ModelError};

/// 正确答案字母
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AnswerLetter {
    A,
    B,
    C,
    D,
}

impl AnswerLetter {
    /// 去空白并转大写后解析，不在 A-D 之内返回 None
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "A" => Some(AnswerLetter::A),
            "B" => Some(AnswerLetter::B),
            "C" => Some(AnswerLetter::C),
            "D" => Some(AnswerLetter::D),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnswerLetter::A => "A",
            AnswerLetter::B => "B",
            AnswerLetter::C => "C",
            AnswerLetter::D => "D",
        }
    }
}

impl fmt::Display for AnswerLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一道选择题
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub id: usize,
    pub question: String,
    pub options: BTreeMap<String, String>,
    pub correct_answer: AnswerLetter,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub option_explanations: BTreeMap<String, String>,
}

/// 批次降级为空结果的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchFailure {
    /// 重试耗尽或不可重试的模型错误
    Model(ModelError),
    /// 模型返回空文本
    EmptyResponse,
    /// 修复后仍无法解析
    Parse(String),
    /// JSON 里没有 `questions` 数组
    MissingQuestions,
    Cancelled,
    /// 任务 panic 或被中止
    TaskAborted(String),
}

impl BatchFailure {
    /// 归入整体失败的原因类别
    pub fn cause(&self) -> Option<FailureCause> {
        match self {
            BatchFailure::Model(e) => Some(e.kind().into()),
            BatchFailure::EmptyResponse => Some(FailureCause::EmptyResponse),
            BatchFailure::Parse(_) | BatchFailure::MissingQuestions => {
                Some(FailureCause::ParseError)
            }
            BatchFailure::Cancelled | BatchFailure::TaskAborted(_) => None,
        }
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchFailure::Model(e) => write!(f, "{}", e),
            BatchFailure::EmptyResponse => write!(f, "模型返回内容为空"),
            BatchFailure::Parse(msg) => write!(f, "输出解析失败: {}", msg),
            BatchFailure::MissingQuestions => write!(f, "输出缺少 questions 数组"),
            BatchFailure::Cancelled => write!(f, "已取消"),
            BatchFailure::TaskAborted(msg) => write!(f, "任务异常终止: {}", msg),
        }
    }
}

/// 单个批次的产出
///
/// `questions` 里的 id 只是批次内的临时编号，汇总时会重新编号。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub batch_index: usize,
    pub questions: Vec<QuestionRecord>,
    /// 校验未通过被丢弃的记录数
    pub dropped: usize,
    pub failure: Option<BatchFailure>,
}

impl BatchResult {
    pub fn new(batch_index: usize, questions: Vec<QuestionRecord>, dropped: usize) -> Self {
        Self {
            batch_index,
            questions,
            dropped,
            failure: None,
        }
    }

    /// 降级空结果
    pub fn degraded(batch_index: usize, failure: BatchFailure) -> Self {
        Self {
            batch_index,
            questions: Vec::new(),
            dropped: 0,
            failure: Some(failure),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.failure.is_some()
    }
}

/// 一次提取的最终结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub questions: Vec<QuestionRecord>,
    pub count: usize,
    pub cached: bool,
}

impl ExtractionOutcome {
    pub fn new(questions: Vec<QuestionRecord>, cached: bool) -> Self {
        Self {
            count: questions.len(),
            questions,
            cached,
        }
    }
}
