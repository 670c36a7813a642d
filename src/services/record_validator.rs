//! 题目记录校验 - 业务能力层
//!
//! 一条坏记录只丢掉它自己，不影响同批次的其他记录。

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::question::{AnswerLetter, QuestionRecord};

/// 校验并规范化一条记录，不合格返回 None
pub fn validate_record(raw: &Value, assigned_id: usize) -> Option<QuestionRecord> {
    let question = match raw.get("question").and_then(Value::as_str).map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => {
            debug!("丢弃记录: 缺少题干");
            return None;
        }
    };

    let Some(options) = raw.get("options").and_then(Value::as_object) else {
        debug!("丢弃记录: 缺少 options ({})", preview(&question));
        return None;
    };

    let Some(raw_answer) = raw.get("correctAnswer").and_then(Value::as_str) else {
        debug!("丢弃记录: 缺少 correctAnswer ({})", preview(&question));
        return None;
    };

    let Some(correct_answer) = AnswerLetter::parse(raw_answer) else {
        debug!(
            "丢弃记录: correctAnswer {:?} 不是 A-D ({})",
            raw_answer,
            preview(&question)
        );
        return None;
    };

    Some(QuestionRecord {
        id: assigned_id,
        question,
        options: string_map(options),
        correct_answer,
        explanation: raw
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        option_explanations: raw
            .get("optionExplanations")
            .and_then(Value::as_object)
            .map(string_map)
            .unwrap_or_default(),
    })
}

/// 按顺序校验一组候选记录，合格的从 `starting_id` 起连续编号
///
/// 返回 (合格记录, 丢弃数量)。
pub fn validate_records(candidates: &[Value], starting_id: usize) -> (Vec<QuestionRecord>, usize) {
    let mut records = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if let Some(record) = validate_record(candidate, starting_id + records.len()) {
            records.push(record);
        }
    }
    let dropped = candidates.len() - records.len();
    (records, dropped)
}

/// 值原样保留；非字符串的标量按 JSON 文本保存，null 跳过
fn string_map(object: &Map<String, Value>) -> BTreeMap<String, String> {
    object
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect()
}

fn preview(text: &str) -> String {
    crate::utils::logging::truncate_text(text, 30)
}
