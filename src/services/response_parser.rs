//! 模型输出解析 - 业务能力层
//!
//! 模型输出不保证是合法 JSON，常见问题有：包在 markdown 代码块里、前后带解释文字、
//! 多余的尾逗号、因 token 上限被截断。解析分三步：
//!
//! 1. 原样解析提取出来的 JSON 文本
//! 2. 修复：去掉尾逗号，补齐缺失的括号
//! 3. 截断恢复：在报错位置之前找最后一个完整记录（`},`），截断后补 `]}`
//!
//! 三步都失败时返回第一步的原始错误，不会返回一个伪装成功的空结果。

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::ParseError;

fn labelled_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)```json\s*(\{.*?\})\s*```").expect("静态正则"))
}

fn unlabelled_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[ \t]*\r?\n(\{.*?\})\s*```").expect("静态正则"))
}

/// 解析模型输出
pub fn parse_model_output(raw: &str) -> Result<Value, ParseError> {
    let candidate = extract_json_candidate(raw).ok_or(ParseError::NoJsonObject)?;

    let original_error = match serde_json::from_str::<Value>(candidate) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };
    debug!("JSON 直接解析失败: {}，尝试修复", original_error);

    let repaired = repair_json(candidate);
    if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
        debug!("JSON 修复成功");
        return Ok(value);
    }

    if let Some(truncated) = truncate_to_last_record(candidate, &original_error) {
        if let Ok(value) = serde_json::from_str::<Value>(&truncated) {
            debug!("JSON 截断恢复成功，保留 {} 字节", truncated.len());
            return Ok(value);
        }
    }

    Err(ParseError::Invalid(original_error))
}

/// 从原始文本中取出 JSON 对象所在的片段
///
/// 顺序：```json 代码块 → 无标签代码块 → 第一个 `{` 到最后一个 `}`
pub fn extract_json_candidate(raw: &str) -> Option<&str> {
    for re in [labelled_fence(), unlabelled_fence()] {
        if let Some(m) = re.captures(raw).and_then(|caps| caps.get(1)) {
            return Some(m.as_str());
        }
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end > start {
        Some(&raw[start..=end])
    } else {
        None
    }
}

/// 去掉尾逗号并补齐缺失的括号
pub fn repair_json(text: &str) -> String {
    let mut repaired = strip_trailing_commas(text);
    let closers = missing_closers(&repaired);
    repaired.push_str(&closers);
    repaired
}

/// 去掉 `}` / `]` 前面的逗号，字符串内部原样保留
fn strip_trailing_commas(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            stripped.push(c);
            continue;
        }
        match c {
            '"' => in_string = true,
            ',' => {
                let next = text[i + 1..].chars().find(|c| !c.is_whitespace());
                if matches!(next, Some('}') | Some(']')) {
                    continue;
                }
            }
            _ => {}
        }
        stripped.push(c);
    }

    stripped
}

/// 未闭合的 `{` / `[` 需要的闭合符号，最内层在前
///
/// 跳过字符串内部的括号。
fn missing_closers(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    stack.iter().rev().collect()
}

/// 截断到报错位置之前最后一个 `},`，再补上 `]}`
fn truncate_to_last_record(text: &str, error: &serde_json::Error) -> Option<String> {
    let offset = error_offset(text, error);
    let cut = text[..offset].rfind("},")?;
    let mut truncated = text[..=cut].to_string();
    truncated.push_str("]}");
    Some(truncated)
}

/// 把 serde_json 报告的行列换算成字节偏移
fn error_offset(text: &str, error: &serde_json::Error) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(error.line().saturating_sub(1))
        .map(str::len)
        .sum();
    let mut offset = (line_start + error.column()).min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
