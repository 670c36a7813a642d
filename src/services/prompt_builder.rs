//! 提示词构建 - 业务能力层
//!
//! 把一个批次的页面拼成一次模型请求，纯函数，不做任何 IO。

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use phf::phf_map;
use tracing::warn;

use crate::clients::request::{ImageAttachment, ModelRequest};
use crate::models::page::{Batch, Page};

/// 裸 base64 的开头 → 图片类型
static BASE64_IMAGE_SIGNATURES: phf::Map<&'static str, &'static str> = phf_map! {
    "iVBORw0KGgo" => "image/png",
    "/9j/" => "image/jpeg",
    "R0lGOD" => "image/gif",
    "UklGR" => "image/webp",
};

/// 文本页之间的分隔
const PAGE_SEPARATOR: &str = "\n\n";

/// 提示词构建器
pub struct PromptBuilder {
    max_images_per_batch: usize,
}

impl PromptBuilder {
    pub fn new(max_images_per_batch: usize) -> Self {
        Self {
            max_images_per_batch,
        }
    }

    /// 构建一个批次的请求
    ///
    /// 第一段是提取指令（内嵌全部文本页），之后每张图片前面跟一句页码说明。
    /// 超过上限的图片页不进入本次请求；无法解码的图片页跳过并记录警告。
    pub fn build(&self, batch: &Batch, starting_id: usize) -> ModelRequest {
        let document_text = batch
            .text_pages()
            .map(|page| page.content.as_str())
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR);

        let mut request = ModelRequest::default();
        request.push_text(extraction_prompt(&document_text, starting_id));

        let image_pages: Vec<&Page> = batch.image_pages().collect();
        if image_pages.len() > self.max_images_per_batch {
            warn!(
                "批次 {} 有 {} 张图片，超过上限 {}，多出的不放入本次请求",
                batch.index + 1,
                image_pages.len(),
                self.max_images_per_batch
            );
        }

        for page in image_pages.into_iter().take(self.max_images_per_batch) {
            match decode_image(page) {
                Some(image) => {
                    request.push_text(format!("第 {} 页（图片）：", page.page_number));
                    request.push_image(image);
                }
                None => warn!(
                    "第 {} 页图片无法解码，已跳过",
                    page.page_number
                ),
            }
        }

        request
    }
}

/// 提取指令
fn extraction_prompt(document_text: &str, starting_id: usize) -> String {
    let document_section = if document_text.trim().is_empty() {
        "（本批次只有图片，请从后面附带的图片中提取题目）".to_string()
    } else {
        document_text.to_string()
    };

    format!(
        r#"你是一个专业的题库整理助手。请从下面的文档内容中提取所有选择题。

【输出格式】
只返回一个 JSON 对象，不要返回任何其他内容：
{{"questions": [{{"id": {start}, "question": "题干", "options": {{"A": "选项A", "B": "选项B", "C": "选项C", "D": "选项D"}}, "correctAnswer": "A", "explanation": "解析", "optionExplanations": {{"A": "A 选项解析"}}}}]}}

【要求】
1. id 从 {start} 开始依次递增
2. options 最多包含 A、B、C、D 四个选项，键必须是大写字母
3. correctAnswer 必须是 A、B、C、D 之一
4. 文档没有给出答案时，根据题意判断正确答案
5. explanation 与 optionExplanations 可以省略
6. 文档中没有选择题时返回 {{"questions": []}}

【文档内容】
{document}"#,
        start = starting_id,
        document = document_section
    )
}

/// 解出图片字节与类型
fn decode_image(page: &Page) -> Option<ImageAttachment> {
    let content = page.content.trim();

    let (media_type, payload) = match content.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',')?;
            let media_type = header.strip_suffix(";base64")?;
            if !media_type.starts_with("image/") {
                return None;
            }
            (media_type.to_string(), payload)
        }
        None => {
            let media_type = BASE64_IMAGE_SIGNATURES
                .entries()
                .find(|(signature, _)| content.starts_with(**signature))
                .map(|(_, media_type)| *media_type)?;
            (media_type.to_string(), content)
        }
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let data = STANDARD.decode(compact).ok()?;
    if data.is_empty() {
        return None;
    }

    Some(ImageAttachment {
        page_number: page.page_number,
        media_type,
        data,
    })
}
