//! 与具体模型服务无关的请求结构

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// 附带的一张图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub page_number: u32,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl ImageAttachment {
    /// 转成 `data:` URL，兼容 OpenAI 风格的 image_url 字段
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, STANDARD.encode(&self.data))
    }
}

/// 请求中的一段内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPart {
    Text(String),
    Image(ImageAttachment),
}

/// 一次模型请求：按顺序排列的文本段与图片段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelRequest {
    pub parts: Vec<RequestPart>,
}

impl ModelRequest {
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.parts.push(RequestPart::Text(text.into()));
    }

    pub fn push_image(&mut self, image: ImageAttachment) {
        self.parts.push(RequestPart::Image(image));
    }

    /// 第一段文本（提取指令）
    pub fn prompt(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            RequestPart::Text(text) => Some(text.as_str()),
            RequestPart::Image(_) => None,
        })
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageAttachment> {
        self.parts.iter().filter_map(|part| match part {
            RequestPart::Image(image) => Some(image),
            RequestPart::Text(_) => None,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images().count()
    }
}
