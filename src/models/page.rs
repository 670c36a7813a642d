//! 输入页面与批次

use serde::{Deserialize, Serialize};

/// 页面类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Text,
    Image,
}

/// 一页输入内容
///
/// 文本页的 `content` 是纯文本；图片页的 `content` 是 base64 数据，
/// 可以是 `data:image/png;base64,...` 形式，也可以是裸 base64。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(rename = "type")]
    pub kind: PageKind,
    pub content: String,
    pub page_number: u32,
}

impl Page {
    pub fn text(page_number: u32, content: impl Into<String>) -> Self {
        Self {
            kind: PageKind::Text,
            content: content.into(),
            page_number,
        }
    }

    pub fn image(page_number: u32, content: impl Into<String>) -> Self {
        Self {
            kind: PageKind::Image,
            content: content.into(),
            page_number,
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == PageKind::Text
    }

    pub fn is_image(&self) -> bool {
        self.kind == PageKind::Image
    }
}

/// 一个批次：一次模型请求处理的页面
///
/// 由切分器创建后不再修改，只归一个批处理任务所有。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub pages: Vec<Page>,
}

impl Batch {
    pub fn new(index: usize, pages: Vec<Page>) -> Self {
        Self { index, pages }
    }

    pub fn text_pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter().filter(|p| p.is_text())
    }

    pub fn image_pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter().filter(|p| p.is_image())
    }

    /// 页码范围，仅用于日志
    pub fn page_range(&self) -> Option<(u32, u32)> {
        let first = self.pages.iter().map(|p| p.page_number).min()?;
        let last = self.pages.iter().map(|p| p.page_number).max()?;
        Some((first, last))
    }
}
