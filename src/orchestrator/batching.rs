//! 页面切分
//!
//! 文本页与图片页分开切块：文本每 `batch_size` 页一块，图片每 `max_images` 页一块。
//! 第 i 个批次拿第 i 块文本和第 i 块图片，所以每张图片恰好出现在一个批次里。

use crate::error::ExtractError;
use crate::models::page::{Batch, Page};

/// 把页面切成批次
pub fn split_into_batches(
    pages: &[Page],
    batch_size: usize,
    max_images_per_batch: usize,
) -> Result<Vec<Batch>, ExtractError> {
    if pages.is_empty() {
        return Err(ExtractError::invalid_input("没有提供任何页面"));
    }

    let text_pages: Vec<&Page> = pages
        .iter()
        .filter(|p| p.is_text() && !p.content.trim().is_empty())
        .collect();
    let image_pages: Vec<&Page> = pages
        .iter()
        .filter(|p| p.is_image() && !p.content.trim().is_empty())
        .collect();

    if text_pages.is_empty() && image_pages.is_empty() {
        return Err(ExtractError::invalid_input("所有页面都没有可提取的内容"));
    }

    let text_chunks: Vec<&[&Page]> = text_pages.chunks(batch_size.max(1)).collect();
    let image_chunks: Vec<&[&Page]> = image_pages.chunks(max_images_per_batch.max(1)).collect();
    let total = text_chunks.len().max(image_chunks.len());

    let batches = (0..total)
        .map(|index| {
            let pages = text_chunks
                .get(index)
                .into_iter()
                .chain(image_chunks.get(index))
                .flat_map(|chunk| chunk.iter().map(|p| (*p).clone()))
                .collect();
            Batch::new(index, pages)
        })
        .collect();

    Ok(batches)
}
