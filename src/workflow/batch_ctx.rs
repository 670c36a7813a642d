//! 批次处理上下文
//!
//! 封装“我正在处理第几批、从哪个临时 ID 开始”这一信息

use std::fmt::Display;

/// 批次处理上下文
#[derive(Debug, Clone, Copy)]
pub struct BatchCtx {
    /// 批次索引（从 0 开始）
    pub batch_index: usize,

    /// 批次总数（仅用于日志显示）
    pub total_batches: usize,

    /// 本批次记录的临时起始 ID
    pub starting_id: usize,
}

impl BatchCtx {
    pub fn new(batch_index: usize, total_batches: usize, starting_id: usize) -> Self {
        Self {
            batch_index,
            total_batches,
            starting_id,
        }
    }
}

impl Display for BatchCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[批次 {}/{}]", self.batch_index + 1, self.total_batches)
    }
}
