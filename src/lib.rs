//! # Question Extract
//!
//! 把分页的文档内容（文本 / 图片）交给生成式模型，提取成经过校验的选择题记录
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 外部协作方（Clients / Store）
//! - `clients/` - `ModelClient` 单次模型调用，`OpenAiClient` 为默认实现
//! - `store/` - `QuestionStore` 题库（是否已有 / 读取 / 保存）
//!
//! ### ② 业务能力层（Services）
//! - `PromptBuilder` - 为一个批次构建请求（提示词 + 图片）
//! - `ModelInvoker` - 带指数退避重试的模型调用
//! - `response_parser` - 从模型输出中提取并修复 JSON
//! - `record_validator` - 校验并规范化单条题目
//!
//! ### ③ 流程层（Workflow）
//! - `BatchCtx` - 上下文封装（批次序号 + 临时起始 ID）
//! - `BatchProcessor` - 一个批次的完整流程（构建 → 调用 → 解析 → 校验），永不失败
//!
//! ### ④ 编排层（Orchestration）
//! - `Extractor` - 缓存检查、切分批次、并发处理、排序编号、保存
//! - `ProgressEmitter` - 进度事件，最后恰好一个终止事件
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod store;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use clients::{ModelClient, ModelRequest, OpenAiClient};
pub use config::Config;
pub use error::{ExtractError, ExtractResult, FailureCause, ModelError};
pub use models::{ExtractionOutcome, Page, PageKind, QuestionRecord};
pub use orchestrator::{Extractor, ProgressEmitter, ProgressEvent};
pub use store::{JsonFileStore, MemoryStore, QuestionStore};
pub use workflow::{BatchCtx, BatchProcessor};
