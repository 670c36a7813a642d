/// 日志工具模块
///
/// 提供订阅器初始化与日志格式化的辅助函数。
/// 日志统一写到 stderr，stdout 只留给 NDJSON 事件。
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化日志订阅器
///
/// `RUST_LOG` 优先；未设置时默认 `info`，开启详细日志时为 `debug`。
/// 重复调用是安全的，只有第一次生效。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `model`: 模型名称
/// - `max_concurrent`: 最大并发批次数
pub fn log_startup(model: &str, max_concurrent: usize) {
    info!("{}", "=".repeat(60));
    info!(
        "🚀 程序启动 - 题目提取 ({})",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("🤖 模型: {}", model);
    info!("📊 最大并发批次数: {}", max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 记录批次划分
pub fn log_batch_plan(total_pages: usize, total_batches: usize, max_concurrent: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 共 {} 页，划分为 {} 个批次", total_pages, total_batches);
    info!("📋 最多同时处理 {} 个批次", max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(
    total_batches: usize,
    succeeded: usize,
    degraded: usize,
    questions: usize,
    dropped: usize,
    elapsed: Duration,
) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部批次处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功批次: {}/{}", succeeded, total_batches);
    info!("❌ 降级批次: {}", degraded);
    info!("📝 有效题目: {}", questions);
    info!("🗑️ 丢弃记录: {}", dropped);
    info!("⏱️ 耗时: {:.1}s", elapsed.as_secs_f64());
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
