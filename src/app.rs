//! 命令行应用
//!
//! 启动时构建一次模型客户端与题库并注入提取器；运行时把每个事件写成一行 NDJSON
//! 输出到 stdout，Ctrl-C 通过取消令牌结束本次提取。

use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clients::OpenAiClient;
use crate::config::Config;
use crate::models::load_pages;
use crate::orchestrator::{Extractor, ProgressEvent};
use crate::store::JsonFileStore;
use crate::utils::logging;

/// 应用主结构
pub struct App {
    extractor: Arc<Extractor>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate().context("配置校验失败")?;

        logging::log_startup(&config.llm_model_name, config.max_concurrent_batches);

        if config.llm_api_key.is_empty() {
            warn!("⚠️ 未设置 LLM_API_KEY，模型调用很可能会被拒绝");
        }

        let store_path = Path::new(&config.store_path);
        if let Some(parent) = store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("无法创建题库目录: {}", parent.display()))?;
        }
        let client = Arc::new(OpenAiClient::new(&config));
        let store = Arc::new(JsonFileStore::new(store_path));
        info!("💾 题库文件: {}", store.path().display());
        let extractor = Arc::new(Extractor::new(config, client, store));

        Ok(Self { extractor })
    }

    /// 运行一次提取
    ///
    /// 返回终止事件是否为 `complete`。
    pub async fn run(&self, pages_file: &Path) -> Result<bool> {
        let pages = load_pages(pages_file).await?;

        let cancel = CancellationToken::new();
        let ctrl_c_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("⚠️ 收到 Ctrl-C，正在取消...");
                ctrl_c_cancel.cancel();
            }
        });

        let mut events = Arc::clone(&self.extractor).extract_stream(pages, cancel);
        let mut stdout = BufWriter::new(tokio::io::stdout());
        let mut completed = false;

        while let Some(event) = events.next().await {
            if let ProgressEvent::Complete(_) = &event {
                completed = true;
            }
            let line = event.to_ndjson().context("事件序列化失败")?;
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }

        Ok(completed)
    }
}
