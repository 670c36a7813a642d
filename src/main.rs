use anyhow::{Context, Result};
use question_extract::utils::logging;
use question_extract::{App, Config};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load().context("加载配置失败")?;

    // 初始化日志
    logging::init(config.verbose_logging);

    let pages_file: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("用法: question-extract <pages-file>")?;

    // 初始化并运行应用
    let completed = App::initialize(config).await?.run(&pages_file).await?;

    if !completed {
        std::process::exit(1);
    }
    Ok(())
}
