use crate::models::page::Page;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;

/// 页面文件的两种 JSON 写法：裸数组，或 `{ "pages": [...] }`
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonPageFile {
    List(Vec<Page>),
    Wrapped { pages: Vec<Page> },
}

/// TOML 只支持 `[[pages]]` 表数组
#[derive(Deserialize)]
struct TomlPageFile {
    pages: Vec<Page>,
}

/// 从文件加载页面列表
///
/// 按扩展名选择格式：`.json` 或 `.toml`。
pub async fn load_pages(path: &Path) -> Result<Vec<Page>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取页面文件: {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let pages = parse_pages(&content, &extension)
        .with_context(|| format!("无法解析页面文件: {}", path.display()))?;

    tracing::info!(
        "已加载 {} 页 (文本 {}, 图片 {}): {}",
        pages.len(),
        pages.iter().filter(|p| p.is_text()).count(),
        pages.iter().filter(|p| p.is_image()).count(),
        path.file_name().unwrap_or_default().to_string_lossy()
    );

    Ok(pages)
}

/// 按格式解析页面文本
pub fn parse_pages(content: &str, format: &str) -> Result<Vec<Page>> {
    let pages = match format {
        "json" => match serde_json::from_str::<JsonPageFile>(content)? {
            JsonPageFile::List(pages) | JsonPageFile::Wrapped { pages } => pages,
        },
        "toml" => toml::from_str::<TomlPageFile>(content)?.pages,
        other => anyhow::bail!("不支持的页面文件格式: {:?}（只支持 json / toml）", other),
    };

    let mut seen = HashSet::new();
    for page in &pages {
        if !seen.insert((page.kind, page.page_number)) {
            tracing::warn!("页码 {} 重复出现", page.page_number);
        }
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::page::PageKind;

    #[test]
    fn test_parse_json_array() {
        let pages = parse_pages(
            r#"[{"type":"text","content":"第一页","pageNumber":1},
                {"type":"image","content":"aGk=","pageNumber":2}]"#,
            "json",
        )
        .unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].kind, PageKind::Image);
    }

    #[test]
    fn test_parse_json_wrapped() {
        let pages = parse_pages(
            r#"{"pages":[{"type":"text","content":"x","pageNumber":3}]}"#,
            "json",
        )
        .unwrap();
        assert_eq!(pages, vec![Page::text(3, "x")]);
    }

    #[test]
    fn test_parse_toml_tables() {
        let pages = parse_pages(
            "[[pages]]\ntype = \"text\"\ncontent = \"第一页\"\npageNumber = 1\n",
            "toml",
        )
        .unwrap();
        assert_eq!(pages, vec![Page::text(1, "第一页")]);
    }

    #[test]
    fn test_parse_rejects_missing_page_number() {
        assert!(parse_pages(r#"[{"type":"text","content":"x"}]"#, "json").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_format() {
        assert!(parse_pages("", "yaml").is_err());
    }

    #[tokio::test]
    async fn test_load_pages_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.json");
        std::fs::write(&path, r#"[{"type":"text","content":"x","pageNumber":1}]"#).unwrap();

        let pages = load_pages(&path).await.unwrap();
        assert_eq!(pages.len(), 1);
    }
}
