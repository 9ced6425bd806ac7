// src/design/context.rs — Background context for the generator (literature/search hits)

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::LabError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// Anything that can turn a goal into reference material.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn search(&self, query: &str) -> Vec<SearchHit>;
}

/// No context at all.
pub struct NoContext;

#[async_trait]
impl ContextProvider for NoContext {
    async fn search(&self, _query: &str) -> Vec<SearchHit> {
        Vec::new()
    }
}

/// Fixed hits loaded from a JSON file (`--context-file`), returned for every query.
pub struct StaticContext {
    hits: Vec<SearchHit>,
}

impl StaticContext {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }

    pub fn load(path: &Path) -> Result<Self, LabError> {
        let content = std::fs::read_to_string(path)?;
        let hits: Vec<SearchHit> = serde_json::from_str(&content)?;
        Ok(Self::new(hits))
    }
}

#[async_trait]
impl ContextProvider for StaticContext {
    async fn search(&self, _query: &str) -> Vec<SearchHit> {
        self.hits.clone()
    }
}

/// Render hits as prompt text. An empty list means no context.
pub fn format_context(hits: &[SearchHit]) -> Option<String> {
    if hits.is_empty() {
        return None;
    }
    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!("[{}] {}", i + 1, hit.title));
        if !hit.url.is_empty() {
            out.push_str(&format!(" ({})", hit.url));
        }
        out.push('\n');
        if !hit.snippet.is_empty() {
            out.push_str(hit.snippet.trim());
            out.push('\n');
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_no_context_is_empty() {
        assert!(NoContext.search("hom dip").await.is_empty());
    }

    #[test]
    fn test_format_empty_is_none() {
        assert_eq!(format_context(&[]), None);
    }

    #[test]
    fn test_format_hits() {
        let hits = vec![
            SearchHit {
                title: "Hong, Ou, Mandel 1987".into(),
                url: "https://doi.org/10.1103/PhysRevLett.59.2044".into(),
                snippet: " Two-photon interference. ".into(),
            },
            SearchHit {
                title: "Notes".into(),
                url: String::new(),
                snippet: String::new(),
            },
        ];
        let text = format_context(&hits).unwrap();
        assert!(text.starts_with("[1] Hong, Ou, Mandel 1987 (https://doi.org/"));
        assert!(text.contains("\nTwo-photon interference.\n"));
        assert!(text.ends_with("[2] Notes\n"));
    }

    #[tokio::test]
    async fn test_static_context_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"title": "BB84 review", "snippet": "QKD"}}]"#).unwrap();
        let ctx = StaticContext::load(file.path()).unwrap();
        let hits = ctx.search("anything").await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "BB84 review");
        assert!(hits[0].url.is_empty());
    }
}
