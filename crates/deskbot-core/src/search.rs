//! Retrieval collaborator interface
//!
//! The keyword search engine lives outside this crate; the core only
//! consumes ranked documents and treats their text as untrusted.

use serde::{Deserialize, Serialize};

/// One ranked document returned by a [`DocumentSearch`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDoc {
    #[serde(default)]
    pub title: Option<String>,
    /// Body text; entries without content are skipped
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub score: f32,
}

impl RetrievedDoc {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: Some(content.into()),
            score: 0.0,
        }
    }

    pub fn untitled(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Text as it will be placed in the prompt, `None` if there is no body
    pub fn render(&self) -> Option<String> {
        let content = self.content.as_deref()?.trim();
        if content.is_empty() {
            return None;
        }
        Some(match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => format!("Source: {title}\n{content}"),
            _ => content.to_string(),
        })
    }
}

/// Document retrieval engine
pub trait DocumentSearch: Send + Sync {
    /// Rank documents for `query`, best first
    fn search(&self, query: &str, limit: usize) -> Vec<RetrievedDoc>;

    /// Flatten ranked documents into one context string
    fn build_context(&self, docs: &[RetrievedDoc]) -> String {
        docs.iter()
            .filter_map(RetrievedDoc::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Search that never finds anything; used when no knowledge base is wired in
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDocuments;

impl DocumentSearch for NoDocuments {
    fn search(&self, _query: &str, _limit: usize) -> Vec<RetrievedDoc> {
        Vec::new()
    }
}
