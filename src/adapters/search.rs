//! Retrieval backends.
//!
//! `HttpSearchRetriever` fronts an embedding/similarity-search service
//! over a small JSON contract. `StaticRetriever` serves a fixed
//! in-memory corpus with term-overlap ranking, for offline runs and
//! fixtures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ContextBundle, ContextPassage};

use super::{BackendError, Retriever};

/// Retriever over a JSON search endpoint.
///
/// POST `{query, top_k}`, expect `{passages: [{source_id, text}, ...]}`
/// in rank order. An empty hit list is a success.
pub struct HttpSearchRetriever {
    client: reqwest::Client,
    url: String,
    top_k: usize,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    passages: Vec<ContextPassage>,
}

impl HttpSearchRetriever {
    pub fn new(url: impl Into<String>, top_k: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            top_k,
        }
    }
}

#[async_trait]
impl Retriever for HttpSearchRetriever {
    async fn retrieve(&self, query: &str) -> Result<ContextBundle, BackendError> {
        let body = SearchRequest {
            query,
            top_k: self.top_k,
        };

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!(
                "search endpoint returned {}",
                status
            )));
        }

        let result: SearchResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        Ok(ContextBundle::new(result.passages))
    }
}

/// Fixed-corpus retriever with naive term-overlap ranking.
pub struct StaticRetriever {
    corpus: Vec<ContextPassage>,
    top_k: usize,
}

impl StaticRetriever {
    pub fn new(corpus: Vec<ContextPassage>, top_k: usize) -> Self {
        Self { corpus, top_k }
    }

    /// Count of distinct query terms appearing in the passage. Terms
    /// shorter than three characters are ignored.
    fn score(passage: &ContextPassage, terms: &[String]) -> usize {
        let haystack = passage.text.to_lowercase();
        terms.iter().filter(|t| haystack.contains(t.as_str())).count()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, query: &str) -> Result<ContextBundle, BackendError> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() >= 3)
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let mut scored: Vec<(usize, &ContextPassage)> = self
            .corpus
            .iter()
            .map(|p| (Self::score(p, &terms), p))
            .filter(|(score, _)| *score > 0)
            .collect();

        // Stable sort keeps corpus order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let passages = scored
            .into_iter()
            .take(self.top_k)
            .map(|(_, p)| p.clone())
            .collect();

        Ok(ContextBundle::new(passages))
    }
}
