//! Capability adapters for external systems.
//!
//! The orchestrator consumes four external capabilities; the narrow
//! contracts here are all it knows about them. Text generation and
//! retrieval each get a trait plus concrete backends; safety
//! classification lives in `guards` on top of `ModelBackend`.

pub mod http_model;
pub mod search;
pub mod subprocess;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ContextBundle;

pub use http_model::HttpModelBackend;
pub use search::{HttpSearchRetriever, StaticRetriever};
pub use subprocess::SubprocessModelBackend;

/// Backend capability errors. All of these are infrastructure: they are
/// never interpreted as a policy decision.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend process failed: {0}")]
    Process(String),

    #[error("malformed backend response: {0}")]
    Malformed(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Opaque text-generation capability: prompt in, text out.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Map a prompt to generated text.
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;

    /// Cheap availability probe.
    async fn health_check(&self) -> Result<(), BackendError>;
}

/// Context retrieval capability.
///
/// An empty bundle is a successful outcome, never an error; the Maker is
/// responsible for answering "not found" over an empty bundle.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<ContextBundle, BackendError>;
}

/// Pull the first JSON object out of a model response, tolerating prose
/// or code fences around it.
pub(crate) fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}
