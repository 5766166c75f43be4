//! Safety guards gating the pipeline's input and output boundaries.
//!
//! A guard wraps a classifier capability and turns its fallible verdict
//! into an infallible policy decision: classifier errors fail closed.
//! The guards are policy components only; factual grounding is the
//! Checker's job.

pub mod input;
pub mod lexical;
pub mod model;
pub mod output;

use async_trait::async_trait;

use crate::adapters::BackendError;
use crate::domain::SafetyVerdict;

pub use input::ClassifierInputGuard;
pub use lexical::LexicalClassifier;
pub use model::ModelClassifier;
pub use output::ClassifierOutputGuard;

/// The fixed refusal returned in place of blocked output. Whole-text
/// replacement only: partially redacted content could still leak
/// fragments of what was blocked.
pub const SAFE_REFUSAL: &str = "I can't help with that request.";

/// Classification capability behind the guards. May be model-backed and
/// may therefore fail; the guards decide what a failure means.
#[async_trait]
pub trait SafetyClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<SafetyVerdict, BackendError>;
}

/// Input boundary gate. Infallible by construction: a classifier error
/// becomes a critical blocking verdict, never a pass.
#[async_trait]
pub trait InputGuard: Send + Sync {
    async fn validate(&self, query: &str) -> SafetyVerdict;
}

/// Output boundary gate.
///
/// `sanitize` is idempotent: sanitizing already-sanitized text returns
/// it unchanged, and the refusal string sanitizes to itself.
#[async_trait]
pub trait OutputGuard: Send + Sync {
    /// Full decision: the sanitized text plus the verdict behind it.
    async fn review(&self, text: &str) -> (String, SafetyVerdict);

    /// Contract form: the sanitized text alone.
    async fn sanitize(&self, text: &str) -> String {
        self.review(text).await.0
    }
}
