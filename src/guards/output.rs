//! Output boundary guard.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::domain::SafetyVerdict;

use super::{OutputGuard, SafetyClassifier, SAFE_REFUSAL};

/// Output guard over a safety classifier.
///
/// Pass-through on a clean verdict; whole-text replacement with the
/// fixed refusal on a blocking verdict or classifier error. The refusal
/// string short-circuits before classification, which makes `sanitize`
/// idempotent regardless of classifier behavior.
pub struct ClassifierOutputGuard {
    classifier: Arc<dyn SafetyClassifier>,
}

impl ClassifierOutputGuard {
    pub fn new(classifier: Arc<dyn SafetyClassifier>) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl OutputGuard for ClassifierOutputGuard {
    async fn review(&self, text: &str) -> (String, SafetyVerdict) {
        if text == SAFE_REFUSAL {
            return (SAFE_REFUSAL.to_string(), SafetyVerdict::pass());
        }

        match self.classifier.classify(text).await {
            Ok(verdict) if verdict.passed => (text.to_string(), verdict),
            Ok(verdict) => {
                warn!(
                    categories = %verdict.categories(),
                    severity = %verdict.severity,
                    "output blocked; replacing with refusal"
                );
                (SAFE_REFUSAL.to_string(), verdict)
            }
            Err(e) => {
                error!(error = %e, "output classifier failed; failing closed");
                (SAFE_REFUSAL.to_string(), SafetyVerdict::fail_closed())
            }
        }
    }
}
