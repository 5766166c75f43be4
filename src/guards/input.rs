//! Input boundary guard.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::domain::SafetyVerdict;

use super::{InputGuard, SafetyClassifier};

/// Input guard over a safety classifier.
///
/// Irrelevance is a soft category: when it is the only finding, the
/// verdict is downgraded to a pass (still carrying the annotation)
/// unless `irrelevance_blocks` is set.
pub struct ClassifierInputGuard {
    classifier: Arc<dyn SafetyClassifier>,
    irrelevance_blocks: bool,
}

impl ClassifierInputGuard {
    pub fn new(classifier: Arc<dyn SafetyClassifier>, irrelevance_blocks: bool) -> Self {
        Self {
            classifier,
            irrelevance_blocks,
        }
    }
}

#[async_trait]
impl InputGuard for ClassifierInputGuard {
    async fn validate(&self, query: &str) -> SafetyVerdict {
        match self.classifier.classify(query).await {
            Ok(mut verdict) => {
                if !verdict.passed && !self.irrelevance_blocks && verdict.irrelevance_only() {
                    warn!("query flagged as irrelevant; passing with annotation");
                    verdict.passed = true;
                }
                verdict
            }
            Err(e) => {
                error!(error = %e, "input classifier failed; failing closed");
                SafetyVerdict::fail_closed()
            }
        }
    }
}
