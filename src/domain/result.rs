//! Terminal pipeline results.

use serde::{Deserialize, Serialize};

use super::record::{FailureKind, GuardStage, PipelineRecord, Stage};
use super::verdict::SafetyVerdict;

/// Whether the delivered answer carries the Checker's approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The Checker accepted this answer.
    Verified,

    /// The refinement budget ran out with the Checker still rejecting;
    /// the answer is delivered best-effort and must be presented with a
    /// low-confidence marker, not as verified.
    Unaudited,
}

/// The terminal value of one pipeline run.
///
/// Every variant carries the sealed audit trail; the record is never
/// truncated on the rejection or failure path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineResult {
    /// The sanitized final answer.
    Answered {
        answer: String,
        audit: AuditStatus,
        record: PipelineRecord,
    },

    /// A guard blocked the run. Policy decision, not an error.
    Rejected {
        stage: GuardStage,
        verdict: SafetyVerdict,
        record: PipelineRecord,
    },

    /// A capability failed or an invariant broke. Retryable from the
    /// caller's point of view, and distinct from a policy rejection.
    Failed {
        kind: FailureKind,
        stage: Stage,
        record: PipelineRecord,
    },
}

impl PipelineResult {
    pub fn record(&self) -> &PipelineRecord {
        match self {
            Self::Answered { record, .. }
            | Self::Rejected { record, .. }
            | Self::Failed { record, .. } => record,
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered { .. })
    }

    /// The fixed caller-facing message. Rejections name the stage and
    /// categories but never echo blocked content; failures stay generic
    /// with the detail in the log, not here.
    pub fn user_message(&self) -> String {
        match self {
            Self::Answered {
                answer,
                audit: AuditStatus::Verified,
                ..
            } => answer.clone(),
            Self::Answered {
                answer,
                audit: AuditStatus::Unaudited,
                ..
            } => format!("[unaudited] {}", answer),
            Self::Rejected { stage, verdict, .. } => {
                format!(
                    "Request blocked: {} (categories: {}).",
                    stage.reason(),
                    verdict.categories()
                )
            }
            Self::Failed { .. } => {
                "The service could not complete this request. Please try again.".to_string()
            }
        }
    }
}
