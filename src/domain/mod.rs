//! Domain types for the makercheck pipeline.
//!
//! This module contains the core data structures:
//! - Passages: retrieved context and citation validation
//! - Verdicts: safety and audit decisions
//! - Record: the per-run audit trail
//! - Result: terminal pipeline outcomes

pub mod passage;
pub mod record;
pub mod result;
pub mod verdict;

// Re-export commonly used types
pub use passage::{ContextBundle, ContextPassage};
pub use record::{
    FailureKind, GuardStage, PipelineRecord, SealedOutcome, Stage, StageEntry, VerdictSnapshot,
};
pub use result::{AuditStatus, PipelineResult};
pub use verdict::{AuditVerdict, SafetyVerdict, Severity, ViolationCategory};
