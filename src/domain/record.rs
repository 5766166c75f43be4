//! The per-run audit trail.
//!
//! One `StageEntry` is appended per executed stage transition, including
//! each refinement attempt and every terminal rejection or failure. The
//! record is the run's transparency guarantee: the terminal result must
//! be fully reconstructible from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::verdict::{AuditVerdict, SafetyVerdict};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Input safety gate.
    InputCheck,

    /// Context retrieval.
    Retrieve,

    /// Maker draft (one per attempt).
    Generate,

    /// Checker audit (one per attempt).
    Audit,

    /// Output safety gate.
    OutputCheck,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InputCheck => "input_check",
            Self::Retrieve => "retrieve",
            Self::Generate => "generate",
            Self::Audit => "audit",
            Self::OutputCheck => "output_check",
        };
        f.write_str(name)
    }
}

/// The verdict a stage produced, when it produced one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerdictSnapshot {
    Safety(SafetyVerdict),
    Audit(AuditVerdict),
}

/// One executed stage transition.
///
/// Snapshots are truncated for storage; the digests cover the
/// untruncated text so the trail stays tamper-evident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEntry {
    pub stage: Stage,

    /// Maker/Checker attempt index, 1-based. Always 1 for the stages
    /// outside the refinement loop.
    pub attempt: u32,

    pub input_snapshot: String,
    pub output_snapshot: String,

    /// SHA-256 of the untruncated input/output.
    pub input_digest: String,
    pub output_digest: String,

    pub verdict: Option<VerdictSnapshot>,

    pub timestamp: DateTime<Utc>,

    /// Stage wall time in milliseconds.
    pub duration_ms: Option<u64>,

    /// Error message when the stage failed.
    pub error: Option<String>,
}

impl StageEntry {
    pub fn new(
        stage: Stage,
        attempt: u32,
        input: &str,
        output: &str,
        verdict: Option<VerdictSnapshot>,
        snapshot_max_chars: usize,
    ) -> Self {
        Self {
            stage,
            attempt,
            input_snapshot: truncate_snapshot(input, snapshot_max_chars),
            output_snapshot: truncate_snapshot(output, snapshot_max_chars),
            input_digest: content_digest(input),
            output_digest: content_digest(output),
            verdict,
            timestamp: Utc::now(),
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Which guard terminated a rejected run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardStage {
    Input,
    Output,
}

impl GuardStage {
    /// The fixed rejection reason exposed to callers.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Input => "input safety violation",
            Self::Output => "output safety violation",
        }
    }
}

/// Why a run failed for non-policy reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A capability call exceeded its deadline.
    Timeout,

    /// A backend errored past the transient-retry budget.
    Backend,

    /// An internal invariant broke (for example a citation that slipped
    /// past the Checker). Surfaced, never silently corrected.
    Contract,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Backend => "backend",
            Self::Contract => "contract",
        };
        f.write_str(name)
    }
}

/// Terminal outcome tag stored with a sealed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SealedOutcome {
    Answered { audited: bool },
    Rejected { stage: GuardStage },
    Failed { kind: FailureKind },
}

/// The append-only audit trail of one run.
///
/// The orchestrator owns the record mutably for the duration of the run
/// and moves it into the terminal `PipelineResult`; after that move no
/// append path exists, so sealing is enforced by ownership rather than
/// by runtime checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub run_id: Uuid,

    /// The raw query, truncated like any other snapshot.
    pub query_snapshot: String,
    pub query_digest: String,

    pub started_at: DateTime<Utc>,

    pub entries: Vec<StageEntry>,

    /// Set exactly once, when the run reaches a terminal state.
    pub outcome: Option<SealedOutcome>,
    pub sealed_at: Option<DateTime<Utc>>,
}

impl PipelineRecord {
    pub fn begin(run_id: Uuid, query: &str, snapshot_max_chars: usize) -> Self {
        Self {
            run_id,
            query_snapshot: truncate_snapshot(query, snapshot_max_chars),
            query_digest: content_digest(query),
            started_at: Utc::now(),
            entries: Vec::new(),
            outcome: None,
            sealed_at: None,
        }
    }

    pub fn push(&mut self, entry: StageEntry) {
        debug_assert!(self.outcome.is_none(), "append to sealed record");
        self.entries.push(entry);
    }

    pub fn seal(&mut self, outcome: SealedOutcome) {
        debug_assert!(self.outcome.is_none(), "record sealed twice");
        self.outcome = Some(outcome);
        self.sealed_at = Some(Utc::now());
    }

    pub fn is_sealed(&self) -> bool {
        self.outcome.is_some()
    }

    /// The executed stage sequence, attempt indices included.
    pub fn stage_sequence(&self) -> Vec<(Stage, u32)> {
        self.entries.iter().map(|e| (e.stage, e.attempt)).collect()
    }

    /// Number of Maker invocations recorded.
    pub fn generate_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.stage == Stage::Generate)
            .count()
    }
}

/// Truncate to a character budget, marking elision.
fn truncate_snapshot(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        None => text.to_string(),
        Some((idx, _)) => format!("{}...", &text[..idx]),
    }
}

/// SHA-256 digest, hex encoded.
fn content_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
