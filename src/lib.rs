//! makercheck - Guarded Maker-Checker orchestrator for RAG requests
//!
//! Coordinates a retrieval-augmented generation request through a
//! two-agent Maker-Checker workflow with safety gating at the input and
//! output boundaries.
//!
//! # Architecture
//!
//! One run is a fixed sequence of stages:
//! - The input guard classifies the raw query and fails closed
//! - The retriever fetches ranked context passages
//! - The Maker drafts a grounded, cited answer
//! - The Checker independently audits the draft; rejections feed a
//!   bounded refinement loop back into the Maker
//! - The output guard sanitizes the selected answer
//!
//! Every stage transition appends one entry to the run's audit trail,
//! which is sealed with the terminal outcome and returned alongside it.
//!
//! # Modules
//!
//! - `adapters`: external capability contracts and backends (HTTP,
//!   subprocess, static)
//! - `agents`: the Maker and Checker
//! - `guards`: input/output safety gates and their classifiers
//! - `core`: orchestration logic (Orchestrator, retry, trail store)
//! - `domain`: data structures (passages, verdicts, record, result)
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run a query through the pipeline
//! makercheck ask "What are the retention rules for invoices?"
//!
//! # Inspect a persisted audit trail
//! makercheck show <run-id> --full
//!
//! # List recent runs
//! makercheck runs
//! ```

pub mod adapters;
pub mod agents;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod guards;

// Re-export main types at crate root for convenience
pub use crate::adapters::{BackendError, ModelBackend, Retriever};
pub use crate::agents::{Checker, Maker};
pub use crate::core::{Orchestrator, RetryPolicy, TrailStore};
pub use crate::domain::{
    AuditStatus, AuditVerdict, ContextBundle, ContextPassage, PipelineRecord, PipelineResult,
    SafetyVerdict, Severity, ViolationCategory,
};
pub use crate::guards::{InputGuard, OutputGuard, SafetyClassifier, SAFE_REFUSAL};
