//! Safety and audit verdicts.
//!
//! `SafetyVerdict` is produced by the guard classifiers on both the
//! input and output boundary; `AuditVerdict` is produced by the Checker.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Policy violation categories.
///
/// The first three form the input vocabulary, the last two the output
/// vocabulary. Hallucination is not a category here; grounding defects
/// are the Checker's business, not the guards'.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    /// Attempt to override or exfiltrate system instructions.
    PromptInjection,

    /// Toxic or abusive content.
    Toxicity,

    /// Off-domain query. Soft by default: flagged, not necessarily
    /// blocking.
    Irrelevance,

    /// Content the deployment policy forbids outright.
    DisallowedContent,

    /// Credentials, keys, or other data that must not leave the system.
    SensitiveData,
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PromptInjection => "prompt_injection",
            Self::Toxicity => "toxicity",
            Self::Irrelevance => "irrelevance",
            Self::DisallowedContent => "disallowed_content",
            Self::SensitiveData => "sensitive_data",
        };
        f.write_str(name)
    }
}

/// Severity of a safety finding, ordered weakest to strongest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Outcome of a safety classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    /// Whether the text may proceed.
    pub passed: bool,

    /// Categories found, possibly empty even when blocked (a fail-closed
    /// verdict reports no category because nothing was classified).
    pub violations: BTreeSet<ViolationCategory>,

    /// Strongest severity among the findings.
    pub severity: Severity,
}

impl SafetyVerdict {
    /// A clean pass with no findings.
    pub fn pass() -> Self {
        Self {
            passed: true,
            violations: BTreeSet::new(),
            severity: Severity::Low,
        }
    }

    /// The verdict a guard returns when its classifier errored: blocked
    /// at critical severity, with nothing classified. A safety component
    /// must never pass content because its classifier failed.
    pub fn fail_closed() -> Self {
        Self {
            passed: false,
            violations: BTreeSet::new(),
            severity: Severity::Critical,
        }
    }

    /// A blocking verdict for the given findings.
    pub fn block(violations: impl IntoIterator<Item = ViolationCategory>, severity: Severity) -> Self {
        Self {
            passed: false,
            violations: violations.into_iter().collect(),
            severity,
        }
    }

    /// True when every finding is the soft irrelevance category.
    pub fn irrelevance_only(&self) -> bool {
        !self.violations.is_empty()
            && self
                .violations
                .iter()
                .all(|v| *v == ViolationCategory::Irrelevance)
    }

    /// Comma-separated category list for logs and CLI output.
    pub fn categories(&self) -> String {
        if self.violations.is_empty() {
            "none".to_string()
        } else {
            self.violations
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

/// Outcome of a Checker audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditVerdict {
    /// Whether the draft answer stands as-is.
    pub accepted: bool,

    /// Actionable defect description; empty exactly when accepted.
    pub feedback: String,
}

impl AuditVerdict {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            feedback: String::new(),
        }
    }

    /// Reject with actionable feedback. Feedback must name the defect;
    /// an empty rejection is replaced with a generic marker rather than
    /// violating the contract.
    pub fn reject(feedback: impl Into<String>) -> Self {
        let feedback = feedback.into();
        Self {
            accepted: false,
            feedback: if feedback.trim().is_empty() {
                "rejected without stated reason".to_string()
            } else {
                feedback
            },
        }
    }
}
