//! The auditing agent.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::adapters::{extract_json, BackendError, ModelBackend};
use crate::domain::{AuditVerdict, ContextBundle};

use super::{Checker, META_SYSTEM_PROMPT};

/// Markers the empty-context branch accepts as an explicit
/// "not found" statement.
const NOT_FOUND_MARKERS: [&str; 3] = ["not found", "no information", "does not contain"];

/// Checker over a model backend.
///
/// Mechanical defects are rejected locally before any model call:
/// citations naming unknown source ids, and asserted facts over an
/// empty bundle. Only answers that survive the local checks reach the
/// model audit for uncited-claim and contradiction review.
pub struct ModelChecker {
    backend: Arc<dyn ModelBackend>,
}

impl ModelChecker {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    /// Deterministic audit steps. Returns a verdict when the answer can
    /// be decided without the model.
    fn local_audit(context: &ContextBundle, answer: &str) -> Option<AuditVerdict> {
        let unknown = context.unknown_citations(answer);
        if !unknown.is_empty() {
            return Some(AuditVerdict::reject(format!(
                "citations reference source ids not present in the context: {}; \
                 cite only the provided passages",
                unknown.join(", ")
            )));
        }

        if context.is_empty() {
            let lowered = answer.to_lowercase();
            let states_not_found = NOT_FOUND_MARKERS.iter().any(|m| lowered.contains(m));
            return Some(if states_not_found {
                AuditVerdict::accept()
            } else {
                AuditVerdict::reject(
                    "the context is empty but the answer asserts facts; state \
                     explicitly that the information was not found",
                )
            });
        }

        None
    }

    fn prompt(query: &str, context: &ContextBundle, answer: &str) -> String {
        format!(
            "{}\n\nROLE: CHECKER. Audit the draft answer against the sources and \
             the question. Reject when a factual claim lacks a citation, when the \
             answer contradicts the sources, or when it asserts anything the \
             sources do not support.\nRespond with JSON only, no prose: \
             {{\"accepted\": boolean, \"feedback\": string}} where feedback names \
             the specific defect when accepted is false.\n\nSources:\n{}\n\n\
             Question: {}\n\nDraft answer:\n{}",
            META_SYSTEM_PROMPT,
            context.as_prompt_block(),
            query,
            answer
        )
    }

    fn parse(raw: &str) -> Result<AuditVerdict, BackendError> {
        let json = extract_json(raw).ok_or_else(|| {
            BackendError::Malformed("checker response contains no JSON object".to_string())
        })?;

        let verdict: AuditVerdict = serde_json::from_str(json)
            .map_err(|e| BackendError::Malformed(format!("checker verdict: {}", e)))?;

        if !verdict.accepted && verdict.feedback.trim().is_empty() {
            return Err(BackendError::Malformed(
                "checker rejected without feedback".to_string(),
            ));
        }

        Ok(verdict)
    }
}

#[async_trait]
impl Checker for ModelChecker {
    async fn audit(
        &self,
        query: &str,
        context: &ContextBundle,
        answer: &str,
    ) -> Result<AuditVerdict, BackendError> {
        if let Some(verdict) = Self::local_audit(context, answer) {
            debug!(accepted = verdict.accepted, "audit decided locally");
            return Ok(verdict);
        }

        let raw = self
            .backend
            .complete(&Self::prompt(query, context, answer))
            .await?;
        Self::parse(&raw)
    }
}
