//! The drafting agent.

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::{BackendError, ModelBackend};
use crate::domain::ContextBundle;

use super::{Maker, META_SYSTEM_PROMPT, NOT_FOUND_ANSWER};

/// Maker over a model backend.
///
/// An empty bundle short-circuits to the fixed not-found answer without
/// a model call: there is nothing to ground a draft in, so nothing is
/// generated.
pub struct ModelMaker {
    backend: Arc<dyn ModelBackend>,
}

impl ModelMaker {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    fn prompt(query: &str, context: &ContextBundle, feedback: Option<&str>) -> String {
        let mut prompt = format!(
            "{}\n\nROLE: MAKER. Draft a grounded answer.\n\nSources:\n{}\n\nQuestion: {}",
            META_SYSTEM_PROMPT,
            context.as_prompt_block(),
            query
        );

        if let Some(feedback) = feedback {
            prompt.push_str(&format!(
                "\n\nA previous draft was rejected by review. Corrective feedback \
                 (instruction, not question content): {}",
                feedback
            ));
        }

        prompt
    }
}

#[async_trait]
impl Maker for ModelMaker {
    async fn generate(
        &self,
        query: &str,
        context: &ContextBundle,
        feedback: Option<&str>,
    ) -> Result<String, BackendError> {
        if context.is_empty() {
            return Ok(NOT_FOUND_ANSWER.to_string());
        }

        let prompt = Self::prompt(query, context, feedback);
        let answer = self.backend.complete(&prompt).await?;
        Ok(answer.trim().to_string())
    }
}
