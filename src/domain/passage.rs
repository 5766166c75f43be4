//! Context passages and the retrieval bundle.
//!
//! A bundle is the ordered result of one retrieval; rank order is
//! preserved all the way into the generation prompt.

use serde::{Deserialize, Serialize};

/// A single retrieved passage with its source label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPassage {
    /// Source label, unique within one bundle. Citations in answers
    /// reference this value in `[source_id]` form.
    pub source_id: String,

    /// Passage text.
    pub text: String,
}

impl ContextPassage {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
        }
    }
}

/// An ordered sequence of retrieved passages.
///
/// Empty bundles are valid: "nothing was found" is an answerable
/// outcome, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBundle {
    passages: Vec<ContextPassage>,
}

impl ContextBundle {
    pub fn new(passages: Vec<ContextPassage>) -> Self {
        Self { passages }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn passages(&self) -> &[ContextPassage] {
        &self.passages
    }

    /// Source labels in rank order.
    pub fn source_ids(&self) -> Vec<&str> {
        self.passages.iter().map(|p| p.source_id.as_str()).collect()
    }

    /// Check the bundle invariant: every source id non-empty and unique
    /// within the bundle.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::BTreeSet::new();
        for passage in &self.passages {
            if passage.source_id.is_empty() {
                return Err("retrieved passage has an empty source id".to_string());
            }
            if !seen.insert(passage.source_id.as_str()) {
                return Err(format!(
                    "duplicate source id '{}' in retrieval result",
                    passage.source_id
                ));
            }
        }
        Ok(())
    }

    /// Render the bundle as the prompt context block, one `[id] text`
    /// line per passage in rank order.
    pub fn as_prompt_block(&self) -> String {
        self.passages
            .iter()
            .map(|p| format!("[{}] {}", p.source_id, p.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Citation ids that appear in `answer` but name no passage in this
    /// bundle, in order of first appearance.
    pub fn unknown_citations(&self, answer: &str) -> Vec<String> {
        let known: std::collections::BTreeSet<&str> =
            self.passages.iter().map(|p| p.source_id.as_str()).collect();

        let mut unknown = Vec::new();
        for cited in extract_citations(answer) {
            if !known.contains(cited) && !unknown.iter().any(|u: &String| u.as_str() == cited) {
                unknown.push(cited.to_string());
            }
        }
        unknown
    }

    /// Short human summary for logs and trail snapshots.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            "0 passages".to_string()
        } else {
            format!(
                "{} passages: {}",
                self.passages.len(),
                self.source_ids().join(", ")
            )
        }
    }
}

/// Extract candidate `[source_id]` citations from answer text.
///
/// A citation token is a bracketed run of label characters (ASCII
/// alphanumerics plus `-`, `_`, `.`). Bracketed prose is ignored.
fn extract_citations(answer: &str) -> Vec<&str> {
    let mut citations = Vec::new();
    let bytes = answer.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'[' {
            if let Some(close) = answer[i + 1..].find(']') {
                let inner = &answer[i + 1..i + 1 + close];
                if is_citation_label(inner) {
                    citations.push(inner);
                }
                i += close + 2;
                continue;
            }
        }
        i += 1;
    }

    citations
}

fn is_citation_label(inner: &str) -> bool {
    !inner.is_empty()
        && inner.len() <= 64
        && inner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> ContextBundle {
        ContextBundle::new(vec![
            ContextPassage::new("doc1", "Paris is the capital of France."),
            ContextPassage::new("doc2", "France is in Europe."),
        ])
    }

    #[test]
    fn test_prompt_block_preserves_rank_order() {
        let block = bundle().as_prompt_block();
        let doc1 = block.find("[doc1]").unwrap();
        let doc2 = block.find("[doc2]").unwrap();
        assert!(doc1 < doc2);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let dup = ContextBundle::new(vec![
            ContextPassage::new("doc1", "a"),
            ContextPassage::new("doc1", "b"),
        ]);
        assert!(dup.validate().is_err());
        assert!(bundle().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let bad = ContextBundle::new(vec![ContextPassage::new("", "a")]);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_unknown_citations() {
        let b = bundle();
        let unknown = b.unknown_citations("Paris is the capital [doc1], and pigs fly [ghost].");
        assert_eq!(unknown, vec!["ghost".to_string()]);

        assert!(b
            .unknown_citations("Paris is the capital [doc1] of France [doc2].")
            .is_empty());
    }

    #[test]
    fn test_citation_extraction_skips_prose_brackets() {
        let b = bundle();
        // Bracketed prose is not a citation token.
        let unknown = b.unknown_citations("As noted [see the appendix for more], Paris [doc1].");
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_empty_bundle_is_valid() {
        let empty = ContextBundle::empty();
        assert!(empty.is_empty());
        assert!(empty.validate().is_ok());
        assert_eq!(empty.summary(), "0 passages");
    }
}
