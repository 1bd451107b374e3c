//! Evidence indexing
//!
//! Turns a free-form evidence bag into the two things the scorer asks about:
//! which evidence types are present, and which keywords the evidence text
//! mentions. Both only grow as evidence is added, which keeps control scores
//! monotonic.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

use crate::lifecycle::Facts;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").expect("static regex"));

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "with", "that", "this", "from", "must", "should", "shall",
    "have", "has", "been", "all", "any", "not", "its", "into", "per", "use", "used", "each",
    "such", "where", "when", "which", "their", "there", "they", "these", "those", "will",
    "can", "may", "also", "than", "then", "being", "was", "were", "our", "your", "about",
];

const SUFFIXES: &[&str] = &["ations", "ation", "ments", "ment", "ings", "ing", "ed", "es", "s"];

/// Lowercase, stop-word-free, lightly stemmed keywords of a text
pub fn keywords(text: &str) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    WORD.find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.len() >= 3 && !STOP_WORDS.contains(w))
        .map(stem)
        .collect()
}

/// Lowercase words of a text, in order
fn words(text: &str) -> Vec<String> {
    WORD.find_iter(&text.to_lowercase()).map(|m| m.as_str().to_string()).collect()
}

/// Strip one common suffix so "documented" and "documentation" meet at "document"
fn stem(word: &str) -> String {
    if word.ends_with("ss") {
        return word.to_string();
    }
    for suffix in SUFFIXES {
        if let Some(root) = word.strip_suffix(suffix) {
            if root.len() >= 4 {
                return root.to_string();
            }
        }
    }
    word.to_string()
}

/// A value counts as supplied evidence unless it is null or empty
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Pre-digested view of one evidence bag
#[derive(Debug, Clone, Default)]
pub struct EvidenceIndex {
    present_types: HashSet<String>,
    keywords: HashSet<String>,
    /// Word sequence of each evidence string, kept apart so phrases never span two values
    fragments: Vec<Vec<String>>,
}

impl EvidenceIndex {
    pub fn build(evidence: &Facts) -> Self {
        let present_types = evidence
            .iter()
            .filter(|(_, value)| is_present(value))
            .map(|(key, _)| key.clone())
            .collect();

        let mut texts = Vec::new();
        for value in evidence.values() {
            collect_text(value, &mut texts);
        }
        let keywords = texts.iter().flat_map(|t| keywords(t)).collect();
        let fragments = texts.iter().map(|t| words(t)).filter(|w| !w.is_empty()).collect();

        Self {
            present_types,
            keywords,
            fragments,
        }
    }

    pub fn has_type(&self, evidence_type: &str) -> bool {
        self.present_types.contains(evidence_type)
    }

    /// A requirement is satisfied when its keywords intersect the evidence
    /// keywords. Requirements made only of stop-words or short words fall
    /// back to a whole-word phrase match inside a single evidence string.
    pub fn satisfies(&self, requirement: &str) -> bool {
        let wanted = keywords(requirement);
        if wanted.is_empty() {
            let phrase = words(requirement);
            if phrase.is_empty() {
                return false;
            }
            return self
                .fragments
                .iter()
                .any(|fragment| fragment.windows(phrase.len()).any(|w| w == phrase.as_slice()));
        }
        wanted.iter().any(|k| self.keywords.contains(k))
    }

    pub fn is_empty(&self) -> bool {
        self.present_types.is_empty()
    }
}

fn collect_text<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_text(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_text(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn facts(value: Value) -> Facts {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_keywords_drop_stop_words_and_stem() {
        let kw = keywords("The process MUST be documented, with documentation!");
        assert!(kw.contains("document"));
        assert!(kw.contains("process"));
        assert!(!kw.contains("the"));
        assert!(!kw.contains("must"));
    }

    #[test]
    fn test_presence_ignores_empty_values() {
        let index = EvidenceIndex::build(&facts(json!({
            "policy_doc": "v2",
            "empty_doc": "  ",
            "null_doc": null,
            "list": [],
            "approved": false
        })));
        assert!(index.has_type("policy_doc"));
        assert!(index.has_type("approved"));
        assert!(!index.has_type("empty_doc"));
        assert!(!index.has_type("null_doc"));
        assert!(!index.has_type("list"));
    }

    #[test]
    fn test_requirement_matches_nested_evidence_text() {
        let index = EvidenceIndex::build(&facts(json!({
            "risk_management_plan": { "summary": "Residual risk register reviewed quarterly" }
        })));
        assert!(index.satisfies("Residual risks evaluated"));
        assert!(!index.satisfies("Human oversight measures assigned"));
    }

    #[test]
    fn test_adding_evidence_never_unsatisfies_a_requirement() {
        let base = facts(json!({ "policy_doc": "fully documented process" }));
        let mut extended = base.clone();
        extended.insert("audit_log".to_string(), json!("quarterly audit"));

        let before = EvidenceIndex::build(&base);
        let after = EvidenceIndex::build(&extended);
        for requirement in ["documented", "audit trail kept", "process owner"] {
            if before.satisfies(requirement) {
                assert!(after.satisfies(requirement), "{}", requirement);
            }
        }
    }

    #[test]
    fn test_stop_word_phrase_matches_within_one_value_only() {
        let split = facts(json!({ "a": "policy must be", "c": "used daily" }));
        assert!(!EvidenceIndex::build(&split).satisfies("must be used"));

        let whole = facts(json!({ "a": "tools must be used with care" }));
        assert!(EvidenceIndex::build(&whole).satisfies("Must be used"));
    }

    #[test]
    fn test_short_requirement_needs_a_whole_word() {
        let index = EvidenceIndex::build(&facts(json!({ "ops": "maintain the pipeline" })));
        assert!(!index.satisfies("AI"));

        let index = EvidenceIndex::build(&facts(json!({ "ops": "an AI system inventory" })));
        assert!(index.satisfies("AI"));
    }
}
