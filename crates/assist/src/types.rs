use bankin_core::CustomerKey;
use serde::{Deserialize, Serialize};

use crate::backend::AssistError;

// ── Stage 1: name review ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    KeepCurrent,
    SearchAlternatives,
}

/// Stage 1 reply. Unknown recommendations and out-of-range confidences are
/// rejected at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameReview {
    pub is_appropriate: bool,
    pub confidence: f64,
    #[serde(default)]
    pub alternatives: Vec<String>,
    pub recommendation: ReviewAction,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    KeepCurrent,
    SearchAlternatives { alternatives: Vec<String> },
}

impl NameReview {
    pub fn parse(text: &str) -> Result<Self, AssistError> {
        let review: Self = serde_json::from_str(json_payload(text))?;
        check_confidence(review.confidence)?;
        Ok(review)
    }

    /// Alternatives are trimmed and de-duplicated case-insensitively.
    pub fn verdict(&self) -> Verdict {
        match self.recommendation {
            ReviewAction::KeepCurrent => Verdict::KeepCurrent,
            ReviewAction::SearchAlternatives => {
                let mut alternatives: Vec<String> = Vec::new();
                for alt in self.alternatives.iter().map(|a| a.trim()) {
                    if !alt.is_empty() && !alternatives.iter().any(|a| a.eq_ignore_ascii_case(alt)) {
                        alternatives.push(alt.to_string());
                    }
                }
                Verdict::SearchAlternatives { alternatives }
            }
        }
    }
}

// ── Stage 2: match scoring ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchAction {
    UpdateCustomer,
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReview {
    pub selected_match: Option<String>,
    pub confidence: f64,
    pub recommendation: MatchAction,
    #[serde(default)]
    pub reasoning: String,
}

impl MatchReview {
    pub fn parse(text: &str) -> Result<Self, AssistError> {
        let review: Self = serde_json::from_str(json_payload(text))?;
        check_confidence(review.confidence)?;
        if review.recommendation == MatchAction::UpdateCustomer
            && review.selected_match.as_deref().map_or(true, |m| m.trim().is_empty())
        {
            return Err(AssistError::Schema("update_customer without a selected_match".into()));
        }
        Ok(review)
    }
}

/// Final outcome of the fallback stage for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum MatchDecision {
    Matched {
        name: String,
        key: Option<CustomerKey>,
        confidence: f64,
    },
    NoMatch {
        reason: String,
    },
}

impl MatchDecision {
    pub fn no_match(reason: impl Into<String>) -> Self {
        MatchDecision::NoMatch { reason: reason.into() }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchDecision::Matched { .. })
    }
}

// ── Audit trace ──────────────────────────────────────────────────────────────

/// A directory row offered to the model in stage 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistEntry {
    pub name: String,
    pub key: Option<CustomerKey>,
    pub score: f64,
    pub blocked: bool,
}

/// Everything one disambiguation saw and decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiTrace {
    pub row_index: usize,
    pub original_name: String,
    pub descriptions: Vec<String>,
    pub name_review_raw: Option<String>,
    pub name_review: Option<NameReview>,
    pub verdict: Option<Verdict>,
    pub candidates: Vec<ShortlistEntry>,
    pub match_review_raw: Option<String>,
    pub match_review: Option<MatchReview>,
    pub decision: MatchDecision,
    /// Transport, timeout or schema failure that forced `NoMatch`.
    pub error: Option<String>,
}

impl AiTrace {
    pub fn new(row_index: usize, original_name: &str, descriptions: &[String]) -> Self {
        Self {
            row_index,
            original_name: original_name.to_string(),
            descriptions: descriptions.to_vec(),
            name_review_raw: None,
            name_review: None,
            verdict: None,
            candidates: Vec::new(),
            match_review_raw: None,
            match_review: None,
            decision: MatchDecision::no_match("not evaluated"),
            error: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Strips a Markdown code fence if the model wrapped its JSON in one.
fn json_payload(text: &str) -> &str {
    let text = text.trim();
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn check_confidence(confidence: f64) -> Result<(), AssistError> {
    if confidence.is_finite() && (0.0..=100.0).contains(&confidence) {
        Ok(())
    } else {
        Err(AssistError::Schema(format!("confidence out of range: {confidence}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_review_parses() {
        let review = NameReview::parse(
            r#"{"is_appropriate": false, "confidence": 70,
                "alternatives": ["ACME TRADING", " acme trading ", "", "ACME HOLDINGS"],
                "recommendation": "search_alternatives", "reasoning": "bank wording"}"#,
        )
        .unwrap();
        assert_eq!(
            review.verdict(),
            Verdict::SearchAlternatives {
                alternatives: vec!["ACME TRADING".into(), "ACME HOLDINGS".into()]
            }
        );
    }

    #[test]
    fn keep_current_verdict() {
        let review = NameReview::parse(
            r#"{"is_appropriate": true, "confidence": 95, "recommendation": "keep_current"}"#,
        )
        .unwrap();
        assert_eq!(review.verdict(), Verdict::KeepCurrent);
        assert!(review.alternatives.is_empty());
    }

    #[test]
    fn fenced_json_is_accepted() {
        let text = "```json\n{\"is_appropriate\": true, \"confidence\": 80, \"recommendation\": \"keep_current\"}\n```";
        assert!(NameReview::parse(text).is_ok());
    }

    #[test]
    fn schema_violations() {
        for bad in [
            "not json",
            r#"{"is_appropriate": true, "confidence": 80, "recommendation": "maybe"}"#,
            r#"{"is_appropriate": true, "confidence": 101, "recommendation": "keep_current"}"#,
            r#"{"is_appropriate": true, "confidence": -1, "recommendation": "keep_current"}"#,
            r#"{"confidence": 80, "recommendation": "keep_current"}"#,
        ] {
            assert!(matches!(NameReview::parse(bad), Err(AssistError::Schema(_))), "{bad}");
        }
    }

    #[test]
    fn match_review_requires_selection_for_update() {
        let ok = MatchReview::parse(
            r#"{"selected_match": "ACME TRADING SDN BHD", "confidence": 92, "recommendation": "update_customer"}"#,
        )
        .unwrap();
        assert_eq!(ok.recommendation, MatchAction::UpdateCustomer);

        let none = MatchReview::parse(r#"{"selected_match": null, "confidence": 0, "recommendation": "no_match"}"#);
        assert!(none.is_ok());

        let bad = MatchReview::parse(r#"{"selected_match": null, "confidence": 95, "recommendation": "update_customer"}"#);
        assert!(matches!(bad, Err(AssistError::Schema(_))));
    }

    #[test]
    fn trace_serializes_tagged_decision() {
        let mut trace = AiTrace::new(3, "ACME", &["DUITNOW ACME".to_string()]);
        trace.decision = MatchDecision::Matched {
            name: "ACME TRADING SDN BHD".into(),
            key: None,
            confidence: 93.0,
        };
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["decision"]["decision"], "matched");
        let back: AiTrace = serde_json::from_value(json).unwrap();
        assert_eq!(back, trace);
    }
}
