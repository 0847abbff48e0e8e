use std::time::Duration;

use bankin_core::{AssistConfig, Thresholds};
use bankin_import::{shortlist, Tier};

use crate::backend::{AssistError, LanguageModel};
use crate::prompt;
use crate::types::{AiTrace, MatchAction, MatchDecision, MatchReview, NameReview, ShortlistEntry, Verdict};

/// One row handed to the fallback stage.
#[derive(Debug, Clone)]
pub struct DisambiguationRequest {
    pub row_index: usize,
    pub candidate: String,
    /// Every populated raw description field of the row.
    pub descriptions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DisambiguationSettings {
    /// 0-100.
    pub acceptance: u8,
    pub prefilter: f64,
    pub top_n: usize,
    pub timeout: Duration,
}

impl DisambiguationSettings {
    pub fn from_config(thresholds: &Thresholds, assist: &AssistConfig) -> Self {
        Self {
            acceptance: thresholds.ai_acceptance,
            prefilter: thresholds.ai_prefilter,
            top_n: thresholds.ai_top_n,
            timeout: Duration::from_secs(assist.timeout_secs),
        }
    }
}

impl Default for DisambiguationSettings {
    fn default() -> Self {
        Self::from_config(&Thresholds::default(), &AssistConfig::default())
    }
}

/// Two-stage model-assisted search for a customer the registries missed.
///
/// Stage 1 asks whether the extracted name is right and for alternatives.
/// Stage 2 shows the model the directory rows closest to the original name
/// and the alternatives, and asks it to pick one. A pick is accepted only
/// when the model recommends `update_customer` with confidence at or above
/// the acceptance floor and the name is one of the rows it was shown.
///
/// Transport errors, timeouts and schema violations end in `NoMatch`; the
/// returned trace always records how far the exchange got.
pub struct Disambiguator<M: LanguageModel> {
    model: M,
    settings: DisambiguationSettings,
}

impl<M: LanguageModel> Disambiguator<M> {
    pub fn new(model: M, settings: DisambiguationSettings) -> Self {
        Self { model, settings }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub async fn resolve(&self, request: &DisambiguationRequest, directory: &Tier<'_>) -> AiTrace {
        let mut trace = AiTrace::new(request.row_index, &request.candidate, &request.descriptions);
        match self.run(request, directory, &mut trace).await {
            Ok(decision) => trace.decision = decision,
            Err(e) => {
                tracing::warn!("Row {}: assisted match failed: {e}", request.row_index + 1);
                trace.decision = MatchDecision::no_match(format!("assistant failure: {e}"));
                trace.error = Some(e.to_string());
            }
        }
        tracing::debug!("Row {}: assisted decision {:?}", request.row_index + 1, trace.decision);
        trace
    }

    async fn run(
        &self,
        request: &DisambiguationRequest,
        directory: &Tier<'_>,
        trace: &mut AiTrace,
    ) -> Result<MatchDecision, AssistError> {
        // Stage 1
        let raw = self
            .call(
                prompt::NAME_REVIEW_SYSTEM,
                &prompt::name_review(&request.candidate, &request.descriptions),
            )
            .await?;
        trace.name_review_raw = Some(raw.clone());
        let review = NameReview::parse(&raw)?;
        let verdict = review.verdict();
        trace.name_review = Some(review.clone());
        trace.verdict = Some(verdict.clone());

        let alternatives = match verdict {
            Verdict::KeepCurrent => return Ok(MatchDecision::no_match("model kept the current name")),
            Verdict::SearchAlternatives { alternatives } => alternatives,
        };

        // Stage 2
        let mut queries = vec![request.candidate.as_str()];
        queries.extend(alternatives.iter().map(String::as_str));
        trace.candidates = shortlist(&queries, directory, self.settings.prefilter, self.settings.top_n)
            .into_iter()
            .map(|e| ShortlistEntry {
                name: e.canonical_name,
                key: e.key,
                score: e.score,
                blocked: e.blocked,
            })
            .collect();
        if trace.candidates.is_empty() {
            return Ok(MatchDecision::no_match("no directory entries near the proposed names"));
        }

        let raw = self
            .call(
                prompt::MATCH_REVIEW_SYSTEM,
                &prompt::match_review(&request.candidate, &request.descriptions, &review, &trace.candidates),
            )
            .await?;
        trace.match_review_raw = Some(raw.clone());
        let match_review = MatchReview::parse(&raw)?;
        let decision = self.accept(&match_review, &trace.candidates);
        trace.match_review = Some(match_review);
        Ok(decision)
    }

    fn accept(&self, review: &MatchReview, candidates: &[ShortlistEntry]) -> MatchDecision {
        if review.recommendation == MatchAction::NoMatch {
            return MatchDecision::no_match("model recommended no_match");
        }
        if review.confidence < f64::from(self.settings.acceptance) {
            return MatchDecision::no_match(format!(
                "confidence {} below {}",
                review.confidence, self.settings.acceptance
            ));
        }
        let selected = review.selected_match.as_deref().unwrap_or_default().trim();
        match candidates.iter().find(|c| c.name.trim().eq_ignore_ascii_case(selected)) {
            Some(entry) => MatchDecision::Matched {
                name: entry.name.clone(),
                key: entry.key.clone(),
                confidence: review.confidence,
            },
            None => MatchDecision::no_match(format!("selection {selected:?} is not a shortlisted customer")),
        }
    }

    async fn call(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AssistError> {
        tokio::time::timeout(self.settings.timeout, self.model.complete_json(system_prompt, user_prompt))
            .await
            .map_err(|_| AssistError::Timeout(self.settings.timeout))?
    }
}
