pub mod backend;
pub mod disambiguate;
pub mod prompt;
pub mod types;

pub use backend::{AssistError, LanguageModel, OpenAiBackend, ScriptedModel};
pub use disambiguate::{DisambiguationRequest, DisambiguationSettings, Disambiguator};
pub use types::{
    AiTrace, MatchAction, MatchDecision, MatchReview, NameReview, ReviewAction, ShortlistEntry, Verdict,
};
