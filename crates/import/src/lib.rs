pub mod clean;
pub mod csv;
pub mod match_engine;
pub mod parser;
pub mod profile;
pub mod registry;
pub mod suggest;
pub(crate) mod util;

pub use clean::{clean, clean_residual, compose_description, format_name, CleanedName};
pub use self::csv::{parse_posting_date, BatchFile, BatchFileError};
pub use match_engine::{best_match, reconcile, shortlist, MatchCandidate, MatchResult, ScoredEntry, Tier};
pub use parser::{DescriptionParser, Extraction};
pub use profile::{builtin_profiles, ProfileError, ProfileSet};
pub use registry::{Registry, RegistryError, RegistryKind, RegistryRow};
pub use suggest::{
    predict, ModelError, ModelSuggester, NameSuggester, Suggestion, SuggestionSource, TrainedNameModel,
};
pub use util::similarity_ratio;
