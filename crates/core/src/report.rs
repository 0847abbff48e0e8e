use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

use crate::registry::CustomerKey;

pub const REMARK_MISSING_NAME: &str = "Missing customer name";
pub const REMARK_NOT_FOUND: &str = "Customer not found";

/// Which stage settled a row's final `CUSTOMER_NAME`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    AliasTable,
    Directory,
    Assistant,
    /// Every stage ran and nothing cleared its threshold.
    Unresolved,
    /// `STATUS = Transferred`; untouched.
    AlreadyTransferred,
    /// Left untouched, e.g. no posting date.
    Skipped,
    /// The row's processing failed; the batch continued.
    Failed,
}

impl ResolvedBy {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolvedBy::AliasTable => "alias_table",
            ResolvedBy::Directory => "directory",
            ResolvedBy::Assistant => "assistant",
            ResolvedBy::Unresolved => "unresolved",
            ResolvedBy::AlreadyTransferred => "already_transferred",
            ResolvedBy::Skipped => "skipped",
            ResolvedBy::Failed => "failed",
        }
    }

    pub fn is_match(self) -> bool {
        matches!(
            self,
            ResolvedBy::AliasTable | ResolvedBy::Directory | ResolvedBy::Assistant
        )
    }
}

impl fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolvedBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alias_table" => Ok(ResolvedBy::AliasTable),
            "directory" => Ok(ResolvedBy::Directory),
            "assistant" => Ok(ResolvedBy::Assistant),
            "unresolved" => Ok(ResolvedBy::Unresolved),
            "already_transferred" => Ok(ResolvedBy::AlreadyTransferred),
            "skipped" => Ok(ResolvedBy::Skipped),
            "failed" => Ok(ResolvedBy::Failed),
            other => Err(format!("Unknown resolution: '{other}'")),
        }
    }
}

/// Final, auditable outcome for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowDisposition {
    pub row_index: usize,
    /// Candidate after extraction and cleaning, before reconciliation.
    pub original_candidate: String,
    pub final_name: String,
    pub resolved_by: ResolvedBy,
    pub registry_key: Option<CustomerKey>,
    /// Similarity in [0, 1] for registry matches, confidence / 100 for the assistant.
    pub score: Option<f64>,
    pub remark: Option<String>,
}

impl RowDisposition {
    pub fn untouched(row_index: usize, name: &str, resolved_by: ResolvedBy) -> Self {
        Self {
            row_index,
            original_candidate: name.to_string(),
            final_name: name.to_string(),
            resolved_by,
            registry_key: None,
            score: None,
            remark: None,
        }
    }
}

/// Monotonic batch counters. Workers keep their own and merge with `+=`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub processed: u64,
    pub already_transferred: u64,
    pub skipped: u64,
    pub failed: u64,
    pub matched_alias: u64,
    pub matched_directory: u64,
    pub matched_assistant: u64,
    pub unresolved: u64,
    pub ai_invocations: u64,
    pub ai_failures: u64,
}

impl BatchStats {
    pub fn record(&mut self, resolved_by: ResolvedBy) {
        match resolved_by {
            ResolvedBy::AlreadyTransferred => self.already_transferred += 1,
            ResolvedBy::Skipped => self.skipped += 1,
            ResolvedBy::Failed => self.failed += 1,
            other => {
                self.processed += 1;
                match other {
                    ResolvedBy::AliasTable => self.matched_alias += 1,
                    ResolvedBy::Directory => self.matched_directory += 1,
                    ResolvedBy::Assistant => self.matched_assistant += 1,
                    _ => self.unresolved += 1,
                }
            }
        }
    }

    pub fn matched(&self) -> u64 {
        self.matched_alias + self.matched_directory + self.matched_assistant
    }
}

impl AddAssign for BatchStats {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.already_transferred += rhs.already_transferred;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
        self.matched_alias += rhs.matched_alias;
        self.matched_directory += rhs.matched_directory;
        self.matched_assistant += rhs.matched_assistant;
        self.unresolved += rhs.unresolved;
        self.ai_invocations += rhs.ai_invocations;
        self.ai_failures += rhs.ai_failures;
    }
}
