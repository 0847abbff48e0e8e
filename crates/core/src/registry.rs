use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a customer in the remote accounting system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerKey {
    pub id: String,
    pub number: String,
}

impl fmt::Display for CustomerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number, self.id)
    }
}

/// Curated mapping from one bank wording to a canonical customer name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub alias: String,
    pub customer_name: String,
}

/// Cached snapshot of one remote customer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub contact: Option<String>,
    pub key: CustomerKey,
    pub blocked: bool,
}

/// The remote system exports `blocked` as free text (`All`, `Ship`, `Invoice`, blank).
/// Only a full block counts.
pub fn parse_blocked(cell: &str) -> bool {
    matches!(
        cell.trim().to_ascii_lowercase().as_str(),
        "all" | "true" | "yes" | "1"
    )
}
