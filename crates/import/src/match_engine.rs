use bankin_core::CustomerKey;

use crate::registry::{Registry, RegistryError, RegistryKind};
use crate::util::similarity_ratio;

/// One registry in the precedence list, with the columns it is searched on
/// and the score it must reach.
#[derive(Debug, Clone)]
pub struct Tier<'a> {
    pub registry: &'a Registry,
    columns: Vec<usize>,
    pub threshold: f64,
}

impl<'a> Tier<'a> {
    pub fn new(registry: &'a Registry, match_columns: &[&str], threshold: f64) -> Result<Self, RegistryError> {
        let columns = match_columns
            .iter()
            .map(|c| registry.column_index(c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            registry,
            columns,
            threshold,
        })
    }

    /// Searches the registry's default match columns.
    pub fn with_default_columns(registry: &'a Registry, threshold: f64) -> Self {
        let columns = registry
            .default_match_columns()
            .iter()
            .filter_map(|c| registry.column_index(c).ok())
            .collect();
        Self {
            registry,
            columns,
            threshold,
        }
    }
}

/// Best-scoring (row, column) pair seen while scanning one registry.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub row: usize,
    pub column: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    pub canonical_name: Option<String>,
    pub registry_key: Option<CustomerKey>,
    /// Registry that accepted the match.
    pub registry: Option<RegistryKind>,
    pub column: Option<String>,
    /// Accepted score, or the best score seen anywhere when unmatched.
    pub score: f64,
}

impl MatchResult {
    fn unmatched(score: f64) -> Self {
        Self {
            matched: false,
            canonical_name: None,
            registry_key: None,
            registry: None,
            column: None,
            score,
        }
    }
}

/// Walks `tiers` in order and returns the first registry whose best match
/// clears its threshold. Lower tiers are not consulted once one accepts.
pub fn reconcile(candidate: &str, tiers: &[Tier<'_>]) -> MatchResult {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return MatchResult::unmatched(0.0);
    }

    let mut best_seen = 0.0f64;
    for tier in tiers {
        let Some(best) = best_match(candidate, tier) else {
            continue;
        };
        best_seen = best_seen.max(best.score);
        if best.score >= tier.threshold {
            let row = &tier.registry.rows[best.row];
            tracing::debug!(
                "Matched {candidate:?} to {:?} in {} ({:.3})",
                row.canonical_name,
                tier.registry.kind,
                best.score
            );
            return MatchResult {
                matched: true,
                canonical_name: Some(row.canonical_name.clone()),
                registry_key: row.key.clone(),
                registry: Some(tier.registry.kind),
                column: tier.registry.columns.get(best.column).cloned(),
                score: best.score,
            };
        }
    }

    MatchResult::unmatched(best_seen)
}

/// Highest-scoring cell across the tier's columns. A strictly higher score
/// wins; on an exact tie an unblocked row displaces a blocked one, otherwise
/// the first in row-then-column order stays.
pub fn best_match(candidate: &str, tier: &Tier<'_>) -> Option<MatchCandidate> {
    let mut best: Option<(MatchCandidate, bool)> = None;

    for (r, row) in tier.registry.rows.iter().enumerate() {
        for &c in &tier.columns {
            let Some(value) = row.values.get(c).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            let score = similarity_ratio(candidate, value.trim());
            let better = match &best {
                None => true,
                Some((current, blocked)) => {
                    score > current.score || (score == current.score && *blocked && !row.blocked)
                }
            };
            if better {
                best = Some((MatchCandidate { row: r, column: c, score }, row.blocked));
            }
        }
    }

    best.map(|(candidate, _)| candidate)
}

/// A registry row short-listed for a later, more expensive decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub row: usize,
    pub canonical_name: String,
    pub key: Option<CustomerKey>,
    pub blocked: bool,
    pub score: f64,
}

/// The `limit` rows scoring highest against any of `queries` on any match
/// column, keeping only those at or above `floor`. Sorted by score, then
/// unblocked first, then registry order.
pub fn shortlist(queries: &[&str], tier: &Tier<'_>, floor: f64, limit: usize) -> Vec<ScoredEntry> {
    let queries: Vec<&str> = queries
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .collect();
    if queries.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<ScoredEntry> = tier
        .registry
        .rows
        .iter()
        .enumerate()
        .filter_map(|(r, row)| {
            let score = tier
                .columns
                .iter()
                .filter_map(|&c| row.values.get(c))
                .filter(|v| !v.trim().is_empty())
                .flat_map(|v| queries.iter().map(move |q| similarity_ratio(q, v.trim())))
                .fold(0.0f64, f64::max);
            (score >= floor && score > 0.0).then(|| ScoredEntry {
                row: r,
                canonical_name: row.canonical_name.clone(),
                key: row.key.clone(),
                blocked: row.blocked,
                score,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.blocked.cmp(&b.blocked))
            .then(a.row.cmp(&b.row))
    });
    scored.truncate(limit);
    scored
}
