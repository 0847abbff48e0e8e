use crate::types::{NameReview, ShortlistEntry};

pub const NAME_REVIEW_SYSTEM: &str = "You review customer names extracted from bank statement \
transaction descriptions. Decide whether the extracted name is the paying customer. If it is \
not, or if the descriptions suggest a better name, list alternative customer names taken from \
the descriptions. Reply with one JSON object with exactly these fields: \
\"is_appropriate\" (boolean), \"confidence\" (number 0-100), \"alternatives\" (array of strings), \
\"recommendation\" (\"keep_current\" or \"search_alternatives\"), \"reasoning\" (string).";

pub const MATCH_REVIEW_SYSTEM: &str = "You match a bank transaction to one customer from a \
candidate list taken from the accounting system. Only choose a name that appears verbatim in \
the candidate list. Candidates marked \"blocked\" are inactive accounts; when a blocked and an \
unblocked candidate fit equally well, choose the unblocked one. If none clearly fits, recommend \
no_match. Reply with one JSON object with \
exactly these fields: \"selected_match\" (a candidate name or null), \"confidence\" (number \
0-100), \"recommendation\" (\"update_customer\" or \"no_match\"), \"reasoning\" (string).";

pub fn name_review(current_name: &str, descriptions: &[String]) -> String {
    serde_json::json!({
        "current_name": current_name,
        "descriptions": descriptions,
    })
    .to_string()
}

pub fn match_review(
    original_name: &str,
    descriptions: &[String],
    review: &NameReview,
    candidates: &[ShortlistEntry],
) -> String {
    let candidates: Vec<serde_json::Value> = candidates
        .iter()
        .map(|c| {
            serde_json::json!({
                "name": c.name,
                "similarity": (c.score * 100.0).round() / 100.0,
                "blocked": c.blocked,
            })
        })
        .collect();
    serde_json::json!({
        "original_name": original_name,
        "descriptions": descriptions,
        "name_review": {
            "alternatives": review.alternatives,
            "reasoning": review.reasoning,
        },
        "candidates": candidates,
    })
    .to_string()
}
