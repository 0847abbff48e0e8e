use std::sync::OnceLock;

use regex::Regex;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_boilerplate, r"(?i)^(?:IBG PAYMENT INTO A/C|MBB CT-?)\s*");
re!(re_leading_number, r"^\d+(?:\s+|$)");
re!(re_at_token, r"@\S*");
re!(re_bracketed, r"\[[^\]]*\]|\([^)]*\)");
re!(re_numeric_date, r"\b\d{1,2}[/.\-]\d{1,2}[/.\-]\d{2,4}\b");

re!(re_sdn_bhd, r"(?i)\bSDN\.?\s*BHD\b\.?");
re!(re_sdn_bh_truncated, r"(?i)\bSDN\.?\s*BH\.?$");
re!(re_s_slash_b, r"(?i)\bS\s*/\s*B\b\.?");
re!(re_trailing_sb, r"\s+SB\.?$");
re!(re_pte_ltd, r"(?i)\bPTE\.?\s*LTD\b\.?");
re!(re_trailing_pte, r"(?i)\s+PTE\.?$");

re!(re_long_number, r"\s+\d{8,}.*$");
re!(re_document_ref, r"\s+[A-Z]{2,3}-?\d[-\d]*.*$");
re!(re_month_date, r"(?i)\s+(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+\d{2}.*$");
re!(re_year, r"\s+20\d{2}\b.*$");

re!(re_whitespace, r"\s+");

/// Output of [`clean`]: the normalised name plus everything taken out of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanedName {
    pub name: String,
    /// Stripped dates, references and other tokens, in removal order.
    pub extra: String,
}

/// Collects removed fragments so nothing leaves the name untracked.
#[derive(Default)]
struct Removed(Vec<String>);

impl Removed {
    fn push(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.chars().any(|c| c.is_alphanumeric()) {
            self.0.push(fragment.to_string());
        }
    }

    fn into_string(self) -> String {
        self.0.join(" ")
    }
}

/// Normalises a raw candidate name.
///
/// Rules run in a fixed order: encoding repair, transfer boilerplate, leading
/// numbers, the asterisk split, `@` handles, bracketed notes, numeric dates,
/// corporate suffix spelling, trailing references (long numbers, document
/// codes, month dates, years), a repeated company name, then whitespace and
/// case. Every removed fragment that carries a letter or digit lands in
/// `extra`. Suffix variants (`S/B`, `SDN. BHD.`, `PTE.LTD`) are rewritten,
/// not removed.
pub fn clean(candidate: &str) -> CleanedName {
    let mut name = candidate.trim().replace('É', "E").replace("&amp;", "&");
    if name.is_empty() {
        return CleanedName::default();
    }
    let mut removed = Removed::default();

    strip_match(&mut name, re_boilerplate(), &mut removed);
    strip_match(&mut name, re_leading_number(), &mut removed);
    split_asterisk(&mut name, &mut removed);
    strip_all(&mut name, re_at_token(), &mut removed);
    strip_all(&mut name, re_bracketed(), &mut removed);
    strip_all(&mut name, re_numeric_date(), &mut removed);

    normalize_suffixes(&mut name);

    for re in [re_long_number(), re_document_ref(), re_month_date(), re_year()] {
        strip_match(&mut name, re, &mut removed);
    }

    strip_repeated_name(&mut name, &mut removed);

    let name = name.trim_end_matches(|c: char| c == '.' || c == '/' || c == ',' || c == '-' || c.is_whitespace());
    let name = re_whitespace().replace_all(name.trim(), " ").to_uppercase();

    CleanedName {
        name,
        extra: removed.into_string(),
    }
}

/// Drops transfer boilerplate from a residual description and trims it.
pub fn clean_residual(residual: &str) -> String {
    let residual = residual.trim();
    if residual == "Fund transfer" {
        return String::new();
    }
    if let Some(rest) = residual.strip_prefix("Fund transfer ") {
        return rest.trim().to_string();
    }
    if residual.starts_with("Sent from ") {
        let parts: Vec<&str> = residual.splitn(4, ' ').collect();
        return parts
            .get(3)
            .or_else(|| parts.get(2))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
    }
    residual.to_string()
}

/// `extra` goes in front of the residual, separated by a space.
pub fn compose_description(extra: &str, residual: &str) -> String {
    format!("{} {}", extra.trim(), clean_residual(residual))
        .trim()
        .to_string()
}

/// Canonical spelling for a name that needs no stripping: suffix variants,
/// whitespace and case only.
pub fn format_name(name: &str) -> String {
    let mut name = name.trim().to_string();
    normalize_suffixes(&mut name);
    re_whitespace().replace_all(name.trim(), " ").to_uppercase()
}

fn strip_match(name: &mut String, re: &Regex, removed: &mut Removed) {
    let Some(m) = re.find(name) else {
        return;
    };
    let range = m.range();
    removed.push(m.as_str());
    name.replace_range(range, " ");
}

fn strip_all(name: &mut String, re: &Regex, removed: &mut Removed) {
    for m in re.find_iter(name) {
        removed.push(m.as_str());
    }
    *name = re.replace_all(name, " ").into_owned();
}

/// Bank descriptions often carry `NAME*NOTE` or `NOTE*NAME`. The segment after
/// the asterisk wins when it looks like a name (two or more words, or ten or
/// more characters) or when nothing precedes the asterisk.
fn split_asterisk(name: &mut String, removed: &mut Removed) {
    let Some(idx) = name.find('*') else {
        return;
    };
    let before = name[..idx].trim().to_string();
    let after = name[idx + 1..].replace('*', " ").trim().to_string();

    let prefer_after = !after.is_empty()
        && (before.is_empty() || after.split_whitespace().count() >= 2 || after.chars().count() >= 10);

    if prefer_after {
        removed.push(&before);
        *name = after;
    } else {
        removed.push(&after);
        *name = before;
    }
}

fn normalize_suffixes(name: &mut String) {
    *name = re_sdn_bhd().replace_all(name, "SDN BHD").into_owned();
    *name = re_s_slash_b().replace_all(name, "SDN BHD").into_owned();
    *name = re_pte_ltd().replace_all(name, "PTE LTD").into_owned();

    let trimmed = name.trim_end().to_string();
    let trimmed = re_sdn_bh_truncated().replace(&trimmed, "SDN BHD");
    let trimmed = re_trailing_sb().replace(&trimmed, " SDN BHD");
    let trimmed = re_trailing_pte().replace(&trimmed, " PTE LTD");
    *name = trimmed.into_owned();
}

/// `ACME TRADING SDN ACME TRADING SDN BHD` keeps the first three words.
fn strip_repeated_name(name: &mut String, removed: &mut Removed) {
    let words: Vec<&str> = name.split_whitespace().collect();
    if words.len() <= 3 {
        return;
    }
    let head = words[..3].join(" ").to_lowercase();
    let tail = words[3..].join(" ");
    if tail.to_lowercase().starts_with(&head) {
        removed.push(&tail);
        *name = words[..3].join(" ");
    }
}
