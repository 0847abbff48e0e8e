use std::collections::BTreeMap;

use bankin_core::{Anchor, BankProfile, ColumnLayout, PrefixRule, SplitStyle};
use thiserror::Error;

use crate::parser::DescriptionParser;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Unknown bank profile: {0}")]
    Unknown(String),
    #[error("Invalid pattern {pattern:?} in profile {profile}: {source}")]
    InvalidPattern {
        profile: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Named profiles available to a run: the built-ins, overridden or extended
/// by those declared in configuration.
#[derive(Debug, Clone)]
pub struct ProfileSet {
    profiles: BTreeMap<String, BankProfile>,
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ProfileSet {
    pub fn with_builtins() -> Self {
        let mut set = Self {
            profiles: BTreeMap::new(),
        };
        set.extend(builtin_profiles());
        set
    }

    /// A profile whose name is already present replaces the existing one.
    pub fn extend(&mut self, profiles: impl IntoIterator<Item = BankProfile>) {
        for profile in profiles {
            self.profiles.insert(profile.name.clone(), profile);
        }
    }

    pub fn get(&self, name: &str) -> Result<&BankProfile, ProfileError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ProfileError::Unknown(name.to_string()))
    }

    pub fn parser(&self, name: &str) -> Result<DescriptionParser, ProfileError> {
        DescriptionParser::new(self.get(name)?)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ── Built-in profiles ────────────────────────────────────────────────────────

const PBB_MARKERS: &[&str] = &[
    "Fund transfer", "PV-", "INV", "BINVOICE", "Statement", "Payment for", "TOP UP", "paym",
    "invoice", "Sent", "Jotex",
];

/// Two-letter document codes only count as whole words or when followed by a
/// number, so `SOLUTIONS` or `POWER` are not split.
const PBB_SHORT_CODES: &str = r"\b(?:SO|PS|PO)(?:[\d-]|\b)";

const SG_PURPOSE_CODES: &[&str] = &["BEXP-", "IVPT-", "OTHR-", "GDDS-", "SUPP-"];

const MONTH_TOKEN: &str = r"\s(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:tember)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\b";

pub fn builtin_profiles() -> Vec<BankProfile> {
    vec![pbb(), mbb("mbb"), mbb("smarthome_mbb"), sg_mbb()]
}

fn anywhere(prefix: &str) -> PrefixRule {
    PrefixRule {
        anchor: Anchor::Anywhere,
        ..PrefixRule::new(prefix)
    }
}

fn pbb() -> BankProfile {
    let mut duitnow_markers = strings(PBB_MARKERS);
    duitnow_markers.extend(strings(&["Bill", "Doc"]));

    let duitnow = PrefixRule {
        skip: Some(r"^\d+\s+".to_string()),
        markers: Some(duitnow_markers),
        patterns: Some(vec![PBB_SHORT_CODES.to_string()]),
        ..anywhere("DUITNOW TRSF CR - NO: ")
    };

    let fund_transfer = PrefixRule {
        skip: Some(r"^\d+\s+XXXXXX\d+\s+".to_string()),
        markers: Some(strings(PBB_MARKERS)),
        patterns: Some(vec![r"\bSO(?:[\d-]|\b)".to_string(), r"\s+\d{4,}".to_string()]),
        ..anywhere("TSFR FUND CR-ATM/EFT - NO: ")
    };

    let ecp = PrefixRule {
        skip: Some(r"^\d+\s+IMEPS\d+\s+".to_string()),
        markers: Some(Vec::new()),
        patterns: Some(vec![
            r"\s(?:CIMB?|HLB|MBB|RHB|PBB)\b".to_string(),
            r"\s+\d{4}[\s-]\d{4}".to_string(),
        ]),
        ..anywhere("DEP-ECP - NO: ")
    };

    let cheque = |prefix: &str| PrefixRule {
        split: SplitStyle::After {
            marker: "*".to_string(),
        },
        markers: Some(Vec::new()),
        patterns: Some(vec![r"\s+\([^)]+\)\s*$".to_string()]),
        ..anywhere(prefix)
    };

    BankProfile {
        name: "pbb".to_string(),
        columns: ColumnLayout {
            description: "Transaction Description".to_string(),
            secondary_description: None,
            reference: None,
            date: "Transaction Date".to_string(),
            amount: Some("Credit Amount".to_string()),
        },
        rules: vec![
            duitnow,
            fund_transfer,
            ecp,
            cheque("DEP-LOC CHEQ - NO:"),
            cheque("DEP-HSE CHEQ - NO:"),
        ],
        markers: Vec::new(),
        patterns: Vec::new(),
    }
}

/// Maybank MY exports carry the counterparty in a second description column;
/// the primary column is only parsed when that one is empty or `-`.
fn mbb(name: &str) -> BankProfile {
    BankProfile {
        name: name.to_string(),
        columns: ColumnLayout {
            description: "Transaction Description".to_string(),
            secondary_description: Some("Transaction Description.1".to_string()),
            reference: Some("Transaction Ref".to_string()),
            date: "Posting date".to_string(),
            amount: Some("Credit".to_string()),
        },
        rules: vec![anywhere("MBB CT-"), anywhere("IBG PAYMENT INTO A/C")],
        markers: Vec::new(),
        patterns: Vec::new(),
    }
}

fn sg_mbb() -> BankProfile {
    let purpose_codes = strings(SG_PURPOSE_CODES);

    BankProfile {
        name: "sg_mbb".to_string(),
        columns: ColumnLayout {
            description: "Description".to_string(),
            secondary_description: None,
            reference: None,
            date: "Transaction Date".to_string(),
            amount: Some("Credit".to_string()),
        },
        rules: vec![
            PrefixRule {
                split: SplitStyle::Delimiter {
                    delimiter: ", ".to_string(),
                },
                ..PrefixRule::new("Inward FAST - ")
            },
            PrefixRule {
                markers: Some(purpose_codes.clone()),
                patterns: Some(vec![MONTH_TOKEN.to_string()]),
                ..PrefixRule::new("Inward PayNow from ")
            },
            PrefixRule {
                markers: Some(purpose_codes),
                patterns: Some(Vec::new()),
                ..PrefixRule::new("Giro Credit from ")
            },
            PrefixRule {
                markers: Some(Vec::new()),
                patterns: Some(Vec::new()),
                ..PrefixRule::new("IB Transfer from ")
            },
        ],
        markers: Vec::new(),
        patterns: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::clean;
    use crate::parser::Extraction;
    use bankin_core::DescriptionFields;

    fn extraction(candidate: &str, residual: &str) -> Extraction {
        Extraction {
            candidate: candidate.to_string(),
            residual: residual.to_string(),
        }
    }

    #[test]
    fn builtins_are_registered() {
        let set = ProfileSet::with_builtins();
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["mbb", "pbb", "sg_mbb", "smarthome_mbb"]);
    }

    #[test]
    fn every_builtin_compiles() {
        let set = ProfileSet::with_builtins();
        for name in ["pbb", "mbb", "sg_mbb", "smarthome_mbb"] {
            assert!(set.parser(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn unknown_profile() {
        let set = ProfileSet::with_builtins();
        assert!(matches!(set.get("hsbc"), Err(ProfileError::Unknown(n)) if n == "hsbc"));
    }

    #[test]
    fn configured_profile_overrides_builtin() {
        let mut set = ProfileSet::with_builtins();
        let mut custom = set.get("pbb").unwrap().clone();
        custom.columns.date = "Value Date".to_string();
        set.extend([custom]);
        assert_eq!(set.get("pbb").unwrap().columns.date, "Value Date");
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let mut set = ProfileSet::with_builtins();
        let mut broken = set.get("mbb").unwrap().clone();
        broken.name = "broken".to_string();
        broken.patterns = vec!["(unclosed".to_string()];
        set.extend([broken]);
        assert!(matches!(
            set.parser("broken"),
            Err(ProfileError::InvalidPattern { profile, .. }) if profile == "broken"
        ));
    }

    #[test]
    fn giro_credit_splits_on_purpose_codes_only() {
        let p = ProfileSet::with_builtins().parser("sg_mbb").unwrap();
        assert_eq!(
            p.extract("Giro Credit from LION CITY PTE LTD March BEXP-inv 7"),
            extraction("LION CITY PTE LTD March ", "BEXP-inv 7")
        );
        assert_eq!(
            p.extract("Giro Credit from MERLION DESIGN March rent"),
            extraction("MERLION DESIGN March rent", "")
        );
        assert_eq!(p.extract("xGiro Credit from ACME"), Extraction::default());
    }

    #[test]
    fn smarthome_reads_the_secondary_column() {
        let set = ProfileSet::with_builtins();
        let profile = set.get("smarthome_mbb").unwrap();
        assert_eq!(profile.columns, set.get("mbb").unwrap().columns);

        let fields = DescriptionFields {
            primary: "MBB CT- 778812".to_string(),
            secondary: Some("INV 22*SMART HOME DECOR".to_string()),
            reference: Some("REF1".to_string()),
        };
        let ex = set.parser("smarthome_mbb").unwrap().extract_fields(&fields);
        assert_eq!(ex, extraction("INV 22*SMART HOME DECOR", "REF1"));

        let cleaned = clean(&ex.candidate);
        assert_eq!(cleaned.name, "SMART HOME DECOR");
        assert_eq!(cleaned.extra, "INV 22");
    }

    #[test]
    fn smarthome_primary_fallback() {
        let p = ProfileSet::with_builtins().parser("smarthome_mbb").unwrap();
        let fields = DescriptionFields {
            primary: "MBB CT- SMART HOME DECOR".to_string(),
            secondary: Some("-".to_string()),
            reference: None,
        };
        assert_eq!(p.extract_fields(&fields), extraction("SMART HOME DECOR", ""));
    }
}
