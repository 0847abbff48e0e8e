use bankin_core::{is_populated, Anchor, BankProfile, DescriptionFields, PrefixRule, SplitStyle};
use regex::Regex;

use crate::profile::ProfileError;

/// A candidate name and the free text left over after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub candidate: String,
    pub residual: String,
}

impl Extraction {
    fn new(candidate: impl Into<String>, residual: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            residual: residual.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidate.trim().is_empty()
    }
}

/// Internal pairing of a prefix rule with its precompiled patterns.
struct CompiledRule {
    prefix: String,
    anchor: Anchor,
    skip: Option<Regex>,
    split: SplitStyle,
    markers: Vec<String>,
    patterns: Vec<Regex>,
}

/// Description parser compiled from one [`BankProfile`].
pub struct DescriptionParser {
    profile: String,
    rules: Vec<CompiledRule>,
}

impl DescriptionParser {
    pub fn new(profile: &BankProfile) -> Result<Self, ProfileError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|source| ProfileError::InvalidPattern {
                profile: profile.name.clone(),
                pattern: pattern.to_string(),
                source,
            })
        };

        let shared_patterns = profile
            .patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        let rules = profile
            .rules
            .iter()
            .map(|rule: &PrefixRule| {
                let skip = rule.skip.as_deref().map(compile).transpose()?;
                let patterns = match &rule.patterns {
                    Some(own) => own.iter().map(|p| compile(p)).collect::<Result<Vec<_>, _>>()?,
                    None => shared_patterns.clone(),
                };
                let markers = rule
                    .markers
                    .clone()
                    .unwrap_or_else(|| profile.markers.clone())
                    .into_iter()
                    .filter(|m| !m.is_empty())
                    .collect();
                Ok::<_, ProfileError>(CompiledRule {
                    prefix: rule.prefix.clone(),
                    anchor: rule.anchor,
                    skip,
                    split: rule.split.clone(),
                    markers,
                    patterns,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            profile: profile.name.clone(),
            rules,
        })
    }

    pub fn profile_name(&self) -> &str {
        &self.profile
    }

    /// Splits one raw description. Text that matches no prefix rule yields an
    /// empty extraction rather than a guess.
    pub fn extract(&self, raw: &str) -> Extraction {
        let raw = raw.trim();
        if raw.is_empty() {
            return Extraction::default();
        }

        for rule in &self.rules {
            let remainder = match rule.anchor {
                Anchor::Start => raw.strip_prefix(rule.prefix.as_str()),
                Anchor::Anywhere => raw
                    .find(rule.prefix.as_str())
                    .map(|idx| &raw[idx + rule.prefix.len()..]),
            };
            if let Some(remainder) = remainder {
                return rule.split(remainder);
            }
        }

        Extraction::default()
    }

    /// Extracts from a whole row. A populated secondary column is the name
    /// itself, with the reference column as its residual.
    pub fn extract_fields(&self, fields: &DescriptionFields) -> Extraction {
        match fields.secondary.as_deref().filter(|s| is_populated(s)) {
            Some(secondary) => Extraction::new(
                secondary.trim(),
                fields
                    .reference
                    .as_deref()
                    .filter(|s| is_populated(s))
                    .map(str::trim)
                    .unwrap_or_default(),
            ),
            None => self.extract(&fields.primary),
        }
    }
}

impl CompiledRule {
    fn split(&self, remainder: &str) -> Extraction {
        let mut rest = remainder.trim_start();
        if let Some(skip) = &self.skip {
            if let Some(m) = skip.find(rest).filter(|m| m.start() == 0) {
                rest = &rest[m.end()..];
            }
        }

        match &self.split {
            SplitStyle::Markers => self.split_at_marker(rest),
            SplitStyle::Delimiter { delimiter } => match rest.split_once(delimiter.as_str()) {
                Some((name, residual)) => Extraction::new(name.trim(), residual.trim()),
                None => Extraction::new(rest.trim(), ""),
            },
            SplitStyle::After { marker } => match rest.split_once(marker.as_str()) {
                Some((_, after)) => self.split_at_marker(after.trim_start()),
                None => Extraction::default(),
            },
        }
    }

    /// The earliest marker occurrence (lowest byte index, not list order)
    /// ends the name. Occurrences at index 0 are ignored.
    fn split_at_marker(&self, rest: &str) -> Extraction {
        let literal = self.markers.iter().filter_map(|marker| {
            rest.match_indices(marker.as_str())
                .map(|(idx, _)| idx)
                .find(|&idx| idx > 0)
        });
        let pattern = self.patterns.iter().filter_map(|re| {
            re.find_iter(rest)
                .map(|m| m.start())
                .find(|&idx| idx > 0)
        });

        match literal.chain(pattern).min() {
            Some(idx) => Extraction::new(&rest[..idx], rest[idx..].trim()),
            None => Extraction::new(rest.trim(), ""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileSet;
    use bankin_core::ColumnLayout;

    fn parser(name: &str) -> DescriptionParser {
        ProfileSet::with_builtins().parser(name).unwrap()
    }

    fn custom(rules: Vec<PrefixRule>, markers: &[&str]) -> DescriptionParser {
        DescriptionParser::new(&BankProfile {
            name: "custom".to_string(),
            columns: ColumnLayout {
                description: "Description".to_string(),
                secondary_description: None,
                reference: None,
                date: "Date".to_string(),
                amount: None,
            },
            rules,
            markers: markers.iter().map(|s| s.to_string()).collect(),
            patterns: Vec::new(),
        })
        .unwrap()
    }

    #[test]
    fn duitnow_with_invoice_marker() {
        let ex = parser("pbb").extract("DUITNOW TRSF CR - NO: 12345 ACME TRADING SDN BHD INV12345");
        assert_eq!(ex.candidate, "ACME TRADING SDN BHD ");
        assert_eq!(ex.residual, "INV12345");
    }

    #[test]
    fn single_marker_profile() {
        let rule = PrefixRule {
            skip: Some(r"^\d+\s+".to_string()),
            ..PrefixRule::new("DUITNOW TRSF CR - NO: ")
        };
        let ex = custom(vec![rule], &["INV"])
            .extract("DUITNOW TRSF CR - NO: 12345 ACME TRADING SDN BHD INV12345");
        assert_eq!(ex, Extraction::new("ACME TRADING SDN BHD ", "INV12345"));
    }

    #[test]
    fn earliest_marker_wins_not_list_order() {
        let p = custom(vec![PrefixRule::new("FROM ")], &["PAYMENT", "INV"]);
        let ex = p.extract("FROM ACME INV 9 PAYMENT");
        assert_eq!(ex, Extraction::new("ACME ", "INV 9 PAYMENT"));
    }

    #[test]
    fn marker_at_start_is_ignored() {
        let p = custom(vec![PrefixRule::new("FROM ")], &["INV"]);
        assert_eq!(p.extract("FROM INVICTA LTD INV 3"), Extraction::new("INVICTA LTD ", "INV 3"));
    }

    #[test]
    fn no_marker_means_whole_remainder() {
        let p = custom(vec![PrefixRule::new("FROM ")], &["INV"]);
        assert_eq!(p.extract("FROM ACME TRADING "), Extraction::new("ACME TRADING", ""));
    }

    #[test]
    fn unknown_prefix_yields_nothing() {
        assert_eq!(parser("pbb").extract("CASH DEPOSIT 500.00"), Extraction::default());
        assert_eq!(parser("sg_mbb").extract("xInward FAST - ACME"), Extraction::default());
        assert!(parser("pbb").extract("").is_empty());
        assert!(parser("pbb").extract("   ").is_empty());
    }

    #[test]
    fn short_codes_need_a_word_boundary() {
        let ex = parser("pbb").extract("DUITNOW TRSF CR - NO: 7 BRIGHT SOLUTIONS SO123 april");
        assert_eq!(ex.candidate, "BRIGHT SOLUTIONS ");
        assert_eq!(ex.residual, "SO123 april");
    }

    #[test]
    fn tsfr_skips_masked_account_and_splits_on_numbers() {
        let ex = parser("pbb")
            .extract("TSFR FUND CR-ATM/EFT - NO: 001 XXXXXX1234 KEDAI MAJU 88120045");
        assert_eq!(ex, Extraction::new("KEDAI MAJU", "88120045"));
    }

    #[test]
    fn ecp_bank_indicator() {
        let ex = parser("pbb").extract("DEP-ECP - NO: 55 IMEPS0012 ACME RESOURCES SDN BHD CIMB 0021");
        assert_eq!(ex, Extraction::new("ACME RESOURCES SDN BHD", "CIMB 0021"));
    }

    #[test]
    fn cheque_name_follows_asterisk() {
        let ex = parser("pbb").extract("DEP-LOC CHEQ - NO: 000123 *ACME HOLDINGS (12-JAN)");
        assert_eq!(ex, Extraction::new("ACME HOLDINGS", "(12-JAN)"));

        let no_asterisk = parser("pbb").extract("DEP-HSE CHEQ - NO: 000123 ACME");
        assert_eq!(no_asterisk, Extraction::default());
    }

    #[test]
    fn sg_fast_splits_on_comma() {
        let ex = parser("sg_mbb").extract("Inward FAST - LION CITY PTE. LTD., OTHR-Other");
        assert_eq!(ex, Extraction::new("LION CITY PTE. LTD.", "OTHR-Other"));
    }

    #[test]
    fn sg_paynow_codes_and_months() {
        let p = parser("sg_mbb");
        assert_eq!(
            p.extract("Inward PayNow from MERLION DESIGN IVPT-inv 22"),
            Extraction::new("MERLION DESIGN ", "IVPT-inv 22")
        );
        assert_eq!(
            p.extract("Inward PayNow from MERLION DESIGN March rent"),
            Extraction::new("MERLION DESIGN", "March rent")
        );
    }

    #[test]
    fn sg_ib_transfer_takes_everything() {
        let ex = parser("sg_mbb").extract("IB Transfer from D'ZANDER INTERIORS P");
        assert_eq!(ex, Extraction::new("D'ZANDER INTERIORS P", ""));
    }

    #[test]
    fn secondary_column_supersedes_primary() {
        let p = parser("mbb");
        let fields = DescriptionFields {
            primary: "MBB CT- SOMETHING ELSE".to_string(),
            secondary: Some("ACME DECOR*INV22".to_string()),
            reference: Some("REF778".to_string()),
        };
        assert_eq!(p.extract_fields(&fields), Extraction::new("ACME DECOR*INV22", "REF778"));
    }

    #[test]
    fn placeholder_secondary_falls_back_to_primary() {
        let p = parser("mbb");
        let fields = DescriptionFields {
            primary: "IBG PAYMENT INTO A/C ACME TRADING".to_string(),
            secondary: Some("-".to_string()),
            reference: Some("REF778".to_string()),
        };
        assert_eq!(p.extract_fields(&fields), Extraction::new("ACME TRADING", ""));
    }

    #[test]
    fn extraction_is_deterministic() {
        let p = parser("pbb");
        let raw = "DUITNOW TRSF CR - NO: 12345 ACME TRADING SDN BHD INV12345";
        assert_eq!(p.extract(raw), p.extract(raw));
    }
}
