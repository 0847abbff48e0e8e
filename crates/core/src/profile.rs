use serde::{Deserialize, Serialize};

/// Declarative parsing rules for one bank's statement export.
///
/// Profiles are plain data so they can live in `bankin.toml`; the import
/// crate compiles them into a parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankProfile {
    pub name: String,
    pub columns: ColumnLayout,
    /// Transaction-type prefixes, tried in order. The first that matches wins.
    #[serde(default)]
    pub rules: Vec<PrefixRule>,
    /// Literal description-start markers shared by every rule.
    #[serde(default)]
    pub markers: Vec<String>,
    /// Regex description-start markers shared by every rule.
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub description: String,
    /// Parallel description column; supersedes `description` as the name
    /// source when populated.
    #[serde(default)]
    pub secondary_description: Option<String>,
    /// Reference column; becomes the residual when the secondary column
    /// supplied the name.
    #[serde(default)]
    pub reference: Option<String>,
    pub date: String,
    #[serde(default)]
    pub amount: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// The description must begin with the prefix.
    #[default]
    Start,
    /// The prefix may appear anywhere; text before it is discarded.
    Anywhere,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixRule {
    pub prefix: String,
    #[serde(default)]
    pub anchor: Anchor,
    /// Regex consumed from the start of the remainder when it matches there
    /// (reference numbers, masked account numbers).
    #[serde(default)]
    pub skip: Option<String>,
    #[serde(default)]
    pub split: SplitStyle,
    /// Replaces the profile-level literal markers for this rule.
    #[serde(default)]
    pub markers: Option<Vec<String>>,
    /// Replaces the profile-level regex markers for this rule.
    #[serde(default)]
    pub patterns: Option<Vec<String>>,
}

impl PrefixRule {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            anchor: Anchor::Start,
            skip: None,
            split: SplitStyle::Markers,
            markers: None,
            patterns: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum SplitStyle {
    /// Earliest description-start marker splits name from residual.
    #[default]
    Markers,
    /// Name is everything before the first delimiter.
    Delimiter { delimiter: String },
    /// Name starts after `marker`; markers then split as usual.
    /// A row without `marker` yields no candidate.
    After { marker: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_from_toml() {
        let profile: BankProfile = toml::from_str(
            r#"
            name = "demo"
            markers = ["INV"]

            [columns]
            description = "Narrative"
            date = "Value Date"

            [[rules]]
            prefix = "CREDIT FROM "
            anchor = "anywhere"
            skip = '^\d+\s+'

            [[rules]]
            prefix = "FAST "
            split = { style = "delimiter", delimiter = "," }
            "#,
        )
        .unwrap();

        assert_eq!(profile.columns.description, "Narrative");
        assert_eq!(profile.columns.secondary_description, None);
        assert_eq!(profile.rules.len(), 2);
        assert_eq!(profile.rules[0].anchor, Anchor::Anywhere);
        assert_eq!(profile.rules[0].split, SplitStyle::Markers);
        assert_eq!(
            profile.rules[1].split,
            SplitStyle::Delimiter { delimiter: ",".to_string() }
        );
        assert_eq!(profile.rules[1].anchor, Anchor::Start);
    }
}
