use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::profile::BankProfile;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid threshold {name}: {value}")]
    Threshold { name: &'static str, value: f64 },
}

/// Top-level `bankin.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub alias_registry: Option<AliasRegistryConfig>,
    #[serde(default)]
    pub directory_registry: Option<DirectoryRegistryConfig>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub assist: AssistConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Where derived output files go. Defaults to the input's directory.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub batches: Vec<BatchSpec>,
    /// Extra profiles; a name shared with a built-in replaces it.
    #[serde(default)]
    pub profiles: Vec<BankProfile>,
}

impl PipelineConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(s)?;
        config.thresholds.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub alias: f64,
    pub directory: f64,
    /// 0-100, inclusive floor for an assisted overwrite.
    pub ai_acceptance: u8,
    pub ai_prefilter: f64,
    pub ai_top_n: usize,
    pub classifier_min_confidence: f64,
    pub classifier_fuzzy: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            alias: 0.95,
            directory: 0.75,
            ai_acceptance: 90,
            ai_prefilter: 0.4,
            ai_top_n: 20,
            classifier_min_confidence: 0.5,
            classifier_fuzzy: 0.85,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratios = [
            ("alias", self.alias),
            ("directory", self.directory),
            ("ai_prefilter", self.ai_prefilter),
            ("classifier_min_confidence", self.classifier_min_confidence),
            ("classifier_fuzzy", self.classifier_fuzzy),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Threshold { name, value });
            }
        }
        if self.ai_acceptance > 100 {
            return Err(ConfigError::Threshold {
                name: "ai_acceptance",
                value: f64::from(self.ai_acceptance),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasRegistryConfig {
    pub path: PathBuf,
    #[serde(default = "default_alias_column")]
    pub alias_column: String,
    #[serde(default = "default_alias_name_column")]
    pub name_column: String,
    /// Registry columns searched (`alias`, `name`); empty means `alias`.
    #[serde(default)]
    pub match_columns: Vec<String>,
    #[serde(default = "default_true")]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRegistryConfig {
    pub path: PathBuf,
    #[serde(default = "default_directory_name_column")]
    pub name_column: String,
    #[serde(default = "default_contact_column")]
    pub contact_column: Option<String>,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_number_column")]
    pub number_column: String,
    #[serde(default = "default_blocked_column")]
    pub blocked_column: Option<String>,
    /// Registry columns searched (`name`, `contact`); empty means both.
    #[serde(default)]
    pub match_columns: Vec<String>,
    #[serde(default = "default_true")]
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            max_tokens: 1000,
            timeout_secs: 30,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSpec {
    pub input: PathBuf,
    #[serde(default)]
    pub output: Option<PathBuf>,
    pub profile: String,
}

impl BatchSpec {
    /// Explicit output, else `<stem>_updated.csv` in `output_dir` (or beside the input).
    pub fn output_path(&self, output_dir: Option<&Path>) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }
        let stem = self
            .input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("batch");
        let file_name = format!("{stem}_updated.csv");
        match output_dir {
            Some(dir) => dir.join(file_name),
            None => self
                .input
                .parent()
                .map(|p| p.join(&file_name))
                .unwrap_or_else(|| PathBuf::from(file_name)),
        }
    }

    /// `<stem>_report.json` beside the output file.
    pub fn report_path(&self, output_dir: Option<&Path>) -> PathBuf {
        let output = self.output_path(output_dir);
        let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("batch");
        output.with_file_name(format!("{stem}_report.json"))
    }
}

fn default_true() -> bool {
    true
}

fn default_alias_column() -> String {
    "SPECIAL NAME BANK IN".to_string()
}

fn default_alias_name_column() -> String {
    "CUSTOMER NAME".to_string()
}

fn default_directory_name_column() -> String {
    "displayName".to_string()
}

fn default_contact_column() -> Option<String> {
    Some("contact".to_string())
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_number_column() -> String {
    "number".to_string()
}

fn default_blocked_column() -> Option<String> {
    Some("blocked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.thresholds.ai_acceptance, 90);
        assert!(config.alias_registry.is_none());
        assert_eq!(config.assist.model, "gpt-4o-mini");
        assert_eq!(config.assist.max_tokens, 1000);
        assert!(config.batches.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config = PipelineConfig::from_toml(
            r#"
            output_dir = "out"

            [thresholds]
            alias = 0.97

            [alias_registry]
            path = "data/customer_mapping.csv"

            [directory_registry]
            path = "data/directory.csv"
            required = false
            blocked_column = "Blocked"
            match_columns = ["name"]

            [model]
            path = "models/name_model.json"

            [assist]
            enabled = false
            timeout_secs = 5

            [storage]
            path = "bankin.db"

            [[batches]]
            input = "in/pbb.csv"
            profile = "pbb"
            "#,
        )
        .unwrap();

        assert_eq!(config.thresholds.alias, 0.97);
        assert_eq!(config.thresholds.directory, 0.75);
        let alias = config.alias_registry.unwrap();
        assert_eq!(alias.alias_column, "SPECIAL NAME BANK IN");
        assert!(alias.required);
        let directory = config.directory_registry.unwrap();
        assert!(!directory.required);
        assert_eq!(directory.blocked_column.as_deref(), Some("Blocked"));
        assert_eq!(directory.contact_column.as_deref(), Some("contact"));
        assert_eq!(directory.match_columns, vec!["name".to_string()]);
        assert!(!config.assist.enabled);
        assert_eq!(config.assist.timeout_secs, 5);
        assert_eq!(config.assist.model, "gpt-4o-mini");
        assert_eq!(config.batches[0].profile, "pbb");
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let err = PipelineConfig::from_toml("[thresholds]\ndirectory = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Threshold { name: "directory", .. }));
        let err = PipelineConfig::from_toml("[thresholds]\nai_acceptance = 101\n").unwrap_err();
        assert!(matches!(err, ConfigError::Threshold { name: "ai_acceptance", .. }));
    }

    #[test]
    fn derived_output_path() {
        let batch = BatchSpec {
            input: PathBuf::from("in/MBB_2025.csv"),
            output: None,
            profile: "mbb".into(),
        };
        assert_eq!(batch.output_path(None), PathBuf::from("in/MBB_2025_updated.csv"));
        assert_eq!(
            batch.output_path(Some(Path::new("out"))),
            PathBuf::from("out/MBB_2025_updated.csv")
        );

        let explicit = BatchSpec { output: Some(PathBuf::from("x.csv")), ..batch.clone() };
        assert_eq!(explicit.output_path(Some(Path::new("out"))), PathBuf::from("x.csv"));
        assert_eq!(explicit.report_path(None), PathBuf::from("x_report.json"));
        assert_eq!(
            batch.report_path(Some(Path::new("out"))),
            PathBuf::from("out/MBB_2025_updated_report.json")
        );
    }
}
