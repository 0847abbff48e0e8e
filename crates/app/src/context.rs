use bankin_core::{PipelineConfig, Thresholds};
use bankin_import::{
    ModelSuggester, NameSuggester, ProfileSet, Registry, RegistryError, Tier, TrainedNameModel,
};

/// Read-only state shared by every batch of a run: registries, the optional
/// name model, bank profiles and thresholds. Built once, never mutated while
/// batches run.
pub struct ResolutionContext {
    pub thresholds: Thresholds,
    pub profiles: ProfileSet,
    aliases: Option<Registry>,
    alias_columns: Vec<String>,
    directory: Option<Registry>,
    directory_columns: Vec<String>,
    suggester: Option<Box<dyn NameSuggester>>,
}

impl ResolutionContext {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            profiles: ProfileSet::with_builtins(),
            aliases: None,
            alias_columns: Vec::new(),
            directory: None,
            directory_columns: Vec::new(),
            suggester: None,
        }
    }

    /// Loads everything `config` names. A required registry that cannot be
    /// read is an error; an optional one, or the name model, is skipped with
    /// a warning.
    pub fn load(config: &PipelineConfig) -> Result<Self, RegistryError> {
        let mut context = Self::new(config.thresholds.clone());
        context.profiles.extend(config.profiles.iter().cloned());

        if let Some(alias) = &config.alias_registry {
            let loaded = Registry::load_aliases(&alias.path, alias).and_then(|r| {
                tier(&r, &alias.match_columns, 0.0)?;
                Ok(r)
            });
            match loaded {
                Ok(registry) => {
                    context.aliases = Some(registry);
                    context.alias_columns = alias.match_columns.clone();
                }
                Err(e) if alias.required => return Err(e),
                Err(e) => tracing::warn!("Skipping optional alias table: {e}"),
            }
        }

        if let Some(directory) = &config.directory_registry {
            let loaded = Registry::load_directory(&directory.path, directory).and_then(|r| {
                tier(&r, &directory.match_columns, 0.0)?;
                Ok(r)
            });
            match loaded {
                Ok(registry) => {
                    context.directory = Some(registry);
                    context.directory_columns = directory.match_columns.clone();
                }
                Err(e) if directory.required => return Err(e),
                Err(e) => tracing::warn!("Skipping optional customer directory: {e}"),
            }
        }

        if let Some(path) = &config.model.path {
            match TrainedNameModel::load(path) {
                Ok(model) => {
                    tracing::info!("Loaded name model: {}", path.display());
                    context.suggester = Some(Box::new(ModelSuggester::new(
                        model,
                        config.thresholds.classifier_min_confidence,
                        config.thresholds.classifier_fuzzy,
                    )));
                }
                Err(e) => tracing::warn!("Name model unavailable, using the cleaner only: {e}"),
            }
        }

        Ok(context)
    }

    pub fn with_aliases(mut self, registry: Registry) -> Self {
        self.aliases = Some(registry);
        self
    }

    pub fn with_directory(mut self, registry: Registry) -> Self {
        self.directory = Some(registry);
        self
    }

    pub fn with_suggester(mut self, suggester: Box<dyn NameSuggester>) -> Self {
        self.suggester = Some(suggester);
        self
    }

    pub fn suggester(&self) -> Option<&dyn NameSuggester> {
        self.suggester.as_deref()
    }

    /// Alias table first, then the directory.
    pub fn tiers(&self) -> Result<Vec<Tier<'_>>, RegistryError> {
        let mut tiers = Vec::new();
        if let Some(aliases) = &self.aliases {
            tiers.push(tier(aliases, &self.alias_columns, self.thresholds.alias)?);
        }
        if let Some(directory) = self.directory_tier()? {
            tiers.push(directory);
        }
        Ok(tiers)
    }

    pub fn directory_tier(&self) -> Result<Option<Tier<'_>>, RegistryError> {
        self.directory
            .as_ref()
            .map(|d| tier(d, &self.directory_columns, self.thresholds.directory))
            .transpose()
    }
}

fn tier<'a>(registry: &'a Registry, columns: &[String], threshold: f64) -> Result<Tier<'a>, RegistryError> {
    if columns.is_empty() {
        return Ok(Tier::with_default_columns(registry, threshold));
    }
    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
    Tier::new(registry, &columns, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankin_core::{AliasRegistryConfig, DirectoryRegistryConfig, ModelConfig};
    use std::path::Path;

    fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn config(dir: &Path) -> PipelineConfig {
        let aliases = write(
            dir,
            "aliases.csv",
            "SPECIAL NAME BANK IN,CUSTOMER NAME\nSK CURTAIN & BLIND,SK CURTAIN AND BLIND SDN BHD\n",
        );
        let customers = write(
            dir,
            "customers.csv",
            "id,number,displayName,contact,blocked\nid-1,C-1,ACME TRADING SDN BHD,,\n",
        );
        PipelineConfig::from_toml(&format!(
            r#"
            [alias_registry]
            path = "{}"

            [directory_registry]
            path = "{}"
            "#,
            aliases.display(),
            customers.display()
        ))
        .unwrap()
    }

    #[test]
    fn loads_registries_in_precedence_order() {
        let dir = tempfile::tempdir().unwrap();
        let context = ResolutionContext::load(&config(dir.path())).unwrap();

        let tiers = context.tiers().unwrap();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].threshold, 0.95);
        assert_eq!(tiers[1].threshold, 0.75);
        assert!(context.directory_tier().unwrap().is_some());
        assert!(context.suggester().is_none());
    }

    #[test]
    fn missing_required_registry_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.alias_registry = Some(AliasRegistryConfig {
            path: dir.path().join("absent.csv"),
            alias_column: "SPECIAL NAME BANK IN".into(),
            name_column: "CUSTOMER NAME".into(),
            match_columns: Vec::new(),
            required: true,
        });
        assert!(matches!(
            ResolutionContext::load(&config),
            Err(RegistryError::Io { .. })
        ));
    }

    #[test]
    fn optional_registry_with_bad_columns_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        let directory = config.directory_registry.take().unwrap();
        config.directory_registry = Some(DirectoryRegistryConfig {
            name_column: "Customer".into(),
            required: false,
            ..directory
        });

        let context = ResolutionContext::load(&config).unwrap();
        assert_eq!(context.tiers().unwrap().len(), 1);
        assert!(context.directory_tier().unwrap().is_none());
    }

    #[test]
    fn unknown_match_column_counts_as_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        if let Some(alias) = config.alias_registry.as_mut() {
            alias.match_columns = vec!["nickname".into()];
        }
        assert!(matches!(
            ResolutionContext::load(&config),
            Err(RegistryError::UnknownMatchColumn { .. })
        ));
    }

    #[test]
    fn corrupt_model_is_a_soft_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.model = ModelConfig {
            path: Some(write(dir.path(), "model.json", "{broken")),
        };

        let context = ResolutionContext::load(&config).unwrap();
        assert!(context.suggester().is_none());
    }

    #[test]
    fn trained_model_becomes_suggester() {
        let dir = tempfile::tempdir().unwrap();
        let model = TrainedNameModel::train(&[("ACME TRDG SB".to_string(), "ACME TRADING SDN BHD".to_string())]).unwrap();
        let path = dir.path().join("model.json");
        model.save(&path).unwrap();

        let mut config = config(dir.path());
        config.model.path = Some(path);
        let context = ResolutionContext::load(&config).unwrap();
        let suggestion = context.suggester().and_then(|s| s.suggest("acme trdg sb")).unwrap();
        assert_eq!(suggestion.name, "ACME TRADING SDN BHD");
    }

    #[test]
    fn configured_profiles_extend_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.profiles.push(bankin_core::BankProfile {
            name: "cimb".into(),
            columns: bankin_core::ColumnLayout {
                description: "Description".into(),
                secondary_description: None,
                reference: None,
                date: "Date".into(),
                amount: None,
            },
            rules: vec![bankin_core::PrefixRule::new("IBG CR ")],
            markers: vec!["INV".into()],
            patterns: Vec::new(),
        });
        let context = ResolutionContext::load(&config).unwrap();
        assert!(context.profiles.get("cimb").is_ok());
        assert!(context.profiles.get("pbb").is_ok());
    }
}
