use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use bankin_core::{
    parse_blocked, AliasEntry, AliasRegistryConfig, CustomerKey, DirectoryEntry,
    DirectoryRegistryConfig,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Registry {registry} is missing required column: {column}")]
    MissingColumn { registry: RegistryKind, column: String },
    #[error("Registry {registry} has no match column {column}")]
    UnknownMatchColumn { registry: RegistryKind, column: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryKind {
    AliasTable,
    Directory,
}

impl std::fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryKind::AliasTable => write!(f, "alias_table"),
            RegistryKind::Directory => write!(f, "directory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryRow {
    /// One value per registry column, in `Registry::columns` order.
    pub values: Vec<String>,
    pub canonical_name: String,
    pub key: Option<CustomerKey>,
    pub blocked: bool,
}

/// A read-only reference table loaded once per batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    pub kind: RegistryKind,
    pub columns: Vec<String>,
    pub rows: Vec<RegistryRow>,
}

pub const ALIAS_COLUMN: &str = "alias";
pub const NAME_COLUMN: &str = "name";
pub const CONTACT_COLUMN: &str = "contact";

impl Registry {
    pub fn from_aliases(entries: impl IntoIterator<Item = AliasEntry>) -> Self {
        let rows = entries
            .into_iter()
            .map(|e| RegistryRow {
                values: vec![e.alias, e.customer_name.clone()],
                canonical_name: e.customer_name,
                key: None,
                blocked: false,
            })
            .collect();
        Self {
            kind: RegistryKind::AliasTable,
            columns: vec![ALIAS_COLUMN.to_string(), NAME_COLUMN.to_string()],
            rows,
        }
    }

    pub fn from_directory(entries: impl IntoIterator<Item = DirectoryEntry>) -> Self {
        let rows = entries
            .into_iter()
            .map(|e| RegistryRow {
                values: vec![e.name.clone(), e.contact.unwrap_or_default()],
                canonical_name: e.name,
                key: Some(e.key),
                blocked: e.blocked,
            })
            .collect();
        Self {
            kind: RegistryKind::Directory,
            columns: vec![NAME_COLUMN.to_string(), CONTACT_COLUMN.to_string()],
            rows,
        }
    }

    /// Match columns used when configuration names none.
    pub fn default_match_columns(&self) -> &'static [&'static str] {
        match self.kind {
            RegistryKind::AliasTable => &[ALIAS_COLUMN],
            RegistryKind::Directory => &[NAME_COLUMN, CONTACT_COLUMN],
        }
    }

    pub fn column_index(&self, column: &str) -> Result<usize, RegistryError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| RegistryError::UnknownMatchColumn {
                registry: self.kind,
                column: column.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn load_aliases(path: &Path, config: &AliasRegistryConfig) -> Result<Self, RegistryError> {
        Self::read_aliases(open(path)?, config)
    }

    pub fn read_aliases<R: Read>(data: R, config: &AliasRegistryConfig) -> Result<Self, RegistryError> {
        let kind = RegistryKind::AliasTable;
        let (headers, records) = read_table(data)?;
        let alias = require(&headers, &config.alias_column, kind)?;
        let name = require(&headers, &config.name_column, kind)?;

        let entries = records.iter().filter_map(|record| {
            let alias = field(record, alias);
            let customer_name = field(record, name);
            (!alias.is_empty() && !customer_name.is_empty()).then(|| AliasEntry {
                alias: alias.to_string(),
                customer_name: customer_name.to_string(),
            })
        });
        let registry = Self::from_aliases(entries.collect::<Vec<_>>());
        tracing::info!("Loaded alias table: {} entries", registry.len());
        Ok(registry)
    }

    pub fn load_directory(path: &Path, config: &DirectoryRegistryConfig) -> Result<Self, RegistryError> {
        Self::read_directory(open(path)?, config)
    }

    pub fn read_directory<R: Read>(
        data: R,
        config: &DirectoryRegistryConfig,
    ) -> Result<Self, RegistryError> {
        let kind = RegistryKind::Directory;
        let (headers, records) = read_table(data)?;
        let name = require(&headers, &config.name_column, kind)?;
        let id = require(&headers, &config.id_column, kind)?;
        let number = require(&headers, &config.number_column, kind)?;
        let contact = optional(&headers, config.contact_column.as_deref());
        let blocked = optional(&headers, config.blocked_column.as_deref());

        let entries: Vec<DirectoryEntry> = records
            .iter()
            .filter(|record| !field(record, name).is_empty())
            .map(|record| DirectoryEntry {
                name: field(record, name).to_string(),
                contact: contact
                    .map(|c| field(record, c))
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                key: CustomerKey {
                    id: field(record, id).to_string(),
                    number: field(record, number).to_string(),
                },
                blocked: blocked.is_some_and(|b| parse_blocked(field(record, b))),
            })
            .collect();

        let registry = Self::from_directory(entries);
        tracing::info!("Loaded customer directory: {} entries", registry.len());
        Ok(registry)
    }
}

fn open(path: &Path) -> Result<std::fs::File, RegistryError> {
    std::fs::File::open(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_table<R: Read>(data: R) -> Result<(HashMap<String, usize>, Vec<csv::StringRecord>), RegistryError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);
    let headers = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim_start_matches('\u{feff}').trim().to_string(), i))
        .collect();
    let records = reader.records().collect::<Result<Vec<_>, _>>()?;
    Ok((headers, records))
}

fn require(headers: &HashMap<String, usize>, column: &str, registry: RegistryKind) -> Result<usize, RegistryError> {
    headers
        .get(column)
        .copied()
        .ok_or_else(|| RegistryError::MissingColumn {
            registry,
            column: column.to_string(),
        })
}

fn optional(headers: &HashMap<String, usize>, column: Option<&str>) -> Option<usize> {
    let column = column?;
    let found = headers.get(column).copied();
    if found.is_none() {
        tracing::warn!("Directory column not found, ignoring: {column}");
    }
    found
}

fn field(record: &csv::StringRecord, index: usize) -> &str {
    record.get(index).map(str::trim).unwrap_or_default()
}
