pub mod config;
pub mod money;
pub mod profile;
pub mod registry;
pub mod report;
pub mod row;

pub use config::{
    AliasRegistryConfig, AssistConfig, BatchSpec, ConfigError, DirectoryRegistryConfig,
    ModelConfig, PipelineConfig, StorageConfig, Thresholds,
};
pub use money::{AmountError, Money};
pub use profile::{Anchor, BankProfile, ColumnLayout, PrefixRule, SplitStyle};
pub use registry::{parse_blocked, AliasEntry, CustomerKey, DirectoryEntry};
pub use report::{BatchStats, ResolvedBy, RowDisposition, REMARK_MISSING_NAME, REMARK_NOT_FOUND};
pub use row::{columns, is_populated, DescriptionFields, RowStatus, TransactionRow, PLACEHOLDER};
