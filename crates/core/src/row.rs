use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Sentinel some banks put in an unused description column.
pub const PLACEHOLDER: &str = "-";

/// Output columns the pipeline owns. Created on read when absent.
pub mod columns {
    pub const CUSTOMER_NAME: &str = "CUSTOMER_NAME";
    pub const DESCRIPTION: &str = "DESCRIPTION";
    pub const STATUS: &str = "STATUS";
    pub const PAYMENT_ID: &str = "payment_ID";
    pub const REMARKS: &str = "REMARKS";

    pub const ALL: [&str; 5] = [CUSTOMER_NAME, DESCRIPTION, STATUS, PAYMENT_ID, REMARKS];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RowStatus {
    #[default]
    Pending,
    Transferred,
}

impl RowStatus {
    /// Anything other than `Transferred` (any case, surrounding blanks) is pending.
    pub fn from_cell(cell: &str) -> Self {
        if cell.trim().eq_ignore_ascii_case("transferred") {
            RowStatus::Transferred
        } else {
            RowStatus::Pending
        }
    }
}

/// The raw free-text columns of one statement line, as configured by the
/// bank profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptionFields {
    pub primary: String,
    pub secondary: Option<String>,
    pub reference: Option<String>,
}

impl DescriptionFields {
    /// Every populated field, skipping blanks and the placeholder sentinel.
    pub fn populated(&self) -> Vec<&str> {
        std::iter::once(self.primary.as_str())
            .chain(self.secondary.as_deref())
            .chain(self.reference.as_deref())
            .map(str::trim)
            .filter(|s| is_populated(s))
            .collect()
    }
}

pub fn is_populated(cell: &str) -> bool {
    let cell = cell.trim();
    !cell.is_empty() && cell != PLACEHOLDER && !cell.eq_ignore_ascii_case("nan")
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRow {
    /// Zero-based position among the data rows of the batch file.
    pub index: usize,
    pub descriptions: DescriptionFields,
    /// Date cell as read, trimmed.
    pub raw_date: String,
    /// `None` when the cell is blank or unparseable.
    pub posting_date: Option<NaiveDate>,
    pub amount: Option<Money>,
    pub customer_name: String,
    pub description: String,
    pub status: RowStatus,
    pub payment_id: String,
    pub remarks: String,
}

impl TransactionRow {
    pub fn is_transferred(&self) -> bool {
        self.status == RowStatus::Transferred
    }
}
