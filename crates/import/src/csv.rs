use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::OnceLock;

use bankin_core::{columns, ColumnLayout, DescriptionFields, Money, RowStatus, TransactionRow};
use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchFileError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("No header row")]
    NoHeader,
}

/// Column positions resolved against one file's header row.
#[derive(Debug, Clone)]
struct ColumnIndex {
    description: usize,
    secondary: Option<usize>,
    reference: Option<usize>,
    date: usize,
    amount: Option<usize>,
    customer_name: usize,
    description_out: usize,
    status: usize,
    payment_id: usize,
    remarks: usize,
}

/// One bank batch held in memory. Every input column is kept in its original
/// order; pipeline-owned columns missing from the input are appended.
#[derive(Debug, Clone)]
pub struct BatchFile {
    headers: Vec<String>,
    records: Vec<Vec<String>>,
    index: ColumnIndex,
    /// Rows whose non-blank cells ran past the input header.
    overlong: Vec<usize>,
}

impl BatchFile {
    pub fn open(path: &Path, layout: &ColumnLayout) -> Result<Self, BatchFileError> {
        let file = std::fs::File::open(path)?;
        Self::read(file, layout)
    }

    pub fn read<R: Read>(data: R, layout: &ColumnLayout) -> Result<Self, BatchFileError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data);

        let mut headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(BatchFileError::NoHeader);
        }

        let input_width = headers.len();
        for column in columns::ALL {
            if !headers.iter().any(|h| h == column) {
                headers.push(column.to_string());
            }
        }

        let mut records = Vec::new();
        let mut overlong = Vec::new();
        for result in reader.records() {
            let record = result?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            let mut fields: Vec<String> = record.iter().map(str::to_string).collect();
            if fields.len() > input_width {
                let dropped = fields.split_off(input_width);
                if dropped.iter().any(|cell| !cell.trim().is_empty()) {
                    tracing::warn!(
                        "Row {}: {} cell(s) beyond the header dropped: {:?}",
                        records.len() + 1,
                        dropped.len(),
                        dropped
                    );
                    overlong.push(records.len());
                }
            }
            fields.resize(headers.len(), String::new());
            records.push(fields);
        }

        let index = resolve_columns(&headers, layout)?;
        Ok(Self {
            headers,
            records,
            index,
            overlong,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Data rows that lost non-blank cells past the last input column.
    pub fn overlong_rows(&self) -> &[usize] {
        &self.overlong
    }

    /// Typed view of every data row.
    pub fn rows(&self) -> Vec<TransactionRow> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| self.row_at(i, record))
            .collect()
    }

    fn row_at(&self, index: usize, record: &[String]) -> TransactionRow {
        let ix = &self.index;
        let cell = |col: usize| record.get(col).map(|s| s.trim()).unwrap_or_default();
        let optional = |col: Option<usize>| col.map(|c| cell(c).to_string());

        let descriptions = DescriptionFields {
            primary: cell(ix.description).to_string(),
            secondary: optional(ix.secondary),
            reference: optional(ix.reference),
        };

        let amount = ix.amount.and_then(|col| match Money::parse_cell(cell(col)) {
            Ok(amount) => amount,
            Err(e) => {
                tracing::debug!("Row {}: {e}", index + 1);
                None
            }
        });

        TransactionRow {
            index,
            descriptions,
            raw_date: blank_nan(cell(ix.date)),
            posting_date: parse_posting_date(cell(ix.date)),
            amount,
            customer_name: blank_nan(cell(ix.customer_name)),
            description: blank_nan(cell(ix.description_out)),
            status: RowStatus::from_cell(cell(ix.status)),
            payment_id: blank_nan(cell(ix.payment_id)),
            remarks: blank_nan(cell(ix.remarks)),
        }
    }

    /// Writes the pipeline-owned fields of `row` back into its record.
    /// STATUS belongs to the payment step and is left as read.
    pub fn apply(&mut self, row: &TransactionRow) {
        let ix = self.index.clone();
        let Some(record) = self.records.get_mut(row.index) else {
            return;
        };
        record[ix.customer_name] = row.customer_name.clone();
        record[ix.description_out] = row.description.clone();
        record[ix.payment_id] = row.payment_id.clone();
        record[ix.remarks] = row.remarks.clone();
    }

    pub fn write<W: Write>(&self, out: W) -> Result<(), BatchFileError> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(&self.headers)?;
        for record in &self.records {
            writer.write_record(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Resolves layout columns by name. Repeated headers are addressed the way
/// spreadsheet exports deduplicate them: `Name`, `Name.1`, `Name.2`.
fn resolve_columns(headers: &[String], layout: &ColumnLayout) -> Result<ColumnIndex, BatchFileError> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut lookup: HashMap<String, usize> = HashMap::new();
    for (i, header) in headers.iter().enumerate() {
        let count = seen.entry(header.as_str()).or_insert(0);
        let key = if *count == 0 {
            header.clone()
        } else {
            format!("{header}.{count}")
        };
        *count += 1;
        lookup.entry(key).or_insert(i);
    }

    let required = |name: &str| {
        lookup
            .get(name)
            .copied()
            .ok_or_else(|| BatchFileError::MissingColumn(name.to_string()))
    };
    let optional = |name: &Option<String>| -> Option<usize> {
        let name = name.as_deref()?;
        let found = lookup.get(name).copied();
        if found.is_none() {
            tracing::warn!("Optional column not found: {name}");
        }
        found
    };

    Ok(ColumnIndex {
        description: required(&layout.description)?,
        secondary: optional(&layout.secondary_description),
        reference: optional(&layout.reference),
        date: required(&layout.date)?,
        amount: optional(&layout.amount),
        customer_name: required(columns::CUSTOMER_NAME)?,
        description_out: required(columns::DESCRIPTION)?,
        status: required(columns::STATUS)?,
        payment_id: required(columns::PAYMENT_ID)?,
        remarks: required(columns::REMARKS)?,
    })
}

fn blank_nan(cell: &str) -> String {
    if cell.eq_ignore_ascii_case("nan") {
        String::new()
    } else {
        cell.to_string()
    }
}

// ── Posting dates ────────────────────────────────────────────────────────────

fn re_year_first() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})").expect("invalid regex"))
}

fn re_day_first() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"^(\d{1,2})[-/.](\d{1,2})[-/.](\d{2,4})\b").expect("invalid regex"))
}

/// Parses a posting-date cell. A part above 12 must be the day; otherwise
/// `YYYY-MM-DD` and `DD/MM/YYYY` are assumed. Time components and the
/// `MY (UTC+08:00)` zone suffix are ignored. Blank or unparseable cells give `None`.
pub fn parse_posting_date(cell: &str) -> Option<NaiveDate> {
    let mut s = cell.trim();
    if s.contains("MY (UTC") {
        s = s.split("MY").next().unwrap_or_default().trim();
    }
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return None;
    }

    let number = |caps: &regex::Captures<'_>, i: usize| -> Option<u32> { caps.get(i)?.as_str().parse().ok() };

    if let Some(caps) = re_year_first().captures(s) {
        let year: i32 = caps.get(1)?.as_str().parse().ok()?;
        let (a, b) = (number(&caps, 2)?, number(&caps, 3)?);
        let (month, day) = if a > 12 && b <= 12 { (b, a) } else { (a, b) };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = re_day_first().captures(s) {
        let (a, b) = (number(&caps, 1)?, number(&caps, 2)?);
        let year_text = caps.get(3)?.as_str();
        let mut year: i32 = year_text.parse().ok()?;
        if year_text.len() == 2 {
            year += 2000;
        }
        let (day, month) = if b > 12 && a <= 12 { (b, a) } else { (a, b) };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    for fmt in ["%d %b %Y", "%d-%b-%Y", "%d %B %Y", "%b %d, %Y", "%B %d, %Y", "%d-%b-%y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    // Date followed by a time of day.
    let head = s.split_whitespace().take(3).collect::<Vec<_>>().join(" ");
    ["%d %b %Y", "%d %B %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&head, fmt).ok())
}
