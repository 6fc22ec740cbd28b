// 🧹 Cleaner - raw rows → canonical Transactions
// Schema check, row filters, type normalization, derived total, stable sort

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::db::Transaction;
use crate::error::PipelineError;

/// Header names the raw dataset must carry, in Transaction field order
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "InvoiceNo",
    "StockCode",
    "Description",
    "Quantity",
    "InvoiceDate",
    "UnitPrice",
    "CustomerID",
    "Country",
];

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

// ============================================================================
// RAW TABLE
// ============================================================================

/// Raw tabular input: headers plus untyped rows
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl RawTable {
    /// Read a raw dataset, picking the reader from the file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        if let Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") = ext.as_deref() {
            return Self::from_workbook(path)
                .with_context(|| format!("Failed to read raw workbook: {}", path.display()));
        }

        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open raw dataset: {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Failed to read raw dataset: {}", path.display()))
    }

    /// Read delimited text; fields that are not UTF-8 are decoded as Latin-1
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr
            .byte_headers()
            .context("Failed to read header row")?
            .iter()
            .map(|h| decode_field(h).trim().to_string())
            .collect();

        let rows = rdr
            .byte_records()
            .enumerate()
            .map(|(i, r)| {
                let record = r.with_context(|| format!("Failed to parse CSV line {}", i + 2))?;
                Ok(record.iter().map(decode_field).collect::<StringRecord>())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RawTable { headers, rows })
    }

    /// First worksheet of a spreadsheet; row 1 holds the headers
    #[cfg(feature = "excel")]
    pub fn from_workbook(path: &Path) -> Result<Self> {
        use calamine::{open_workbook_auto, Reader};

        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .context("Workbook has no worksheets")??;

        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|r| r.iter().map(|c| cell_to_field(c).trim().to_string()).collect())
            .unwrap_or_default();
        let rows = rows
            .map(|r| r.iter().map(cell_to_field).collect::<StringRecord>())
            .collect();

        Ok(RawTable { headers, rows })
    }

    #[cfg(not(feature = "excel"))]
    pub fn from_workbook(path: &Path) -> Result<Self> {
        anyhow::bail!(
            "Spreadsheet input needs the `excel` feature: {}",
            path.display()
        )
    }

    /// Render cleaned transactions back into raw shape (cleaned artifact layout)
    pub fn from_transactions(transactions: &[Transaction]) -> Result<Self> {
        let mut buf = Vec::new();
        write_transactions(&mut buf, transactions)?;
        Self::from_reader(buf.as_slice())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        // Latin-1: each byte is the code point of the same value
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(feature = "excel")]
fn cell_to_field(cell: &calamine::Data) -> String {
    use calamine::{Data, DataType};

    match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format(crate::db::TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Column positions of the required fields inside one RawTable
struct ColumnIndex {
    invoice_id: usize,
    stock_code: usize,
    description: usize,
    quantity: usize,
    invoice_timestamp: usize,
    unit_price: usize,
    customer_id: usize,
    country: usize,
}

impl ColumnIndex {
    fn resolve(headers: &[String]) -> Result<Self, PipelineError> {
        let position = |name: &str| headers.iter().position(|h| h == name);

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|&c| position(c).is_none())
            .map(String::from)
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Schema { missing });
        }

        let at = |name: &str| position(name).unwrap_or_default();
        Ok(ColumnIndex {
            invoice_id: at("InvoiceNo"),
            stock_code: at("StockCode"),
            description: at("Description"),
            quantity: at("Quantity"),
            invoice_timestamp: at("InvoiceDate"),
            unit_price: at("UnitPrice"),
            customer_id: at("CustomerID"),
            country: at("Country"),
        })
    }
}

// ============================================================================
// FIELD PARSERS (row predicates)
// ============================================================================

/// Customer id as a whole number; `17850` and `17850.0` both qualify
pub fn parse_customer_id(raw: &str) -> Option<i64> {
    parse_whole_number(raw)
}

/// Quantity as an integer; float text is accepted when it has no fraction
pub fn parse_quantity(raw: &str) -> Option<i64> {
    parse_whole_number(raw)
}

pub fn parse_unit_price(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Parse a timestamp in any supported layout; date-only values map to midnight
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

fn parse_whole_number(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }

    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

// ============================================================================
// CLEANING
// ============================================================================

/// Why a raw row was excluded (first failing predicate wins for counting)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DropReason {
    MissingInvoice,
    MissingCustomer,
    InvalidCustomer,
    InvalidQuantity,
    NonPositiveQuantity,
    InvalidPrice,
    NonPositivePrice,
    InvalidTimestamp,
}

impl DropReason {
    pub fn name(&self) -> &str {
        match self {
            DropReason::MissingInvoice => "missing_invoice",
            DropReason::MissingCustomer => "missing_customer",
            DropReason::InvalidCustomer => "invalid_customer",
            DropReason::InvalidQuantity => "invalid_quantity",
            DropReason::NonPositiveQuantity => "non_positive_quantity",
            DropReason::InvalidPrice => "invalid_price",
            DropReason::NonPositivePrice => "non_positive_price",
            DropReason::InvalidTimestamp => "invalid_timestamp",
        }
    }
}

/// Row accounting for one cleaning pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub dropped: BTreeMap<DropReason, usize>,
}

impl CleaningReport {
    pub fn rows_dropped(&self) -> usize {
        self.dropped.values().sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "read {}, kept {}, dropped {}",
            self.rows_read,
            self.rows_kept,
            self.rows_dropped()
        )
    }
}

/// Output of the cleaner
#[derive(Debug, Clone, Default)]
pub struct Cleaned {
    pub transactions: Vec<Transaction>,
    pub report: CleaningReport,
}

/// Apply every row predicate to one record
fn clean_row(record: &StringRecord, cols: &ColumnIndex) -> Result<Transaction, DropReason> {
    let field = |idx: usize| record.get(idx).unwrap_or("");

    let invoice_id = field(cols.invoice_id);
    if invoice_id.trim().is_empty() {
        return Err(DropReason::MissingInvoice);
    }

    let customer_raw = field(cols.customer_id);
    if customer_raw.trim().is_empty() {
        return Err(DropReason::MissingCustomer);
    }
    let customer_id = parse_customer_id(customer_raw).ok_or(DropReason::InvalidCustomer)?;

    let quantity = parse_quantity(field(cols.quantity)).ok_or(DropReason::InvalidQuantity)?;
    if quantity <= 0 {
        return Err(DropReason::NonPositiveQuantity);
    }

    let unit_price = parse_unit_price(field(cols.unit_price)).ok_or(DropReason::InvalidPrice)?;
    if unit_price <= 0.0 {
        return Err(DropReason::NonPositivePrice);
    }

    let invoice_timestamp =
        parse_timestamp(field(cols.invoice_timestamp)).ok_or(DropReason::InvalidTimestamp)?;

    Ok(Transaction::new(
        invoice_id.to_string(),
        field(cols.stock_code).to_string(),
        field(cols.description).trim().to_string(),
        quantity,
        invoice_timestamp,
        unit_price,
        customer_id,
        field(cols.country).to_string(),
    ))
}

/// Validate the schema, filter and type every row, sort by timestamp
///
/// Missing required columns fail with `PipelineError::Schema` before any row
/// is looked at. Rows failing a predicate are dropped silently and counted
/// in the report.
pub fn clean(raw: &RawTable) -> Result<Cleaned> {
    let cols = ColumnIndex::resolve(&raw.headers)?;

    let mut report = CleaningReport {
        rows_read: raw.len(),
        ..Default::default()
    };
    let mut transactions = Vec::with_capacity(raw.len());

    for record in &raw.rows {
        match clean_row(record, &cols) {
            Ok(tx) => transactions.push(tx),
            Err(reason) => *report.dropped.entry(reason).or_insert(0) += 1,
        }
    }

    // Stable: equal timestamps keep input order
    transactions.sort_by(|a, b| a.invoice_timestamp.cmp(&b.invoice_timestamp));
    report.rows_kept = transactions.len();

    for (reason, count) in &report.dropped {
        log::debug!("Dropped {} rows: {}", count, reason.name());
    }

    Ok(Cleaned {
        transactions,
        report,
    })
}

/// Clean and persist the result to the cleaned artifact
pub fn clean_to_file(raw: &RawTable, clean_path: &Path) -> Result<Cleaned> {
    let cleaned = clean(raw)?;
    write_cleaned(clean_path, &cleaned.transactions)?;

    log::info!(
        "🧹 Cleaned data saved: {} ({})",
        clean_path.display(),
        cleaned.report.summary()
    );
    Ok(cleaned)
}

// ============================================================================
// CLEANED ARTIFACT
// ============================================================================

pub fn write_cleaned(path: &Path, transactions: &[Transaction]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create cleaned artifact: {}", path.display()))?;
    write_transactions(file, transactions)
        .with_context(|| format!("Failed to write cleaned artifact: {}", path.display()))
}

fn write_transactions<W: std::io::Write>(writer: W, transactions: &[Transaction]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);

    // Header written explicitly so an empty set still carries all nine columns
    let mut header: Vec<&str> = REQUIRED_COLUMNS.to_vec();
    header.push("TotalPrice");
    wtr.write_record(&header)?;

    for tx in transactions {
        wtr.serialize(tx)?;
    }
    wtr.flush()?;
    Ok(())
}
