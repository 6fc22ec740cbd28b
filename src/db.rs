use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::{Serialize, Serializer};
use std::path::Path;

use crate::error::{PipelineError, Stage};

/// Relational schema, versioned alongside the code
pub const SCHEMA_SQL: &str = include_str!("../sql/create_tables.sql");

/// Storage and artifact format for `invoice_timestamp`
///
/// `%.f` writes sub-second digits only when present, so whole-second values
/// stay `YYYY-MM-DD HH:MM:SS`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// One cleaned invoice line
///
/// Only the cleaner builds these, so every value already satisfies the
/// cleaning rules: positive quantity and price, a whole-number customer id,
/// and `total_price == quantity * unit_price`.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Transaction {
    #[serde(rename = "InvoiceNo")]
    pub invoice_id: String,

    #[serde(rename = "StockCode")]
    pub stock_code: String,

    #[serde(rename = "Description")]
    pub description: String,

    #[serde(rename = "Quantity")]
    pub quantity: i64,

    #[serde(rename = "InvoiceDate", serialize_with = "serialize_timestamp")]
    pub invoice_timestamp: NaiveDateTime,

    #[serde(rename = "UnitPrice")]
    pub unit_price: f64,

    #[serde(rename = "CustomerID")]
    pub customer_id: i64,

    #[serde(rename = "Country")]
    pub country: String,

    #[serde(rename = "TotalPrice")]
    pub total_price: f64,
}

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
}

impl Transaction {
    /// Build a line item, deriving `total_price` from the typed values
    pub fn new(
        invoice_id: String,
        stock_code: String,
        description: String,
        quantity: i64,
        invoice_timestamp: NaiveDateTime,
        unit_price: f64,
        customer_id: i64,
        country: String,
    ) -> Self {
        Transaction {
            invoice_id,
            stock_code,
            description,
            quantity,
            invoice_timestamp,
            unit_price,
            customer_id,
            country,
            total_price: quantity as f64 * unit_price,
        }
    }

    /// Calendar month key (`YYYY-MM`), same shape the store's strftime produces
    pub fn month(&self) -> String {
        self.invoice_timestamp.format("%Y-%m").to_string()
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Exclusive owner of the SQLite connection for one run
///
/// The connection is released when the store is dropped, so every early
/// return through `?` closes it too.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(PipelineError::store(Stage::Load))
            .with_context(|| format!("Failed to open store: {}", path.display()))?;

        // WAL for crash recovery on file-backed stores
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(PipelineError::store(Stage::Load))?;

        Ok(Store { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(PipelineError::store(Stage::Load))?;
        Ok(Store { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Rebuild the `transactions` table and insert every row
    ///
    /// Schema and rows commit as one SQLite transaction: a failure leaves the
    /// previous contents untouched and the caller aborts the run.
    pub fn load(&mut self, transactions: &[Transaction]) -> Result<usize> {
        let inserted = self
            .load_inner(transactions)
            .map_err(PipelineError::store(Stage::Load))?;

        log::info!("💾 Loaded {} transactions into store", inserted);
        Ok(inserted)
    }

    fn load_inner(&mut self, transactions: &[Transaction]) -> rusqlite::Result<usize> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(SCHEMA_SQL)?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transactions (
                    invoice_id, stock_code, description, quantity, invoice_timestamp,
                    unit_price, customer_id, country, total_price
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;

            for t in transactions {
                stmt.execute(params![
                    t.invoice_id,
                    t.stock_code,
                    t.description,
                    t.quantity,
                    t.invoice_timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    t.unit_price,
                    t.customer_id,
                    t.country,
                    t.total_price,
                ])?;
                inserted += 1;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    pub fn verify_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))
            .map_err(PipelineError::store(Stage::Load))?;

        Ok(count)
    }

    /// Read the table back in load order
    pub fn get_all_transactions(&self) -> Result<Vec<Transaction>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT invoice_id, stock_code, description, quantity, invoice_timestamp,
                        unit_price, customer_id, country, total_price
                 FROM transactions
                 ORDER BY rowid",
            )
            .map_err(PipelineError::store(Stage::Load))?;

        let transactions = stmt
            .query_map([], |row| {
                let ts_str: String = row.get(4)?;
                let invoice_timestamp = NaiveDateTime::parse_from_str(&ts_str, TIMESTAMP_FORMAT)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

                Ok(Transaction {
                    invoice_id: row.get(0)?,
                    stock_code: row.get(1)?,
                    description: row.get(2)?,
                    quantity: row.get(3)?,
                    invoice_timestamp,
                    unit_price: row.get(5)?,
                    customer_id: row.get(6)?,
                    country: row.get(7)?,
                    total_price: row.get(8)?,
                })
            })
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(PipelineError::store(Stage::Load))?;

        Ok(transactions)
    }

    /// Close explicitly so close errors surface instead of being swallowed by Drop
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| PipelineError::Store { stage: Stage::Query, source: e })?;
        Ok(())
    }
}
