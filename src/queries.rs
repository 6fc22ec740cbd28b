// 📊 Query Engine - six fixed aggregate analyses over `transactions`
// Each analysis is materialized into typed rows and exported as CSV

use anyhow::{Context, Result};
use rusqlite::{Connection, Row};
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};

use crate::db::Store;
use crate::error::{PipelineError, Stage};

// ============================================================================
// ANALYSES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Analysis {
    MonthlyRevenueTrend,
    TopProductsByRevenue,
    RevenueByCountry,
    RepeatVsNewCustomers,
    AverageOrderValue,
    TopCustomersLifetimeValue,
}

impl Analysis {
    pub const ALL: [Analysis; 6] = [
        Analysis::MonthlyRevenueTrend,
        Analysis::TopProductsByRevenue,
        Analysis::RevenueByCountry,
        Analysis::RepeatVsNewCustomers,
        Analysis::AverageOrderValue,
        Analysis::TopCustomersLifetimeValue,
    ];

    /// Result table name, also the CSV file stem
    pub fn name(&self) -> &'static str {
        match self {
            Analysis::MonthlyRevenueTrend => "monthly_revenue_trend",
            Analysis::TopProductsByRevenue => "top_10_products_by_revenue",
            Analysis::RevenueByCountry => "revenue_by_country",
            Analysis::RepeatVsNewCustomers => "repeat_vs_new_customers",
            Analysis::AverageOrderValue => "average_order_value",
            Analysis::TopCustomersLifetimeValue => "top_customers_lifetime_value",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Analysis::MonthlyRevenueTrend => &["month", "revenue"],
            Analysis::TopProductsByRevenue => &["Description", "revenue"],
            Analysis::RevenueByCountry => &["Country", "revenue"],
            Analysis::RepeatVsNewCustomers => &["customer_type", "customer_count"],
            Analysis::AverageOrderValue => &["average_order_value"],
            Analysis::TopCustomersLifetimeValue => &["CustomerID", "lifetime_value"],
        }
    }

    /// Descending orders break ties on the grouping key so reruns are byte-identical
    pub fn sql(&self) -> &'static str {
        match self {
            Analysis::MonthlyRevenueTrend => {
                "SELECT
                    strftime('%Y-%m', invoice_timestamp) AS month,
                    ROUND(SUM(total_price), 2) AS revenue
                 FROM transactions
                 GROUP BY month
                 ORDER BY month"
            }
            Analysis::TopProductsByRevenue => {
                "SELECT
                    description AS Description,
                    ROUND(SUM(total_price), 2) AS revenue
                 FROM transactions
                 GROUP BY description
                 ORDER BY revenue DESC, description ASC
                 LIMIT 10"
            }
            Analysis::RevenueByCountry => {
                "SELECT
                    country AS Country,
                    ROUND(SUM(total_price), 2) AS revenue
                 FROM transactions
                 GROUP BY country
                 ORDER BY revenue DESC, country ASC"
            }
            Analysis::RepeatVsNewCustomers => {
                "WITH customer_orders AS (
                    SELECT customer_id, COUNT(DISTINCT invoice_id) AS order_count
                    FROM transactions
                    GROUP BY customer_id
                 )
                 SELECT
                    CASE WHEN order_count > 1 THEN 'Repeat' ELSE 'New' END AS customer_type,
                    COUNT(*) AS customer_count
                 FROM customer_orders
                 GROUP BY customer_type
                 ORDER BY customer_type"
            }
            Analysis::AverageOrderValue => {
                "WITH order_totals AS (
                    SELECT invoice_id, SUM(total_price) AS order_value
                    FROM transactions
                    GROUP BY invoice_id
                 )
                 SELECT ROUND(AVG(order_value), 2) AS average_order_value
                 FROM order_totals"
            }
            Analysis::TopCustomersLifetimeValue => {
                "SELECT
                    customer_id AS CustomerID,
                    ROUND(SUM(total_price), 2) AS lifetime_value
                 FROM transactions
                 GROUP BY customer_id
                 ORDER BY lifetime_value DESC, customer_id ASC
                 LIMIT 10"
            }
        }
    }
}

// ============================================================================
// RESULT ROWS
// ============================================================================

/// `(grouping key, revenue)` row of the revenue-ranked analyses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueRow {
    pub key: String,
    #[serde(serialize_with = "serialize_money")]
    pub revenue: f64,
}

impl RevenueRow {
    pub fn new(key: &str, revenue: f64) -> Self {
        RevenueRow {
            key: key.to_string(),
            revenue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerMixRow {
    pub customer_type: String,
    pub customer_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifetimeValueRow {
    pub customer_id: i64,
    #[serde(serialize_with = "serialize_money")]
    pub lifetime_value: f64,
}

#[derive(Debug, Serialize)]
struct AverageOrderValueRow {
    #[serde(serialize_with = "serialize_optional_money")]
    average_order_value: Option<f64>,
}

/// Monetary outputs are already rounded; always print two decimals
fn serialize_money<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:.2}", value))
}

fn serialize_optional_money<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serialize_money(v, serializer),
        None => serializer.serialize_str(""),
    }
}

fn revenue_row(row: &Row) -> rusqlite::Result<RevenueRow> {
    Ok(RevenueRow {
        key: row.get(0)?,
        revenue: row.get(1)?,
    })
}

fn customer_mix_row(row: &Row) -> rusqlite::Result<CustomerMixRow> {
    Ok(CustomerMixRow {
        customer_type: row.get(0)?,
        customer_count: row.get(1)?,
    })
}

fn lifetime_value_row(row: &Row) -> rusqlite::Result<LifetimeValueRow> {
    Ok(LifetimeValueRow {
        customer_id: row.get(0)?,
        lifetime_value: row.get(1)?,
    })
}

// ============================================================================
// RESULT SET
// ============================================================================

/// All six results of one run
///
/// Grouped analyses over an empty store are empty vectors; the average
/// order value is `None` when there are no orders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResults {
    pub monthly_revenue_trend: Vec<RevenueRow>,
    pub top_10_products_by_revenue: Vec<RevenueRow>,
    pub revenue_by_country: Vec<RevenueRow>,
    pub repeat_vs_new_customers: Vec<CustomerMixRow>,
    pub average_order_value: Option<f64>,
    pub top_customers_lifetime_value: Vec<LifetimeValueRow>,
}

impl QueryResults {
    pub fn row_count(&self, analysis: Analysis) -> usize {
        match analysis {
            Analysis::MonthlyRevenueTrend => self.monthly_revenue_trend.len(),
            Analysis::TopProductsByRevenue => self.top_10_products_by_revenue.len(),
            Analysis::RevenueByCountry => self.revenue_by_country.len(),
            Analysis::RepeatVsNewCustomers => self.repeat_vs_new_customers.len(),
            Analysis::AverageOrderValue => 1,
            Analysis::TopCustomersLifetimeValue => self.top_customers_lifetime_value.len(),
        }
    }

    pub fn is_empty(&self, analysis: Analysis) -> bool {
        match analysis {
            Analysis::AverageOrderValue => self.average_order_value.is_none(),
            _ => self.row_count(analysis) == 0,
        }
    }

    /// Write one analysis as `<columns>` header + rows
    pub fn write_csv(&self, analysis: Analysis, path: &Path) -> Result<()> {
        let columns = analysis.columns();
        match analysis {
            Analysis::MonthlyRevenueTrend => write_rows(path, columns, &self.monthly_revenue_trend),
            Analysis::TopProductsByRevenue => write_rows(path, columns, &self.top_10_products_by_revenue),
            Analysis::RevenueByCountry => write_rows(path, columns, &self.revenue_by_country),
            Analysis::RepeatVsNewCustomers => write_rows(path, columns, &self.repeat_vs_new_customers),
            Analysis::AverageOrderValue => write_rows(
                path,
                columns,
                &[AverageOrderValueRow {
                    average_order_value: self.average_order_value,
                }],
            ),
            Analysis::TopCustomersLifetimeValue => {
                write_rows(path, columns, &self.top_customers_lifetime_value)
            }
        }
    }
}

fn write_rows<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    // Explicit header so empty results still carry their schema
    wtr.write_record(columns)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

// ============================================================================
// EXECUTION
// ============================================================================

/// Run one analysis, mapping every row; a cell of the wrong type is an error
fn query_rows<T, F>(conn: &Connection, analysis: Analysis, map: F) -> Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn
        .prepare(analysis.sql())
        .map_err(PipelineError::store(Stage::Query))
        .with_context(|| format!("Query failed: {}", analysis.name()))?;

    let rows = stmt
        .query_map([], map)
        .and_then(|mapped| mapped.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(PipelineError::store(Stage::Query))
        .with_context(|| format!("Query failed: {}", analysis.name()))?;

    Ok(rows)
}

/// Run all six analyses against a loaded store
pub fn run_queries(store: &Store) -> Result<QueryResults> {
    let conn = store.connection();

    let average_order_value = query_rows(conn, Analysis::AverageOrderValue, |row| {
        row.get::<_, Option<f64>>(0)
    })?
    .into_iter()
    .next()
    .flatten();

    let results = QueryResults {
        monthly_revenue_trend: query_rows(conn, Analysis::MonthlyRevenueTrend, revenue_row)?,
        top_10_products_by_revenue: query_rows(conn, Analysis::TopProductsByRevenue, revenue_row)?,
        revenue_by_country: query_rows(conn, Analysis::RevenueByCountry, revenue_row)?,
        repeat_vs_new_customers: query_rows(conn, Analysis::RepeatVsNewCustomers, customer_mix_row)?,
        average_order_value,
        top_customers_lifetime_value: query_rows(
            conn,
            Analysis::TopCustomersLifetimeValue,
            lifetime_value_row,
        )?,
    };

    for analysis in Analysis::ALL {
        log::info!("📊 {}: {} rows", analysis.name(), results.row_count(analysis));
    }

    Ok(results)
}

/// Write each result to `<dir>/<name>.csv`
pub fn export_tables(results: &QueryResults, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut written = Vec::new();
    for analysis in Analysis::ALL {
        let path = dir.join(format!("{}.csv", analysis.name()));
        results.write_csv(analysis, &path)?;
        log::debug!("Saved query output: {}", path.display());
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Transaction;
    use chrono::NaiveDate;

    fn tx(invoice: &str, desc: &str, qty: i64, price: f64, customer: i64, country: &str, month: u32) -> Transaction {
        Transaction::new(
            invoice.to_string(),
            "SKU".to_string(),
            desc.to_string(),
            qty,
            NaiveDate::from_ymd_opt(2011, month, 10)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            price,
            customer,
            country.to_string(),
        )
    }

    fn loaded(transactions: &[Transaction]) -> QueryResults {
        let mut store = Store::open_in_memory().unwrap();
        store.load(transactions).unwrap();
        run_queries(&store).unwrap()
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx("I1", "HOME_MUG", 10, 10.0, 1, "United Kingdom", 1),
            tx("I1", "HOME_CANDLE", 2, 0.5, 1, "United Kingdom", 1),
            tx("I2", "APPAREL_TSHIRT", 1, 12.25, 1, "France", 2),
            tx("I3", "HOME_MUG", 4, 10.0, 2, "Germany", 3),
            tx("I4", "TOY_BUILDING_SET", 3, 7.5, 3, "France", 3),
        ]
    }

    #[test]
    fn test_monthly_revenue_ascending() {
        let results = loaded(&sample());
        assert_eq!(
            results.monthly_revenue_trend,
            vec![
                RevenueRow::new("2011-01", 101.0),
                RevenueRow::new("2011-02", 12.25),
                RevenueRow::new("2011-03", 62.5),
            ]
        );
    }

    #[test]
    fn test_country_revenue_descending() {
        let results = loaded(&sample());
        assert_eq!(
            results.revenue_by_country,
            vec![
                RevenueRow::new("United Kingdom", 101.0),
                RevenueRow::new("Germany", 40.0),
                RevenueRow::new("France", 34.75),
            ]
        );
    }

    #[test]
    fn test_top_products_limited_to_ten() {
        let txs: Vec<Transaction> = (0..15)
            .map(|i| tx(&format!("I{}", i), &format!("P{:02}", i), 1, 1.0 + i as f64, 1, "UK", 1))
            .collect();

        let products = loaded(&txs).top_10_products_by_revenue;
        assert_eq!(products.len(), 10);
        assert_eq!(products[0], RevenueRow::new("P14", 15.0));
        assert_eq!(products[9], RevenueRow::new("P05", 6.0));
    }

    #[test]
    fn test_repeat_vs_new_customers() {
        let txs = vec![
            tx("I1", "HOME_MUG", 1, 1.0, 100, "UK", 1),
            tx("I2", "HOME_MUG", 1, 1.0, 100, "UK", 2),
            tx("I3", "HOME_MUG", 1, 1.0, 200, "UK", 2),
        ];

        let mix = loaded(&txs).repeat_vs_new_customers;
        assert_eq!(
            mix,
            vec![
                CustomerMixRow { customer_type: "New".to_string(), customer_count: 1 },
                CustomerMixRow { customer_type: "Repeat".to_string(), customer_count: 1 },
            ]
        );
    }

    #[test]
    fn test_repeat_counts_distinct_invoices() {
        // Two lines on one invoice is still a single order
        let txs = vec![
            tx("I1", "HOME_MUG", 1, 1.0, 100, "UK", 1),
            tx("I1", "HOME_CANDLE", 1, 1.0, 100, "UK", 1),
        ];

        let mix = loaded(&txs).repeat_vs_new_customers;
        assert_eq!(mix.len(), 1);
        assert_eq!(mix[0].customer_type, "New");
        assert_eq!(mix[0].customer_count, 1);
    }

    #[test]
    fn test_average_order_value() {
        let txs = vec![
            tx("I1", "HOME_MUG", 6, 10.0, 1, "UK", 1),
            tx("I1", "HOME_CANDLE", 4, 10.0, 1, "UK", 1),
            tx("I2", "HOME_MUG", 5, 10.0, 2, "UK", 1),
        ];

        assert_eq!(loaded(&txs).average_order_value, Some(75.0));
    }

    #[test]
    fn test_top_customers_lifetime_value() {
        let top = loaded(&sample()).top_customers_lifetime_value;
        let pairs: Vec<(i64, f64)> = top.iter().map(|r| (r.customer_id, r.lifetime_value)).collect();
        assert_eq!(pairs, vec![(1, 113.25), (2, 40.0), (3, 22.5)]);
    }

    #[test]
    fn test_descending_ties_break_on_key() {
        let txs = vec![
            tx("I1", "B", 1, 5.0, 1, "Spain", 1),
            tx("I2", "A", 1, 5.0, 2, "Belgium", 1),
        ];

        let results = loaded(&txs);
        assert_eq!(results.top_10_products_by_revenue[0].key, "A");
        assert_eq!(results.revenue_by_country[0].key, "Belgium");
    }

    #[test]
    fn test_empty_store_gives_empty_results() {
        let results = loaded(&[]);

        for analysis in Analysis::ALL {
            assert!(results.is_empty(analysis), "{}", analysis.name());
        }
        assert_eq!(results.average_order_value, None);
    }

    #[test]
    fn test_mistyped_cell_is_an_error() {
        let mut store = Store::open_in_memory().unwrap();
        store.load(&sample()).unwrap();
        store
            .connection()
            .execute("UPDATE transactions SET customer_id = 'guest' WHERE invoice_id = 'I4'", [])
            .unwrap();

        let err = run_queries(&store).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Store { stage: Stage::Query, .. })
        ));
    }

    #[test]
    fn test_country_and_month_totals_agree() {
        let results = loaded(&sample());
        let by_month: f64 = results.monthly_revenue_trend.iter().map(|r| r.revenue).sum();
        let by_country: f64 = results.revenue_by_country.iter().map(|r| r.revenue).sum();
        assert!((by_month - by_country).abs() < 0.01 * 3.0);
    }

    #[test]
    fn test_export_tables_writes_headers() {
        let dir = tempfile::tempdir().unwrap();
        let results = loaded(&sample());

        let written = export_tables(&results, dir.path()).unwrap();
        assert_eq!(written.len(), 6);

        let monthly = std::fs::read_to_string(dir.path().join("monthly_revenue_trend.csv")).unwrap();
        let lines: Vec<&str> = monthly.lines().collect();
        assert_eq!(lines[0], "month,revenue");
        assert_eq!(lines[1], "2011-01,101.00");

        let customers = std::fs::read_to_string(dir.path().join("top_customers_lifetime_value.csv")).unwrap();
        assert_eq!(customers.lines().nth(1), Some("1,113.25"));

        let aov = std::fs::read_to_string(dir.path().join("average_order_value.csv")).unwrap();
        let lines: Vec<&str> = aov.lines().collect();
        assert_eq!(lines, vec!["average_order_value", "43.94"]);
    }

    #[test]
    fn test_export_empty_tables_keep_header() {
        let dir = tempfile::tempdir().unwrap();
        export_tables(&loaded(&[]), dir.path()).unwrap();

        let country = std::fs::read_to_string(dir.path().join("revenue_by_country.csv")).unwrap();
        assert_eq!(country.lines().collect::<Vec<_>>(), vec!["Country,revenue"]);
    }
}
