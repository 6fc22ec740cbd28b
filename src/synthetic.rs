// 🎲 Synthetic raw dataset - acquisition fallback
// Deterministic (seeded) Online-Retail-shaped rows written as raw CSV

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::Path;

use crate::db::TIMESTAMP_FORMAT;

pub const DEFAULT_ROWS: usize = 6000;
pub const DEFAULT_SEED: u64 = 42;

const PRODUCTS: [(&str, f64); 10] = [
    ("ELECTRONICS_HEADPHONES", 0.13),
    ("ELECTRONICS_KEYBOARD", 0.08),
    ("HOME_MUG", 0.16),
    ("HOME_CANDLE", 0.09),
    ("APPAREL_TSHIRT", 0.14),
    ("APPAREL_HOODIE", 0.10),
    ("TOY_BUILDING_SET", 0.07),
    ("STATIONERY_NOTEBOOK", 0.10),
    ("BEAUTY_SKINCARE_KIT", 0.07),
    ("SPORT_WATER_BOTTLE", 0.06),
];

const COUNTRIES: [(&str, f64); 10] = [
    ("United Kingdom", 0.45),
    ("Germany", 0.10),
    ("France", 0.09),
    ("Netherlands", 0.07),
    ("Spain", 0.08),
    ("Ireland", 0.05),
    ("Belgium", 0.05),
    ("Portugal", 0.04),
    ("Switzerland", 0.04),
    ("Norway", 0.03),
];

const QUANTITIES: [(i64, f64); 9] = [
    (1, 0.20),
    (2, 0.20),
    (3, 0.17),
    (4, 0.12),
    (5, 0.10),
    (6, 0.08),
    (8, 0.05),
    (10, 0.05),
    (12, 0.03),
];

const INVOICE_BASE: u32 = 500_000;
const CUSTOMER_POOL: std::ops::Range<i64> = 10_000..10_800;

/// One raw row, headers match the required input columns
#[derive(Debug, Serialize)]
struct RawRow {
    #[serde(rename = "InvoiceNo")]
    invoice_no: String,
    #[serde(rename = "StockCode")]
    stock_code: String,
    #[serde(rename = "Description")]
    description: &'static str,
    #[serde(rename = "Quantity")]
    quantity: i64,
    #[serde(rename = "InvoiceDate")]
    invoice_date: String,
    #[serde(rename = "UnitPrice")]
    unit_price: f64,
    #[serde(rename = "CustomerID")]
    customer_id: i64,
    #[serde(rename = "Country")]
    country: &'static str,
}

/// Unit price range by category prefix
fn price_range(description: &str) -> (f64, f64) {
    if description.starts_with("ELECTRONICS") {
        (15.0, 90.0)
    } else if description.starts_with("APPAREL") {
        (8.0, 45.0)
    } else if description.starts_with("BEAUTY") {
        (10.0, 60.0)
    } else {
        (2.0, 30.0)
    }
}

fn weighted<T: Copy>(choices: &[(T, f64)]) -> Result<(Vec<T>, WeightedIndex<f64>)> {
    let values = choices.iter().map(|(v, _)| *v).collect();
    let index = WeightedIndex::new(choices.iter().map(|(_, w)| *w))
        .context("Invalid sampling weights")?;
    Ok((values, index))
}

fn generate_rows(n_rows: usize, seed: u64) -> Result<Vec<RawRow>> {
    let mut rng = StdRng::seed_from_u64(seed);

    let (products, product_dist) = weighted(&PRODUCTS)?;
    let (countries, country_dist) = weighted(&COUNTRIES)?;
    let (quantities, quantity_dist) = weighted(&QUANTITIES)?;

    let start = NaiveDate::from_ymd_opt(2010, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("Invalid start date")?;
    let end = NaiveDate::from_ymd_opt(2011, 12, 31)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("Invalid end date")?;
    let total_days = (end - start).num_days();

    let mut rows = Vec::with_capacity(n_rows);
    for _ in 0..n_rows {
        let invoice_no = (INVOICE_BASE + rng.gen_range(1..1800)).to_string();
        let stock_code = format!("SKU{}", rng.gen_range(10_000..99_999));
        let description = products[product_dist.sample(&mut rng)];
        let quantity = quantities[quantity_dist.sample(&mut rng)];

        let offset = Duration::days(rng.gen_range(0..=total_days))
            + Duration::minutes(rng.gen_range(0..24 * 60));
        let invoice_date = (start + offset).format(TIMESTAMP_FORMAT).to_string();

        let (low, high) = price_range(description);
        let unit_price = (rng.gen_range(low..high) * 100.0).round() / 100.0;

        let customer_id = rng.gen_range(CUSTOMER_POOL);
        let country = countries[country_dist.sample(&mut rng)];

        rows.push(RawRow {
            invoice_no,
            stock_code,
            description,
            quantity,
            invoice_date,
            unit_price,
            customer_id,
            country,
        });
    }

    Ok(rows)
}

/// Write `n_rows` synthetic raw rows to `path`
pub fn generate_dataset(path: &Path, n_rows: usize, seed: u64) -> Result<usize> {
    let rows = generate_rows(n_rows, seed)?;

    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create synthetic dataset: {}", path.display()))?;
    for row in &rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;

    log::info!("🎲 Synthetic dataset saved: {} ({} rows)", path.display(), rows.len());
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::{clean, RawTable, REQUIRED_COLUMNS};

    #[test]
    fn test_generated_rows_all_survive_cleaning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");

        let written = generate_dataset(&path, 500, DEFAULT_SEED).unwrap();
        assert_eq!(written, 500);

        let raw = RawTable::from_path(&path).unwrap();
        assert_eq!(raw.headers, REQUIRED_COLUMNS.to_vec());

        let cleaned = clean(&raw).unwrap();
        assert_eq!(cleaned.transactions.len(), 500);
    }

    #[test]
    fn test_same_seed_same_rows() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");

        generate_dataset(&a, 50, 7).unwrap();
        generate_dataset(&b, 50, 7).unwrap();

        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn test_values_within_ranges() {
        let rows = generate_rows(300, DEFAULT_SEED).unwrap();

        for row in &rows {
            let (low, high) = price_range(row.description);
            assert!(row.unit_price >= low && row.unit_price <= high);
            assert!(CUSTOMER_POOL.contains(&row.customer_id));
            assert!(row.quantity > 0);
            assert!(row.invoice_date.starts_with("2010") || row.invoice_date.starts_with("2011"));
        }
    }
}
