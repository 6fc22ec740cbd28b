// 🔁 Pipeline - acquire → clean → load → query → insights
// Strictly sequential; each stage completes before the next starts

use anyhow::{Context, Result};

use crate::cleaner::{clean_to_file, CleaningReport, RawTable};
use crate::config::PipelineConfig;
use crate::db::{Store, Transaction};
use crate::error::{PipelineError, Stage};
use crate::insights::{derive_insights, write_report, InsightSet};
use crate::queries::{export_tables, run_queries, QueryResults};
use crate::synthetic::{generate_dataset, DEFAULT_ROWS, DEFAULT_SEED};

/// Where the raw dataset came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    Existing,
    Synthetic { rows: usize },
}

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub acquisition: Acquisition,
    pub cleaning: CleaningReport,
    pub transactions: Vec<Transaction>,
    pub loaded: usize,
    pub results: QueryResults,
    pub insights: InsightSet,
}

/// Use the raw file if present, otherwise fall back to a synthetic dataset
pub fn acquire(config: &PipelineConfig) -> Result<Acquisition> {
    if config.raw_path.is_file() {
        log::info!("📂 Using raw dataset: {}", config.raw_path.display());
        return Ok(Acquisition::Existing);
    }

    log::warn!(
        "Raw dataset not found at {}, generating synthetic fallback",
        config.raw_path.display()
    );
    let rows = generate_dataset(&config.raw_path, DEFAULT_ROWS, DEFAULT_SEED)
        .map_err(|e| PipelineError::Acquisition(format!("{:#}", e)))?;

    Ok(Acquisition::Synthetic { rows })
}

/// Load into the store and run every analysis
///
/// The store is dropped (connection closed) on every path out of this
/// function, including a failing query.
fn load_and_query(config: &PipelineConfig, transactions: &[Transaction]) -> Result<(usize, QueryResults)> {
    let mut store = Store::open(&config.store_path)?;

    let loaded = store
        .load(transactions)
        .with_context(|| format!("stage {}", Stage::Load))?;

    let results = run_queries(&store).with_context(|| format!("stage {}", Stage::Query))?;

    store.close()?;
    Ok((loaded, results))
}

pub fn run(config: &PipelineConfig) -> Result<PipelineOutput> {
    config.ensure_directories()?;

    let acquisition = acquire(config).with_context(|| format!("stage {}", Stage::Acquire))?;

    let raw = RawTable::from_path(&config.raw_path)
        .with_context(|| format!("stage {}", Stage::Clean))?;
    let cleaned = clean_to_file(&raw, &config.clean_path)
        .with_context(|| format!("stage {}", Stage::Clean))?;

    let (loaded, results) = load_and_query(config, &cleaned.transactions)?;
    export_tables(&results, &config.tables_dir())
        .with_context(|| format!("stage {}", Stage::Query))?;

    let insights = derive_insights(&cleaned.transactions, &results);
    write_report(&insights, &config.insights_path(), &config.insights_json_path())
        .with_context(|| format!("stage {}", Stage::Insights))?;

    Ok(PipelineOutput {
        acquisition,
        cleaning: cleaned.report,
        transactions: cleaned.transactions,
        loaded,
        results,
        insights,
    })
}
