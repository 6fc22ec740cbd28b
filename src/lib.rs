// Retail Analytics - Core Library
// Cleaning pipeline, SQLite store, fixed analyses and headline insights

pub mod cleaner;
pub mod config;
pub mod db;
pub mod error;
pub mod insights;
pub mod pipeline;
pub mod queries;
pub mod synthetic;

// Re-export commonly used types
pub use cleaner::{
    clean, clean_to_file, write_cleaned,
    Cleaned, CleaningReport, DropReason, RawTable, REQUIRED_COLUMNS,
};
pub use config::PipelineConfig;
pub use db::{Store, Transaction};
pub use error::{PipelineError, Stage};
pub use insights::{category_of, derive_insights, render_report, write_report, InsightSet};
pub use pipeline::{acquire, run, Acquisition, PipelineOutput};
pub use queries::{
    export_tables, run_queries, Analysis, CustomerMixRow, LifetimeValueRow, QueryResults, RevenueRow,
};
pub use synthetic::generate_dataset;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
