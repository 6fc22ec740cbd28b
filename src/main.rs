use anyhow::{bail, Result};
use std::env;

use retail_analytics::config::PipelineConfig;
use retail_analytics::pipeline::{self, Acquisition};
use retail_analytics::synthetic::{generate_dataset, DEFAULT_ROWS, DEFAULT_SEED};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let config = PipelineConfig::from_env();

    match args.get(1).map(String::as_str) {
        None | Some("run") => run_pipeline(&config)?,
        Some("generate") => {
            let rows = match args.get(2) {
                Some(n) => n.parse::<usize>()?,
                None => DEFAULT_ROWS,
            };
            run_generate(&config, rows)?;
        }
        Some(other) => bail!("Unknown command: {} (expected `run` or `generate [rows]`)", other),
    }

    Ok(())
}

fn run_generate(config: &PipelineConfig, rows: usize) -> Result<()> {
    config.ensure_directories()?;
    let written = generate_dataset(&config.raw_path, rows, DEFAULT_SEED)?;
    println!("✓ Wrote {} synthetic rows to {}", written, config.raw_path.display());
    Ok(())
}

fn run_pipeline(config: &PipelineConfig) -> Result<()> {
    println!("🛒 E-commerce Sales & Customer Analytics Pipeline v{}", retail_analytics::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let output = pipeline::run(config)?;

    if let Acquisition::Synthetic { rows } = output.acquisition {
        println!("⚠️  Raw dataset missing, used {} synthetic rows", rows);
    }
    println!("✓ Cleaning: {}", output.cleaning.summary());
    println!("✓ Store: {} transactions in {}", output.loaded, config.store_path.display());
    println!("✓ Tables: {}", config.tables_dir().display());
    println!("✓ Insights: {}", config.insights_path().display());

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🎉 Pipeline complete");

    Ok(())
}
