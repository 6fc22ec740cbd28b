// ⚙️ Pipeline Configuration
// Every stage receives paths from here instead of module-level constants

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_RAW_PATH: &str = "data/raw/online_retail.csv";
pub const DEFAULT_CLEAN_PATH: &str = "data/processed/cleaned.csv";
pub const DEFAULT_STORE_PATH: &str = "data/processed/ecommerce.db";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Raw tabular dataset (input boundary)
    pub raw_path: PathBuf,
    /// Cleaned artifact written by the cleaner
    pub clean_path: PathBuf,
    /// SQLite database file
    pub store_path: PathBuf,
    /// Root for query tables and the insight report
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            raw_path: PathBuf::from(DEFAULT_RAW_PATH),
            clean_path: PathBuf::from(DEFAULT_CLEAN_PATH),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl PipelineConfig {
    /// Defaults, overridden by RAW_PATH / CLEAN_PATH / STORE_PATH / OUTPUT_DIR
    pub fn from_env() -> Self {
        let defaults = PipelineConfig::default();

        let path_var = |name: &str, fallback: PathBuf| -> PathBuf {
            match env::var(name) {
                Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
                _ => fallback,
            }
        };

        PipelineConfig {
            raw_path: path_var("RAW_PATH", defaults.raw_path),
            clean_path: path_var("CLEAN_PATH", defaults.clean_path),
            store_path: path_var("STORE_PATH", defaults.store_path),
            output_dir: path_var("OUTPUT_DIR", defaults.output_dir),
        }
    }

    /// Same layout as the defaults, rooted under `root`
    pub fn in_dir(root: &Path) -> Self {
        PipelineConfig {
            raw_path: root.join(DEFAULT_RAW_PATH),
            clean_path: root.join(DEFAULT_CLEAN_PATH),
            store_path: root.join(DEFAULT_STORE_PATH),
            output_dir: root.join(DEFAULT_OUTPUT_DIR),
        }
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.output_dir.join("tables")
    }

    pub fn insights_path(&self) -> PathBuf {
        self.output_dir.join("insights.txt")
    }

    pub fn insights_json_path(&self) -> PathBuf {
        self.output_dir.join("insights.json")
    }

    /// Create parent directories for every configured path
    pub fn ensure_directories(&self) -> Result<()> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for file in [&self.raw_path, &self.clean_path, &self.store_path] {
            if let Some(parent) = file.parent() {
                if !parent.as_os_str().is_empty() {
                    dirs.push(parent.to_path_buf());
                }
            }
        }
        dirs.push(self.tables_dir());

        for dir in dirs {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = PipelineConfig::default();
        assert_eq!(config.raw_path, PathBuf::from("data/raw/online_retail.csv"));
        assert_eq!(config.store_path, PathBuf::from("data/processed/ecommerce.db"));
        assert_eq!(config.tables_dir(), PathBuf::from("output/tables"));
        assert_eq!(config.insights_path(), PathBuf::from("output/insights.txt"));
    }

    #[test]
    fn test_in_dir_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::in_dir(dir.path());

        config.ensure_directories().unwrap();

        assert!(dir.path().join("data/raw").is_dir());
        assert!(dir.path().join("data/processed").is_dir());
        assert!(dir.path().join("output/tables").is_dir());
        assert!(config.clean_path.starts_with(dir.path()));
    }
}
