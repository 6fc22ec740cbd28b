// 🚨 Error taxonomy
// Fatal conditions only. Dropped rows and empty results are data, not errors.

use thiserror::Error;

/// Pipeline stage, used to label diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquire,
    Clean,
    Load,
    Query,
    Insights,
}

impl Stage {
    pub fn name(&self) -> &str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Clean => "clean",
            Stage::Load => "load",
            Stage::Query => "query",
            Stage::Insights => "insights",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required columns: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("store operation failed during {stage}: {source}")]
    Store {
        stage: Stage,
        #[source]
        source: rusqlite::Error,
    },

    #[error("raw data acquisition failed: {0}")]
    Acquisition(String),
}

impl PipelineError {
    pub fn store(stage: Stage) -> impl FnOnce(rusqlite::Error) -> PipelineError {
        move |source| PipelineError::Store { stage, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_lists_columns() {
        let err = PipelineError::Schema {
            missing: vec!["Quantity".to_string(), "Country".to_string()],
        };
        assert_eq!(err.to_string(), "missing required columns: Quantity, Country");
    }

    #[test]
    fn test_store_error_names_stage() {
        let err = PipelineError::store(Stage::Load)(rusqlite::Error::InvalidQuery);
        assert!(err.to_string().starts_with("store operation failed during load"));
    }
}
