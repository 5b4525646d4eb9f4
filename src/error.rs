use std::path::PathBuf;

use thiserror::Error;

/// Failures at the edges of the crate: reading tables and config, or calling an insight source.
/// Metric computation itself never fails.
#[derive(Debug, Error)]
pub enum HseError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("insight source failed: {0}")]
    InsightSource(String),
}

pub type Result<T> = std::result::Result<T, HseError>;
