//! Error types for the collector

use thiserror::Error;

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Main error type for the collector
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    Lock(String),
}
