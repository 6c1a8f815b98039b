//! Descriptor parse errors

use thiserror::Error;

/// Result type alias for grammar-level operations
pub type Result<T> = std::result::Result<T, DescriptorError>;

/// Reasons a single document cannot be parsed to completion
#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Malformed '{keyword}' line: {line}")]
    MalformedLine { keyword: &'static str, line: String },

    #[error("Invalid base64 '{value}': {source}")]
    Base64 {
        value: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Invalid timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid number '{value}' in '{keyword}' line")]
    Number { keyword: &'static str, value: String },

    #[error("Missing required '{0}' line")]
    MissingLine(&'static str),
}
