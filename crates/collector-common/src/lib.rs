//! Collector Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging and digest utilities for the collector
//! workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CollectorError`] and the [`Result`] alias
//! - **Logging**: console/file tracing setup in [`logging`]
//! - **Digests**: SHA-1 hex digests used as content addresses in [`digest`]
//!
//! # Example
//!
//! ```no_run
//! use collector_common::digest::sha1_hex;
//!
//! let id = sha1_hex(b"router test 127.0.0.1 9001 0 0\n");
//! assert_eq!(id.len(), 40);
//! ```

pub mod digest;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CollectorError, Result};
