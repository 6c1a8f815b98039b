//! Collector Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch ingestion of Tor relay descriptors and Torperf measurement series.
//!
//! # Overview
//!
//! - [`archive_reader`] walks an archives directory and feeds every file to
//!   the [`descriptor`] parser
//! - [`sinks`] holds the consumers a parsed descriptor is dispatched to
//! - [`torperf`] downloads, appends and merges Torperf series
//! - [`pipeline`] sequences the stages of one run under a [`lock::RunLock`]

pub mod archive_reader;
pub mod clean;
pub mod config;
pub mod descriptor;
pub mod history;
pub mod lock;
pub mod pipeline;
pub mod sinks;
pub mod torperf;

pub use config::CollectorConfig;
pub use descriptor::{DescriptorParser, ParseOutcome};
pub use sinks::{ConsumerFanout, DescriptorSink, SinkStage};
