//! Tor directory descriptor parsing
//!
//! [`DescriptorParser`] classifies a raw document by its first line into a
//! [`DocumentKind`], runs the single-pass grammar for that kind and hands the
//! results to a [`ConsumerFanout`](crate::sinks::ConsumerFanout).
//!
//! Supported documents:
//!
//! | First line                  | Grammar             |
//! |-----------------------------|---------------------|
//! | `network-status-version 3`  | consensus or vote   |
//! | `router ...`                | server descriptor   |
//! | `extra-info ...`            | extra-info          |

pub mod digest;
pub mod error;
pub mod extra_info;
pub mod fields;
pub mod kind;
pub mod models;
pub mod network_status;
pub mod parser;
pub mod server;

pub use digest::{DigestExtractor, HexCase, MarkerOffsets};
pub use error::{DescriptorError, Result};
pub use kind::DocumentKind;
pub use models::{
    BandwidthTriple, ConnBiDirectStats, DirReqStats, ExtraInfoRecord, NetworkStatus,
    ParsedDescriptor, ServerDescriptorRecord, StatusEntry,
};
pub use parser::{DescriptorParser, ParseOutcome};
