//! Document dispatch

use tracing::{debug, warn};

use super::fields::ascii_text;
use super::kind::DocumentKind;
use super::models::ParsedDescriptor;
use super::{extra_info, network_status, server};
use crate::sinks::ConsumerFanout;

/// What happened to one raw document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Parsed and handed to every sink
    Dispatched {
        kind: &'static str,
        sink_failures: usize,
    },
    /// Empty or of a kind this parser does not handle
    Ignored,
    /// Abandoned after a parse error; entries streamed before the error
    /// stay dispatched
    Failed,
}

/// Classifies raw documents and runs the matching grammar
///
/// The parser keeps no state between documents; everything a grammar needs
/// lives in that grammar's own pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorParser;

impl DescriptorParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one document and notify `fanout`
    ///
    /// Never fails: parse errors are logged and reported as
    /// [`ParseOutcome::Failed`].
    pub fn parse(&self, data: &[u8], fanout: &mut ConsumerFanout) -> ParseOutcome {
        if data.is_empty() {
            debug!("Ignoring empty descriptor");
            return ParseOutcome::Ignored;
        }

        let text = ascii_text(data);
        let mut lines = text.lines();
        let first_line = lines.next().unwrap_or_default();
        let kind = DocumentKind::classify(first_line);

        let parsed = match kind {
            DocumentKind::NetworkStatus => network_status::parse(data, lines, |valid_after, entry| {
                fanout.dispatch_status_entry(valid_after, entry);
            })
            .map(|status| {
                if status.is_vote {
                    ParsedDescriptor::Vote(status)
                } else {
                    ParsedDescriptor::Consensus(status)
                }
            }),
            DocumentKind::ServerDescriptor => {
                server::parse(data, first_line, lines).map(ParsedDescriptor::ServerDescriptor)
            },
            DocumentKind::ExtraInfoDescriptor => {
                extra_info::parse(data, first_line, lines).map(ParsedDescriptor::ExtraInfo)
            },
            DocumentKind::Unrecognized => {
                debug!(first_line = %first_line, "Ignoring document of unknown kind");
                return ParseOutcome::Ignored;
            },
        };

        match parsed {
            Ok(descriptor) => {
                let sink_failures = fanout.dispatch(&descriptor);
                ParseOutcome::Dispatched {
                    kind: descriptor.kind_name(),
                    sink_failures,
                }
            },
            Err(e) => {
                warn!(kind = ?kind, error = %e, "Could not parse descriptor. Skipping.");
                ParseOutcome::Failed
            },
        }
    }
}
