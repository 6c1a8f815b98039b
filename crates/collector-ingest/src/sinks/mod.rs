//! Downstream consumers of parsed descriptors
//!
//! Every consumer implements [`DescriptorSink`] and is registered with a
//! [`ConsumerFanout`]. The fanout has no knowledge of concrete sinks: it
//! calls the registered ones in [`SinkStage`] order and isolates their
//! failures from each other.
//!
//! # Dispatch order
//!
//! 1. [`SinkStage::Archive`] raw-byte storage
//! 2. [`SinkStage::Database`] structured records
//! 3. [`SinkStage::Stats`], [`SinkStage::Inventory`], [`SinkStage::Health`]
//!
//! Sinks of the same stage are called in registration order.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::descriptor::{ParsedDescriptor, StatusEntry};

pub mod archive;
pub mod health;
pub mod inventory;
pub mod records;
pub mod stats;

pub use archive::ArchiveWriter;
pub use health::ConsensusHealth;
pub use inventory::DescriptorInventory;
pub use records::RecordsWriter;
pub use stats::HashedRelayStats;

/// Position of a sink in the dispatch order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SinkStage {
    Archive,
    Database,
    Stats,
    Inventory,
    Health,
}

/// A consumer of parse results
///
/// Errors returned from any method are logged by the fanout and never reach
/// the parser or other sinks.
pub trait DescriptorSink {
    /// Name used in log messages
    fn name(&self) -> &'static str;

    fn stage(&self) -> SinkStage;

    /// Called once per finalized consensus status entry, while the
    /// consensus is still being parsed
    fn on_status_entry(&mut self, _valid_after: DateTime<Utc>, _entry: &StatusEntry) -> Result<()> {
        Ok(())
    }

    /// Called once per fully parsed document
    fn on_descriptor(&mut self, descriptor: &ParsedDescriptor<'_>) -> Result<()>;

    /// Called at the end of a run to persist accumulated state
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The set of present sinks, ordered by stage
#[derive(Default)]
pub struct ConsumerFanout {
    sinks: Vec<Box<dyn DescriptorSink>>,
}

impl ConsumerFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink after all sinks of the same or an earlier stage
    pub fn register(&mut self, sink: Box<dyn DescriptorSink>) {
        let position = self
            .sinks
            .iter()
            .position(|existing| existing.stage() > sink.stage())
            .unwrap_or(self.sinks.len());
        self.sinks.insert(position, sink);
    }

    pub fn with_sink(mut self, sink: impl DescriptorSink + 'static) -> Self {
        self.register(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Registered sink names in dispatch order
    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|sink| sink.name()).collect()
    }

    /// Returns the number of sinks that failed
    pub fn dispatch_status_entry(&mut self, valid_after: DateTime<Utc>, entry: &StatusEntry) -> usize {
        let mut failures = 0;
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.on_status_entry(valid_after, entry) {
                failures += 1;
                warn!(
                    sink = sink.name(),
                    relay = %entry.relay_identity,
                    error = %e,
                    "Sink failed to accept status entry"
                );
            }
        }
        failures
    }

    /// Returns the number of sinks that failed
    pub fn dispatch(&mut self, descriptor: &ParsedDescriptor<'_>) -> usize {
        let mut failures = 0;
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.on_descriptor(descriptor) {
                failures += 1;
                warn!(
                    sink = sink.name(),
                    kind = descriptor.kind_name(),
                    error = %e,
                    "Sink failed to accept descriptor"
                );
            }
        }
        failures
    }

    /// Let every sink persist its state; a failing sink does not stop the
    /// others
    pub fn finish(&mut self) -> usize {
        let mut failures = 0;
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.finish() {
                failures += 1;
                warn!(sink = sink.name(), error = %e, "Sink failed to persist its state");
            }
        }
        failures
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Probe {
        name: &'static str,
        stage: SinkStage,
        fail: bool,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl DescriptorSink for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn stage(&self) -> SinkStage {
            self.stage
        }

        fn on_descriptor(&mut self, _descriptor: &ParsedDescriptor<'_>) -> Result<()> {
            self.log.borrow_mut().push(self.name);
            if self.fail {
                anyhow::bail!("{} is broken", self.name);
            }
            Ok(())
        }
    }

    fn probe(name: &'static str, stage: SinkStage, fail: bool, log: &Rc<RefCell<Vec<&'static str>>>) -> Probe {
        Probe {
            name,
            stage,
            fail,
            log: Rc::clone(log),
        }
    }

    fn extra_info() -> ParsedDescriptor<'static> {
        ParsedDescriptor::ExtraInfo(crate::descriptor::ExtraInfoRecord {
            digest: "00".repeat(20),
            nickname: "relay".to_string(),
            directory: "ab".repeat(20),
            published: None,
            published_time: None,
            bandwidth_history: Vec::new(),
            dir_req_stats: Vec::new(),
            conn_bi_direct: Vec::new(),
            raw: b"extra-info relay\n",
        })
    }

    #[test]
    fn test_dispatch_follows_stage_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut fanout = ConsumerFanout::new()
            .with_sink(probe("health", SinkStage::Health, false, &log))
            .with_sink(probe("database", SinkStage::Database, false, &log))
            .with_sink(probe("archive", SinkStage::Archive, false, &log))
            .with_sink(probe("stats", SinkStage::Stats, false, &log));

        assert_eq!(fanout.sink_names(), vec!["archive", "database", "stats", "health"]);
        assert_eq!(fanout.dispatch(&extra_info()), 0);
        assert_eq!(*log.borrow(), vec!["archive", "database", "stats", "health"]);
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut fanout = ConsumerFanout::new()
            .with_sink(probe("archive", SinkStage::Archive, true, &log))
            .with_sink(probe("database", SinkStage::Database, false, &log));

        assert_eq!(fanout.dispatch(&extra_info()), 1);
        assert_eq!(*log.borrow(), vec!["archive", "database"]);
    }

    #[test]
    fn test_empty_fanout_is_valid() {
        let mut fanout = ConsumerFanout::new();
        assert!(fanout.is_empty());
        assert_eq!(fanout.dispatch(&extra_info()), 0);
        assert_eq!(fanout.finish(), 0);
    }
}
