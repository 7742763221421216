//! Resolver-facing seam for recording resolutions.

use std::sync::{Arc, Mutex};

use crate::entry::ConflictLogEntry;

/// Receives one entry per completed resolution.
///
/// Implementations must not block: the resolver calls `record` inline and
/// never waits on persistence.
pub trait ConflictSink: Send + Sync {
    /// Records a resolution.
    fn record(&self, entry: ConflictLogEntry);
}

/// Sink that keeps entries in memory, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<ConflictLogEntry>>,
}

impl RecordingSink {
    /// Creates a new recording sink.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a copy of the recorded entries.
    #[must_use]
    pub fn entries(&self) -> Vec<ConflictLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Removes and returns the recorded entries.
    #[must_use]
    pub fn drain(&self) -> Vec<ConflictLogEntry> {
        match self.entries.lock() {
            Ok(mut entries) => entries.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        }
    }
}

impl ConflictSink for RecordingSink {
    fn record(&self, entry: ConflictLogEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use arbiter_primitives::ResolutionStrategy;

    use super::*;

    #[test]
    fn records_and_drains() {
        let sink = RecordingSink::new();
        sink.record(ConflictLogEntry::new(
            "design",
            Vec::new(),
            Vec::new(),
            ResolutionStrategy::WeightedConsensus,
            Duration::ZERO,
        ));
        assert_eq!(sink.entries().len(), 1);
        assert_eq!(sink.drain().len(), 1);
        assert!(sink.entries().is_empty());
    }
}
