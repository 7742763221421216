//! Audit trail for conflict resolutions.
//!
//! Entries are buffered in memory by [`ConflictLogger`] and flushed to an
//! [`EntryStore`] either when the buffer fills, on a periodic timer, or on an
//! explicit [`ConflictLogger::flush`]. The persisted collection rotates to the
//! most recent entries once its serialized size exceeds the configured cap.

#![warn(missing_docs, clippy::pedantic)]

pub mod entry;
pub mod error;
pub mod logger;
pub mod sink;
pub mod stats;
pub mod store;

pub use entry::ConflictLogEntry;
pub use error::{JournalError, JournalResult};
pub use logger::{ConflictLogger, LoggerConfig};
pub use sink::{ConflictSink, RecordingSink};
pub use stats::{ConflictStats, PairCount};
pub use store::{EntryStore, FileEntryStore, MemoryEntryStore};
