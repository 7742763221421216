//! Buffered conflict logger with size-capped persistence.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::entry::ConflictLogEntry;
use crate::sink::ConflictSink;
use crate::stats::ConflictStats;
use crate::store::{EntryStore, FileEntryStore};
use crate::{JournalError, JournalResult};

/// Default location of the persisted log.
pub const DEFAULT_LOG_PATH: &str = "logs/conflict_resolutions.json";

/// Configuration for [`ConflictLogger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    path: PathBuf,
    flush_threshold: NonZeroUsize,
    flush_interval: Option<Duration>,
    max_bytes: u64,
    retain_entries: NonZeroUsize,
}

impl LoggerConfig {
    /// Creates a configuration writing to `path` with default limits.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Sets the buffer size that triggers an automatic flush.
    #[must_use]
    pub fn with_flush_threshold(mut self, threshold: NonZeroUsize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    /// Sets the period of the background flush timer.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    /// Disables the background flush timer.
    #[must_use]
    pub fn without_timer(mut self) -> Self {
        self.flush_interval = None;
        self
    }

    /// Sets the serialized size above which the log rotates.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Sets the number of entries kept after rotation.
    #[must_use]
    pub fn with_retain_entries(mut self, retain: NonZeroUsize) -> Self {
        self.retain_entries = retain;
        self
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the auto-flush buffer threshold.
    #[must_use]
    pub const fn flush_threshold(&self) -> NonZeroUsize {
        self.flush_threshold
    }

    /// Returns the timer period, or `None` when the timer is disabled.
    #[must_use]
    pub const fn flush_interval(&self) -> Option<Duration> {
        self.flush_interval
    }

    /// Returns the rotation size cap in bytes.
    #[must_use]
    pub const fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Returns the number of entries kept after rotation.
    #[must_use]
    pub const fn retain_entries(&self) -> NonZeroUsize {
        self.retain_entries
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidConfig`] when the path is empty, the
    /// size cap is zero, or the timer period is zero.
    pub fn validate(&self) -> JournalResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(JournalError::InvalidConfig("log path cannot be empty"));
        }
        if self.max_bytes == 0 {
            return Err(JournalError::InvalidConfig(
                "rotation size cap must be greater than zero",
            ));
        }
        if self.flush_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(JournalError::InvalidConfig(
                "flush interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LOG_PATH),
            flush_threshold: NonZeroUsize::new(100).expect("non-zero"),
            flush_interval: Some(Duration::from_secs(30)),
            max_bytes: 10 * 1024 * 1024,
            retain_entries: NonZeroUsize::new(1000).expect("non-zero"),
        }
    }
}

struct LoggerInner {
    config: LoggerConfig,
    store: Arc<dyn EntryStore>,
    buffer: Mutex<Vec<ConflictLogEntry>>,
    // Serialises the read-append-write cycle against the store.
    flush_lock: tokio::sync::Mutex<()>,
    flush_scheduled: AtomicBool,
}

impl LoggerInner {
    fn buffer(&self) -> MutexGuard<'_, Vec<ConflictLogEntry>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, entry: ConflictLogEntry) -> usize {
        let mut buffer = self.buffer();
        buffer.push(entry);
        buffer.len()
    }

    fn buffered_len(&self) -> usize {
        self.buffer().len()
    }

    async fn flush(&self) -> JournalResult<usize> {
        let _guard = self.flush_lock.lock().await;

        // Entries appended after this snapshot stay buffered for the next flush.
        let pending = self.buffer().clone();
        if pending.is_empty() {
            return Ok(0);
        }
        let count = pending.len();

        let mut entries = self.load_or_empty().await;
        entries.extend(pending);
        let rotated = self.rotate(&mut entries)?;
        self.store.store(&entries).await?;

        self.buffer().drain(..count);
        debug!(
            written = count,
            persisted = entries.len(),
            rotated,
            "flushed conflict log buffer"
        );
        Ok(count)
    }

    /// Flushes and, on success, re-arms threshold-triggered flushing.
    async fn flush_and_rearm(&self) -> JournalResult<usize> {
        let written = self.flush().await?;
        self.flush_scheduled.store(false, Ordering::Release);
        Ok(written)
    }

    async fn load_or_empty(&self) -> Vec<ConflictLogEntry> {
        match self.store.load().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(?err, "persisted conflict log unreadable; treating as empty");
                Vec::new()
            }
        }
    }

    fn rotate(&self, entries: &mut Vec<ConflictLogEntry>) -> JournalResult<bool> {
        let size = serde_json::to_vec(entries)?.len();
        if u64::try_from(size).unwrap_or(u64::MAX) <= self.config.max_bytes {
            return Ok(false);
        }

        let retain = self.config.retain_entries.get();
        if entries.len() > retain {
            let excess = entries.len() - retain;
            entries.drain(..excess);
        }
        Ok(true)
    }
}

/// Append-only audit logger for conflict resolutions.
///
/// [`log`](Self::log) only touches the in-memory buffer and never waits on
/// disk. Callers must invoke [`cleanup`](Self::cleanup) on shutdown so the
/// final batch is persisted; dropping the logger stops the timer without
/// flushing.
pub struct ConflictLogger {
    inner: Arc<LoggerInner>,
    shutdown: Arc<AtomicBool>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for ConflictLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictLogger")
            .field("config", &self.inner.config)
            .field("store", &"dyn EntryStore")
            .field("buffered", &self.inner.buffered_len())
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ConflictLogger {
    /// Opens a file-backed logger at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidConfig`] for invalid configuration and
    /// propagates I/O errors raised while creating the log directory.
    pub async fn open(config: LoggerConfig) -> JournalResult<Self> {
        config.validate()?;
        let store = FileEntryStore::open(config.path()).await?;
        Self::with_store(config, Arc::new(store))
    }

    /// Creates a logger persisting through the supplied store.
    ///
    /// The periodic flush timer starts only when a tokio runtime is available.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidConfig`] for invalid configuration.
    pub fn with_store(config: LoggerConfig, store: Arc<dyn EntryStore>) -> JournalResult<Self> {
        config.validate()?;
        let interval = config.flush_interval();
        let inner = Arc::new(LoggerInner {
            buffer: Mutex::new(Vec::with_capacity(config.flush_threshold().get())),
            config,
            store,
            flush_lock: tokio::sync::Mutex::new(()),
            flush_scheduled: AtomicBool::new(false),
        });
        let shutdown = Arc::new(AtomicBool::new(false));

        let timer = match (interval, Handle::try_current()) {
            (Some(period), Ok(handle)) => Some(handle.spawn(run_flush_timer(
                Arc::downgrade(&inner),
                Arc::clone(&shutdown),
                period,
            ))),
            (Some(_), Err(_)) => {
                warn!("no tokio runtime available; periodic conflict log flush disabled");
                None
            }
            (None, _) => None,
        };

        Ok(Self {
            inner,
            shutdown,
            timer: Mutex::new(timer),
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &LoggerConfig {
        &self.inner.config
    }

    /// Returns the number of entries waiting to be flushed.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.inner.buffered_len()
    }

    /// Returns `true` while the periodic flush timer is running.
    #[must_use]
    pub fn timer_active(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Appends an entry to the buffer, scheduling a flush once it is full.
    pub fn log(&self, entry: ConflictLogEntry) {
        let buffered = self.inner.push(entry);
        if buffered >= self.inner.config.flush_threshold().get() {
            self.schedule_flush();
        }
    }

    /// Persists all buffered entries.
    ///
    /// A missing or corrupt log file is treated as empty. The buffer is only
    /// cleared after the store accepted the write.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] when serialization or the store write fails;
    /// the buffered entries are retained in that case.
    pub async fn flush(&self) -> JournalResult<usize> {
        self.inner.flush_and_rearm().await
    }

    /// Returns the last `limit` persisted entries, oldest first.
    ///
    /// Unreadable storage yields an empty list.
    pub async fn recent(&self, limit: usize) -> Vec<ConflictLogEntry> {
        if limit == 0 {
            return Vec::new();
        }
        let mut entries = match self.inner.store.load().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(?err, "conflict log unreadable; returning no entries");
                return Vec::new();
            }
        };
        if entries.len() > limit {
            let skip = entries.len() - limit;
            entries.drain(..skip);
        }
        entries
    }

    /// Computes statistics over the persisted entries.
    pub async fn stats(&self) -> ConflictStats {
        let entries = self.inner.load_or_empty().await;
        ConflictStats::from_entries(&entries)
    }

    /// Stops the periodic timer and performs a final flush.
    ///
    /// # Errors
    ///
    /// Propagates the error of the final flush.
    pub async fn cleanup(&self) -> JournalResult<usize> {
        self.stop_timer();
        self.inner.flush_and_rearm().await
    }

    fn stop_timer(&self) {
        self.shutdown.store(true, Ordering::Release);
        let handle = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    fn schedule_flush(&self) {
        if self.inner.flush_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            self.inner.flush_scheduled.store(false, Ordering::Release);
            warn!("no tokio runtime available; conflict log flush deferred");
            return;
        };

        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            let threshold = inner.config.flush_threshold().get();
            loop {
                if let Err(err) = inner.flush().await {
                    // Stays scheduled until the timer or an explicit flush succeeds.
                    warn!(?err, "automatic conflict log flush failed");
                    break;
                }
                inner.flush_scheduled.store(false, Ordering::Release);
                // Entries logged while the flush ran may have refilled the buffer.
                if inner.buffered_len() < threshold
                    || inner.flush_scheduled.swap(true, Ordering::AcqRel)
                {
                    break;
                }
            }
        });
    }
}

impl ConflictSink for ConflictLogger {
    fn record(&self, entry: ConflictLogEntry) {
        self.log(entry);
    }
}

impl Drop for ConflictLogger {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

async fn run_flush_timer(inner: Weak<LoggerInner>, shutdown: Arc<AtomicBool>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if let Err(err) = inner.flush_and_rearm().await {
            warn!(?err, "periodic conflict log flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use arbiter_primitives::{Conflict, ConflictType, PerspectiveId, ResolutionStrategy};
    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::store::MemoryEntryStore;

    fn entry(operation: impl Into<String>) -> ConflictLogEntry {
        let ids = vec![
            PerspectiveId::new("security").unwrap(),
            PerspectiveId::new("performance").unwrap(),
        ];
        ConflictLogEntry::new(
            operation,
            vec![Conflict::new(ConflictType::Veto, ids.clone(), "blocked")],
            ids[..1].to_vec(),
            ResolutionStrategy::VetoOverride,
            Duration::from_millis(1),
        )
    }

    fn memory_logger(config: LoggerConfig) -> (ConflictLogger, Arc<MemoryEntryStore>) {
        let store = Arc::new(MemoryEntryStore::new());
        let logger = ConflictLogger::with_store(config, store.clone()).unwrap();
        (logger, store)
    }

    struct FailingStore;

    #[async_trait]
    impl EntryStore for FailingStore {
        async fn load(&self) -> JournalResult<Vec<ConflictLogEntry>> {
            Err(JournalError::backend("read refused"))
        }

        async fn store(&self, _entries: &[ConflictLogEntry]) -> JournalResult<()> {
            Err(JournalError::backend("write refused"))
        }
    }

    #[test]
    fn config_validation() {
        assert!(LoggerConfig::default().validate().is_ok());
        assert!(LoggerConfig::new("").validate().is_err());
        assert!(LoggerConfig::default().with_max_bytes(0).validate().is_err());
        assert!(
            LoggerConfig::default()
                .with_flush_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn logging_without_runtime_keeps_entries_buffered() {
        let config = LoggerConfig::default()
            .with_flush_threshold(NonZeroUsize::new(1).unwrap());
        let (logger, _store) = memory_logger(config);
        assert!(!logger.timer_active());

        logger.log(entry("deploy"));
        logger.log(entry("deploy"));
        assert_eq!(logger.buffered_len(), 2);
    }

    #[tokio::test]
    async fn explicit_flush_persists_and_clears_buffer() {
        let (logger, store) = memory_logger(LoggerConfig::default().without_timer());
        logger.log(entry("one"));
        logger.log(entry("two"));

        assert_eq!(logger.flush().await.unwrap(), 2);
        assert_eq!(logger.buffered_len(), 0);
        assert_eq!(store.snapshot().await.len(), 2);
        assert_eq!(logger.flush().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn buffer_auto_flushes_at_threshold() {
        let config = LoggerConfig::default()
            .without_timer()
            .with_flush_threshold(NonZeroUsize::new(10).unwrap());
        let (logger, store) = memory_logger(config);

        for index in 0..10 {
            logger.log(entry(format!("op-{index}")));
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.snapshot().await.len() < 10 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("auto flush did not complete");
        assert_eq!(logger.buffered_len(), 0);
    }

    #[tokio::test]
    async fn failed_write_retains_buffer() {
        let logger = ConflictLogger::with_store(
            LoggerConfig::default().without_timer(),
            Arc::new(FailingStore),
        )
        .unwrap();
        logger.log(entry("one"));

        assert!(logger.flush().await.is_err());
        assert_eq!(logger.buffered_len(), 1);
        assert!(logger.recent(5).await.is_empty());
        assert_eq!(logger.stats().await.total, 0);
    }

    struct FlakyStore {
        healthy: AtomicBool,
        writes: AtomicUsize,
        inner: MemoryEntryStore,
    }

    #[async_trait]
    impl EntryStore for FlakyStore {
        async fn load(&self) -> JournalResult<Vec<ConflictLogEntry>> {
            self.inner.load().await
        }

        async fn store(&self, entries: &[ConflictLogEntry]) -> JournalResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(JournalError::backend("write refused"));
            }
            self.inner.store(entries).await
        }
    }

    #[tokio::test]
    async fn failed_auto_flush_waits_for_explicit_flush() {
        let store = Arc::new(FlakyStore {
            healthy: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            inner: MemoryEntryStore::new(),
        });
        let config = LoggerConfig::default()
            .without_timer()
            .with_flush_threshold(NonZeroUsize::new(1).unwrap());
        let logger = ConflictLogger::with_store(config, store.clone()).unwrap();

        logger.log(entry("one"));
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.writes.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("auto flush was not attempted");

        for operation in ["two", "three", "four"] {
            logger.log(entry(operation));
        }
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(logger.buffered_len(), 4);

        store.healthy.store(true, Ordering::SeqCst);
        assert_eq!(logger.flush().await.unwrap(), 4);

        logger.log(entry("five"));
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.inner.snapshot().await.len() < 5 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("auto flush was not re-armed");
        assert_eq!(logger.buffered_len(), 0);
    }

    #[tokio::test]
    async fn rotation_keeps_most_recent_entries() {
        let config = LoggerConfig::default()
            .without_timer()
            .with_max_bytes(1)
            .with_retain_entries(NonZeroUsize::new(3).unwrap());
        let (logger, store) = memory_logger(config);

        for index in 0..5 {
            logger.log(entry(format!("op-{index}")));
        }
        logger.flush().await.unwrap();

        let persisted = store.snapshot().await;
        let operations: Vec<_> = persisted.iter().map(|e| e.operation.as_str()).collect();
        assert_eq!(operations, ["op-2", "op-3", "op-4"]);
    }

    #[tokio::test]
    async fn recent_returns_tail_in_order() {
        let (logger, _store) = memory_logger(LoggerConfig::default().without_timer());
        for index in 0..4 {
            logger.log(entry(format!("op-{index}")));
        }
        logger.flush().await.unwrap();

        let recent = logger.recent(2).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].operation, "op-2");
        assert_eq!(recent[1].operation, "op-3");
        assert!(logger.recent(0).await.is_empty());
        assert_eq!(logger.recent(10).await.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flushes_periodically() {
        let config = LoggerConfig::default().with_flush_interval(Duration::from_secs(30));
        let (logger, store) = memory_logger(config);
        assert!(logger.timer_active());

        logger.log(entry("late"));
        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;

        assert_eq!(store.snapshot().await.len(), 1);
        assert_eq!(logger.buffered_len(), 0);
    }

    #[tokio::test]
    async fn cleanup_cancels_timer_and_flushes() {
        let (logger, store) = memory_logger(LoggerConfig::default());
        assert!(logger.timer_active());
        logger.log(entry("final"));

        assert_eq!(logger.cleanup().await.unwrap(), 1);
        assert!(!logger.timer_active());
        assert_eq!(store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_is_replaced_on_flush() {
        let mut path = std::env::temp_dir();
        path.push(format!("conflict-log-{}.json", Uuid::new_v4()));
        std::fs::write(&path, b"[{\"broken\"").unwrap();

        let logger = ConflictLogger::open(LoggerConfig::new(&path).without_timer())
            .await
            .unwrap();
        assert!(logger.recent(5).await.is_empty());

        logger.log(entry("recovered"));
        assert_eq!(logger.flush().await.unwrap(), 1);
        let recent = logger.recent(5).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].operation, "recovered");

        let _ = std::fs::remove_file(path);
    }
}
