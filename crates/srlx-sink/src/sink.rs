//! Uploading sink
//!
//! [`IndexSink`] accepts items into a bounded queue and persists them with a
//! bounded pool of upload jobs. Every accepted item submits exactly one job;
//! the job takes whatever item is at the head of the queue when it gets a
//! pool slot. Jobs are tracked from submission until their completion
//! callback runs, and `stop()` cancels the ones that have not started yet.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::schema::{PersistableItem, RegisteredSchema, SchemaId};
use crate::store::IndexStore;
use srlx_core::{RelationRecord, Result, SinkConfig, SrlxError};

// ============================================================================
// Errors and state
// ============================================================================

/// Sink error types
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Invalid sink state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        expected: SinkState,
        actual: SinkState,
    },

    #[error("Schema mismatch: sink accepts {expected}, got {actual}")]
    SchemaMismatch { expected: SchemaId, actual: SchemaId },

    #[error("Sink queue full after waiting {0:?}")]
    QueueFull(Duration),

    #[error("Sink {0} is not started")]
    NotStarted(String),

    #[error("Upload job cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Store(String),
}

impl From<SinkError> for SrlxError {
    fn from(err: SinkError) -> Self {
        Self::SinkError(err.to_string())
    }
}

/// Sink lifecycle, only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SinkState {
    Inited,
    Started,
    Stopped,
}

/// Snapshot of sink counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub submitted: u64,
    pub persisted: u64,
    pub empty_runs: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub shutdowns: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    persisted: AtomicU64,
    empty_runs: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    shutdowns: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SinkStats {
        SinkStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            empty_runs: self.empty_runs.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            shutdowns: self.shutdowns.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Sink trait
// ============================================================================

/// Trait for sinks receiving persistable items
#[async_trait]
pub trait ItemSink: Send + Sync {
    /// Schema this sink accepts
    fn schema(&self) -> &SchemaId;

    /// Build the item for a record with this sink's registered constructor
    fn make_item(&self, record: &RelationRecord) -> PersistableItem;

    async fn start(&self) -> Result<()>;

    /// Stop the sink; calling it again is a no-op
    async fn stop(&self) -> Result<()>;

    /// Queue an item for persistence
    async fn sink_item(&self, item: PersistableItem) -> Result<()>;

    /// Wait until every submitted job has completed
    async fn flush(&self) -> Result<()>;
}

// ============================================================================
// Index sink
// ============================================================================

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

struct TrackedJob {
    phase: Arc<AtomicU8>,
    handle: JoinHandle<()>,
}

enum JobOutcome {
    Persisted(String),
    Empty,
}

struct SinkInner {
    name: String,
    schema: RegisteredSchema,
    store: Arc<dyn IndexStore>,
    enqueue_timeout: Duration,
    state: Mutex<SinkState>,
    sender: mpsc::Sender<PersistableItem>,
    receiver: Mutex<mpsc::Receiver<PersistableItem>>,
    pool: Arc<Semaphore>,
    jobs: Mutex<HashMap<u64, TrackedJob>>,
    next_job: AtomicU64,
    idle: Notify,
    counters: Counters,
}

/// Sink persisting items of one schema into an index store
#[derive(Clone)]
pub struct IndexSink {
    inner: Arc<SinkInner>,
}

impl IndexSink {
    /// Create a new sink for a registered schema
    pub fn new(schema: RegisteredSchema, store: Arc<dyn IndexStore>, config: &SinkConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));

        Self {
            inner: Arc::new(SinkInner {
                name: schema.id().to_string(),
                schema,
                store,
                enqueue_timeout: config.enqueue_timeout(),
                state: Mutex::new(SinkState::Inited),
                sender,
                receiver: Mutex::new(receiver),
                pool: Arc::new(Semaphore::new(config.workers.max(1))),
                jobs: Mutex::new(HashMap::new()),
                next_job: AtomicU64::new(0),
                idle: Notify::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Sink name, `index.mapping`
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> SinkState {
        *self.inner.state.lock()
    }

    pub fn stats(&self) -> SinkStats {
        self.inner.counters.snapshot()
    }

    /// Number of jobs submitted and not yet completed
    pub fn pending_jobs(&self) -> usize {
        self.inner.jobs.lock().len()
    }

    fn submit_job(&self) {
        let inner = &self.inner;
        let job_id = inner.next_job.fetch_add(1, Ordering::Relaxed);
        let phase = Arc::new(AtomicU8::new(QUEUED));
        inner.counters.submitted.fetch_add(1, Ordering::Relaxed);

        // Hold the map while spawning so the completion callback cannot
        // run before the job is tracked.
        let mut jobs = inner.jobs.lock();
        let handle = tokio::spawn({
            let inner = Arc::clone(inner);
            let phase = Arc::clone(&phase);
            async move {
                let outcome = inner.run_job(&phase).await;
                inner.complete(job_id, outcome);
            }
        });
        jobs.insert(job_id, TrackedJob { phase, handle });
    }
}

impl SinkInner {
    async fn run_job(&self, phase: &AtomicU8) -> std::result::Result<JobOutcome, SinkError> {
        let _permit = Arc::clone(&self.pool)
            .acquire_owned()
            .await
            .map_err(|_| SinkError::Cancelled)?;

        if phase
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SinkError::Cancelled);
        }

        let item = self.receiver.lock().try_recv().ok();
        let Some(item) = item else {
            return Ok(JobOutcome::Empty);
        };

        self.store
            .save(item)
            .await
            .map(JobOutcome::Persisted)
            .map_err(|e| SinkError::Store(e.to_string()))
    }

    fn complete(&self, job_id: u64, outcome: std::result::Result<JobOutcome, SinkError>) {
        let counter = match &outcome {
            Ok(JobOutcome::Persisted(_)) => &self.counters.persisted,
            Ok(JobOutcome::Empty) => &self.counters.empty_runs,
            Err(SinkError::Cancelled) => &self.counters.cancelled,
            Err(_) => &self.counters.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        {
            let mut jobs = self.jobs.lock();
            jobs.remove(&job_id);
            if jobs.is_empty() {
                self.idle.notify_waiters();
            }
        }

        if *self.state.lock() != SinkState::Started {
            return;
        }

        match outcome {
            Ok(JobOutcome::Persisted(id)) => debug!(sink = %self.name, id = %id, "persisted item"),
            Ok(JobOutcome::Empty) => debug!(sink = %self.name, "sink queue empty"),
            Err(SinkError::Cancelled) => debug!(sink = %self.name, "upload job cancelled"),
            Err(e) => error!(sink = %self.name, error = %e, "failed to persist item"),
        }
    }
}

#[async_trait]
impl ItemSink for IndexSink {
    fn schema(&self) -> &SchemaId {
        self.inner.schema.id()
    }

    fn make_item(&self, record: &RelationRecord) -> PersistableItem {
        self.inner.schema.build(record)
    }

    async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        let current = self.state();
        if current != SinkState::Inited {
            return Err(SinkError::InvalidState {
                expected: SinkState::Inited,
                actual: current,
            }
            .into());
        }

        inner.store.init_schema(inner.schema.schema()).await?;

        {
            let mut state = inner.state.lock();
            if *state != SinkState::Inited {
                return Err(SinkError::InvalidState {
                    expected: SinkState::Inited,
                    actual: *state,
                }
                .into());
            }
            *state = SinkState::Started;
        }

        info!(sink = %inner.name, store = inner.store.name(), "sink started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            if *state == SinkState::Stopped {
                return Ok(());
            }
            *state = SinkState::Stopped;
        }

        let jobs: Vec<TrackedJob> = inner.jobs.lock().drain().map(|(_, job)| job).collect();
        let cancelled = jobs
            .iter()
            .filter(|job| {
                job.phase
                    .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            })
            .count();

        inner.pool.close();
        for job in jobs {
            if let Err(e) = job.handle.await {
                warn!(sink = %inner.name, error = %e, "upload job did not finish cleanly");
            }
        }
        inner.idle.notify_waiters();
        inner.counters.shutdowns.fetch_add(1, Ordering::Relaxed);

        info!(sink = %inner.name, cancelled, "sink stopped");
        Ok(())
    }

    async fn sink_item(&self, item: PersistableItem) -> Result<()> {
        let inner = &self.inner;
        if item.schema != *inner.schema.id() {
            return Err(SinkError::SchemaMismatch {
                expected: inner.schema.id().clone(),
                actual: item.schema,
            }
            .into());
        }
        if self.state() != SinkState::Started {
            return Err(SinkError::NotStarted(inner.name.clone()).into());
        }

        inner
            .sender
            .send_timeout(item, inner.enqueue_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => SinkError::QueueFull(inner.enqueue_timeout),
                SendTimeoutError::Closed(_) => SinkError::NotStarted(inner.name.clone()),
            })?;

        self.submit_job();
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.jobs.lock().is_empty() {
                return Ok(());
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{relation_faq_schema, relation_item, ModelSchema};
    use crate::store::MemoryStore;
    use tokio_test::{assert_err, assert_ok};

    fn config(workers: usize, capacity: usize, timeout_ms: u64) -> SinkConfig {
        SinkConfig {
            workers,
            queue_capacity: capacity,
            enqueue_timeout_ms: timeout_ms,
        }
    }

    fn registered() -> RegisteredSchema {
        RegisteredSchema::new(relation_faq_schema(), relation_item)
    }

    fn record(n: usize) -> RelationRecord {
        RelationRecord::new(format!("left{n}"), "right", "relate", "A sentence")
    }

    /// Store whose saves wait until the gate hands out permits
    struct GatedStore {
        gate: Semaphore,
        inner: MemoryStore,
    }

    #[async_trait]
    impl IndexStore for GatedStore {
        async fn init_schema(&self, schema: &ModelSchema) -> Result<()> {
            self.inner.init_schema(schema).await
        }

        async fn save(&self, item: PersistableItem) -> Result<String> {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| SrlxError::StoreError(e.to_string()))?;
            permit.forget();
            self.inner.save(item).await
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    struct FailingStore;

    #[async_trait]
    impl IndexStore for FailingStore {
        async fn init_schema(&self, _schema: &ModelSchema) -> Result<()> {
            Ok(())
        }

        async fn save(&self, _item: PersistableItem) -> Result<String> {
            Err(SrlxError::StoreError("index unavailable".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_sink_persists_every_item_once() {
        let store = Arc::new(MemoryStore::new());
        let sink = IndexSink::new(registered(), store.clone(), &config(3, 100, 1000));
        assert_ok!(sink.start().await);

        for n in 0..50 {
            let item = sink.make_item(&record(n));
            assert_ok!(sink.sink_item(item).await);
        }
        assert_ok!(sink.flush().await);

        let id = relation_faq_schema().id;
        let mut lefts: Vec<String> = store
            .documents(&id)
            .iter()
            .map(|doc| doc["leftEntity"].as_str().unwrap_or_default().to_string())
            .collect();
        lefts.sort();
        lefts.dedup();
        assert_eq!(lefts.len(), 50);

        let stats = sink.stats();
        assert_eq!(stats.submitted, 50);
        assert_eq!(stats.persisted, 50);
        assert_eq!(stats.failed, 0);
        assert_eq!(sink.pending_jobs(), 0);

        assert_ok!(sink.stop().await);
    }

    #[tokio::test]
    async fn test_sink_item_requires_started() {
        let sink = IndexSink::new(registered(), Arc::new(MemoryStore::new()), &config(1, 10, 10));
        let item = sink.make_item(&record(0));

        let err = sink.sink_item(item.clone()).await.unwrap_err();
        assert!(err.to_string().contains("not started"));

        sink.start().await.unwrap();
        sink.stop().await.unwrap();
        assert_err!(sink.sink_item(item).await);
    }

    #[tokio::test]
    async fn test_schema_mismatch() {
        let sink = IndexSink::new(registered(), Arc::new(MemoryStore::new()), &config(1, 10, 10));
        sink.start().await.unwrap();

        let item = PersistableItem::new(SchemaId::new("other", "faq"));
        let err = sink.sink_item(item).await.unwrap_err();
        assert!(err.to_string().contains("Schema mismatch"));
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let sink = IndexSink::new(registered(), Arc::new(MemoryStore::new()), &config(1, 10, 10));
        sink.start().await.unwrap();

        let err = sink.start().await.unwrap_err();
        assert!(err.to_string().contains("Invalid sink state"));
    }

    #[tokio::test]
    async fn test_stop_twice_shuts_down_once() {
        let sink = IndexSink::new(registered(), Arc::new(MemoryStore::new()), &config(1, 10, 10));
        sink.start().await.unwrap();

        assert_ok!(sink.stop().await);
        assert_ok!(sink.stop().await);
        assert_eq!(sink.state(), SinkState::Stopped);
        assert_eq!(sink.stats().shutdowns, 1);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let sink = IndexSink::new(registered(), Arc::new(MemoryStore::new()), &config(1, 10, 10));
        assert_ok!(sink.stop().await);
        assert_err!(sink.start().await);
    }

    #[tokio::test]
    async fn test_queue_full_is_an_error() {
        let store = Arc::new(GatedStore {
            gate: Semaphore::new(0),
            inner: MemoryStore::new(),
        });
        let sink = IndexSink::new(registered(), store.clone(), &config(1, 1, 20));
        sink.start().await.unwrap();

        // First item: its job takes it and blocks in the store
        sink.sink_item(sink.make_item(&record(0))).await.unwrap();
        while sink.inner.receiver.lock().len() > 0 {
            tokio::task::yield_now().await;
        }
        // Second item fills the queue, third times out
        sink.sink_item(sink.make_item(&record(1))).await.unwrap();
        let err = sink.sink_item(sink.make_item(&record(2))).await.unwrap_err();
        assert!(err.to_string().contains("queue full"));

        store.gate.add_permits(10);
        sink.flush().await.unwrap();
        assert_eq!(store.inner.total(), 2);
    }

    #[tokio::test]
    async fn test_stop_cancels_waiting_jobs() {
        let store = Arc::new(GatedStore {
            gate: Semaphore::new(0),
            inner: MemoryStore::new(),
        });
        let sink = IndexSink::new(registered(), store.clone(), &config(1, 10, 100));
        sink.start().await.unwrap();

        for n in 0..4 {
            sink.sink_item(sink.make_item(&record(n))).await.unwrap();
        }
        // Wait for one job to hold the only pool slot
        while sink.inner.receiver.lock().len() > 3 {
            tokio::task::yield_now().await;
        }

        let stopper = tokio::spawn({
            let sink = sink.clone();
            async move { sink.stop().await }
        });
        while sink.state() != SinkState::Stopped {
            tokio::task::yield_now().await;
        }
        store.gate.add_permits(10);
        stopper.await.unwrap().unwrap();

        let stats = sink.stats();
        assert_eq!(stats.persisted, 1);
        assert_eq!(stats.cancelled, 3);
        assert_eq!(store.inner.total(), 1);
        assert_eq!(sink.pending_jobs(), 0);
    }

    #[tokio::test]
    async fn test_store_failures_are_counted() {
        let sink = IndexSink::new(registered(), Arc::new(FailingStore), &config(2, 10, 100));
        sink.start().await.unwrap();

        for n in 0..3 {
            assert_ok!(sink.sink_item(sink.make_item(&record(n))).await);
        }
        sink.flush().await.unwrap();

        let stats = sink.stats();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.persisted, 0);
    }

    #[tokio::test]
    async fn test_flush_without_jobs() {
        let sink = IndexSink::new(registered(), Arc::new(MemoryStore::new()), &config(1, 10, 10));
        assert_ok!(sink.flush().await);
    }
}
