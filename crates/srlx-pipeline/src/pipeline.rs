//! Extraction pipeline
//!
//! Source batches are chunked and handed to a bounded pool of workers.
//! Workers run extraction on the blocking thread pool, turn every record
//! into a persistable item and offer it to the hand-off queue. A single
//! consumer drains the queue into the sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::queue::{handoff_queue, HandoffReceiver, HandoffSender};
use crate::source::DataSource;
use srlx_core::{PipelineConfig, Result, SrlxError};
use srlx_extractor::RelationExtractor;
use srlx_sink::{ItemSink, PersistableItem};

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Default)]
struct PipelineStats {
    batches: AtomicU64,
    items_processed: AtomicU64,
    blank_skipped: AtomicU64,
    failed: AtomicU64,
    records_formed: AtomicU64,
    records_dropped: AtomicU64,
    records_forwarded: AtomicU64,
    sink_errors: AtomicU64,
}

impl PipelineStats {
    fn report(&self, elapsed: Duration) -> PipelineReport {
        PipelineReport {
            batches: self.batches.load(Ordering::Relaxed),
            items_processed: self.items_processed.load(Ordering::Relaxed),
            blank_skipped: self.blank_skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            records_formed: self.records_formed.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            records_forwarded: self.records_forwarded.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub batches: u64,
    pub items_processed: u64,
    pub blank_skipped: u64,
    pub failed: u64,
    pub records_formed: u64,
    pub records_dropped: u64,
    pub records_forwarded: u64,
    pub sink_errors: u64,
    pub elapsed: Duration,
}

impl std::fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Batches:            {}", self.batches)?;
        writeln!(f, "Items processed:    {}", self.items_processed)?;
        writeln!(f, "Blank items:        {}", self.blank_skipped)?;
        writeln!(f, "Failed items:       {}", self.failed)?;
        writeln!(f, "Records formed:     {}", self.records_formed)?;
        writeln!(f, "Records dropped:    {}", self.records_dropped)?;
        writeln!(f, "Records forwarded:  {}", self.records_forwarded)?;
        writeln!(f, "Sink errors:        {}", self.sink_errors)?;
        write!(f, "Elapsed:            {:.2}s", self.elapsed.as_secs_f64())
    }
}

// ============================================================================
// Workers and consumer
// ============================================================================

#[derive(Clone)]
struct WorkerContext {
    extractor: Arc<dyn RelationExtractor>,
    sink: Arc<dyn ItemSink>,
    handoff: HandoffSender<PersistableItem>,
    stats: Arc<PipelineStats>,
}

impl WorkerContext {
    async fn process_batch(&self, batch: Vec<String>) {
        self.stats.batches.fetch_add(1, Ordering::Relaxed);

        for item in batch {
            if item.trim().is_empty() {
                self.stats.blank_skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.process_item(item).await;
        }
    }

    async fn process_item(&self, item: String) {
        let extractor = Arc::clone(&self.extractor);
        let outcome = tokio::task::spawn_blocking(move || extractor.extract(&item)).await;

        let records = match outcome {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "extraction failed, skipping item");
                return;
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "extraction worker panicked, skipping item");
                return;
            }
        };

        self.stats.items_processed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .records_formed
            .fetch_add(records.len() as u64, Ordering::Relaxed);

        for record in records {
            debug!(relation = %record, "formed relation");
            let item = self.sink.make_item(&record);
            if !self.handoff.offer(item).await {
                self.stats.records_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(relation = %record, "hand-off queue full, dropping record");
            }
        }
    }
}

async fn run_workers(
    batches: BoxStream<'static, Vec<String>>,
    context: WorkerContext,
    chunk_size: usize,
    workers: usize,
) {
    batches
        .chunks(chunk_size.max(1))
        .for_each_concurrent(workers.max(1), |chunk| {
            let context = context.clone();
            async move {
                for batch in chunk {
                    context.process_batch(batch).await;
                }
            }
        })
        .await;

    debug!("source exhausted");
}

async fn run_consumer(
    mut handoff: HandoffReceiver<PersistableItem>,
    sink: Arc<dyn ItemSink>,
    stats: Arc<PipelineStats>,
) {
    while let Some(item) = handoff.recv().await {
        match sink.sink_item(item).await {
            Ok(()) => {
                stats.records_forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.sink_errors.fetch_add(1, Ordering::Relaxed);
                error!(sink = %sink.schema(), error = %e, "failed to forward item to sink");
            }
        }
    }

    debug!("hand-off queue drained");
}

// ============================================================================
// Pipeline
// ============================================================================

struct Running {
    workers: JoinHandle<()>,
    consumer: JoinHandle<()>,
    started: Instant,
}

/// Concurrent extraction pipeline from a data source into a sink
pub struct ExtractionPipeline {
    extractor: Arc<dyn RelationExtractor>,
    source: Option<Arc<dyn DataSource>>,
    sink: Option<Arc<dyn ItemSink>>,
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
    running: Option<Running>,
}

impl ExtractionPipeline {
    /// Create a new pipeline around an extractor
    pub fn new(extractor: Arc<dyn RelationExtractor>, config: PipelineConfig) -> Self {
        Self {
            extractor,
            source: None,
            sink: None,
            config,
            stats: Arc::new(PipelineStats::default()),
            running: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ItemSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn parts(&self) -> Result<(Arc<dyn DataSource>, Arc<dyn ItemSink>)> {
        let source = self
            .source
            .clone()
            .ok_or_else(|| SrlxError::ConfigError("Pipeline has no data source".to_string()))?;
        let sink = self
            .sink
            .clone()
            .ok_or_else(|| SrlxError::ConfigError("Pipeline has no sink".to_string()))?;
        Ok((source, sink))
    }

    /// Start the source, the sink, the worker pool and the consumer
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(SrlxError::ConfigError("Pipeline is already running".to_string()));
        }
        let (source, sink) = self.parts()?;

        source.start().await?;
        if let Err(e) = sink.start().await {
            if let Err(stop_err) = source.stop().await {
                warn!(error = %stop_err, "failed to stop source after sink start failure");
            }
            return Err(e);
        }

        let (handoff, receiver) =
            handoff_queue(self.config.queue_capacity, self.config.enqueue_timeout());

        let context = WorkerContext {
            extractor: Arc::clone(&self.extractor),
            sink: Arc::clone(&sink),
            handoff,
            stats: Arc::clone(&self.stats),
        };

        let workers = tokio::spawn(run_workers(
            source.batches(),
            context,
            self.config.chunk_size,
            self.config.workers,
        ));
        let consumer = tokio::spawn(run_consumer(receiver, sink, Arc::clone(&self.stats)));

        info!(
            workers = self.config.workers,
            chunk_size = self.config.chunk_size,
            queue_capacity = self.config.queue_capacity,
            "extraction pipeline started"
        );

        self.running = Some(Running {
            workers,
            consumer,
            started: Instant::now(),
        });
        Ok(())
    }

    /// Wait for the source to be exhausted and everything to be persisted
    pub async fn join(&mut self) -> Result<PipelineReport> {
        let running = self
            .running
            .take()
            .ok_or_else(|| SrlxError::ConfigError("Pipeline is not running".to_string()))?;
        let (source, sink) = self.parts()?;

        running
            .workers
            .await
            .map_err(|e| SrlxError::ExtractionError(format!("Worker pool failed: {e}")))?;

        // Workers dropped their senders, so the consumer ends once the queue is empty
        running
            .consumer
            .await
            .map_err(|e| SrlxError::SinkError(format!("Consumer failed: {e}")))?;

        sink.flush().await?;
        source.stop().await?;

        let report = self.stats.report(running.started.elapsed());
        info!(
            items = report.items_processed,
            records = report.records_formed,
            forwarded = report.records_forwarded,
            dropped = report.records_dropped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "extraction pipeline finished"
        );
        Ok(report)
    }

    /// Start, join and stop the sink; the sink is stopped even if joining fails
    pub async fn run(&mut self) -> Result<PipelineReport> {
        self.start().await?;
        let outcome = self.join().await;

        let (source, sink) = self.parts()?;
        match outcome {
            Ok(report) => {
                sink.stop().await?;
                Ok(report)
            }
            Err(e) => {
                if let Err(stop_err) = source.stop().await {
                    warn!(error = %stop_err, "failed to stop source");
                }
                if let Err(stop_err) = sink.stop().await {
                    warn!(error = %stop_err, "failed to stop sink");
                }
                Err(e)
            }
        }
    }

    /// Counters of the current or last run
    pub fn report(&self) -> PipelineReport {
        let elapsed = self
            .running
            .as_ref()
            .map(|running| running.started.elapsed())
            .unwrap_or_default();
        self.stats.report(elapsed)
    }
}
