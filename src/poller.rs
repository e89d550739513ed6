//! Watermark-tracking poll loop.
//!
//! [`ChangePoller`] owns the producer side of the pipeline: it initializes
//! the watermark, runs the poll cycle as a long-lived task, and terminates
//! by marking the change queue complete on cancellation or failure so the
//! consumer can always drain and exit cleanly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::assemble::assemble_batch;
use crate::error::{ChangeStreamError, Result};
use crate::metrics::{PollerMetrics, PollerMetricsSnapshot};
use crate::position::Lsn;
use crate::queue::{change_queue, BatchReceiver, BatchSender, QueueConfig, SendError};
use crate::retry::RetryPolicy;
use crate::source::{ChangeSource, RowFilter};

/// Poll loop configuration.
///
/// Connection parameters live with the [`ChangeSource`] implementation;
/// this covers only what the loop itself needs.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Capture instances to watch, in iteration order
    pub tables: Vec<String>,
    /// Poll interval in milliseconds (default: 1000)
    pub poll_interval_ms: u64,
    /// Row filter mode for fetches (default: before-image updates)
    pub filter: RowFilter,
    /// Response to transient source failures (default: fail-stop)
    pub retry: RetryPolicy,
    /// Hand-off queue capacity and overflow behavior
    pub queue: QueueConfig,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            poll_interval_ms: 1000,
            filter: RowFilter::AllUpdateOld,
            retry: RetryPolicy::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl PollerConfig {
    /// Create a new builder for PollerConfig
    pub fn builder() -> PollerConfigBuilder {
        PollerConfigBuilder::default()
    }

    fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(ChangeStreamError::config("At least one table is required"));
        }
        if self.tables.iter().any(|t| t.is_empty()) {
            return Err(ChangeStreamError::config("Table names must be non-empty"));
        }
        if self.poll_interval_ms < 50 {
            return Err(ChangeStreamError::config(
                "Poll interval must be >= 50ms to avoid excessive load",
            ));
        }
        if self.queue.capacity == 0 {
            return Err(ChangeStreamError::config("Queue capacity must be > 0"));
        }
        Ok(())
    }
}

/// Builder for PollerConfig
#[derive(Default)]
pub struct PollerConfigBuilder {
    config: PollerConfig,
}

impl PollerConfigBuilder {
    /// Add a capture instance to watch
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.config.tables.push(table.into());
        self
    }

    /// Set all capture instances at once
    pub fn tables(mut self, tables: Vec<String>) -> Self {
        self.config.tables = tables;
        self
    }

    /// Set the poll interval in milliseconds (default: 1000ms)
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the row filter mode for fetches
    pub fn filter(mut self, filter: RowFilter) -> Self {
        self.config.filter = filter;
        self
    }

    /// Set the retry policy for transient source failures
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the hand-off queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue.capacity = capacity;
        self
    }

    /// Set the full-queue policy
    pub fn overflow_policy(mut self, policy: crate::queue::OverflowPolicy) -> Self {
        self.config.queue.policy = policy;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<PollerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Producer service owning the poll loop lifecycle.
///
/// `start()` initializes the watermark and spawns the loop,
/// `request_stop()` signals cooperative cancellation, `join()` awaits the
/// terminal state. The watermark is owned and mutated exclusively by the
/// loop task; the only shared state with the consumer is the queue.
pub struct ChangePoller<S> {
    source: Option<S>,
    config: PollerConfig,
    sender: Option<BatchSender>,
    receiver: Option<BatchReceiver>,
    token: CancellationToken,
    handle: Option<JoinHandle<Result<()>>>,
    metrics: Arc<PollerMetrics>,
}

impl<S: ChangeSource + 'static> ChangePoller<S> {
    /// Create a new poller over a change source.
    pub fn new(source: S, config: PollerConfig) -> Self {
        let (sender, receiver) = change_queue(config.queue.clone());
        Self {
            source: Some(source),
            config,
            sender: Some(sender),
            receiver: Some(receiver),
            token: CancellationToken::new(),
            handle: None,
            metrics: PollerMetrics::new(),
        }
    }

    /// Take the batch receiver (can only be called once)
    pub fn take_batch_receiver(&mut self) -> Option<BatchReceiver> {
        self.receiver.take()
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> PollerMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The cancellation token observed by the poll loop.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initialize the watermark and spawn the poll loop.
    ///
    /// A change source failure during watermark initialization is fatal:
    /// the loop is never spawned, the queue is completed so a consumer
    /// does not hang, and the error is returned.
    pub async fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(ChangeStreamError::invalid_state("poll loop already started"));
        }
        let mut source = self
            .source
            .take()
            .ok_or_else(|| ChangeStreamError::invalid_state("change source not available"))?;
        let sender = self
            .sender
            .take()
            .ok_or_else(|| ChangeStreamError::invalid_state("batch sender not available"))?;

        let watermark = match initialize_watermark(&mut source).await {
            Ok(lsn) => lsn,
            Err(e) => {
                error!("watermark initialization failed: {}", e);
                sender.complete();
                return Err(e);
            }
        };
        info!("starting poll loop from '{}'", watermark);

        let config = self.config.clone();
        let token = self.token.clone();
        let metrics = self.metrics.clone();
        self.handle = Some(tokio::spawn(run_poll_loop(
            source, watermark, config, sender, token, metrics,
        )));
        Ok(())
    }

    /// Request cooperative shutdown.
    ///
    /// Honored at the next checkpoint (cycle start or any wait); in-flight
    /// source calls are not interrupted, and any batch fetched before the
    /// cancellation is observed is still delivered.
    pub fn request_stop(&self) {
        self.token.cancel();
    }

    /// Await the poll loop's terminal state.
    ///
    /// Returns `Ok(())` for graceful cancellation, the terminal error for
    /// a failed loop.
    pub async fn join(&mut self) -> Result<()> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| ChangeStreamError::invalid_state("poll loop not started"))?;
        handle
            .await
            .map_err(|e| ChangeStreamError::invalid_state(format!("poll loop panicked: {}", e)))?
    }
}

/// Compute the starting low-bound: the position immediately following the
/// source's current maximum.
async fn initialize_watermark<S: ChangeSource>(source: &mut S) -> Result<Lsn> {
    let max = source.current_max_position().await?;
    source.next_position(&max).await
}

async fn run_poll_loop<S: ChangeSource>(
    mut source: S,
    mut watermark: Lsn,
    config: PollerConfig,
    sender: BatchSender,
    token: CancellationToken,
    metrics: Arc<PollerMetrics>,
) -> Result<()> {
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let mut retry = config.retry.state();

    let result = loop {
        // Checkpoint: cycle start
        if token.is_cancelled() {
            break Ok(());
        }

        match poll_once(&mut source, &mut watermark, &config, &sender, &metrics).await {
            Ok(()) => retry.reset(),
            Err(e) if e.is_retriable() => match retry.next_delay() {
                Some(delay) => {
                    warn!(
                        "transient source failure (attempt {}), retrying in {:?}: {}",
                        retry.attempt(),
                        delay,
                        e
                    );
                    tokio::select! {
                        _ = token.cancelled() => break Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
                None => {
                    error!("change source failure: {}", e);
                    break Err(e);
                }
            },
            Err(e) => {
                error!("change source failure: {}", e);
                break Err(e);
            }
        }

        // Checkpoint: inter-cycle wait
        tokio::select! {
            _ = token.cancelled() => break Ok(()),
            _ = tokio::time::sleep(poll_interval) => {}
        }
    };

    // Both terminal states perform the same exit action: mark the queue
    // complete so the consumer drains and exits instead of hanging.
    sender.complete();
    if result.is_ok() {
        info!("poll loop cancelled, queue completed");
    }
    result
}

/// One poll cycle: measure the high bound, fetch and assemble changes,
/// deliver the batch, advance the watermark.
async fn poll_once<S: ChangeSource>(
    source: &mut S,
    watermark: &mut Lsn,
    config: &PollerConfig,
    sender: &BatchSender,
    metrics: &PollerMetrics,
) -> Result<()> {
    let poll_start = Instant::now();
    let high = source.current_max_position().await?;

    if *watermark > high {
        metrics.record_poll(poll_start.elapsed(), 0);
        info!("no changes since last poll '{}'", watermark);
        return Ok(());
    }

    info!("polling from '{}' to '{}'", watermark, high);
    let mut per_table = Vec::with_capacity(config.tables.len());
    for table in &config.tables {
        let rows = source
            .fetch_changes(table, watermark, &high, config.filter)
            .await?;
        debug!("fetched {} rows from '{}'", rows.len(), table);
        per_table.push(rows);
    }

    let batch = assemble_batch(per_table);
    metrics.record_poll(poll_start.elapsed(), batch.len());

    if !batch.is_empty() {
        sender.send(batch).await.map_err(|e| match e {
            SendError::Completed => ChangeStreamError::queue("send after completion"),
            SendError::Full => ChangeStreamError::queue("queue full"),
        })?;
        metrics.record_batch();
    }

    // Advance only because a poll was performed; skipped cycles leave the
    // watermark untouched.
    *watermark = source.next_position(&high).await?;
    Ok(())
}
