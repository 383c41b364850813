//! Collector loop: fetch, store, sleep.
//!
//! One loop instance is the sole writer of the store. Fetch and store
//! failures are logged and counted; the loop keeps its cadence until it is
//! cancelled or a bounded run completes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::collector::{CollectorError, CollectorState, SampleSink, TelemetrySource};

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Loop cadence and optional bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Sleep between cycles.
    pub interval: Duration,
    /// Number of attempted cycles before stopping (`None` = unbounded).
    pub limit: Option<u64>,
}

impl LoopConfig {
    /// Create an unbounded loop configuration.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            limit: None,
        }
    }

    /// Stop after `limit` attempted cycles.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Live statistics of a collector loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectorStatus {
    /// Source identifier.
    pub source: String,
    /// Current lifecycle state.
    pub state: CollectorState,
    /// Attempted cycles.
    pub cycles: u64,
    /// Samples persisted.
    pub stored: u64,
    pub fetch_failures: u64,
    pub store_failures: u64,
    pub last_sequence_id: Option<i64>,
    pub last_sample_timestamp: Option<i64>,
    pub last_error: Option<String>,
    /// Bound on attempted cycles, if any.
    pub limit: Option<u64>,
    pub started_at: DateTime<Utc>,
}

impl CollectorStatus {
    fn new(source: &str, limit: Option<u64>) -> Self {
        Self {
            source: source.to_string(),
            state: CollectorState::Idle,
            cycles: 0,
            stored: 0,
            fetch_failures: 0,
            store_failures: 0,
            last_sequence_id: None,
            last_sample_timestamp: None,
            last_error: None,
            limit,
            started_at: Utc::now(),
        }
    }
}

/// Periodic fetch-and-store loop over a source and a sink.
pub struct CollectorLoop<S, K> {
    source: S,
    sink: K,
    config: LoopConfig,
    status: watch::Sender<CollectorStatus>,
}

impl<S: TelemetrySource, K: SampleSink> CollectorLoop<S, K> {
    /// Create a new loop in the `Idle` state.
    pub fn new(source: S, sink: K, config: LoopConfig) -> Self {
        let (status, _) = watch::channel(CollectorStatus::new(source.name(), config.limit));
        Self {
            source,
            sink,
            config,
            status,
        }
    }

    /// Subscribe to live statistics.
    pub fn monitor(&self) -> CollectorMonitor {
        CollectorMonitor {
            rx: self.status.subscribe(),
        }
    }

    /// Run until `shutdown` turns `true` (or its sender is dropped) at a
    /// Sleeping boundary, or until the cycle limit is reached.
    ///
    /// Returns the final statistics.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> CollectorStatus {
        tracing::info!(
            source = %self.source.name(),
            interval = ?self.config.interval,
            limit = ?self.config.limit,
            "Collector started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.limit_reached() {
                break;
            }

            self.cycle().await;

            if self.limit_reached() {
                tracing::info!(cycles = self.status.borrow().cycles, "Bounded run complete");
                break;
            }

            self.set_state(CollectorState::Sleeping);
            let cancelled = tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => false,
                _ = async {
                    let _ = shutdown.wait_for(|stop| *stop).await;
                } => true,
            };
            if cancelled {
                break;
            }
        }

        self.set_state(CollectorState::Stopped);
        let status = self.status.borrow().clone();
        tracing::info!(
            cycles = status.cycles,
            stored = status.stored,
            fetch_failures = status.fetch_failures,
            store_failures = status.store_failures,
            "Collector stopped"
        );
        status
    }

    async fn cycle(&self) {
        self.set_state(CollectorState::Fetching);
        let cycle = self.status.borrow().cycles + 1;
        tracing::debug!(cycle, source = %self.source.name(), "Fetching");

        let fetched = self.source.fetch().await;
        let sample = match fetched {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(cycle, error = %e, "Fetch failed");
                self.status.send_modify(|s| {
                    s.cycles += 1;
                    s.fetch_failures += 1;
                    s.last_error = Some(e.to_string());
                });
                return;
            }
        };

        self.set_state(CollectorState::Storing);
        match self.sink.append(sample).await {
            Ok(sequence_id) => {
                let observed = sample
                    .observed_at()
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| sample.timestamp_utc.to_string());
                tracing::info!(
                    sequence_id,
                    "Stored sample at {}: lat {:.2}, lon {:.2}, alt {:.2} km",
                    observed,
                    sample.latitude,
                    sample.longitude,
                    sample.altitude
                );
                self.status.send_modify(|s| {
                    s.cycles += 1;
                    s.stored += 1;
                    s.last_sequence_id = Some(sequence_id);
                    s.last_sample_timestamp = Some(sample.timestamp_utc);
                });
            }
            Err(e) => {
                tracing::error!(cycle, error = %e, "Failed to store sample");
                self.status.send_modify(|s| {
                    s.cycles += 1;
                    s.store_failures += 1;
                    s.last_error = Some(e.to_string());
                });
            }
        }
    }

    fn limit_reached(&self) -> bool {
        self.config
            .limit
            .is_some_and(|limit| self.status.borrow().cycles >= limit)
    }

    fn set_state(&self, state: CollectorState) {
        self.status.send_if_modified(|s| {
            if s.state == state {
                return false;
            }
            tracing::debug!(from = %s.state, to = %state, "Collector state");
            s.state = state;
            true
        });
    }
}

/// Read-only view of a running loop's statistics.
#[derive(Debug, Clone)]
pub struct CollectorMonitor {
    rx: watch::Receiver<CollectorStatus>,
}

impl CollectorMonitor {
    /// Current statistics.
    pub fn status(&self) -> CollectorStatus {
        self.rx.borrow().clone()
    }

    /// Wait until the statistics satisfy `predicate`.
    ///
    /// Returns the last published statistics if the loop has gone away.
    pub async fn wait_until(
        &mut self,
        mut predicate: impl FnMut(&CollectorStatus) -> bool,
    ) -> CollectorStatus {
        if let Ok(status) = self.rx.wait_for(|s| predicate(s)).await {
            return status.clone();
        }
        self.rx.borrow().clone()
    }
}

/// A collector loop running on its own Tokio task.
pub struct CollectorHandle {
    shutdown: watch::Sender<bool>,
    monitor: CollectorMonitor,
    task: JoinHandle<CollectorStatus>,
}

impl CollectorHandle {
    /// Spawn the loop onto the runtime.
    pub fn spawn<S: TelemetrySource, K: SampleSink>(collector: CollectorLoop<S, K>) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let monitor = collector.monitor();
        let task = tokio::spawn(collector.run(shutdown_rx));
        Self {
            shutdown,
            monitor,
            task,
        }
    }

    /// Statistics view that outlives this handle.
    pub fn monitor(&self) -> CollectorMonitor {
        self.monitor.clone()
    }

    /// Wait for the loop to stop on its own.
    pub async fn join(self) -> Result<CollectorStatus, CollectorError> {
        self.task
            .await
            .map_err(|e| CollectorError::Join(e.to_string()))
    }

    /// Signal the loop to stop with the default timeout.
    pub async fn shutdown(self) -> Result<CollectorStatus, CollectorError> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Signal the loop to stop at its next Sleeping boundary and wait for it.
    ///
    /// An in-flight fetch or store is allowed to finish. If the loop is still
    /// running after `timeout` the task is aborted.
    pub async fn shutdown_with_timeout(
        mut self,
        timeout: Duration,
    ) -> Result<CollectorStatus, CollectorError> {
        let _ = self.shutdown.send(true);

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(status)) => {
                tracing::info!("Collector shutdown complete");
                Ok(status)
            }
            Ok(Err(e)) => Err(CollectorError::Join(e.to_string())),
            Err(_) => {
                tracing::warn!(?timeout, "Collector shutdown timed out, aborting");
                self.task.abort();
                Err(CollectorError::ShutdownTimeout(timeout))
            }
        }
    }
}

impl std::fmt::Debug for CollectorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorHandle")
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}
