//! The drain loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pulse_store::{EventStore, StoredEvent};
use pulse_types::{now_millis, EventBus, Notification};
use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::config::EmitterConfig;
use crate::request::{build_requests, Request, RequestResult};
use crate::retry::{Disposition, RetryPolicy};
use crate::transport::Transport;

/// Whether the emitter is scheduling drain cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterStatus {
    Running,
    Paused,
}

/// Errors from starting an emitter.
#[derive(Debug, thiserror::Error)]
pub enum EmitterError {
    /// `start` was called outside a tokio runtime.
    #[error("emitter must be started from within a tokio runtime")]
    NoRuntime,
}

/// Row counts for one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Rows pulled from the store.
    pub attempted: usize,
    /// Rows delivered and removed.
    pub sent: usize,
    /// Rows that failed terminally and were removed.
    pub dropped: usize,
    /// Rows that failed transiently and were kept.
    pub retained: usize,
}

impl CycleReport {
    fn failed(&self) -> usize {
        self.dropped + self.retained
    }
}

struct Shared {
    store: Arc<dyn EventStore>,
    transport: Arc<dyn Transport>,
    config: EmitterConfig,
    policy: RetryPolicy,
    bus: EventBus,
    paused: AtomicBool,
    wake: Notify,
    workers: Arc<Semaphore>,
    /// Held for the whole of a drain so cycles never overlap.
    draining: tokio::sync::Mutex<()>,
}

/// Drains the event store to a transport.
///
/// A background task wakes on a periodic tick or on [`Emitter::flush`] and
/// runs drain cycles while the emitter is running. Each cycle evicts old
/// rows, pulls up to `emit_range` of the oldest rows, groups them into
/// requests, sends them concurrently on at most `thread_pool_size` blocking
/// workers, then removes or retains rows according to the retry policy.
///
/// If the store fails to remove rows after a send, the emitter pauses
/// itself and stays paused until [`Emitter::resume`] is called.
pub struct Emitter {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Emitter {
    /// Creates a running emitter. No cycles run until [`Emitter::start`].
    ///
    /// `config` is passed through [`EmitterConfig::normalized`] first.
    pub fn new(
        store: Arc<dyn EventStore>,
        transport: Arc<dyn Transport>,
        config: EmitterConfig,
        bus: EventBus,
    ) -> Self {
        let config = config.normalized();
        let policy = RetryPolicy::new(
            config.retry_failed_requests,
            config.custom_retry_for_status_codes.clone(),
        );
        let workers = Arc::new(Semaphore::new(config.thread_pool_size));
        Self {
            shared: Arc::new(Shared {
                store,
                transport,
                config,
                policy,
                bus,
                paused: AtomicBool::new(false),
                wake: Notify::new(),
                workers,
                draining: tokio::sync::Mutex::new(()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawns the drain loop on the current tokio runtime. Calling it again
    /// while the loop is alive does nothing.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::NoRuntime` outside a tokio runtime.
    pub fn start(&self) -> Result<(), EmitterError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| EmitterError::NoRuntime)?;
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }
        tracing::info!(
            interval_ms = u64::try_from(self.shared.config.emit_interval.as_millis()).unwrap_or(u64::MAX),
            emit_range = self.shared.config.emit_range,
            workers = self.shared.config.thread_pool_size,
            "starting emitter"
        );
        *task = Some(handle.spawn(run(Arc::clone(&self.shared))));
        Ok(())
    }

    /// Stops the drain loop. In-flight requests finish on their workers.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }

    /// Requests an immediate drain.
    pub fn flush(&self) {
        self.shared.wake.notify_one();
    }

    /// Stops scheduling drain cycles. Cycles already running finish.
    pub fn pause(&self) {
        self.shared.pause("paused by caller");
    }

    /// Resumes scheduling and triggers a drain.
    pub fn resume(&self) {
        if self.shared.paused.swap(false, Ordering::SeqCst) {
            tracing::info!("emitter resumed");
        }
        self.shared.wake.notify_one();
    }

    pub fn status(&self) -> EmitterStatus {
        self.shared.status()
    }

    /// Runs drain cycles now, on the caller's task, until the store is
    /// empty, a cycle makes no progress, or a request is retained.
    ///
    /// Returns the summed counts of every cycle run.
    pub async fn drain(&self) -> CycleReport {
        self.shared.drain().await
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.shared.config
    }
}

impl Drop for Emitter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("status", &self.status())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

async fn run(shared: Arc<Shared>) {
    let mut tick = tokio::time::interval(shared.config.emit_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if shared.status() == EmitterStatus::Paused {
            // The timer is idle while paused; only resume or flush wakes us.
            shared.wake.notified().await;
            if shared.status() == EmitterStatus::Running {
                tick.reset();
                shared.drain().await;
            }
            continue;
        }

        tokio::select! {
            _ = tick.tick() => {}
            () = shared.wake.notified() => {}
        }

        shared.drain().await;
    }
}

impl Shared {
    fn status(&self) -> EmitterStatus {
        if self.paused.load(Ordering::SeqCst) {
            EmitterStatus::Paused
        } else {
            EmitterStatus::Running
        }
    }

    fn pause(&self, reason: &str) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            tracing::info!(reason, "emitter paused");
            self.bus.publish(Notification::EmitterPaused {
                reason: reason.to_string(),
            });
        }
    }

    async fn drain(&self) -> CycleReport {
        let _guard = self.draining.lock().await;
        let mut total = CycleReport::default();

        while self.status() == EmitterStatus::Running {
            let Some(report) = self.cycle().await else {
                break;
            };
            total.attempted += report.attempted;
            total.sent += report.sent;
            total.dropped += report.dropped;
            total.retained += report.retained;

            // Go again only while a full page was cleared; anything retained
            // waits for the next tick.
            if report.attempted == 0
                || report.attempted < self.config.emit_range
                || report.retained > 0
            {
                break;
            }
        }
        total
    }

    /// Runs one cycle. Returns `None` if the store could not be read.
    async fn cycle(&self) -> Option<CycleReport> {
        let rows = self.read_rows().await?;
        if rows.is_empty() {
            return Some(CycleReport::default());
        }

        let method = self.transport.method();
        let requests = build_requests(
            rows,
            method,
            self.config.buffer.size(),
            self.config.byte_limit(method),
        );
        let attempted: usize = requests.iter().map(|r| r.ids.len()).sum();
        let results = self.dispatch(requests).await;

        let mut report = CycleReport {
            attempted,
            ..CycleReport::default()
        };
        let mut remove = Vec::new();
        for result in &results {
            let rows = result.ids.len();
            let disposition = self.policy.disposition(result);
            match disposition {
                Disposition::Sent => report.sent += rows,
                Disposition::Dropped => {
                    tracing::warn!(status = ?result.status, oversize = result.oversize, rows, "dropping undeliverable rows");
                    report.dropped += rows;
                }
                Disposition::Retained => {
                    tracing::debug!(status = ?result.status, rows, "keeping rows for retry");
                    report.retained += rows;
                }
            }
            if disposition.removes_rows() {
                remove.extend_from_slice(&result.ids);
            }
        }

        if !remove.is_empty() {
            self.remove_rows(remove).await;
        }

        self.bus.publish(Notification::RequestsCompleted {
            sent: report.sent,
            failed: report.failed(),
        });
        tracing::debug!(
            attempted = report.attempted,
            sent = report.sent,
            dropped = report.dropped,
            retained = report.retained,
            "drain cycle finished"
        );
        Some(report)
    }

    async fn read_rows(&self) -> Option<Vec<StoredEvent>> {
        let store = Arc::clone(&self.store);
        let eviction = self.config.eviction;
        let limit = self.config.emit_range;

        let result = tokio::task::spawn_blocking(move || {
            if !eviction.is_unbounded() {
                let evicted = store.remove_old(eviction)?;
                if evicted > 0 {
                    tracing::info!(evicted, "evicted rows past store limits");
                }
            }
            store.emittable(limit)
        })
        .await;

        match result {
            Ok(Ok(rows)) => Some(rows),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to read emittable rows");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "store read task panicked or was cancelled");
                None
            }
        }
    }

    async fn dispatch(&self, requests: Vec<Request>) -> Vec<RequestResult> {
        let mut in_flight = JoinSet::new();
        let mut results = Vec::with_capacity(requests.len());

        for mut request in requests {
            let Ok(permit) = Arc::clone(&self.workers).acquire_owned().await else {
                break;
            };
            let transport = Arc::clone(&self.transport);
            let ids = request.ids.clone();
            let oversize = request.oversize;
            in_flight.spawn_blocking(move || {
                let _permit = permit;
                request.stamp_sent(now_millis());
                let mut result = transport.send(&request);
                // The transport reports status only for the rows it was given.
                result.ids = ids;
                result.oversize |= oversize;
                result
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                // A panicked send leaves its rows in the store for the next cycle.
                Err(e) => tracing::error!(error = %e, "send task panicked"),
            }
        }
        results
    }

    async fn remove_rows(&self, ids: Vec<i64>) {
        let store = Arc::clone(&self.store);
        let count = ids.len();
        let result = tokio::task::spawn_blocking(move || store.remove(&ids)).await;

        let reason = match result {
            Ok(Ok(_)) => return,
            Ok(Err(e)) => format!("failed to remove {count} delivered rows: {e}"),
            Err(e) => format!("row removal task failed: {e}"),
        };
        tracing::error!(reason, "pausing emitter to avoid duplicate delivery");
        self.pause(&reason);
    }
}
