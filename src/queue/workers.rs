// Dispatcher loop: sequential pops, one task per job, a semaphore permit held by each
// job task so at most `concurrency` handlers run at once

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::consumer::JobQueue;
use super::jobs::{EnvelopeError, Task};
use crate::config::Config;
use crate::processor::{panic_message, JobHandler};
use crate::types::WorkerError;

pub const DEFAULT_CONCURRENCY: usize = 10;

/// The handler for each known task type.
#[derive(Clone)]
pub struct HandlerSet {
    pub report: Arc<dyn JobHandler>,
    pub image: Arc<dyn JobHandler>,
}

impl HandlerSet {
    pub fn new(report: Arc<dyn JobHandler>, image: Arc<dyn JobHandler>) -> Self {
        Self { report, image }
    }

    /// Select the handler and job id for a decoded task. `None` for unknown kinds.
    fn route(&self, task: &Task) -> Option<(Arc<dyn JobHandler>, String)> {
        match task {
            Task::GenerateReport(p) => Some((Arc::clone(&self.report), p.report_id.clone())),
            Task::ProcessImage(p) => Some((Arc::clone(&self.image), p.image_job_id.clone())),
            Task::Unknown(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub concurrency: usize,
    /// Pause after a failed pop before trying again.
    pub retry_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl DispatcherConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.worker.concurrency,
            retry_delay: Duration::from_millis(config.redis.retry_delay_ms),
        }
    }
}

/// Live counters, shared with every job task.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    received: AtomicU64,
    dropped: AtomicU64,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    in_flight: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub dropped: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
    pub in_flight: u64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Holds a concurrency slot for the lifetime of one job task.
struct InFlight {
    stats: Arc<DispatcherStats>,
    _permit: OwnedSemaphorePermit,
}

impl InFlight {
    fn enter(stats: Arc<DispatcherStats>, permit: OwnedSemaphorePermit) -> Self {
        stats.in_flight.fetch_add(1, Ordering::Relaxed);
        Self {
            stats,
            _permit: permit,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

enum Outcome {
    Succeeded,
    Failed(WorkerError),
    Panicked(String),
}

struct JobReport {
    task_type: String,
    job_id: String,
    outcome: Outcome,
}

pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    handlers: HandlerSet,
    slots: Arc<Semaphore>,
    stats: Arc<DispatcherStats>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, handlers: HandlerSet, config: DispatcherConfig) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            queue,
            handlers,
            slots: Arc::new(Semaphore::new(concurrency)),
            stats: Arc::new(DispatcherStats::default()),
            config: DispatcherConfig {
                concurrency,
                ..config
            },
        }
    }

    pub fn stats(&self) -> Arc<DispatcherStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `shutdown` flips to `true` or the queue closes, then wait for in-flight
    /// jobs and return the final counters.
    ///
    /// A dropped shutdown sender never stops the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> StatsSnapshot {
        info!(
            queue = self.queue.name(),
            concurrency = self.config.concurrency,
            "dispatcher started"
        );
        let mut jobs: JoinSet<JobReport> = JoinSet::new();

        loop {
            while let Some(done) = jobs.try_join_next() {
                self.reap(done);
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let popped = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                popped = self.queue.pop() => popped,
            };

            let raw = match popped {
                Ok(raw) => raw,
                Err(WorkerError::QueueClosed) => {
                    info!(queue = self.queue.name(), "queue closed");
                    break;
                }
                Err(e) => {
                    warn!(queue = self.queue.name(), error = %e, "queue pop failed, retrying");
                    drop(permit);
                    tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut shutdown) => break,
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                    continue;
                }
            };

            DispatcherStats::bump(&self.stats.received);
            if let Some(job) = self.accept(&raw, permit) {
                jobs.spawn(job);
            }
        }

        if !jobs.is_empty() {
            info!(in_flight = jobs.len(), "waiting for in-flight jobs");
        }
        while let Some(done) = jobs.join_next().await {
            self.reap(done);
        }

        let summary = self.stats.snapshot();
        info!(
            received = summary.received,
            dropped = summary.dropped,
            dispatched = summary.dispatched,
            succeeded = summary.succeeded,
            failed = summary.failed,
            panicked = summary.panicked,
            "dispatcher stopped"
        );
        summary
    }

    /// Decode and route one entry, returning the job future to spawn.
    fn accept(
        &self,
        raw: &str,
        permit: OwnedSemaphorePermit,
    ) -> Option<impl std::future::Future<Output = JobReport> + Send + 'static> {
        let task = match Task::decode(raw) {
            Ok(task) => task,
            Err(EnvelopeError::Empty) => {
                warn!("skipping empty queue entry");
                DispatcherStats::bump(&self.stats.dropped);
                return None;
            }
            Err(e) => {
                error!(error = %e, "dropping undecodable queue entry");
                DispatcherStats::bump(&self.stats.dropped);
                return None;
            }
        };

        let Some((handler, job_id)) = self.handlers.route(&task) else {
            warn!(task_type = task.task_type(), "dropping entry with unknown task type");
            DispatcherStats::bump(&self.stats.dropped);
            return None;
        };

        debug!(task = %task, handler = %handler.kind(), "dispatching");
        DispatcherStats::bump(&self.stats.dispatched);

        let guard = InFlight::enter(Arc::clone(&self.stats), permit);
        let task_type = task.task_type().to_string();

        Some(async move {
            let _guard = guard;
            let outcome = match AssertUnwindSafe(handler.handle(&job_id)).catch_unwind().await {
                Ok(Ok(())) => Outcome::Succeeded,
                Ok(Err(e)) => Outcome::Failed(e),
                Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
            };
            JobReport {
                task_type,
                job_id,
                outcome,
            }
        })
    }

    fn reap(&self, done: Result<JobReport, JoinError>) {
        match done {
            Ok(JobReport {
                task_type,
                job_id,
                outcome,
            }) => match outcome {
                Outcome::Succeeded => {
                    DispatcherStats::bump(&self.stats.succeeded);
                    debug!(task_type, job_id, "job finished");
                }
                Outcome::Failed(e) => {
                    DispatcherStats::bump(&self.stats.failed);
                    error!(task_type, job_id, error = %e, "job failed");
                }
                Outcome::Panicked(message) => {
                    DispatcherStats::bump(&self.stats.panicked);
                    error!(task_type, job_id, panic = %message, "job panicked");
                }
            },
            Err(e) => {
                DispatcherStats::bump(&self.stats.panicked);
                error!(error = %e, "job task aborted");
            }
        }
    }
}

/// Resolves once the flag reads `true`. Pends forever if the sender is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        let stop = *rx.borrow_and_update();
        if stop {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
