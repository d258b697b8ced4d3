//! Supervised group for background resize work
//!
//! Asynchronous resizes outlive the request that scheduled them. They are
//! spawned through this group so that both running and waiting tasks are
//! bounded, their outcome (including panics) is logged and counted, and
//! shutdown can wait for them to drain.

use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct TaskCounters {
    spawned: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    rejected: AtomicU64,
}

/// Why [`BackgroundTasks::spawn`] did not schedule a task
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnRejection {
    #[error("service is shutting down")]
    ShuttingDown,
    #[error("background queue is full")]
    Saturated,
}

/// Releases a pending slot when the task finishes or is dropped
struct PendingSlot(Arc<AtomicUsize>);

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Point-in-time background task statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackgroundTaskStats {
    pub spawned: u64,
    /// Tasks not yet finished, including those waiting for a slot
    pub running: usize,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
    /// Spawn attempts refused because of shutdown or a full queue
    pub rejected: u64,
}

#[derive(Clone)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    slots: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    counters: Arc<TaskCounters>,
    accepting: Arc<AtomicBool>,
    // Orders shutdown's close against wait_idle's reopen
    lifecycle: Arc<Mutex<()>>,
}

impl BackgroundTasks {
    /// Create a task group running at most `max_concurrent` tasks at once,
    /// with at most `max_queued` more waiting for a slot
    pub fn new(max_concurrent: usize, max_queued: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);

        Self {
            tracker: TaskTracker::new(),
            slots: Arc::new(Semaphore::new(max_concurrent)),
            pending: Arc::new(AtomicUsize::new(0)),
            max_pending: max_concurrent.saturating_add(max_queued),
            counters: Arc::new(TaskCounters::default()),
            accepting: Arc::new(AtomicBool::new(true)),
            lifecycle: Arc::new(Mutex::new(())),
        }
    }

    /// Schedule `task` unless the group is shut down or its queue is full
    pub fn spawn<F, T, E>(&self, name: String, task: F) -> Result<(), SpawnRejection>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        if !self.accepting.load(Ordering::Acquire) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(task = %name, "Background task rejected: shutting down");
            return Err(SpawnRejection::ShuttingDown);
        }

        if self.pending.fetch_add(1, Ordering::AcqRel) >= self.max_pending {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(task = %name, limit = self.max_pending, "Background task rejected: queue full");
            return Err(SpawnRejection::Saturated);
        }
        let pending = PendingSlot(self.pending.clone());

        self.counters.spawned.fetch_add(1, Ordering::Relaxed);
        let slots = self.slots.clone();
        let counters = self.counters.clone();

        self.tracker.spawn(async move {
            let _pending = pending;
            let Ok(_slot) = slots.acquire_owned().await else {
                warn!(task = %name, "Background task dropped: no slots available");
                counters.failed.fetch_add(1, Ordering::Relaxed);
                return;
            };

            let start = Instant::now();
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(_)) => {
                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!(task = %name, elapsed = ?start.elapsed(), "Background task completed");
                }
                Ok(Err(e)) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(task = %name, elapsed = ?start.elapsed(), error = %e, "Background task failed");
                }
                Err(panic) => {
                    counters.panicked.fetch_add(1, Ordering::Relaxed);
                    error!(
                        task = %name,
                        panic = %panic_message(panic.as_ref()),
                        "Background task panicked"
                    );
                }
            }
        });

        Ok(())
    }

    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    pub fn stats(&self) -> BackgroundTaskStats {
        BackgroundTaskStats {
            spawned: self.counters.spawned.load(Ordering::Relaxed),
            running: self.tracker.len(),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Wait until every task spawned so far has finished; new tasks are still accepted
    ///
    /// Safe to run alongside [`shutdown`](Self::shutdown): the tracker is only
    /// reopened while the group is still accepting work.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;

        let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.accepting.load(Ordering::Acquire) {
            self.tracker.reopen();
        }
    }

    /// Stop accepting tasks and wait up to `grace` for running ones to finish
    ///
    /// Returns true when the group drained within the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        {
            let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            self.accepting.store(false, Ordering::Release);
            self.tracker.close();
        }

        let pending = self.tracker.len();
        if pending > 0 {
            info!("Waiting up to {:?} for {} background task(s) to finish", grace, pending);
        }

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("Background tasks drained");
                true
            }
            Err(_) => {
                warn!(
                    "Shutdown grace period elapsed with {} background task(s) still running",
                    self.tracker.len()
                );
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn sleeper(duration: Duration) -> impl Future<Output = Result<(), String>> + Send + 'static {
        async move {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_outcomes_are_counted() {
        let tasks = BackgroundTasks::new(4, 4);

        assert!(tasks.spawn("ok".to_string(), async { Ok::<_, String>(()) }).is_ok());
        assert!(
            tasks
                .spawn("err".to_string(), async { Err::<(), _>("boom".to_string()) })
                .is_ok()
        );
        tasks.wait_idle().await;

        let stats = tasks.stats();
        assert_eq!(stats.spawned, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.panicked, 0);
        assert_eq!(stats.rejected, 0);
        assert_eq!(stats.running, 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_panics_are_contained_and_logged() {
        let tasks = BackgroundTasks::new(1, 4);

        tasks
            .spawn("explodes".to_string(), async {
                if true {
                    panic!("transform exploded");
                }
                Ok::<(), String>(())
            })
            .unwrap();
        tasks
            .spawn("after".to_string(), async { Ok::<_, String>(()) })
            .unwrap();
        tasks.wait_idle().await;

        let stats = tasks.stats();
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.succeeded, 1);
        assert!(logs_contain("Background task panicked"));
        assert!(logs_contain("transform exploded"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let tasks = BackgroundTasks::new(2, 16);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for n in 0..8 {
            let active = active.clone();
            let peak = peak.clone();
            tasks
                .spawn(format!("task-{n}"), async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                })
                .unwrap();
        }
        tasks.wait_idle().await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(tasks.stats().succeeded, 8);
    }

    #[tokio::test]
    async fn test_queue_is_bounded() {
        // One running plus two waiting
        let tasks = BackgroundTasks::new(1, 2);

        for n in 0..3 {
            assert!(tasks.spawn(format!("task-{n}"), sleeper(Duration::from_millis(50))).is_ok());
        }
        assert_eq!(
            tasks.spawn("overflow".to_string(), sleeper(Duration::ZERO)),
            Err(SpawnRejection::Saturated)
        );
        assert_eq!(tasks.stats().rejected, 1);

        // Finished tasks free their place in the queue
        tasks.wait_idle().await;
        assert!(tasks.spawn("later".to_string(), sleeper(Duration::ZERO)).is_ok());
        tasks.wait_idle().await;
        assert_eq!(tasks.stats().succeeded, 4);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_rejects_new_work() {
        let tasks = BackgroundTasks::new(4, 4);
        tasks
            .spawn("slow".to_string(), sleeper(Duration::from_millis(50)))
            .unwrap();

        assert!(tasks.shutdown(Duration::from_secs(5)).await);
        assert_eq!(tasks.stats().succeeded, 1);
        assert_eq!(
            tasks.spawn("late".to_string(), sleeper(Duration::ZERO)),
            Err(SpawnRejection::ShuttingDown)
        );
    }

    #[tokio::test]
    async fn test_shutdown_completes_while_waiting_idle() {
        let tasks = BackgroundTasks::new(2, 4);
        tasks
            .spawn("slow".to_string(), sleeper(Duration::from_millis(50)))
            .unwrap();

        let (drained, ()) =
            tokio::join!(tasks.shutdown(Duration::from_secs(5)), tasks.wait_idle());

        assert!(drained);
        assert!(tasks.tracker.is_closed());

        tasks.wait_idle().await;
        assert!(tasks.tracker.is_closed());
        assert!(tasks.shutdown(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_shutdown_reports_timeout() {
        let tasks = BackgroundTasks::new(1, 1);
        tasks
            .spawn("stuck".to_string(), sleeper(Duration::from_secs(30)))
            .unwrap();

        assert!(!tasks.shutdown(Duration::from_millis(20)).await);
        assert_eq!(tasks.running(), 1);
    }
}
