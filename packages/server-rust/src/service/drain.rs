//! Drain-on-shutdown support for event- and timer-driven services.
//!
//! Services that react to triggers rather than direct calls route every
//! execution through a `DrainController`: work is only admitted while the
//! controller is ready, each admitted execution is tracked by a unique
//! in-flight id, and `drain()` refuses new work first, then waits until the
//! in-flight set is empty. Shutdown therefore waits for work already
//! admitted but accepts none new.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde_json::json;

use crate::logger::Logger;

/// Lifecycle state of a drain-aware service.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Not yet ready; triggered executions are skipped.
    Starting,
    /// Accepting work.
    Ready,
    /// No new work accepted; in-flight executions are finishing.
    Draining,
    /// Drained: nothing in flight, nothing admitted.
    Stopped,
}

/// Admission gate plus in-flight tracking.
pub struct DrainController {
    state: ArcSwap<DrainState>,
    in_flight: DashMap<u64, ()>,
    next_id: AtomicU64,
    poll_interval: Duration,
}

impl DrainController {
    #[must_use]
    pub fn new() -> Self {
        Self::with_poll_interval(Duration::from_millis(10))
    }

    /// Controller polling the in-flight set at the given interval while
    /// draining.
    #[must_use]
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            state: ArcSwap::from_pointee(DrainState::Starting),
            in_flight: DashMap::new(),
            next_id: AtomicU64::new(1),
            poll_interval,
        }
    }

    /// Open the gate; typically called from the service's `ready` hook.
    pub fn set_ready(&self) {
        self.state.store(Arc::new(DrainState::Ready));
    }

    #[must_use]
    pub fn state(&self) -> DrainState {
        **self.state.load()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == DrainState::Ready
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Interval at which `drain` re-checks the in-flight set.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Execute one triggered unit of work through the gate.
    ///
    /// Skipped (with a log line, not an error) unless the controller is
    /// ready — running against a half-initialized or draining service is
    /// never correct. Admitted work runs inside a failure boundary: handler
    /// errors are logged and swallowed, and the in-flight id is released on
    /// every outcome.
    pub async fn run<F>(&self, logger: &Logger, label: &str, work: F)
    where
        F: std::future::Future<Output = anyhow::Result<()>>,
    {
        if !self.is_ready() {
            logger.warning(
                "skipping triggered execution: service not ready",
                Some(&json!({ "operation": label })),
            );
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.in_flight.insert(id, ());
        let guard = InFlightGuard {
            in_flight: &self.in_flight,
            id,
        };

        // A drain that started between the check and the insert may already
        // have observed an empty in-flight set and resolved; the id is
        // registered now, so re-reading the state closes that window.
        if !self.is_ready() {
            logger.warning(
                "skipping triggered execution: service not ready",
                Some(&json!({ "operation": label })),
            );
            return;
        }

        if let Err(err) = work.await {
            logger.error(
                "triggered execution failed",
                Some(&json!({ "operation": label, "error": err.to_string() })),
            );
        }
        drop(guard);
    }

    /// Stop admitting work, then wait for the in-flight set to empty.
    pub async fn drain(&self) {
        self.state.store(Arc::new(DrainState::Draining));
        while !self.in_flight.is_empty() {
            tokio::time::sleep(self.poll_interval).await;
        }
        self.state.store(Arc::new(DrainState::Stopped));
    }
}

impl Default for DrainController {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases an in-flight id when dropped, so tracking stays accurate even if
/// the admitted future panics.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<u64, ()>,
    id: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    #[tokio::test]
    async fn initial_state_skips_work() {
        let controller = DrainController::new();
        let ran = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ran);

        controller
            .run(&Logger::new(), "tick", async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(controller.state(), DrainState::Starting);
    }

    #[tokio::test]
    async fn ready_admits_and_releases_work() {
        let controller = DrainController::new();
        controller.set_ready();
        let ran = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ran);

        controller
            .run(&Logger::new(), "tick", async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(controller.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn failing_work_is_logged_not_raised_and_id_released() {
        let controller = DrainController::new();
        controller.set_ready();

        controller
            .run(&Logger::new(), "tick", async { Err(anyhow::anyhow!("boom")) })
            .await;

        assert_eq!(controller.in_flight_count(), 0);
        assert!(controller.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_in_flight_work() {
        let controller = Arc::new(DrainController::new());
        controller.set_ready();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let finished = Arc::new(AtomicU32::new(0));

        let worker = {
            let controller = Arc::clone(&controller);
            let finished = Arc::clone(&finished);
            tokio::spawn(async move {
                controller
                    .run(&Logger::new(), "slow", async move {
                        release_rx.await.ok();
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await;
            })
        };

        // Let the work get admitted before draining.
        while controller.in_flight_count() == 0 {
            tokio::task::yield_now().await;
        }

        let drainer = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.drain().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!drainer.is_finished());

        release_tx.send(()).unwrap();
        drainer.await.unwrap();
        worker.await.unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state(), DrainState::Stopped);
    }

    #[tokio::test]
    async fn no_work_admitted_after_drain_begins() {
        let controller = DrainController::new();
        controller.set_ready();
        controller.drain().await;

        let ran = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ran);
        controller
            .run(&Logger::new(), "late", async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(controller.state(), DrainState::Stopped);
    }

    #[tokio::test]
    async fn drain_with_nothing_in_flight_completes_immediately() {
        let controller = DrainController::new();
        controller.set_ready();
        controller.drain().await;
        assert_eq!(controller.state(), DrainState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn nothing_runs_after_drain_resolves() {
        let controller = Arc::new(DrainController::new());
        controller.set_ready();
        let ran = Arc::new(AtomicU32::new(0));

        // Admissions racing the drain either finish before it resolves or
        // are skipped entirely.
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let controller = Arc::clone(&controller);
                let counter = Arc::clone(&ran);
                tokio::spawn(async move {
                    controller
                        .run(&Logger::new(), "burst", async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .await;
                })
            })
            .collect();

        controller.drain().await;
        let ran_at_drain = ran.load(Ordering::SeqCst);
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(ran.load(Ordering::SeqCst), ran_at_drain);
        assert_eq!(controller.in_flight_count(), 0);
        assert_eq!(controller.state(), DrainState::Stopped);
    }

    #[tokio::test]
    async fn concurrent_executions_are_tracked_independently() {
        let controller = Arc::new(DrainController::new());
        controller.set_ready();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let controller = Arc::clone(&controller);
                tokio::spawn(async move {
                    controller
                        .run(&Logger::new(), "burst", async {
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            Ok(())
                        })
                        .await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(controller.in_flight_count(), 0);
    }
}
