//! Background worker for periodic and on-demand tasks.
//!
//! Event- and timer-driven helper services pair a `BackgroundWorker` with a
//! [`DrainController`](super::drain::DrainController): the worker supplies
//! the trigger loop (mpsc tasks plus an optional tick interval), and every
//! execution goes through the controller's gate, so such services inherit
//! the drain-on-shutdown guarantee without their own tracking code.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::drain::DrainController;
use crate::logger::Logger;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler executed by a [`BackgroundWorker`].
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Process a single submitted task.
    async fn run(&mut self, task: Self::Task) -> anyhow::Result<()>;

    /// Called on each tick interval. Default is a no-op.
    async fn on_tick(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Generic trigger loop feeding a gated runnable.
///
/// The worker spawns a tokio task that listens for submitted tasks, fires
/// the periodic tick, and exits on the shutdown signal. Executions are
/// admitted through the shared `DrainController`, so they are skipped until
/// the owning service is ready and refused once it starts draining.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Start the worker. The channel capacity is fixed at 256.
    pub fn start(
        mut runnable: R,
        tick_interval_ms: u64,
        gate: Arc<DrainController>,
        logger: Logger,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(256);
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut tick_interval =
                tokio::time::interval(std::time::Duration::from_millis(tick_interval_ms));
            // Skip the first immediate tick so on_tick doesn't fire at startup.
            tick_interval.tick().await;

            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(task) => {
                                gate.run(&logger, "task", runnable.run(task)).await;
                            }
                            None => break, // Channel closed.
                        }
                    }
                    _ = tick_interval.tick() => {
                        gate.run(&logger, "tick", runnable.on_tick()).await;
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Submit a task to the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped or the channel is full.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(task)
                .await
                .map_err(|_| anyhow::anyhow!("worker channel closed")),
            None => Err(anyhow::anyhow!("worker not running")),
        }
    }

    /// Stop the trigger loop and wait for the worker task to exit. Draining
    /// admitted work is the owning service's `cleanup` concern, via the
    /// shared controller.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct CountingRunnable {
        run_count: Arc<AtomicU32>,
        tick_count: Arc<AtomicU32>,
    }

    #[async_trait]
    impl BackgroundRunnable for CountingRunnable {
        type Task = String;

        async fn run(&mut self, _task: String) -> anyhow::Result<()> {
            self.run_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_tick(&mut self) -> anyhow::Result<()> {
            self.tick_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn make_runnable() -> (CountingRunnable, Arc<AtomicU32>, Arc<AtomicU32>) {
        let run_count = Arc::new(AtomicU32::new(0));
        let tick_count = Arc::new(AtomicU32::new(0));
        (
            CountingRunnable {
                run_count: Arc::clone(&run_count),
                tick_count: Arc::clone(&tick_count),
            },
            run_count,
            tick_count,
        )
    }

    #[tokio::test]
    async fn tasks_run_once_gate_is_ready() {
        let (runnable, run_count, _ticks) = make_runnable();
        let gate = Arc::new(DrainController::new());
        gate.set_ready();
        let mut worker = BackgroundWorker::start(runnable, 60_000, gate, Logger::new());

        worker.submit("task-1".to_string()).await.unwrap();
        worker.submit("task-2".to_string()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(run_count.load(Ordering::SeqCst), 2);
        worker.stop().await;
    }

    #[tokio::test]
    async fn tasks_are_skipped_before_ready() {
        let (runnable, run_count, _ticks) = make_runnable();
        let gate = Arc::new(DrainController::new());
        let mut worker = BackgroundWorker::start(runnable, 60_000, gate, Logger::new());

        worker.submit("early".to_string()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(run_count.load(Ordering::SeqCst), 0);
        worker.stop().await;
    }

    #[tokio::test]
    async fn tick_fires_periodically() {
        let (runnable, _runs, tick_count) = make_runnable();
        let gate = Arc::new(DrainController::new());
        gate.set_ready();
        let mut worker = BackgroundWorker::start(runnable, 20, gate, Logger::new());

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        worker.stop().await;

        assert!(tick_count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn submit_after_stop_returns_error() {
        let (runnable, _runs, _ticks) = make_runnable();
        let gate = Arc::new(DrainController::new());
        gate.set_ready();
        let mut worker = BackgroundWorker::start(runnable, 60_000, gate, Logger::new());
        worker.stop().await;

        assert!(worker.submit("late".to_string()).await.is_err());
    }
}
