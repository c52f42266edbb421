//! The in-process event fabric: a process-wide `event -> group -> listener`
//! registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use parking_lot::RwLock;
use serde_json::json;

use super::{EventListener, EventSystem};
use crate::logger::Logger;

/// In-process implementation of [`EventSystem`].
#[derive(Default)]
pub struct EventBroker {
    listeners: DashMap<String, HashMap<String, EventListener>>,
    logger: RwLock<Logger>,
}

impl EventBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listeners currently registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, |groups| groups.len())
    }
}

#[async_trait]
impl EventSystem for EventBroker {
    async fn prepare(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        self.listeners.clear();
        Ok(())
    }

    fn set_logger(&self, logger: Logger) {
        *self.logger.write() = logger;
    }

    fn on(&self, event: &str, group: &str, listener: EventListener) {
        self.listeners
            .entry(event.to_string())
            .or_default()
            .insert(group.to_string(), listener);
    }

    fn off(&self, event: &str, group: &str, listener: &EventListener) {
        if let Some(mut groups) = self.listeners.get_mut(event) {
            let registered = groups
                .get(group)
                .is_some_and(|current| Arc::ptr_eq(current, listener));
            if registered {
                groups.remove(group);
            }
        }
    }

    async fn emit(&self, event: &str, args: Vec<serde_json::Value>) {
        // Snapshot before invoking: a listener may call `off`/`on` while the
        // fan-out is in flight.
        let snapshot: Vec<(String, EventListener)> = self
            .listeners
            .get(event)
            .map(|groups| {
                groups
                    .iter()
                    .map(|(group, listener)| (group.clone(), Arc::clone(listener)))
                    .collect()
            })
            .unwrap_or_default();

        let invocations = snapshot
            .iter()
            .map(|(_, listener)| listener(args.clone()));
        let outcomes = join_all(invocations).await;

        let logger = self.logger.read().clone();
        for ((group, _), outcome) in snapshot.iter().zip(outcomes) {
            if let Err(err) = outcome {
                logger.error(
                    "event listener failed",
                    Some(&json!({
                        "event": event,
                        "group": group,
                        "error": err.to_string(),
                    })),
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;

    use super::*;

    fn counting_listener(counter: Arc<AtomicU32>) -> EventListener {
        Arc::new(move |_args| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn failing_listener() -> EventListener {
        Arc::new(|_args| Box::pin(async { Err(anyhow::anyhow!("listener broke")) }))
    }

    #[tokio::test]
    async fn same_group_replaces_not_appends() {
        let broker = EventBroker::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        broker.on("Ledger:posted", "g", counting_listener(Arc::clone(&first)));
        broker.on("Ledger:posted", "g", counting_listener(Arc::clone(&second)));
        broker.emit("Ledger:posted", vec![]).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(broker.listener_count("Ledger:posted"), 1);
    }

    #[tokio::test]
    async fn off_removes_only_the_registered_listener() {
        let broker = EventBroker::new();
        let count = Arc::new(AtomicU32::new(0));
        let current = counting_listener(Arc::clone(&count));
        let stale = counting_listener(Arc::clone(&count));

        broker.on("e", "g", Arc::clone(&current));

        // A stale handle must not steal the slot.
        broker.off("e", "g", &stale);
        assert_eq!(broker.listener_count("e"), 1);

        broker.off("e", "g", &current);
        assert_eq!(broker.listener_count("e"), 0);
    }

    #[tokio::test]
    async fn listener_failure_is_isolated_from_siblings_and_emitter() {
        let broker = EventBroker::new();
        let count = Arc::new(AtomicU32::new(0));

        broker.on("e", "broken", failing_listener());
        broker.on("e", "healthy", counting_listener(Arc::clone(&count)));

        // Must not panic or propagate; the healthy listener still runs.
        broker.emit("e", vec![json!(1)]).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn emit_passes_args_to_each_listener() {
        let broker = EventBroker::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        broker.on(
            "e",
            "g",
            Arc::new(move |args| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    sink.lock().push(args);
                    Ok(())
                })
            }),
        );

        broker.emit("e", vec![json!("a"), json!(2)]).await;
        assert_eq!(seen.lock().as_slice(), &[vec![json!("a"), json!(2)]]);
    }

    #[tokio::test]
    async fn emit_without_listeners_is_a_no_op() {
        let broker = EventBroker::new();
        broker.emit("silent", vec![]).await;
    }

    #[tokio::test]
    async fn cleanup_drops_all_registrations() {
        let broker = EventBroker::new();
        let count = Arc::new(AtomicU32::new(0));
        broker.on("e", "g", counting_listener(Arc::clone(&count)));

        broker.cleanup().await.unwrap();
        broker.emit("e", vec![]).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
