//! In-process publish/subscribe keyed by `(event, group)` pairs.
//!
//! Event delivery is an optional capability of the runtime: components that
//! receive no event system degrade to warn-and-skip rather than failing.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::logger::Logger;

pub mod broker;

pub use broker::EventBroker;

/// Type-erased event listener. Failures are reported to the fabric, which
/// logs them without disturbing sibling listeners or the emitter.
pub type EventListener = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Boundary contract for event transports.
///
/// An external fabric (e.g., a broker-backed one) can replace the in-process
/// [`EventBroker`] as long as it keeps the `(event, group)` replace-not-append
/// semantics.
#[async_trait]
pub trait EventSystem: Send + Sync {
    async fn prepare(&self) -> anyhow::Result<()>;

    async fn cleanup(&self) -> anyhow::Result<()>;

    fn set_logger(&self, logger: Logger);

    /// Insert or replace the listener in the `(event, group)` slot. A group
    /// holds at most one listener; re-registration is last-write-wins so a
    /// redeployed subscriber never accumulates duplicates.
    fn on(&self, event: &str, group: &str, listener: EventListener);

    /// Remove the `(event, group)` slot, but only when `listener` is the one
    /// currently registered there. An out-of-order `off` carrying a stale
    /// listener must not steal the slot from a newer registration.
    fn off(&self, event: &str, group: &str, listener: &EventListener);

    /// Deliver `args` to a snapshot of the listeners registered for `event`,
    /// concurrently; listener failures are isolated from each other and
    /// never reach the emitter.
    async fn emit(&self, event: &str, args: Vec<Value>);
}
