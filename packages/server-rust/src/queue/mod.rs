//! Transport-neutral queue abstraction.
//!
//! A queue moves envelopes from callers to whichever server registered a
//! handler for the target service name. Routing misses are ordinary failure
//! responses, never panics: `enqueue` is infallible at the type level so a
//! client always receives a well-formed [`EnvelopeResponse`].

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use meshrpc_core::{Envelope, EnvelopeResponse};

use crate::logger::Logger;

pub mod in_process;
pub mod network;

pub use in_process::InProcessQueue;
pub use network::{NetworkQueue, QueueBinding, RoutingError};

/// Type-erased per-service envelope handler installed by a server.
pub type EnvelopeHandler =
    Arc<dyn Fn(Envelope) -> BoxFuture<'static, EnvelopeResponse> + Send + Sync>;

/// Contract every transport (in-process, HTTP, WebSocket, ...) satisfies to
/// participate in the logical network.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Bring the transport up. Must complete before any `set_handler` or
    /// `enqueue` call.
    async fn prepare(&self) -> anyhow::Result<()>;

    /// Tear the transport down, releasing routes and handlers.
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// Assign the logger used for transport-level diagnostics.
    fn set_logger(&self, logger: Logger);

    /// Install the handler that processes every envelope addressed to
    /// `service`.
    ///
    /// # Errors
    ///
    /// Implementations may reject registration, e.g. when no route exists
    /// for `service`.
    async fn set_handler(&self, service: &str, handler: EnvelopeHandler) -> anyhow::Result<()>;

    /// Deliver an envelope and wait for its response. A missing route or
    /// handler yields a `not_found` failure response.
    async fn enqueue(&self, envelope: Envelope) -> EnvelopeResponse;
}
