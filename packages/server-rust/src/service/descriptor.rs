//! Service model: static per-type descriptor, lifecycle trait, and the
//! per-call scope handed to handlers.

use std::sync::Arc;

use async_trait::async_trait;
use meshrpc_core::{CallError, RequestContext};
use serde_json::Value;

use super::middleware::Middleware;
use crate::logger::Logger;
use crate::network::Network;

// ---------------------------------------------------------------------------
// ServiceDescriptor
// ---------------------------------------------------------------------------

/// Static, per-service-type configuration.
///
/// The identifier is the routing key used by every queue and by the event
/// fabric's namespacing. Middlewares are ordered and shared across all calls
/// of the type, so they must not hold per-call mutable state outside what
/// `process` receives.
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub identifier: &'static str,
    pub middlewares: Vec<Arc<dyn Middleware>>,
    /// Managed regardless of the orchestrator's allow-list. Used by
    /// infrastructure services that must start even in partially-managed
    /// deployments.
    pub always_managed: bool,
}

impl ServiceDescriptor {
    #[must_use]
    pub fn new(identifier: &'static str) -> Self {
        Self {
            identifier,
            middlewares: Vec::new(),
            always_managed: false,
        }
    }

    /// Append a middleware; declaration order is execution order.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    #[must_use]
    pub fn always_managed(mut self) -> Self {
        self.always_managed = true;
        self
    }
}

// ---------------------------------------------------------------------------
// CallScope
// ---------------------------------------------------------------------------

/// Per-call state built fresh by the dispatcher for every inbound envelope.
///
/// Handlers receive their request context, scoped logger, and network facade
/// through this value instead of through service fields, so concurrent calls
/// to the same service instance never race on shared mutable state.
#[derive(Clone)]
pub struct CallScope {
    /// The committed context: tid, middleware-accumulated data, parent link.
    pub context: RequestContext,
    /// Logger scoped to `"Service:Method"` with the call's tid attached.
    pub logger: Logger,
    /// Facade whose outbound calls inherit this call's tid and parent chain.
    pub network: Network,
}

impl CallScope {
    /// Context data injected by middlewares (e.g., a verified identity), if
    /// any middleware contributed one.
    #[must_use]
    pub fn data(&self, key: &str) -> Option<&Value> {
        self.context.data.as_ref().and_then(|data| data.get(key))
    }
}

// ---------------------------------------------------------------------------
// Service trait
// ---------------------------------------------------------------------------

/// A dispatchable service type.
///
/// Instances are created once at process start and live for the process
/// lifetime. `handle` resolves the wire-level method name through an
/// explicit match; unknown methods must return
/// [`CallError::method_not_found`] rather than silently no-op.
#[async_trait]
pub trait Service: Send + Sync {
    /// Static configuration for this service type.
    fn descriptor(&self) -> ServiceDescriptor;

    /// First lifecycle hook; the facade is wired but handlers are not yet
    /// registered anywhere.
    async fn prepare(&self, network: &Network) -> anyhow::Result<()> {
        let _ = network;
        Ok(())
    }

    /// Last start hook; guaranteed to observe a fully wired,
    /// handler-registered network.
    async fn ready(&self, network: &Network) -> anyhow::Result<()> {
        let _ = network;
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Invoke `method` with the envelope's positional arguments.
    async fn handle(
        &self,
        method: &str,
        args: &[Value],
        call: &CallScope,
    ) -> Result<Option<Value>, CallError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
