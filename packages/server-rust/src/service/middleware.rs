//! Per-call middleware contract.
//!
//! Middlewares run in declaration order before the target method. Each one
//! sees the envelope with the context accumulated so far and either returns
//! a context-data patch or fails the call. The core makes no assumption
//! about what a patch contains; an auth middleware, for instance, injects
//! the verified identity the downstream handler reads from its call scope.

use async_trait::async_trait;
use meshrpc_core::{CallError, Envelope};
use serde_json::{Map, Value};

use super::descriptor::Service;

/// Shallow patch merged into `envelope.context.data` between middlewares.
/// Later middlewares' keys win on conflict.
pub type ContextPatch = Map<String, Value>;

/// Ordered per service type; stateless across calls except for values
/// explicitly cached in `prepare` (e.g., a fetched public key).
#[async_trait]
pub trait Middleware: Send + Sync {
    fn id(&self) -> &'static str;

    /// Called once per managed service during orchestrator start.
    async fn prepare(&self, service: &dyn Service) -> anyhow::Result<()> {
        let _ = service;
        Ok(())
    }

    /// Called once per managed service during teardown.
    async fn cleanup(&self, service: &dyn Service) -> anyhow::Result<()> {
        let _ = service;
        Ok(())
    }

    /// Inspect the call and contribute context data, or reject it. Any
    /// failure stops the chain immediately; the target method never runs.
    async fn process(
        &self,
        envelope: &Envelope,
        service: &dyn Service,
    ) -> Result<ContextPatch, CallError>;
}
