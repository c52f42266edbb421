//! Direct in-process dispatch: the simplest queue, a service-name to handler
//! table with no transport in between.

use async_trait::async_trait;
use dashmap::DashMap;
use meshrpc_core::{CallError, Envelope, EnvelopeResponse};
use parking_lot::RwLock;
use serde_json::json;

use super::{EnvelopeHandler, Queue};
use crate::logger::Logger;

/// In-process queue: `set_handler` populates a handler table, `enqueue`
/// looks the target up and invokes it directly.
#[derive(Default)]
pub struct InProcessQueue {
    handlers: DashMap<String, EnvelopeHandler>,
    logger: RwLock<Logger>,
}

impl InProcessQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Queue for InProcessQueue {
    async fn prepare(&self) -> anyhow::Result<()> {
        // A fresh prepare discards handlers from any previous run.
        self.handlers.clear();
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        self.handlers.clear();
        Ok(())
    }

    fn set_logger(&self, logger: Logger) {
        *self.logger.write() = logger;
    }

    async fn set_handler(&self, service: &str, handler: EnvelopeHandler) -> anyhow::Result<()> {
        self.handlers.insert(service.to_string(), handler);
        Ok(())
    }

    async fn enqueue(&self, envelope: Envelope) -> EnvelopeResponse {
        // Clone the handler out so no map guard is held across the await.
        let handler = self.handlers.get(&envelope.service).map(|h| h.clone());
        match handler {
            Some(handler) => handler(envelope).await,
            None => {
                let logger = self.logger.read().clone();
                logger.warning(
                    "envelope for unhandled service",
                    Some(&json!({ "service": envelope.service })),
                );
                let error = CallError::service_not_found(&envelope.service);
                EnvelopeResponse::failure(envelope.context.tid, error)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
