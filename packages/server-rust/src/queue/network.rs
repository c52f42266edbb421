//! Multi-transport router: one logical network over several queues.
//!
//! A `NetworkQueue` is built from bindings, each associating an underlying
//! queue with the service names it carries (plus at most one default route).
//! Envelopes fan out by exact service-name match, falling back to the
//! default; with neither, the call fails with a `no_route` response that
//! names the missing service so operators know which binding to add.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use meshrpc_core::{CallError, Envelope, EnvelopeResponse};
use parking_lot::RwLock;
use serde_json::json;

use super::{EnvelopeHandler, Queue};
use crate::logger::Logger;

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// One transport and the service names it carries.
pub struct QueueBinding {
    pub queue: Arc<dyn Queue>,
    pub services: Vec<String>,
    /// At most one binding per router may be the default route.
    pub default: bool,
}

impl QueueBinding {
    #[must_use]
    pub fn new(queue: Arc<dyn Queue>, services: Vec<String>) -> Self {
        Self {
            queue,
            services,
            default: false,
        }
    }

    /// Mark this binding as the fallback for services no binding names.
    #[must_use]
    pub fn default_route(mut self) -> Self {
        self.default = true;
        self
    }
}

/// Route-table construction and registration failures.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("service '{service}' appears in more than one binding")]
    DuplicateService { service: String },
    #[error("more than one binding is marked default")]
    MultipleDefaults,
    #[error("no queue associated with service '{service}'")]
    UnmappedService { service: String },
}

// ---------------------------------------------------------------------------
// NetworkQueue
// ---------------------------------------------------------------------------

/// Router over several underlying queues, keyed by service name.
pub struct NetworkQueue {
    bindings: Vec<QueueBinding>,
    routes: RwLock<HashMap<String, Arc<dyn Queue>>>,
    default_queue: RwLock<Option<Arc<dyn Queue>>>,
    logger: RwLock<Logger>,
}

impl NetworkQueue {
    #[must_use]
    pub fn new(bindings: Vec<QueueBinding>) -> Self {
        Self {
            bindings,
            routes: RwLock::new(HashMap::new()),
            default_queue: RwLock::new(None),
            logger: RwLock::new(Logger::new()),
        }
    }

    /// The queue bound to `service`, if any (exact match only).
    #[must_use]
    pub fn route_for(&self, service: &str) -> Option<Arc<dyn Queue>> {
        self.routes.read().get(service).cloned()
    }

    fn build_routes(&self) -> Result<(), RoutingError> {
        let mut routes: HashMap<String, Arc<dyn Queue>> = HashMap::new();
        let mut default_queue: Option<Arc<dyn Queue>> = None;

        for binding in &self.bindings {
            for service in &binding.services {
                if routes
                    .insert(service.clone(), Arc::clone(&binding.queue))
                    .is_some()
                {
                    return Err(RoutingError::DuplicateService {
                        service: service.clone(),
                    });
                }
            }
            if binding.default {
                if default_queue.is_some() {
                    return Err(RoutingError::MultipleDefaults);
                }
                default_queue = Some(Arc::clone(&binding.queue));
            }
        }

        *self.routes.write() = routes;
        *self.default_queue.write() = default_queue;
        Ok(())
    }
}

#[async_trait]
impl Queue for NetworkQueue {
    async fn prepare(&self) -> anyhow::Result<()> {
        for binding in &self.bindings {
            binding.queue.prepare().await?;
        }
        self.build_routes()?;
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        self.routes.write().clear();
        self.default_queue.write().take();

        // Best effort across transports; the first failure is reported after
        // every queue had its chance to clean up.
        let mut first_error = None;
        for binding in &self.bindings {
            if let Err(err) = binding.queue.cleanup().await {
                let logger = self.logger.read().clone();
                logger.error(
                    "queue cleanup failed",
                    Some(&json!({ "error": err.to_string() })),
                );
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn set_logger(&self, logger: Logger) {
        for binding in &self.bindings {
            binding.queue.set_logger(logger.clone());
        }
        *self.logger.write() = logger;
    }

    async fn set_handler(&self, service: &str, handler: EnvelopeHandler) -> anyhow::Result<()> {
        // Handler registration and routing must agree: registering a service
        // no binding routes to is a configuration bug, not a soft miss.
        let queue = self
            .route_for(service)
            .ok_or_else(|| RoutingError::UnmappedService {
                service: service.to_string(),
            })?;
        queue.set_handler(service, handler).await
    }

    async fn enqueue(&self, envelope: Envelope) -> EnvelopeResponse {
        let queue = self
            .route_for(&envelope.service)
            .or_else(|| self.default_queue.read().clone());
        match queue {
            Some(queue) => queue.enqueue(envelope).await,
            None => {
                let error = CallError::no_route(&envelope.service);
                EnvelopeResponse::failure(envelope.context.tid, error)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
