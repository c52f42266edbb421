//! Server orchestrator: wires queue, event system, and logger to the
//! registered services and drives the start/stop lifecycle.
//!
//! Start is strictly phased — logger, queue, event system, per-service
//! prepare, handler registration, middleware prepare, ready — and aborts on
//! the first failure so the process never claims readiness with
//! partially-initialized services. Stop is best-effort and symmetric: each
//! service's teardown failure is logged with its identifier and never blocks
//! the remaining services or subsystems.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _};
use serde_json::json;

use crate::config::ServerConfig;
use crate::events::EventSystem;
use crate::logger::Logger;
use crate::network::Network;
use crate::queue::Queue;
use crate::service::{CallDispatcher, DrainController, Service, ServiceDescriptor};

// ---------------------------------------------------------------------------
// Managed-pattern matching
// ---------------------------------------------------------------------------

/// Allow-list match: exact name, or a single-`*` glob matched by prefix and
/// suffix only. Patterns with more than one wildcard match nothing (they are
/// not an error).
#[must_use]
pub fn matches_pattern(pattern: &str, identifier: &str) -> bool {
    let mut parts = pattern.splitn(3, '*');
    let Some(first) = parts.next() else {
        return false;
    };
    match (parts.next(), parts.next()) {
        (None, _) => first == identifier,
        (Some(suffix), None) => {
            identifier.len() >= first.len() + suffix.len()
                && identifier.starts_with(first)
                && identifier.ends_with(suffix)
        }
        (Some(_), Some(_)) => false,
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Lifecycle orchestrator for one process's services.
pub struct Server {
    config: Arc<ServerConfig>,
    logger: Logger,
    queue: Arc<dyn Queue>,
    events: Option<Arc<dyn EventSystem>>,
    services: Vec<Arc<dyn Service>>,
    managed_patterns: Option<Vec<String>>,
}

impl Server {
    #[must_use]
    pub fn new(config: ServerConfig, logger: Logger, queue: Arc<dyn Queue>) -> Self {
        Self {
            config: Arc::new(config),
            logger,
            queue,
            events: None,
            services: Vec::new(),
            managed_patterns: None,
        }
    }

    #[must_use]
    pub fn with_event_system(mut self, events: Arc<dyn EventSystem>) -> Self {
        self.events = Some(events);
        self
    }

    /// Restrict the managed subset to services matching one of `patterns`.
    /// Services whose descriptor declares `always_managed` start regardless.
    #[must_use]
    pub fn manage_only(mut self, patterns: Vec<String>) -> Self {
        self.managed_patterns = Some(patterns);
        self
    }

    pub fn register(&mut self, service: Arc<dyn Service>) {
        self.services.push(service);
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Drain controller polling at this server's configured interval.
    /// Drain-aware services take one at construction time and share it with
    /// their workers.
    #[must_use]
    pub fn drain_controller(&self) -> Arc<DrainController> {
        Arc::new(DrainController::with_poll_interval(Duration::from_millis(
            self.config.drain_poll_interval_ms,
        )))
    }

    /// The services this orchestrator will start: every registered service
    /// when no allow-list is set, otherwise the allow-list matches plus the
    /// always-managed ones.
    #[must_use]
    pub fn managed(&self) -> Vec<(Arc<dyn Service>, ServiceDescriptor)> {
        self.services
            .iter()
            .filter_map(|service| {
                let descriptor = service.descriptor();
                let selected = descriptor.always_managed
                    || self.managed_patterns.as_ref().is_none_or(|patterns| {
                        patterns
                            .iter()
                            .any(|pattern| matches_pattern(pattern, descriptor.identifier))
                    });
                selected.then(|| (Arc::clone(service), descriptor))
            })
            .collect()
    }

    fn network_for(&self, identifier: &'static str) -> Network {
        Network::new(
            identifier,
            self.logger.scoped(identifier),
            Arc::clone(&self.queue),
            self.events.clone(),
        )
        .with_origin(self.config.node_id.clone())
    }

    /// Run the start sequence. Each phase fully completes before the next;
    /// `ready` hooks are guaranteed to observe a fully wired,
    /// handler-registered network.
    ///
    /// # Errors
    ///
    /// Any failure aborts the whole sequence.
    pub async fn prepare(&self) -> anyhow::Result<()> {
        self.logger.prepare();
        self.queue.set_logger(self.logger.clone());
        self.queue.prepare().await.context("queue prepare failed")?;
        if let Some(events) = &self.events {
            events.set_logger(self.logger.clone());
            events
                .prepare()
                .await
                .context("event system prepare failed")?;
        }

        let managed = self.managed();
        let mut seen = HashSet::new();
        for (_, descriptor) in &managed {
            if descriptor.identifier.is_empty() {
                bail!("service identifier must not be empty");
            }
            if !seen.insert(descriptor.identifier) {
                bail!("duplicate service identifier '{}'", descriptor.identifier);
            }
        }

        let mut networks = Vec::with_capacity(managed.len());
        for (service, descriptor) in &managed {
            let network = self.network_for(descriptor.identifier);
            service
                .prepare(&network)
                .await
                .with_context(|| format!("prepare failed for service '{}'", descriptor.identifier))?;
            networks.push(network);
        }

        for ((service, descriptor), network) in managed.iter().zip(&networks) {
            let dispatcher = Arc::new(CallDispatcher::new(
                Arc::clone(service),
                network.clone(),
                self.logger.clone(),
            ));
            self.queue
                .set_handler(descriptor.identifier, dispatcher.handler())
                .await
                .with_context(|| {
                    format!("handler registration failed for service '{}'", descriptor.identifier)
                })?;
        }

        for (service, descriptor) in &managed {
            for middleware in &descriptor.middlewares {
                middleware.prepare(service.as_ref()).await.with_context(|| {
                    format!(
                        "middleware '{}' prepare failed for service '{}'",
                        middleware.id(),
                        descriptor.identifier
                    )
                })?;
            }
        }

        for ((service, descriptor), network) in managed.iter().zip(&networks) {
            service
                .ready(network)
                .await
                .with_context(|| format!("ready failed for service '{}'", descriptor.identifier))?;
        }

        self.logger.info(
            "server ready",
            Some(&json!({ "services": managed.len() })),
        );
        Ok(())
    }

    /// Run the stop sequence. Individual failures are logged with the
    /// offending service's identifier and do not block the rest of the
    /// teardown.
    pub async fn stop(&self) {
        let managed = self.managed();

        for (service, descriptor) in &managed {
            for middleware in &descriptor.middlewares {
                if let Err(err) = middleware.cleanup(service.as_ref()).await {
                    self.logger.error(
                        "middleware cleanup failed",
                        Some(&json!({
                            "service": descriptor.identifier,
                            "middleware": middleware.id(),
                            "error": err.to_string(),
                        })),
                    );
                }
            }
        }

        for (service, descriptor) in &managed {
            if let Err(err) = service.cleanup().await {
                self.logger.error(
                    "service cleanup failed",
                    Some(&json!({
                        "service": descriptor.identifier,
                        "error": err.to_string(),
                    })),
                );
            }
        }

        if let Err(err) = self.queue.cleanup().await {
            self.logger.error(
                "queue cleanup failed",
                Some(&json!({ "error": err.to_string() })),
            );
        }
        if let Some(events) = &self.events {
            if let Err(err) = events.cleanup().await {
                self.logger.error(
                    "event system cleanup failed",
                    Some(&json!({ "error": err.to_string() })),
                );
            }
        }
        self.logger.cleanup();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
