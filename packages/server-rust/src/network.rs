//! Per-service network facade.
//!
//! Each service instance (and each in-flight call) gets a `Network` bound to
//! its own identifier. Outbound proxies built here inherit the current
//! call's tid and parent chain; event subscriptions are namespaced by the
//! target service and grouped by the owning service's identifier, so a
//! restarted service replaces its old subscription instead of stacking a
//! duplicate.

use std::sync::Arc;

use meshrpc_core::RequestContext;
use serde_json::{json, Map, Value};

use crate::client::{ServiceClient, ServiceProxy};
use crate::events::{EventListener, EventSystem};
use crate::logger::Logger;
use crate::queue::Queue;

/// Namespaced event key: `"<ServiceIdentifier>:<event>"`.
fn event_key(service: &str, event: &str) -> String {
    format!("{service}:{event}")
}

/// Facade bound to one owning service instance.
#[derive(Clone)]
pub struct Network {
    owner: &'static str,
    logger: Logger,
    queue: Arc<dyn Queue>,
    events: Option<Arc<dyn EventSystem>>,
    forwarded: Option<RequestContext>,
    origin: Option<String>,
}

impl Network {
    #[must_use]
    pub fn new(
        owner: &'static str,
        logger: Logger,
        queue: Arc<dyn Queue>,
        events: Option<Arc<dyn EventSystem>>,
    ) -> Self {
        Self {
            owner,
            logger,
            queue,
            events,
            forwarded: None,
            origin: None,
        }
    }

    /// Node identifier stamped onto outbound call contexts.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        self.origin = if origin.is_empty() { None } else { Some(origin) };
        self
    }

    /// Derive the facade for one in-flight call: same wiring, but outbound
    /// calls are nested under `forwarded`.
    #[must_use]
    pub(crate) fn for_call(&self, logger: Logger, forwarded: RequestContext) -> Self {
        Self {
            owner: self.owner,
            logger,
            queue: Arc::clone(&self.queue),
            events: self.events.clone(),
            forwarded: Some(forwarded),
            origin: self.origin.clone(),
        }
    }

    /// Identifier of the owning service.
    #[must_use]
    pub fn owner(&self) -> &'static str {
        self.owner
    }

    /// Untyped call proxy for `service`, pre-bound to this facade's queue,
    /// logger, and forwarded context.
    #[must_use]
    pub fn client(&self, service: &str) -> ServiceClient {
        let mut client = ServiceClient::new(service, Arc::clone(&self.queue), self.logger.clone());
        if let Some(forwarded) = &self.forwarded {
            client = client.with_forwarded_context(forwarded.clone());
        }
        if let Some(origin) = &self.origin {
            client = client.with_origin(origin.clone());
        }
        client
    }

    /// Typed proxy for the service `P` fronts.
    #[must_use]
    pub fn get<P: ServiceProxy>(&self) -> P {
        P::bind(self.client(P::SERVICE))
    }

    /// Typed proxy carrying an explicit context payload instead of the
    /// forwarded one.
    #[must_use]
    pub fn get_with_data<P: ServiceProxy>(&self, data: Map<String, Value>) -> P {
        P::bind(self.client(P::SERVICE).with_data(data))
    }

    /// Subscribe to `event` emitted by `service`, under this facade's owner
    /// as the subscription group.
    pub fn on(&self, service: &str, event: &str, listener: EventListener) {
        match &self.events {
            Some(events) => events.on(&event_key(service, event), self.owner, listener),
            None => self.warn_no_event_system("subscribe", service, event),
        }
    }

    /// Remove a subscription made through [`Network::on`].
    pub fn off(&self, service: &str, event: &str, listener: &EventListener) {
        match &self.events {
            Some(events) => events.off(&event_key(service, event), self.owner, listener),
            None => self.warn_no_event_system("unsubscribe", service, event),
        }
    }

    /// Publish `event` under this service's own identifier.
    pub async fn emit(&self, event: &str, args: Vec<Value>) {
        match &self.events {
            Some(events) => events.emit(&event_key(self.owner, event), args).await,
            None => self.warn_no_event_system("emit", self.owner, event),
        }
    }

    // Event delivery is an optional capability, not a hard dependency.
    fn warn_no_event_system(&self, action: &str, service: &str, event: &str) {
        self.logger.warning(
            "no event system configured",
            Some(&json!({ "action": action, "service": service, "event": event })),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::events::EventBroker;
    use crate::queue::InProcessQueue;

    fn make_network(events: Option<Arc<dyn EventSystem>>) -> Network {
        Network::new(
            "Billing",
            Logger::new(),
            Arc::new(InProcessQueue::new()),
            events,
        )
    }

    fn counting_listener(counter: Arc<AtomicU32>) -> EventListener {
        Arc::new(move |_args| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn emit_publishes_under_own_identifier() {
        let broker = Arc::new(EventBroker::new());
        let count = Arc::new(AtomicU32::new(0));
        broker.on("Billing:invoiced", "observer", counting_listener(Arc::clone(&count)));

        let network = make_network(Some(Arc::clone(&broker) as Arc<dyn EventSystem>));
        network.emit("invoiced", vec![]).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscriptions_are_grouped_by_owner_identifier() {
        let broker = Arc::new(EventBroker::new());
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        let network = make_network(Some(Arc::clone(&broker) as Arc<dyn EventSystem>));
        network.on("Ledger", "posted", counting_listener(Arc::clone(&first)));
        // Same owner re-subscribing replaces, not appends.
        network.on("Ledger", "posted", counting_listener(Arc::clone(&second)));

        broker.emit("Ledger:posted", vec![]).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn off_unregisters_through_the_facade() {
        let broker = Arc::new(EventBroker::new());
        let count = Arc::new(AtomicU32::new(0));
        let listener = counting_listener(Arc::clone(&count));

        let network = make_network(Some(Arc::clone(&broker) as Arc<dyn EventSystem>));
        network.on("Ledger", "posted", Arc::clone(&listener));
        network.off("Ledger", "posted", &listener);

        broker.emit("Ledger:posted", vec![]).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_event_system_is_a_logged_no_op() {
        let network = make_network(None);
        let count = Arc::new(AtomicU32::new(0));
        let listener = counting_listener(Arc::clone(&count));

        // None of these may panic or fail.
        network.on("Ledger", "posted", Arc::clone(&listener));
        network.off("Ledger", "posted", &listener);
        network.emit("posted", vec![]).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn client_inherits_forwarded_context() {
        let network = make_network(None);
        let per_call = network.for_call(Logger::new(), RequestContext::root("tid-1"));
        // The derived facade builds clients whose calls nest under tid-1;
        // verified end-to-end in the dispatcher tests.
        assert_eq!(per_call.owner(), "Billing");
        let client = per_call.client("Ledger");
        assert_eq!(client.service(), "Ledger");
    }
}
