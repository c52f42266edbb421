//! Client-side call proxying.
//!
//! A `ServiceClient` turns "call method X on service S" into an envelope,
//! sends it through the queue, and unwraps the response. Nested calls reuse
//! the forwarded transaction id and link their context to the caller's, so
//! one tid threads a whole call chain and `parent` pointers reconstruct it.

use std::sync::Arc;

use meshrpc_core::{CallError, Envelope, RequestContext};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::logger::Logger;
use crate::queue::Queue;

/// Call proxy pre-bound to one target service.
#[derive(Clone)]
pub struct ServiceClient {
    service: String,
    queue: Arc<dyn Queue>,
    logger: Logger,
    forwarded: Option<RequestContext>,
    data: Option<Map<String, Value>>,
    origin: Option<String>,
}

impl ServiceClient {
    #[must_use]
    pub fn new(service: impl Into<String>, queue: Arc<dyn Queue>, logger: Logger) -> Self {
        Self {
            service: service.into(),
            queue,
            logger,
            forwarded: None,
            data: None,
            origin: None,
        }
    }

    /// Bind the context of the call this client is nested under. Outbound
    /// calls reuse its tid and chain their `parent` to it.
    #[must_use]
    pub fn with_forwarded_context(mut self, context: RequestContext) -> Self {
        self.forwarded = Some(context);
        self
    }

    /// Explicit context payload for outbound calls. Overrides the forwarded
    /// context's data, which is otherwise inherited.
    #[must_use]
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    /// Stamp outbound contexts with the originating node's identifier.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Invoke `method` with positional `args`.
    ///
    /// # Errors
    ///
    /// A failure response yields its error verbatim: the kind, message, and
    /// details observed here are exactly what the failing layer produced,
    /// however many transport hops away it was.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Option<Value>, CallError> {
        let mut context = match &self.forwarded {
            Some(parent) => RequestContext::child(parent, self.data.clone()),
            None => {
                let mut root = RequestContext::root(Uuid::new_v4().to_string());
                root.data = self.data.clone();
                root
            }
        };
        if context.origin.is_none() {
            context.origin = self.origin.clone();
        }

        self.logger.debug(
            "outbound call",
            Some(&json!({ "service": self.service, "method": method, "tid": context.tid })),
        );

        let envelope = Envelope::new(self.service.clone(), method, args, context);
        self.queue.enqueue(envelope).await.into_result()
    }
}

/// Typed proxy over a [`ServiceClient`].
///
/// Wire envelopes still carry the method name as a string; a proxy type
/// gives local callers a statically-checked surface over that, one method
/// per operation, each delegating to [`ServiceClient::call`].
pub trait ServiceProxy {
    /// The target service's identifier.
    const SERVICE: &'static str;

    fn bind(client: ServiceClient) -> Self;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use meshrpc_core::{EnvelopeResponse, ErrorKind};
    use parking_lot::Mutex;

    use super::*;
    use crate::queue::{EnvelopeHandler, InProcessQueue};

    /// Handler that records every envelope it sees and succeeds.
    fn recording_handler(seen: Arc<Mutex<Vec<Envelope>>>) -> EnvelopeHandler {
        Arc::new(move |envelope: Envelope| {
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                let tid = envelope.context.tid.clone();
                seen.lock().push(envelope);
                EnvelopeResponse::success(tid, None)
            })
        })
    }

    async fn queue_with_recorder(service: &str) -> (Arc<InProcessQueue>, Arc<Mutex<Vec<Envelope>>>) {
        let queue = Arc::new(InProcessQueue::new());
        queue.prepare().await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        queue
            .set_handler(service, recording_handler(Arc::clone(&seen)))
            .await
            .unwrap();
        (queue, seen)
    }

    #[tokio::test]
    async fn top_level_calls_mint_distinct_tids() {
        let (queue, seen) = queue_with_recorder("Ledger").await;
        let client = ServiceClient::new("Ledger", queue, Logger::new());

        client.call("post", vec![]).await.unwrap();
        client.call("post", vec![]).await.unwrap();

        let seen = seen.lock();
        assert_ne!(seen[0].context.tid, seen[1].context.tid);
        assert!(seen.iter().all(|e| e.context.parent.is_none()));
    }

    #[tokio::test]
    async fn forwarded_context_reuses_tid_and_sets_parent() {
        let (queue, seen) = queue_with_recorder("Ledger").await;
        let outer = RequestContext::root("tid-outer");
        let client = ServiceClient::new("Ledger", queue, Logger::new())
            .with_forwarded_context(outer.clone());

        client.call("post", vec![]).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen[0].context.tid, "tid-outer");
        assert_eq!(seen[0].context.parent.as_deref(), Some(&outer));
    }

    #[tokio::test]
    async fn explicit_data_overrides_forwarded_data() {
        let (queue, seen) = queue_with_recorder("Ledger").await;
        let mut outer = RequestContext::root("tid-outer");
        outer.data = Some(json!({ "token": "inherited" }).as_object().unwrap().clone());
        let explicit = json!({ "token": "explicit" }).as_object().unwrap().clone();

        let client = ServiceClient::new("Ledger", Arc::clone(&queue) as Arc<dyn Queue>, Logger::new())
            .with_forwarded_context(outer.clone())
            .with_data(explicit.clone());
        client.call("post", vec![]).await.unwrap();

        let inheriting = ServiceClient::new("Ledger", queue, Logger::new())
            .with_forwarded_context(outer);
        inheriting.call("post", vec![]).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen[0].context.data, Some(explicit));
        assert_eq!(
            seen[1].context.data,
            Some(json!({ "token": "inherited" }).as_object().unwrap().clone())
        );
    }

    #[tokio::test]
    async fn origin_is_stamped_on_outbound_context() {
        let (queue, seen) = queue_with_recorder("Ledger").await;
        let client = ServiceClient::new("Ledger", queue, Logger::new()).with_origin("node-1");

        client.call("post", vec![]).await.unwrap();
        assert_eq!(seen.lock()[0].context.origin.as_deref(), Some("node-1"));
    }

    #[tokio::test]
    async fn failure_response_error_is_raised_verbatim() {
        let queue = Arc::new(InProcessQueue::new());
        queue.prepare().await.unwrap();
        let denial: EnvelopeHandler = Arc::new(|envelope: Envelope| {
            Box::pin(async move {
                EnvelopeResponse::failure(
                    envelope.context.tid,
                    CallError::denied("X").with_detail("reason", "quota"),
                )
            })
        });
        queue.set_handler("Vault", denial).await.unwrap();

        let client = ServiceClient::new("Vault", queue, Logger::new());
        let error = client.call("open", vec![]).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Denied);
        assert_eq!(error.message, "X");
        assert_eq!(error.details["reason"], json!("quota"));
    }

    #[tokio::test]
    async fn missing_route_surfaces_as_catchable_error() {
        let queue = Arc::new(InProcessQueue::new());
        queue.prepare().await.unwrap();

        let client = ServiceClient::new("Ghost", queue, Logger::new());
        let error = client.call("ping", vec![]).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::NotFound);
    }
}
