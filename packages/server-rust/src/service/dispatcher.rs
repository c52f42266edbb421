//! Server-side call dispatch: the per-envelope pipeline.
//!
//! One dispatcher exists per managed service; its erased handler is what the
//! orchestrator registers on the queue. Every inbound envelope runs the same
//! strictly sequential pipeline:
//!
//! 1. derive a call-scoped logger (`"Service:Method"`, tid attached)
//! 2. run the middleware chain in declaration order, accumulating context
//!    data (shallow merge, later middleware wins) and short-circuiting on
//!    the first failure — the target method never runs after one
//! 3. commit the accumulated context into a fresh [`CallScope`] with a
//!    per-call network facade, so nested calls inherit tid and parent
//! 4. invoke the target method and package the outcome into exactly one
//!    [`EnvelopeResponse`]
//!
//! All per-call state lives in the scope built at step 3; the registered
//! service instance is never mutated, which is what makes concurrent
//! dispatches to one service safe.

use std::sync::Arc;

use meshrpc_core::{CallError, Envelope, EnvelopeResponse, ErrorKind};
use serde_json::json;

use super::descriptor::{CallScope, Service, ServiceDescriptor};
use crate::logger::Logger;
use crate::network::Network;
use crate::queue::EnvelopeHandler;

/// Uniform message for middleware failures that carry no explicit kind.
pub const MIDDLEWARE_FAILURE_MESSAGE: &str = "An error occurred while processing middlewares";

/// Per-service request pipeline; registered on the queue as the service's
/// envelope handler.
pub struct CallDispatcher {
    service: Arc<dyn Service>,
    descriptor: ServiceDescriptor,
    network: Network,
    logger: Logger,
}

impl CallDispatcher {
    #[must_use]
    pub fn new(service: Arc<dyn Service>, network: Network, logger: Logger) -> Self {
        let descriptor = service.descriptor();
        Self {
            service,
            descriptor,
            network,
            logger,
        }
    }

    /// Erase into the handler shape queues accept.
    #[must_use]
    pub fn handler(self: &Arc<Self>) -> EnvelopeHandler {
        let dispatcher = Arc::clone(self);
        Arc::new(move |envelope| {
            let dispatcher = Arc::clone(&dispatcher);
            Box::pin(async move { dispatcher.dispatch(envelope).await })
        })
    }

    /// Run one envelope through the pipeline. Infallible: every outcome,
    /// including middleware rejections and handler faults, becomes a
    /// response.
    pub async fn dispatch(&self, mut envelope: Envelope) -> EnvelopeResponse {
        let tid = envelope.context.tid.clone();
        let logger = self
            .logger
            .scoped(format!("{}:{}", envelope.service, envelope.method))
            .with_transaction(&tid);

        // Middleware chain: context accumulates across the chain, so each
        // middleware observes its predecessors' patches.
        for middleware in &self.descriptor.middlewares {
            match middleware.process(&envelope, self.service.as_ref()).await {
                Ok(patch) => envelope.context.merge_data(patch),
                Err(err) => {
                    let error = middleware_failure(err, &envelope, &tid);
                    logger.error(
                        "middleware rejected the call",
                        Some(&json!({ "middleware": middleware.id(), "error": error.to_string() })),
                    );
                    return EnvelopeResponse::failure(tid, error);
                }
            }
        }

        // Context commit: the accumulated context becomes the call's current
        // context, visible to the handler and to its nested calls.
        let network = self
            .network
            .for_call(logger.clone(), envelope.context.clone());
        let call = CallScope {
            context: envelope.context.clone(),
            logger: logger.clone(),
            network,
        };

        match self
            .service
            .handle(&envelope.method, &envelope.args, &call)
            .await
        {
            Ok(response) => EnvelopeResponse::success(tid, response),
            Err(mut error) => {
                error.merge_call_details(&envelope.service, &envelope.method, &tid);
                logger.error("call failed", Some(&json!({ "error": error.to_string() })));
                EnvelopeResponse::failure(tid, error)
            }
        }
    }
}

/// Wrap a middleware failure uniformly: an error without an explicit kind
/// gets the standard message with the original preserved as a detail; one
/// that already carries a kind (e.g. `denied`) passes through. Either way
/// the dispatch coordinates are merged in without clobbering inner details.
fn middleware_failure(err: CallError, envelope: &Envelope, tid: &str) -> CallError {
    let mut error = if err.kind == ErrorKind::Unexpected {
        let mut wrapped = CallError::unexpected(MIDDLEWARE_FAILURE_MESSAGE);
        wrapped.details = err.details;
        wrapped
            .details
            .entry("cause".to_string())
            .or_insert_with(|| err.message.into());
        wrapped
    } else {
        err
    };
    error.merge_call_details(&envelope.service, &envelope.method, tid);
    error
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
