//! Error taxonomy shared by every dispatch boundary.
//!
//! Errors crossing a queue keep their original kind and message; outer
//! layers annotate `details` without overwriting what inner layers attached,
//! so a caller several hops away still sees the original failure.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Call failure classification, serialized as the wire-level `name` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Authorization or precondition refusal.
    Denied,
    /// Missing service, method, or route.
    NotFound,
    /// Everything else, including transport and runtime faults.
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denied => f.write_str("denied"),
            Self::NotFound => f.write_str("not_found"),
            Self::Unexpected => f.write_str("unexpected"),
        }
    }
}

// ---------------------------------------------------------------------------
// CallError
// ---------------------------------------------------------------------------

/// Typed failure returned by middlewares, handlers, and queues.
///
/// `details` accumulates context as the error crosses boundaries. Merging is
/// insert-if-absent: an outer layer never clobbers a key an inner layer
/// already attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct CallError {
    #[serde(rename = "name")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl CallError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Map::new(),
            stack: None,
        }
    }

    /// Authorization/precondition refusal.
    #[must_use]
    pub fn denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Denied, message)
    }

    /// Missing service, method, or route.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Unclassified runtime or transport fault.
    #[must_use]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// No handler registered for `service` on the receiving queue.
    #[must_use]
    pub fn service_not_found(service: &str) -> Self {
        Self::not_found(format!("no handler registered for service '{service}'"))
            .with_detail("service", service)
    }

    /// `method` is not part of `service`'s operation set.
    #[must_use]
    pub fn method_not_found(service: &str, method: &str) -> Self {
        Self::not_found(format!("method '{method}' not found on service '{service}'"))
            .with_detail("service", service)
            .with_detail("method", method)
    }

    /// No queue binding (and no default) routes to `service`. The message
    /// names the service so operators know which route to add.
    #[must_use]
    pub fn no_route(service: &str) -> Self {
        Self::not_found(format!("no network found for service '{service}'"))
            .with_detail("service", service)
    }

    /// Builder-style detail attachment at construction time.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Merge details from an outer layer. Keys already present win: an
    /// inner layer's context is never discarded by annotation.
    pub fn merge_details<I>(&mut self, details: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (key, value) in details {
            self.details.entry(key).or_insert(value);
        }
    }

    /// Annotate with the dispatch coordinates of the failing call.
    pub fn merge_call_details(&mut self, service: &str, method: &str, tid: &str) {
        self.merge_details([
            ("service".to_string(), Value::from(service)),
            ("method".to_string(), Value::from(method)),
            ("tid".to_string(), Value::from(tid)),
        ]);
    }
}

impl From<anyhow::Error> for CallError {
    /// Normalizes an untyped failure to `unexpected`, preserving the full
    /// error chain as a detail when it adds information over the message.
    fn from(err: anyhow::Error) -> Self {
        let message = err.to_string();
        let chain = format!("{err:#}");
        let mut out = Self::unexpected(message);
        if chain != out.message {
            out.details.insert("cause".to_string(), Value::from(chain));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
