//! Wire-level call model: `Envelope`, `RequestContext`, `EnvelopeResponse`.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` with absent optional
//! fields skipped, so the MsgPack/JSON wire shape is identical for every
//! transport.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CallError;

// ---------------------------------------------------------------------------
// RequestContext
// ---------------------------------------------------------------------------

/// Per-call context threaded through every hop of a call chain.
///
/// `tid` is minted once at the outermost call and reused unchanged by every
/// nested call it triggers. `parent` links a nested call back to its caller,
/// forming the call tree; `data` is the explicit, transport-visible payload
/// (e.g., an auth token) and is only inherited when the caller forwards it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Transaction/trace identifier, stable across the whole call chain.
    pub tid: String,
    /// Identifier of the transport or node that originated the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Explicit context payload visible to middlewares and handlers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    /// Context of the call this one is nested under, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<RequestContext>>,
}

impl RequestContext {
    /// Context for an outermost (top-level) call.
    #[must_use]
    pub fn root(tid: impl Into<String>) -> Self {
        Self {
            tid: tid.into(),
            origin: None,
            data: None,
            parent: None,
        }
    }

    /// Context for a call nested under `parent`.
    ///
    /// Reuses the parent's `tid`. `data` falls back to the parent's data
    /// when no explicit payload is supplied, matching the proxy's
    /// forwarding rule.
    #[must_use]
    pub fn child(parent: &RequestContext, data: Option<Map<String, Value>>) -> Self {
        Self {
            tid: parent.tid.clone(),
            origin: None,
            data: data.or_else(|| parent.data.clone()),
            parent: Some(Box::new(parent.clone())),
        }
    }

    /// Shallow-merge a middleware patch into `data`. Patch keys win on
    /// conflict; keys absent from the patch are preserved.
    pub fn merge_data(&mut self, patch: Map<String, Value>) {
        if patch.is_empty() {
            return;
        }
        let data = self.data.get_or_insert_with(Map::new);
        for (key, value) in patch {
            data.insert(key, value);
        }
    }

    /// Number of ancestors in the call tree (0 for a top-level call).
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent.as_deref();
        while let Some(ctx) = current {
            depth += 1;
            current = ctx.parent.as_deref();
        }
        depth
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One remote operation invocation: which service, which method, with what
/// arguments, under what context. Built by the caller and immutable from its
/// point of view; the dispatcher works on its own copy when accumulating
/// middleware context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub service: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
    pub context: RequestContext,
}

impl Envelope {
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Value>,
        context: RequestContext,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            args,
            context,
        }
    }
}

// ---------------------------------------------------------------------------
// EnvelopeResponse
// ---------------------------------------------------------------------------

/// Result of exactly one dispatch: success with an optional return value, or
/// failure with a typed error. Never both, never neither.
///
/// Serialized through the flat `{ tid, success, response?, error? }` wire
/// repr shared with non-Rust peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ResponseRepr", try_from = "ResponseRepr")]
pub enum EnvelopeResponse {
    Success {
        tid: String,
        response: Option<Value>,
    },
    Failure {
        tid: String,
        error: CallError,
    },
}

impl EnvelopeResponse {
    #[must_use]
    pub fn success(tid: impl Into<String>, response: Option<Value>) -> Self {
        Self::Success {
            tid: tid.into(),
            response,
        }
    }

    #[must_use]
    pub fn failure(tid: impl Into<String>, error: CallError) -> Self {
        Self::Failure {
            tid: tid.into(),
            error,
        }
    }

    #[must_use]
    pub fn tid(&self) -> &str {
        match self {
            Self::Success { tid, .. } | Self::Failure { tid, .. } => tid,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Unwrap into the caller-facing result, yielding the failure error
    /// verbatim so kind/message/details survive the round trip.
    pub fn into_result(self) -> Result<Option<Value>, CallError> {
        match self {
            Self::Success { response, .. } => Ok(response),
            Self::Failure { error, .. } => Err(error),
        }
    }
}

/// Flat wire representation of [`EnvelopeResponse`].
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseRepr {
    tid: String,
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<CallError>,
}

impl From<EnvelopeResponse> for ResponseRepr {
    fn from(resp: EnvelopeResponse) -> Self {
        match resp {
            EnvelopeResponse::Success { tid, response } => Self {
                tid,
                success: true,
                response,
                error: None,
            },
            EnvelopeResponse::Failure { tid, error } => Self {
                tid,
                success: false,
                response: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<ResponseRepr> for EnvelopeResponse {
    type Error = String;

    fn try_from(repr: ResponseRepr) -> Result<Self, Self::Error> {
        match (repr.success, repr.error) {
            (true, None) => Ok(Self::Success {
                tid: repr.tid,
                response: repr.response,
            }),
            (false, Some(error)) => Ok(Self::Failure {
                tid: repr.tid,
                error,
            }),
            (true, Some(_)) => Err("success response must not carry an error".to_string()),
            (false, None) => Err("failure response missing its error".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
