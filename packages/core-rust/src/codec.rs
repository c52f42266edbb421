//! Wire codec for envelopes and responses.
//!
//! Named-field MsgPack (`rmp_serde::to_vec_named`) is the primary transport
//! encoding, with JSON as the debugging/HTTP alternative. Both produce the
//! same camelCase field names, so transports can be mixed under one logical
//! network.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::envelope::{Envelope, EnvelopeResponse};

/// Encode/decode failures at the transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("msgpack encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

fn to_msgpack<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

fn from_msgpack<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Encode an envelope as named-field MsgPack.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    to_msgpack(envelope)
}

/// Decode a named-field MsgPack envelope.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, CodecError> {
    from_msgpack(bytes)
}

/// Encode a response as named-field MsgPack.
pub fn encode_response(response: &EnvelopeResponse) -> Result<Vec<u8>, CodecError> {
    to_msgpack(response)
}

/// Decode a named-field MsgPack response.
pub fn decode_response(bytes: &[u8]) -> Result<EnvelopeResponse, CodecError> {
    from_msgpack(bytes)
}

/// Encode an envelope as a JSON string.
pub fn envelope_to_json(envelope: &Envelope) -> Result<String, CodecError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode an envelope from JSON.
pub fn envelope_from_json(json: &str) -> Result<Envelope, CodecError> {
    Ok(serde_json::from_str(json)?)
}

/// Encode a response as a JSON string.
pub fn response_to_json(response: &EnvelopeResponse) -> Result<String, CodecError> {
    Ok(serde_json::to_string(response)?)
}

/// Decode a response from JSON.
pub fn response_from_json(json: &str) -> Result<EnvelopeResponse, CodecError> {
    Ok(serde_json::from_str(json)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
