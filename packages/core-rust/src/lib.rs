//! `MeshRPC` Core — envelope/context model, error taxonomy, and wire codec.

pub mod codec;
pub mod envelope;
pub mod error;

pub use codec::CodecError;
pub use envelope::{Envelope, EnvelopeResponse, RequestContext};
pub use error::{CallError, ErrorKind};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
