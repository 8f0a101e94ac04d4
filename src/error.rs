//! # Gateway Error Handling
//!
//! Defines the `GatewayError` enum covering the error taxonomy of the
//! packet-forwarder core: transient I/O, protocol decode, filter decode,
//! JIT rejects, concentrator I/O, and fatal startup/runtime errors.

use thiserror::Error;

/// Errors surfaced by the gateway core.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transient socket I/O (send/recv EAGAIN, short read). Callers retry with backoff.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// A Semtech UDP or relay binary message failed to decode.
    #[error("protocol decode error: {0}")]
    DecodeError(String),

    /// The 12-byte Semtech UDP frame header was malformed.
    #[error("malformed Semtech UDP header: {0}")]
    SemtechFraming(String),

    /// The relay binary protocol rejected a packet.
    #[error("relay protocol error: {0}")]
    RelayProtocol(#[from] crate::codec::relay::RelayError),

    /// A JIT queue operation could not be scheduled.
    #[error("JIT reject: {0:?}")]
    JitReject(crate::jit::JitError),

    /// The concentrator hardware interface returned an error.
    #[error("concentrator I/O error: {0}")]
    ConcentratorIo(String),

    /// The gateway-level or concentrator-level JSON configuration failed to parse.
    #[error("configuration error: {0}")]
    Config(String),

    /// A named service could not be found or was misconfigured.
    #[error("service error: {0}")]
    Service(String),

    /// Hardware initialization failed at startup.
    #[error("hardware init failure: {0}")]
    HardwareInit(String),

    /// Unrecoverable runtime condition; the coordinator declares itself dead.
    #[error("fatal runtime error: {0}")]
    Fatal(String),

    /// Catch-all for uncategorized cases.
    #[error("other error: {0}")]
    Other(String),
}

impl GatewayError {
    /// Process exit code this error should produce when it terminates `main`.
    ///
    /// Mirrors the CLI exit-code contract: 1 = configuration error, 2 =
    /// hardware init failure, 3 = any other runtime-fatal error.
    pub fn exit_code(&self) -> i32 {
        match self {
            GatewayError::Config(_) => 1,
            GatewayError::HardwareInit(_) => 2,
            _ => 3,
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::TransientIo(e.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::DecodeError(e.to_string())
    }
}
