//! # Service Runtime (C4)
//!
//! Each enabled upstream service owns an uplink worker and a downlink
//! worker. The wire format each speaks is abstracted behind
//! [`ServiceProtocol`] — a tagged [`crate::config::ServiceKind`] plus one
//! trait implementation per kind, rather than function-pointer dispatch.

pub mod protocols;
pub mod runtime;
pub mod transport;

pub use runtime::{DownlinkSink, LivenessState, Service, ServiceHandle};

use crate::error::GatewayError;
use crate::model::{RadioPacket, TxJob};
use async_trait::async_trait;

/// A downlink the protocol decoded off the wire, ready for JIT scheduling.
#[derive(Debug, Clone)]
pub struct DecodedDownlink {
    pub job: TxJob,
    /// Echoed back to the peer in the protocol's acknowledgment, if any
    /// (e.g. the Semtech token).
    pub ack_token: Option<u16>,
}

/// The capability every upstream service type must implement: how to turn a
/// batch of surviving uplink packets into bytes for the wire, how to decode
/// a downlink off the wire, and how (if at all) to keep the connection
/// alive between real traffic.
#[async_trait]
pub trait ServiceProtocol: Send + Sync {
    /// Encodes one outgoing upstream message. Semtech-style protocols batch
    /// every surviving packet from one uplink pass into a single message;
    /// per-packet protocols return one message per call and are invoked
    /// once per packet.
    fn encode_uplink(&self, packets: &[RadioPacket]) -> Result<Vec<u8>, GatewayError>;

    /// Decodes one inbound downlink message.
    fn decode_downlink(&self, data: &[u8]) -> Result<DecodedDownlink, GatewayError>;

    /// Builds an acknowledgment/TX_ACK for a JIT enqueue outcome. `None`
    /// means this protocol sends no per-downlink acknowledgment.
    fn encode_tx_ack(
        &self,
        ack_token: Option<u16>,
        result: Result<(), crate::jit::JitError>,
    ) -> Option<Vec<u8>>;

    /// A keepalive payload to send when the pull interval elapses with no
    /// other traffic. `None` means this service type has no keepalive
    /// (open question (b): defaults to none, overridden by Semtech/TTN).
    fn keepalive(&self) -> Option<Vec<u8>> {
        None
    }

    /// Whether `encode_uplink` batches every surviving packet into one
    /// message (Semtech/TTN/MQTT) or must be invoked once per packet, with
    /// the runtime sending one message per surviving packet (Relay/Pkt/Delay/
    /// Gwtraf).
    fn is_batched(&self) -> bool {
        true
    }
}
