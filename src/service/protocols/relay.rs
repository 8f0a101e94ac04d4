//! `ServiceProtocol` implementation shared by the `Relay`, `Pkt`, `Delay` and
//! `Gwtraf` service kinds: all four speak [`crate::codec::relay`]'s compact
//! binary framing over a TCP connection, differing only in which way traffic
//! flows (a `Pkt`/`Gwtraf` sink never decodes a downlink, a `Delay` mirror
//! never encodes an uplink) — left to the runtime's configuration rather than
//! this type, which implements the full bidirectional capability.

use crate::codec::relay::{
    self, DownlinkPacket, EventPacket, EventType, RelayPacket, UplinkPacket,
};
use crate::error::GatewayError;
use crate::jit::JitError;
use crate::model::{Modulation, RadioPacket, TxJob, TxMode};
use crate::service::{DecodedDownlink, ServiceProtocol};

/// Maps a LoRa spreading factor (5..12) to the protocol's 4-bit data_rate
/// field. Values outside that range are clamped rather than rejected: the
/// field exists for the peer's logging, not for scheduling.
fn sf_to_data_rate(datarate: u32) -> u8 {
    datarate.clamp(0, 15) as u8
}

fn data_rate_to_sf(data_rate: u8) -> u32 {
    data_rate as u32
}

fn packet_to_uplink(packet: &RadioPacket) -> UplinkPacket {
    UplinkPacket {
        hop_count: 0,
        uplink_id: relay::generate_packet_id(),
        data_rate: sf_to_data_rate(packet.datarate),
        rssi: packet.rssi_chan.round().clamp(-128.0, 127.0) as i8,
        snr: packet.snr.round().clamp(-32.0, 31.0) as i8,
        channel: packet.if_chain,
        phy_payload: packet.payload.clone(),
    }
}

fn downlink_to_job(pkt: &DownlinkPacket, rf_chain: u8) -> TxJob {
    TxJob {
        freq_hz: pkt.frequency,
        tx_mode: TxMode::Timestamped,
        count_us: pkt.count_us,
        rf_chain,
        rf_power: pkt.tx_power as i8,
        modulation: Modulation::LoRa,
        bandwidth: 125_000,
        datarate: data_rate_to_sf(pkt.data_rate),
        coderate: 1,
        invert_pol: true,
        preamble: 8,
        no_crc: false,
        no_header: false,
        payload: pkt.phy_payload.clone(),
    }
}

/// Shared by `Relay`, `Pkt`, `Delay` and `Gwtraf`: the wire format and framing
/// are identical, the runtime decides which direction(s) of traffic a given
/// server config actually uses.
pub struct RelayProtocol {
    pub rf_chain: u8,
}

impl RelayProtocol {
    pub fn new(rf_chain: u8) -> Self {
        Self { rf_chain }
    }

    /// Builds a standalone event notification, sent outside the normal
    /// per-packet uplink/downlink flow (join/reset/error/timeout).
    pub fn encode_event(&self, event_type: EventType, payload: Vec<u8>) -> Result<Vec<u8>, GatewayError> {
        EventPacket {
            hop_count: 0,
            event_id: relay::generate_packet_id(),
            event_type,
            event_payload: payload,
        }
        .encode()
        .map_err(GatewayError::from)
    }
}

impl ServiceProtocol for RelayProtocol {
    fn encode_uplink(&self, packets: &[RadioPacket]) -> Result<Vec<u8>, GatewayError> {
        let packet = packets
            .first()
            .ok_or_else(|| GatewayError::Other("encode_uplink called with no packets".into()))?;
        packet_to_uplink(packet).encode().map_err(GatewayError::from)
    }

    fn decode_downlink(&self, data: &[u8]) -> Result<DecodedDownlink, GatewayError> {
        match RelayPacket::decode_any(data)? {
            RelayPacket::Downlink(pkt) => Ok(DecodedDownlink {
                job: downlink_to_job(&pkt, self.rf_chain),
                ack_token: Some(pkt.dwlink_id),
            }),
            other => Err(GatewayError::DecodeError(format!(
                "expected a downlink relay packet, got {other:?}"
            ))),
        }
    }

    fn encode_tx_ack(
        &self,
        _ack_token: Option<u16>,
        _result: Result<(), JitError>,
    ) -> Option<Vec<u8>> {
        // The relay protocol has no TX_ACK frame: delivery is confirmed (or
        // not) at the TCP layer, not the application layer.
        None
    }

    fn is_batched(&self) -> bool {
        false
    }
}
