//! # Relay Binary Protocol
//!
//! A compact, big-endian binary protocol used to link gateways together or
//! forward traffic to a lightweight collector. Three packet kinds share one
//! leading MHDR byte:
//!
//! ```text
//! MHDR(1) = meta_type(3 bits) | payload_type(2 bits) | hop_count(3 bits)
//!
//! Uplink:   MHDR | uplink_id(12b) data_rate(4b) | rssi(1) | snr(1) | channel(1) | phy_payload
//! Downlink: MHDR | dwlink_id(12b) data_rate(4b) | frequency(4, BE) | tx_power(4b) delay(4b) | count_us(4, BE) | phy_payload
//! Event:    MHDR | event_id(2, BE) | event_type(1) | event_payload
//! ```
//!
//! `meta_type` only ever carries [`MetaType::LoRaWan`]; the field exists so a
//! future non-LoRaWAN meta type can share the same header without breaking
//! parsers that already check it.

use rand::Rng;
use thiserror::Error;

/// Max PHY payload carried by an uplink or downlink relay packet.
pub const MAX_PHY_PAYLOAD_LEN: usize = 245;
/// Max payload carried by an event relay packet.
pub const MAX_EVENT_PAYLOAD_LEN: usize = 240;

/// Errors produced while encoding or decoding a relay packet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("buffer too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },
    #[error("unsupported meta_type {0:#05b}")]
    UnsupportedMetaType(u8),
    #[error("payload_type {0:#04b} does not match expected {1:#04b}")]
    PayloadTypeMismatch(u8, u8),
    #[error("snr {0} out of protocol range [-32, 31]")]
    SnrOutOfRange(i8),
    #[error("payload length {0} exceeds max {1}")]
    PayloadTooLong(usize, usize),
    #[error("unknown event_type byte {0}")]
    UnknownEventType(u8),
}

/// Meta-type field of the MHDR byte. The protocol defines only one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaType {
    LoRaWan,
}

impl MetaType {
    fn bits(self) -> u8 {
        match self {
            MetaType::LoRaWan => 0b111,
        }
    }

    fn from_bits(bits: u8) -> Result<Self, RelayError> {
        match bits {
            0b111 => Ok(MetaType::LoRaWan),
            other => Err(RelayError::UnsupportedMetaType(other)),
        }
    }
}

/// Payload-type field of the MHDR byte, identifying which of the three
/// packet kinds follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    Uplink,
    Downlink,
    Event,
}

impl PayloadType {
    fn bits(self) -> u8 {
        match self {
            PayloadType::Uplink => 0b00,
            PayloadType::Downlink => 0b01,
            PayloadType::Event => 0b11,
        }
    }

    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b00 => Some(PayloadType::Uplink),
            0b01 => Some(PayloadType::Downlink),
            0b11 => Some(PayloadType::Event),
            _ => None,
        }
    }
}

/// Event sub-type carried by an [`EventPacket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Join,
    Reset,
    Error,
    Timeout,
}

impl EventType {
    fn to_byte(self) -> u8 {
        match self {
            EventType::Join => 1,
            EventType::Reset => 2,
            EventType::Error => 3,
            EventType::Timeout => 4,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, RelayError> {
        match byte {
            1 => Ok(EventType::Join),
            2 => Ok(EventType::Reset),
            3 => Ok(EventType::Error),
            4 => Ok(EventType::Timeout),
            other => Err(RelayError::UnknownEventType(other)),
        }
    }
}

fn build_mhdr(meta_type: MetaType, payload_type: PayloadType, hop_count: u8) -> u8 {
    (meta_type.bits() << 5) | (payload_type.bits() << 3) | (hop_count & 0x07)
}

fn parse_mhdr(byte: u8) -> Result<(MetaType, PayloadType, u8), RelayError> {
    let meta_type = MetaType::from_bits((byte >> 5) & 0x07)?;
    let payload_bits = (byte >> 3) & 0x03;
    let payload_type = PayloadType::from_bits(payload_bits)
        .ok_or(RelayError::PayloadTypeMismatch(payload_bits, payload_bits))?;
    let hop_count = byte & 0x07;
    Ok((meta_type, payload_type, hop_count))
}

/// Draws a random 12-bit id, mirroring the reference implementation's
/// `rand() & 0x0FFF` uplink/downlink id generator.
pub fn generate_packet_id() -> u16 {
    rand::thread_rng().gen_range(0..=0x0FFF)
}

/// An uplink relay packet: PHY payload plus the radio metadata needed to
/// rebuild a Semtech `rxpk` entry on the receiving end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkPacket {
    pub hop_count: u8,
    pub uplink_id: u16,
    pub data_rate: u8,
    pub rssi: i8,
    pub snr: i8,
    pub channel: u8,
    pub phy_payload: Vec<u8>,
}

impl UplinkPacket {
    pub fn encode(&self) -> Result<Vec<u8>, RelayError> {
        if self.phy_payload.len() > MAX_PHY_PAYLOAD_LEN {
            return Err(RelayError::PayloadTooLong(
                self.phy_payload.len(),
                MAX_PHY_PAYLOAD_LEN,
            ));
        }
        if !(-32..=31).contains(&self.snr) {
            return Err(RelayError::SnrOutOfRange(self.snr));
        }
        let mut buf = Vec::with_capacity(6 + self.phy_payload.len());
        buf.push(build_mhdr(MetaType::LoRaWan, PayloadType::Uplink, self.hop_count));
        buf.push((self.uplink_id >> 4) as u8);
        buf.push((((self.uplink_id & 0x0F) as u8) << 4) | (self.data_rate & 0x0F));
        buf.push(self.rssi as u8);
        buf.push(self.snr as u8);
        buf.push(self.channel);
        buf.extend_from_slice(&self.phy_payload);
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self, RelayError> {
        if data.len() < 6 {
            return Err(RelayError::TooShort {
                need: 6,
                got: data.len(),
            });
        }
        let (_meta_type, payload_type, hop_count) = parse_mhdr(data[0])?;
        if payload_type != PayloadType::Uplink {
            return Err(RelayError::PayloadTypeMismatch(
                payload_type.bits(),
                PayloadType::Uplink.bits(),
            ));
        }
        let uplink_id = ((data[1] as u16) << 4) | ((data[2] >> 4) as u16 & 0x0F);
        let data_rate = data[2] & 0x0F;
        let rssi = data[3] as i8;
        let snr = data[4] as i8;
        if !(-32..=31).contains(&snr) {
            return Err(RelayError::SnrOutOfRange(snr));
        }
        let channel = data[5];
        let phy_payload = data[6..].to_vec();
        if phy_payload.len() > MAX_PHY_PAYLOAD_LEN {
            return Err(RelayError::PayloadTooLong(
                phy_payload.len(),
                MAX_PHY_PAYLOAD_LEN,
            ));
        }
        Ok(Self {
            hop_count,
            uplink_id,
            data_rate,
            rssi,
            snr,
            channel,
            phy_payload,
        })
    }
}

/// A downlink relay packet: a scheduled transmission handed back down to the
/// gateway that originated the matching uplink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlinkPacket {
    pub hop_count: u8,
    pub dwlink_id: u16,
    pub data_rate: u8,
    pub frequency: u32,
    pub tx_power: u8,
    pub delay: u8,
    pub count_us: u32,
    pub phy_payload: Vec<u8>,
}

impl DownlinkPacket {
    pub fn encode(&self) -> Result<Vec<u8>, RelayError> {
        if self.phy_payload.len() > MAX_PHY_PAYLOAD_LEN {
            return Err(RelayError::PayloadTooLong(
                self.phy_payload.len(),
                MAX_PHY_PAYLOAD_LEN,
            ));
        }
        let mut buf = Vec::with_capacity(12 + self.phy_payload.len());
        buf.push(build_mhdr(MetaType::LoRaWan, PayloadType::Downlink, self.hop_count));
        buf.push((self.dwlink_id >> 4) as u8);
        buf.push((((self.dwlink_id & 0x0F) as u8) << 4) | (self.data_rate & 0x0F));
        buf.extend_from_slice(&self.frequency.to_be_bytes());
        buf.push(((self.tx_power & 0x0F) << 4) | (self.delay & 0x0F));
        buf.extend_from_slice(&self.count_us.to_be_bytes());
        buf.extend_from_slice(&self.phy_payload);
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self, RelayError> {
        if data.len() < 12 {
            return Err(RelayError::TooShort {
                need: 12,
                got: data.len(),
            });
        }
        let (_meta_type, payload_type, hop_count) = parse_mhdr(data[0])?;
        if payload_type != PayloadType::Downlink {
            return Err(RelayError::PayloadTypeMismatch(
                payload_type.bits(),
                PayloadType::Downlink.bits(),
            ));
        }
        let dwlink_id = ((data[1] as u16) << 4) | ((data[2] >> 4) as u16 & 0x0F);
        let data_rate = data[2] & 0x0F;
        let frequency = u32::from_be_bytes([data[3], data[4], data[5], data[6]]);
        let tx_power = (data[7] >> 4) & 0x0F;
        let delay = data[7] & 0x0F;
        let count_us = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let phy_payload = data[12..].to_vec();
        if phy_payload.len() > MAX_PHY_PAYLOAD_LEN {
            return Err(RelayError::PayloadTooLong(
                phy_payload.len(),
                MAX_PHY_PAYLOAD_LEN,
            ));
        }
        Ok(Self {
            hop_count,
            dwlink_id,
            data_rate,
            frequency,
            tx_power,
            delay,
            count_us,
            phy_payload,
        })
    }
}

/// An out-of-band event notification (join, reset, error, timeout) relayed
/// alongside the uplink/downlink traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPacket {
    pub hop_count: u8,
    pub event_id: u16,
    pub event_type: EventType,
    pub event_payload: Vec<u8>,
}

impl EventPacket {
    pub fn encode(&self) -> Result<Vec<u8>, RelayError> {
        if self.event_payload.len() > MAX_EVENT_PAYLOAD_LEN {
            return Err(RelayError::PayloadTooLong(
                self.event_payload.len(),
                MAX_EVENT_PAYLOAD_LEN,
            ));
        }
        let mut buf = Vec::with_capacity(4 + self.event_payload.len());
        buf.push(build_mhdr(MetaType::LoRaWan, PayloadType::Event, self.hop_count));
        buf.extend_from_slice(&self.event_id.to_be_bytes());
        buf.push(self.event_type.to_byte());
        buf.extend_from_slice(&self.event_payload);
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self, RelayError> {
        if data.len() < 4 {
            return Err(RelayError::TooShort {
                need: 4,
                got: data.len(),
            });
        }
        let (_meta_type, payload_type, hop_count) = parse_mhdr(data[0])?;
        if payload_type != PayloadType::Event {
            return Err(RelayError::PayloadTypeMismatch(
                payload_type.bits(),
                PayloadType::Event.bits(),
            ));
        }
        let event_id = u16::from_be_bytes([data[1], data[2]]);
        let event_type = EventType::from_byte(data[3])?;
        let event_payload = data[4..].to_vec();
        if event_payload.len() > MAX_EVENT_PAYLOAD_LEN {
            return Err(RelayError::PayloadTooLong(
                event_payload.len(),
                MAX_EVENT_PAYLOAD_LEN,
            ));
        }
        Ok(Self {
            hop_count,
            event_id,
            event_type,
            event_payload,
        })
    }
}

/// Any of the three relay packet kinds, discriminated by the MHDR's
/// `payload_type` field — used by a reader that hasn't yet decided which
/// variant it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayPacket {
    Uplink(UplinkPacket),
    Downlink(DownlinkPacket),
    Event(EventPacket),
}

impl RelayPacket {
    pub fn decode_any(data: &[u8]) -> Result<Self, RelayError> {
        if data.is_empty() {
            return Err(RelayError::TooShort { need: 1, got: 0 });
        }
        let (_meta_type, payload_type, _hop_count) = parse_mhdr(data[0])?;
        match payload_type {
            PayloadType::Uplink => UplinkPacket::decode(data).map(RelayPacket::Uplink),
            PayloadType::Downlink => DownlinkPacket::decode(data).map(RelayPacket::Downlink),
            PayloadType::Event => EventPacket::decode(data).map(RelayPacket::Event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uplink_encode_matches_known_vector() {
        let pkt = UplinkPacket {
            hop_count: 2,
            uplink_id: 0xABC,
            data_rate: 5,
            rssi: -80,
            snr: 7,
            channel: 3,
            phy_payload: vec![0xDE, 0xAD],
        };
        let encoded = pkt.encode().unwrap();
        assert_eq!(
            encoded,
            vec![0xE2, 0xAB, 0xC5, 0xB0, 0x07, 0x03, 0xDE, 0xAD]
        );
        let decoded = UplinkPacket::decode(&encoded).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn uplink_rejects_snr_out_of_range() {
        let pkt = UplinkPacket {
            hop_count: 0,
            uplink_id: 1,
            data_rate: 0,
            rssi: 0,
            snr: 40,
            channel: 0,
            phy_payload: vec![],
        };
        assert!(matches!(pkt.encode(), Err(RelayError::SnrOutOfRange(40))));
    }

    #[test]
    fn downlink_round_trip_preserves_frequency_and_count_us() {
        let pkt = DownlinkPacket {
            hop_count: 1,
            dwlink_id: 0x123,
            data_rate: 4,
            frequency: 868_100_000,
            tx_power: 14,
            delay: 1,
            count_us: 123_456_789,
            phy_payload: vec![1, 2, 3, 4, 5],
        };
        let encoded = pkt.encode().unwrap();
        let decoded = DownlinkPacket::decode(&encoded).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn event_round_trip() {
        let pkt = EventPacket {
            hop_count: 2,
            event_id: 42,
            event_type: EventType::Join,
            event_payload: vec![9, 9],
        };
        let encoded = pkt.encode().unwrap();
        let decoded = EventPacket::decode(&encoded).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn decode_any_dispatches_on_payload_type() {
        let up = UplinkPacket {
            hop_count: 0,
            uplink_id: 1,
            data_rate: 0,
            rssi: 0,
            snr: 0,
            channel: 0,
            phy_payload: vec![],
        };
        let bytes = up.encode().unwrap();
        assert!(matches!(
            RelayPacket::decode_any(&bytes).unwrap(),
            RelayPacket::Uplink(_)
        ));
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert!(matches!(
            UplinkPacket::decode(&[0xE0, 0x00]),
            Err(RelayError::TooShort { .. })
        ));
    }

    #[test]
    fn generate_packet_id_stays_within_12_bits() {
        for _ in 0..1000 {
            assert!(generate_packet_id() <= 0x0FFF);
        }
    }
}
