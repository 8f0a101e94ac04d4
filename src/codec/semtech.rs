//! # Semtech UDP Packet-Forwarder Protocol
//!
//! A 12-byte binary header (protocol version, a random transaction token,
//! a packet identifier, and the sending gateway's EUI) wraps an optional
//! JSON body. `PUSH_DATA`/`PUSH_ACK` carry uplink `rxpk[]` and periodic
//! `stat{}`; `PULL_DATA`/`PULL_ACK`/`PULL_RESP` carry keepalives and
//! downlink `txpk{}`; `TX_ACK` reports the concentrator's transmit outcome.

use crate::constants::SEMTECH_VERSION;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while framing or parsing a Semtech UDP datagram.
#[derive(Debug, Error)]
pub enum SemtechError {
    #[error("datagram too short: need at least 12 bytes, got {0}")]
    TooShort(usize),
    #[error("unsupported protocol version {0}, expected {expected}", expected = SEMTECH_VERSION)]
    UnsupportedVersion(u8),
    #[error("unknown identifier byte {0:#04x}")]
    UnknownIdentifier(u8),
    #[error("JSON body error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The single-byte packet identifier following the version and token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier {
    PushData,
    PushAck,
    PullData,
    PullResp,
    PullAck,
    TxAck,
}

impl Identifier {
    fn to_byte(self) -> u8 {
        match self {
            Identifier::PushData => 0x00,
            Identifier::PushAck => 0x01,
            Identifier::PullData => 0x02,
            Identifier::PullResp => 0x03,
            Identifier::PullAck => 0x04,
            Identifier::TxAck => 0x05,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, SemtechError> {
        match byte {
            0x00 => Ok(Identifier::PushData),
            0x01 => Ok(Identifier::PushAck),
            0x02 => Ok(Identifier::PullData),
            0x03 => Ok(Identifier::PullResp),
            0x04 => Ok(Identifier::PullAck),
            0x05 => Ok(Identifier::TxAck),
            other => Err(SemtechError::UnknownIdentifier(other)),
        }
    }
}

/// The fixed 12-byte header shared by every Semtech UDP datagram:
/// `version(1) | token(2) | identifier(1) | gateway_eui(8)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub token: u16,
    pub identifier: Identifier,
    pub gateway_eui: [u8; 8],
}

impl Header {
    pub fn new(token: u16, identifier: Identifier, gateway_eui: [u8; 8]) -> Self {
        Self {
            version: SEMTECH_VERSION,
            token,
            identifier,
            gateway_eui,
        }
    }

    pub fn encode(&self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[0] = self.version;
        buf[1..3].copy_from_slice(&self.token.to_be_bytes());
        buf[3] = self.identifier.to_byte();
        buf[4..12].copy_from_slice(&self.gateway_eui);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, SemtechError> {
        if data.len() < 12 {
            return Err(SemtechError::TooShort(data.len()));
        }
        let version = data[0];
        if version != SEMTECH_VERSION {
            return Err(SemtechError::UnsupportedVersion(version));
        }
        let token = u16::from_be_bytes([data[1], data[2]]);
        let identifier = Identifier::from_byte(data[3])?;
        let mut gateway_eui = [0u8; 8];
        gateway_eui.copy_from_slice(&data[4..12]);
        Ok(Self {
            version,
            token,
            identifier,
            gateway_eui,
        })
    }
}

/// A decoded datagram: header plus the raw JSON body bytes, if any
/// (`PUSH_ACK`, `PULL_DATA`, `PULL_ACK`, and `TX_ACK` with no error may
/// carry no body at all).
#[derive(Debug, Clone)]
pub struct Datagram {
    pub header: Header,
    pub body: Vec<u8>,
}

impl Datagram {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.body.len());
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.body);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, SemtechError> {
        let header = Header::decode(data)?;
        Ok(Self {
            header,
            body: data[12..].to_vec(),
        })
    }
}

/// One received-packet report, matching the Semtech `rxpk` JSON object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rxpk {
    pub tmst: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub chan: u8,
    pub rfch: u8,
    pub freq: f64,
    pub stat: i8,
    pub modu: String,
    pub datr: String,
    pub codr: String,
    pub rssi: i32,
    pub lsnr: f32,
    pub size: u16,
    pub data: String,
}

/// A downlink transmission request, matching the Semtech `txpk` JSON object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Txpk {
    pub imme: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmst: Option<u32>,
    pub freq: f64,
    pub rfch: u8,
    pub powe: i8,
    pub modu: String,
    pub datr: String,
    pub codr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fdev: Option<u32>,
    pub ipol: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prea: Option<u16>,
    pub size: u16,
    pub data: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ncrc: bool,
}

/// The gateway's periodic `stat` JSON object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stat {
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lati: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alti: Option<i32>,
    pub rxnb: u32,
    pub rxok: u32,
    pub rxfw: u32,
    pub ackr: f32,
    pub dwnb: u32,
    pub txnb: u32,
}

/// The JSON body of a `PUSH_DATA` datagram.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PushDataBody {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rxpk: Vec<Rxpk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<Stat>,
}

/// The JSON body of a `PULL_RESP` datagram.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullRespBody {
    pub txpk: Txpk,
}

/// `TX_ACK` error codes as defined by the Semtech protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxAckError {
    None,
    TooLate,
    TooEarly,
    CollisionPacket,
    CollisionBeacon,
    TxFreq,
    TxPower,
    GpsUnlocked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TxpkAck {
    error: TxAckError,
}

/// The JSON body of a `TX_ACK` datagram.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxAckBody {
    txpk_ack: TxpkAck,
}

impl TxAckBody {
    pub fn new(error: TxAckError) -> Self {
        Self {
            txpk_ack: TxpkAck { error },
        }
    }

    pub fn error(&self) -> TxAckError {
        self.txpk_ack.error
    }
}
