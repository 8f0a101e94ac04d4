//! Core data model: radio packets, reception batches, transmit jobs.
//!
//! Field names and caps are grounded on `lgw_pkt_rx_s`/`lgw_pkt_tx_s` from the
//! concentrator HAL this crate's `Concentrator` trait abstracts over.

use crate::constants::MAX_RADIO_PAYLOAD;
use std::time::{SystemTime, UNIX_EPOCH};

/// Radio modulation in use for a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    LoRa,
    Fsk,
    Cw,
}

/// CRC outcome reported by the concentrator for a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcStatus {
    None,
    Ok,
    Bad,
}

/// A single inbound radio packet, as handed up from the concentrator.
#[derive(Debug, Clone)]
pub struct RadioPacket {
    pub freq_hz: u32,
    pub if_chain: u8,
    pub rf_chain: u8,
    pub modulation: Modulation,
    /// Channel bandwidth in Hz (125000/250000/500000 for LoRa).
    pub bandwidth: u32,
    pub datarate: u32,
    pub coderate: u8,
    pub rssi_chan: f32,
    pub rssi_sig: f32,
    pub snr: f32,
    pub snr_min: f32,
    pub snr_max: f32,
    pub crc_status: CrcStatus,
    pub payload: Vec<u8>,
    pub count_us: u32,
    pub ftime: Option<u32>,
}

impl RadioPacket {
    /// Payload size, mirroring the HAL's separate `size` field.
    pub fn size(&self) -> u16 {
        self.payload.len() as u16
    }

    /// Construct a packet, rejecting an oversized payload up front rather
    /// than letting it surface as a decode error downstream.
    pub fn new(
        freq_hz: u32,
        rf_chain: u8,
        modulation: Modulation,
        datarate: u32,
        crc_status: CrcStatus,
        payload: Vec<u8>,
        count_us: u32,
    ) -> Result<Self, crate::error::GatewayError> {
        if payload.len() > MAX_RADIO_PAYLOAD {
            return Err(crate::error::GatewayError::DecodeError(format!(
                "payload {} exceeds max radio payload {}",
                payload.len(),
                MAX_RADIO_PAYLOAD
            )));
        }
        Ok(Self {
            freq_hz,
            if_chain: 0,
            rf_chain,
            modulation,
            bandwidth: 125_000,
            datarate,
            coderate: 0,
            rssi_chan: 0.0,
            rssi_sig: 0.0,
            snr: 0.0,
            snr_min: 0.0,
            snr_max: 0.0,
            crc_status,
            payload,
            count_us,
            ftime: None,
        })
    }
}

/// An ordered set of radio packets pulled from one `Concentrator::receive`
/// call, stamped with an arrival time and a per-service consumption bitmap.
#[derive(Debug, Clone)]
pub struct ReceptionBatch {
    pub entry_us: u32,
    /// Wall-clock time the batch was built, used for staleness reclamation
    /// (the hardware `count_us` counter alone cannot express "500ms old"
    /// across a 32-bit wraparound).
    pub entry_instant: std::time::Instant,
    pub stamp: u64,
    pub packets: Vec<RadioPacket>,
}

impl ReceptionBatch {
    pub fn new(packets: Vec<RadioPacket>, entry_us: u32) -> Self {
        Self {
            entry_us,
            entry_instant: std::time::Instant::now(),
            stamp: 0,
            packets,
        }
    }

    /// True once every bit in `enabled_mask` is set in the batch's stamp.
    pub fn fully_stamped(&self, enabled_mask: u64) -> bool {
        self.stamp & enabled_mask == enabled_mask
    }

    /// True if this service (by stamp bit) has already consumed the batch.
    pub fn is_stamped(&self, stamp_bit: u8) -> bool {
        self.stamp & (1u64 << stamp_bit) != 0
    }

    /// Atomically-in-spirit set of a stamp bit (the reception list is
    /// protected by a single mutex, so "atomic" here just means "monotonic":
    /// once set, a bit is never cleared).
    pub fn set_stamp(&mut self, stamp_bit: u8) {
        self.stamp |= 1u64 << stamp_bit;
    }

    pub fn age(&self) -> std::time::Duration {
        self.entry_instant.elapsed()
    }
}

/// How a transmit job's `count_us` target should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    Immediate,
    Timestamped,
    OnPps,
}

/// A downlink transmit job, ready for JIT scheduling.
#[derive(Debug, Clone)]
pub struct TxJob {
    pub freq_hz: u32,
    pub tx_mode: TxMode,
    pub count_us: u32,
    pub rf_chain: u8,
    pub rf_power: i8,
    pub modulation: Modulation,
    /// Channel bandwidth in Hz.
    pub bandwidth: u32,
    pub datarate: u32,
    pub coderate: u8,
    pub invert_pol: bool,
    pub preamble: u16,
    pub no_crc: bool,
    pub no_header: bool,
    pub payload: Vec<u8>,
}

impl TxJob {
    pub fn size(&self) -> u16 {
        self.payload.len() as u16
    }
}

/// Current wall-clock microsecond counter, independent of the
/// concentrator's own free-running counter (e.g. a batch's `entry_us`).
pub fn wallclock_us() -> u32 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    since_epoch.as_micros() as u32
}
