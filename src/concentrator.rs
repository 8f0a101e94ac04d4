//! # Concentrator Interface
//!
//! Abstracts the radio concentrator HAL the gateway coordinator drives. RX
//! ingest and the JIT dispatcher never see vendor-specific hardware types;
//! they only see [`Concentrator`]. A [`MockConcentrator`] backs the unit and
//! integration tests that would otherwise need real SX130x hardware.

use crate::error::GatewayError;
use crate::model::{RadioPacket, TxJob};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Per-chain/kind status code returned by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Unknown,
    Idle,
    Scheduled,
    Emitting,
}

/// The concentrator operations the gateway core depends on.
#[async_trait]
pub trait Concentrator: Send + Sync {
    /// Pulls up to `max` newly received packets. Returns an empty vec if
    /// none are pending; never blocks past a short, hardware-defined window.
    async fn receive(&self, max: usize) -> Result<Vec<RadioPacket>, GatewayError>;

    /// Hands a transmit job to the hardware for immediate or scheduled
    /// emission, depending on the job's `tx_mode`.
    async fn send(&self, job: &TxJob) -> Result<(), GatewayError>;

    /// Current transmit status for an RF chain.
    fn status(&self, rf_chain: u8) -> TxStatus;

    /// The concentrator's free-running microsecond counter.
    fn get_inst_cnt(&self) -> u32;

    /// Estimated time-on-air for a job, in milliseconds.
    fn time_on_air_ms(&self, job: &TxJob) -> u32;

    /// Supported frequency range in Hz.
    fn get_freq_range(&self) -> (u32, u32);

    /// Supported TX power range in dBm.
    fn get_power_range(&self) -> (i8, i8);
}

/// An in-memory concentrator used by tests: packets are pre-loaded via
/// [`MockConcentrator::push_rx`] and transmitted jobs are captured for
/// assertions rather than sent anywhere.
#[derive(Clone)]
pub struct MockConcentrator {
    rx_queue: Arc<Mutex<VecDeque<RadioPacket>>>,
    sent: Arc<Mutex<Vec<TxJob>>>,
    inst_cnt: Arc<Mutex<u32>>,
    next_error: Arc<Mutex<Option<String>>>,
}

impl Default for MockConcentrator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConcentrator {
    pub fn new() -> Self {
        Self {
            rx_queue: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            inst_cnt: Arc::new(Mutex::new(0)),
            next_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn push_rx(&self, packet: RadioPacket) {
        self.rx_queue.lock().unwrap().push_back(packet);
    }

    pub fn sent_jobs(&self) -> Vec<TxJob> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_inst_cnt(&self, value: u32) {
        *self.inst_cnt.lock().unwrap() = value;
    }

    pub fn fail_next(&self, message: &str) {
        *self.next_error.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl Concentrator for MockConcentrator {
    async fn receive(&self, max: usize) -> Result<Vec<RadioPacket>, GatewayError> {
        if let Some(msg) = self.next_error.lock().unwrap().take() {
            return Err(GatewayError::ConcentratorIo(msg));
        }
        let mut queue = self.rx_queue.lock().unwrap();
        let n = max.min(queue.len());
        Ok(queue.drain(..n).collect())
    }

    async fn send(&self, job: &TxJob) -> Result<(), GatewayError> {
        if let Some(msg) = self.next_error.lock().unwrap().take() {
            return Err(GatewayError::ConcentratorIo(msg));
        }
        self.sent.lock().unwrap().push(job.clone());
        Ok(())
    }

    fn status(&self, _rf_chain: u8) -> TxStatus {
        TxStatus::Idle
    }

    fn get_inst_cnt(&self) -> u32 {
        *self.inst_cnt.lock().unwrap()
    }

    fn time_on_air_ms(&self, job: &TxJob) -> u32 {
        (job.payload.len() as u32 + 13).max(1)
    }

    fn get_freq_range(&self) -> (u32, u32) {
        (863_000_000, 870_000_000)
    }

    fn get_power_range(&self) -> (i8, i8) {
        (0, 27)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CrcStatus, Modulation};

    #[tokio::test]
    async fn mock_receive_drains_queued_packets() {
        let concentrator = MockConcentrator::new();
        let pkt = RadioPacket::new(
            868_100_000,
            0,
            Modulation::LoRa,
            7,
            CrcStatus::Ok,
            vec![1, 2, 3],
            0,
        )
        .unwrap();
        concentrator.push_rx(pkt);

        let received = concentrator.receive(16).await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(concentrator.receive(16).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mock_send_captures_job_and_honors_injected_error() {
        let concentrator = MockConcentrator::new();
        let job = TxJob {
            freq_hz: 868_100_000,
            tx_mode: crate::model::TxMode::Immediate,
            count_us: 0,
            rf_chain: 0,
            rf_power: 14,
            modulation: Modulation::LoRa,
            bandwidth: 125_000,
            datarate: 7,
            coderate: 1,
            invert_pol: true,
            preamble: 8,
            no_crc: false,
            no_header: false,
            payload: vec![0xAA],
        };
        concentrator.send(&job).await.unwrap();
        assert_eq!(concentrator.sent_jobs().len(), 1);

        concentrator.fail_next("radio busy");
        assert!(concentrator.send(&job).await.is_err());
    }
}
