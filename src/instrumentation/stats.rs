//! # Per-Service and Per-Gateway Counters
//!
//! `ServiceStats` tracks the rolling counters named in the stats aggregator
//! contract (received, forwarded, filtered, dropped_crc_bad, dropped_no_crc,
//! dropped_filter, ack_ok, ack_error, rtt_last_ms). `GatewayStats` tracks the
//! gateway-wide counters (packets by modulation/spreading factor, beacon
//! queued/sent/rejected, JIT reject reasons). `StatsRegistry` is the process
//! singleton a sampling call reads through a single report lock.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Rolling counters for one enabled service.
#[derive(Debug, Default)]
pub struct ServiceStats {
    pub received: AtomicU64,
    pub forwarded: AtomicU64,
    pub filtered: AtomicU64,
    pub dropped_crc_bad: AtomicU64,
    pub dropped_no_crc: AtomicU64,
    pub dropped_filter: AtomicU64,
    pub ack_ok: AtomicU64,
    pub ack_error: AtomicU64,
    rtt_last_ms: AtomicU64,
}

/// A point-in-time copy of a [`ServiceStats`], safe to serialize and hand to
/// a caller without holding any lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceStatsSnapshot {
    pub received: u64,
    pub forwarded: u64,
    pub filtered: u64,
    pub dropped_crc_bad: u64,
    pub dropped_no_crc: u64,
    pub dropped_filter: u64,
    pub ack_ok: u64,
    pub ack_error: u64,
    pub rtt_last_ms: u64,
}

impl ServiceStats {
    pub fn snapshot(&self) -> ServiceStatsSnapshot {
        ServiceStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            dropped_crc_bad: self.dropped_crc_bad.load(Ordering::Relaxed),
            dropped_no_crc: self.dropped_no_crc.load(Ordering::Relaxed),
            dropped_filter: self.dropped_filter.load(Ordering::Relaxed),
            ack_ok: self.ack_ok.load(Ordering::Relaxed),
            ack_error: self.ack_error.load(Ordering::Relaxed),
            rtt_last_ms: self.rtt_last_ms.load(Ordering::Relaxed),
        }
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_crc_bad(&self) {
        self.dropped_crc_bad.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_no_crc(&self) {
        self.dropped_no_crc.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_filter(&self) {
        self.dropped_filter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack_ok(&self, rtt_ms: u64) {
        self.ack_ok.fetch_add(1, Ordering::Relaxed);
        self.rtt_last_ms.store(rtt_ms, Ordering::Relaxed);
    }

    pub fn record_ack_error(&self) {
        self.ack_error.fetch_add(1, Ordering::Relaxed);
    }
}

/// Why a JIT enqueue was rejected, for the gateway-wide reject-reason
/// histogram. Mirrors [`crate::jit::JitError`] one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JitRejectReason {
    TooLate,
    TooEarly,
    CollisionPacket,
    CollisionBeacon,
    TxFreqOutOfRange,
    TxPowerUnsupported,
    TxParamsInvalid,
    Full,
}

impl From<crate::jit::JitError> for JitRejectReason {
    fn from(e: crate::jit::JitError) -> Self {
        match e {
            crate::jit::JitError::TooLate => JitRejectReason::TooLate,
            crate::jit::JitError::TooEarly => JitRejectReason::TooEarly,
            crate::jit::JitError::CollisionPacket => JitRejectReason::CollisionPacket,
            crate::jit::JitError::CollisionBeacon => JitRejectReason::CollisionBeacon,
            crate::jit::JitError::TxFreqOutOfRange => JitRejectReason::TxFreqOutOfRange,
            crate::jit::JitError::TxPowerUnsupported => JitRejectReason::TxPowerUnsupported,
            crate::jit::JitError::TxParamsInvalid => JitRejectReason::TxParamsInvalid,
            crate::jit::JitError::Full => JitRejectReason::Full,
        }
    }
}

/// Gateway-wide counters, independent of any single service.
#[derive(Debug, Default)]
pub struct GatewayStats {
    pub rx_lora: AtomicU64,
    pub rx_fsk: AtomicU64,
    rx_by_sf: RwLock<HashMap<u8, u64>>,
    pub beacons_queued: AtomicU64,
    pub beacons_sent: AtomicU64,
    pub beacons_rejected: AtomicU64,
    jit_rejects: RwLock<HashMap<JitRejectReason, u64>>,
}

/// A point-in-time copy of [`GatewayStats`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayStatsSnapshot {
    pub rx_lora: u64,
    pub rx_fsk: u64,
    pub rx_by_sf: HashMap<u8, u64>,
    pub beacons_queued: u64,
    pub beacons_sent: u64,
    pub beacons_rejected: u64,
    pub jit_rejects: HashMap<JitRejectReason, u64>,
}

impl GatewayStats {
    pub fn record_rx_lora(&self, spreading_factor: u8) {
        self.rx_lora.fetch_add(1, Ordering::Relaxed);
        let mut by_sf = self.rx_by_sf.write().unwrap();
        *by_sf.entry(spreading_factor).or_insert(0) += 1;
    }

    pub fn record_rx_fsk(&self) {
        self.rx_fsk.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_beacon_queued(&self) {
        self.beacons_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_beacon_sent(&self) {
        self.beacons_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_beacon_rejected(&self) {
        self.beacons_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_jit_reject(&self, reason: JitRejectReason) {
        let mut rejects = self.jit_rejects.write().unwrap();
        *rejects.entry(reason).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            rx_lora: self.rx_lora.load(Ordering::Relaxed),
            rx_fsk: self.rx_fsk.load(Ordering::Relaxed),
            rx_by_sf: self.rx_by_sf.read().unwrap().clone(),
            beacons_queued: self.beacons_queued.load(Ordering::Relaxed),
            beacons_sent: self.beacons_sent.load(Ordering::Relaxed),
            beacons_rejected: self.beacons_rejected.load(Ordering::Relaxed),
            jit_rejects: self.jit_rejects.read().unwrap().clone(),
        }
    }
}

/// The process-wide stats singleton: one [`GatewayStats`] plus one
/// [`ServiceStats`] per registered service name.
pub struct StatsRegistry {
    gateway: GatewayStats,
    services: RwLock<HashMap<String, std::sync::Arc<ServiceStats>>>,
}

impl StatsRegistry {
    fn new() -> Self {
        Self {
            gateway: GatewayStats::default(),
            services: RwLock::new(HashMap::new()),
        }
    }

    pub fn gateway(&self) -> &GatewayStats {
        &self.gateway
    }

    /// Returns this service's counters, registering it on first use.
    pub fn service(&self, name: &str) -> std::sync::Arc<ServiceStats> {
        if let Some(existing) = self.services.read().unwrap().get(name) {
            return existing.clone();
        }
        let mut services = self.services.write().unwrap();
        services
            .entry(name.to_string())
            .or_insert_with(|| std::sync::Arc::new(ServiceStats::default()))
            .clone()
    }

    /// A consistent view of every registered service, sampled one at a time
    /// under the registry's single report lock.
    pub fn snapshot_services(&self) -> HashMap<String, ServiceStatsSnapshot> {
        self.services
            .read()
            .unwrap()
            .iter()
            .map(|(name, stats)| (name.clone(), stats.snapshot()))
            .collect()
    }

    /// Drops every registered service's counters, used when a service is
    /// torn down by the coordinator.
    pub fn remove_service(&self, name: &str) {
        self.services.write().unwrap().remove(name);
    }
}

/// The process-wide instance consulted by every component; analogous to the
/// reference implementation's single global stats block, but behind an
/// explicit accessor rather than ambient global mutation.
pub static STATS: Lazy<StatsRegistry> = Lazy::new(StatsRegistry::new);
