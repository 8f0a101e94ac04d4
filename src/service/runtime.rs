//! # Service Runtime
//!
//! Each enabled service owns two tasks: an uplink worker that walks the
//! shared reception list and forwards surviving packets, and a downlink
//! worker that waits on its transport for inbound traffic and a keepalive
//! timer. Both share one [`LivenessState`] the coordinator's watchdog reads.

use crate::config::{FilterModeConfig, ServerConfig};
use crate::filter::{FieldFilter, FilterSet};
use crate::instrumentation::stats::ServiceStats;
use crate::jit::{JitClass, JitError};
use crate::model::{CrcStatus, RadioPacket, TxJob};
use crate::rx::ReceptionList;
use crate::service::transport::Transport;
use crate::service::ServiceProtocol;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Connection health, read by the coordinator's watchdog sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Disconnected,
    Connecting,
    Live,
    Stalled,
    Dead,
}

impl LivenessState {
    fn to_u8(self) -> u8 {
        match self {
            LivenessState::Disconnected => 0,
            LivenessState::Connecting => 1,
            LivenessState::Live => 2,
            LivenessState::Stalled => 3,
            LivenessState::Dead => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LivenessState::Disconnected,
            1 => LivenessState::Connecting,
            2 => LivenessState::Live,
            4 => LivenessState::Dead,
            _ => LivenessState::Stalled,
        }
    }
}

/// Where a downlink worker hands a decoded job to get it onto the air. The
/// coordinator implements this over its JIT queue + GPS time reference;
/// keeping the interface this narrow lets a service worker be tested without
/// either.
pub trait DownlinkSink: Send + Sync {
    fn schedule(&self, job: TxJob, class: JitClass) -> Result<(), JitError>;
}

fn field_filter_from_config<T>(mode: FilterModeConfig, values: HashSet<T>) -> Option<FieldFilter<T>>
where
    T: std::hash::Hash + Eq,
{
    match mode {
        FilterModeConfig::None => None,
        FilterModeConfig::Include => Some(FieldFilter::include(values)),
        FilterModeConfig::Exclude => Some(FieldFilter::exclude(values)),
    }
}

/// One enabled service: its protocol, transport, filters and forwarding
/// policy, plus the shared counters and liveness state the coordinator
/// observes from outside.
pub struct Service {
    pub name: String,
    pub stamp_bit: u8,
    protocol: Arc<dyn ServiceProtocol>,
    transport: Arc<dyn Transport>,
    filters: FilterSet,
    fwd_valid_pkt: bool,
    fwd_error_pkt: bool,
    fwd_nocrc_pkt: bool,
    pull_interval: Duration,
    autoquit_threshold: u32,
    pub stats: Arc<ServiceStats>,
    liveness: AtomicU8,
    consecutive_failures: AtomicU32,
    last_heartbeat_ms: AtomicU32,
    started_at: Instant,
}

/// Handles to a running service's two worker tasks.
pub struct ServiceHandle {
    pub uplink: tokio::task::JoinHandle<()>,
    pub downlink: tokio::task::JoinHandle<()>,
}

impl Service {
    pub fn new(
        config: &ServerConfig,
        stamp_bit: u8,
        protocol: Arc<dyn ServiceProtocol>,
        transport: Arc<dyn Transport>,
        stats: Arc<ServiceStats>,
    ) -> Self {
        let filters = FilterSet {
            dev_addr: field_filter_from_config(
                config.filter.devaddr,
                config.filter.devaddr_values.iter().copied().collect(),
            ),
            f_port: field_filter_from_config(
                config.filter.fport,
                config.filter.fport_values.iter().copied().collect(),
            ),
            join_eui: field_filter_from_config(
                config.filter.joineui,
                config.filter.joineui_values.iter().copied().collect(),
            ),
            dev_eui: field_filter_from_config(
                config.filter.deveui,
                config.filter.deveui_values.iter().copied().collect(),
            ),
            net_id: field_filter_from_config(
                config.filter.netid,
                config.filter.netid_values.iter().copied().collect(),
            ),
        };

        Self {
            name: config.name.clone(),
            stamp_bit,
            protocol,
            transport,
            filters,
            fwd_valid_pkt: config.fwd_valid_pkt,
            fwd_error_pkt: config.fwd_error_pkt,
            fwd_nocrc_pkt: config.fwd_nocrc_pkt,
            pull_interval: Duration::from_secs(config.pull_interval.max(1) as u64),
            autoquit_threshold: config.autoquit_threshold,
            stats,
            liveness: AtomicU8::new(LivenessState::Disconnected.to_u8()),
            consecutive_failures: AtomicU32::new(0),
            last_heartbeat_ms: AtomicU32::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn liveness(&self) -> LivenessState {
        LivenessState::from_u8(self.liveness.load(Ordering::Relaxed))
    }

    /// Millisecond offset since this service's worker last made forward
    /// progress, read by the coordinator's watchdog sweep.
    pub fn heartbeat_age(&self) -> Duration {
        let last = self.last_heartbeat_ms.load(Ordering::Relaxed);
        let now = self.started_at.elapsed().as_millis() as u32;
        Duration::from_millis(now.saturating_sub(last) as u64)
    }

    fn heartbeat(&self) {
        let now = self.started_at.elapsed().as_millis() as u32;
        self.last_heartbeat_ms.store(now, Ordering::Relaxed);
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.liveness
            .store(LivenessState::Live.to_u8(), Ordering::Relaxed);
        self.heartbeat();
    }

    /// Returns `true` once failures exceed `autoquit_threshold`, signalling
    /// the coordinator should treat this service as unrecoverable (a
    /// threshold of 0 means "never auto-quit").
    fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        self.liveness
            .store(LivenessState::Stalled.to_u8(), Ordering::Relaxed);
        if self.autoquit_threshold > 0 && failures >= self.autoquit_threshold {
            self.liveness
                .store(LivenessState::Dead.to_u8(), Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    fn should_forward(&self, packet: &RadioPacket) -> bool {
        let crc_gate = match packet.crc_status {
            CrcStatus::Ok => self.fwd_valid_pkt,
            CrcStatus::Bad => self.fwd_error_pkt,
            CrcStatus::None => self.fwd_nocrc_pkt,
        };
        if !crc_gate {
            match packet.crc_status {
                CrcStatus::None => self.stats.record_dropped_no_crc(),
                _ => self.stats.record_dropped_crc_bad(),
            }
            return false;
        }
        let outcome = self.filters.evaluate(&packet.payload);
        if !outcome.forward {
            self.stats.record_dropped_filter();
            self.stats.record_filtered();
            return false;
        }
        true
    }

    /// Runs the uplink worker until `shutdown` fires: walk the reception
    /// list oldest-first, gate each packet by CRC policy and filter set,
    /// batch the survivors into one protocol message, and send with
    /// exponential backoff on transport failure.
    pub async fn run_uplink(
        self: Arc<Self>,
        reception_list: Arc<ReceptionList>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut backoff = crate::constants::FETCH_SLEEP;
        loop {
            if self.liveness() == LivenessState::Dead {
                break;
            }
            self.heartbeat();
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(crate::constants::FETCH_SLEEP) => {
                    let batches = reception_list.claim_unstamped(self.stamp_bit);
                    let mut survivors = Vec::new();
                    for batch in batches {
                        for packet in batch.packets {
                            self.stats.record_received();
                            if self.should_forward(&packet) {
                                survivors.push(packet);
                            }
                        }
                    }
                    if survivors.is_empty() {
                        continue;
                    }
                    if self.protocol.is_batched() {
                        self.send_uplink_message(&survivors, &mut backoff).await;
                    } else {
                        for packet in &survivors {
                            let dead = self
                                .send_uplink_message(std::slice::from_ref(packet), &mut backoff)
                                .await;
                            if dead {
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Encodes and sends one protocol message covering `packets`, updating
    /// stats and liveness on the outcome. `forwarded` is only bumped for
    /// packets in a message that was actually sent, so a per-packet protocol
    /// never credits a dropped packet as delivered. Returns `true` if the
    /// service became unrecoverable and the caller should stop forwarding
    /// for this tick.
    async fn send_uplink_message(&self, packets: &[RadioPacket], backoff: &mut Duration) -> bool {
        match self.protocol.encode_uplink(packets) {
            Ok(bytes) => match self.transport.send(&bytes).await {
                Ok(()) => {
                    for _ in packets {
                        self.stats.record_forwarded();
                    }
                    self.record_success();
                    *backoff = crate::constants::FETCH_SLEEP;
                    false
                }
                Err(e) => {
                    crate::logging::log_error(&format!("{}: uplink send failed: {e}", self.name));
                    let dead = self.record_failure();
                    if !dead {
                        tokio::time::sleep(*backoff).await;
                        *backoff = (*backoff * 2).min(crate::constants::MAX_BACKOFF);
                    }
                    dead
                }
            },
            Err(e) => {
                crate::logging::log_error(&format!("{}: uplink encode failed: {e}", self.name));
                false
            }
        }
    }

    /// Runs the downlink worker until `shutdown` fires: wait for an inbound
    /// frame up to `pull_interval`, decode it, hand the job to `sink`, and
    /// ack the outcome back through the protocol. Sends a keepalive when the
    /// pull interval elapses with no other traffic.
    pub async fn run_downlink(
        self: Arc<Self>,
        sink: Arc<dyn DownlinkSink>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if self.liveness() == LivenessState::Dead {
                break;
            }
            self.heartbeat();
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                result = self.transport.recv(self.pull_interval) => {
                    match result {
                        Ok(Some(bytes)) => {
                            self.handle_downlink_frame(&bytes, sink.as_ref()).await;
                        }
                        Ok(None) => {
                            if let Some(keepalive) = self.protocol.keepalive() {
                                if let Err(e) = self.transport.send(&keepalive).await {
                                    crate::logging::log_error(&format!(
                                        "{}: keepalive send failed: {e}",
                                        self.name
                                    ));
                                    self.record_failure();
                                }
                            }
                        }
                        Err(e) => {
                            crate::logging::log_error(&format!(
                                "{}: downlink recv failed: {e}",
                                self.name
                            ));
                            self.record_failure();
                        }
                    }
                }
            }
        }
    }

    async fn handle_downlink_frame(&self, bytes: &[u8], sink: &dyn DownlinkSink) {
        let decoded = match self.protocol.decode_downlink(bytes) {
            Ok(d) => d,
            Err(e) => {
                crate::logging::log_error(&format!("{}: downlink decode failed: {e}", self.name));
                return;
            }
        };
        let result = sink.schedule(decoded.job, JitClass::ClassA);
        match &result {
            Ok(()) => self.stats.record_ack_ok(0),
            Err(_) => self.stats.record_ack_error(),
        }
        if let Some(ack) = self.protocol.encode_tx_ack(decoded.ack_token, result) {
            if let Err(e) = self.transport.send(&ack).await {
                crate::logging::log_error(&format!("{}: tx_ack send failed: {e}", self.name));
            }
        }
    }

    /// Spawns the uplink and downlink workers, sharing one shutdown signal.
    pub fn spawn(
        self: Arc<Self>,
        reception_list: Arc<ReceptionList>,
        sink: Arc<dyn DownlinkSink>,
        shutdown: watch::Receiver<bool>,
    ) -> ServiceHandle {
        let uplink = tokio::spawn(self.clone().run_uplink(reception_list, shutdown.clone()));
        let downlink = tokio::spawn(self.run_downlink(sink, shutdown));
        ServiceHandle { uplink, downlink }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::relay::{DownlinkPacket, EventType as RelayEventType};
    use crate::config::FilterConfig;
    use crate::model::{Modulation, ReceptionBatch};
    use crate::service::protocols::relay::RelayProtocol;
    use crate::service::transport::MockTransport;

    fn config() -> ServerConfig {
        ServerConfig {
            kind: crate::config::ServiceKind::Relay,
            name: "relay-test".to_string(),
            enabled: true,
            key: None,
            addr: "127.0.0.1".to_string(),
            port_up: 1700,
            port_down: None,
            pull_interval: 1,
            max_stall: 0,
            autoquit_threshold: 3,
            filter: FilterConfig::default(),
            fwd_valid_pkt: true,
            fwd_error_pkt: false,
            fwd_nocrc_pkt: false,
        }
    }

    struct RecordingSink {
        jobs: std::sync::Mutex<Vec<TxJob>>,
    }

    impl DownlinkSink for RecordingSink {
        fn schedule(&self, job: TxJob, _class: JitClass) -> Result<(), JitError> {
            self.jobs.lock().unwrap().push(job);
            Ok(())
        }
    }

    fn good_packet() -> RadioPacket {
        RadioPacket::new(868_100_000, 0, Modulation::LoRa, 7, CrcStatus::Ok, vec![1, 2, 3], 0)
            .unwrap()
    }

    #[allow(clippy::field_reassign_with_default)]
    fn bad_crc_packet() -> RadioPacket {
        let mut p = good_packet();
        p.crc_status = CrcStatus::Bad;
        p
    }

    #[test]
    fn crc_gate_respects_fwd_flags() {
        let cfg = config();
        let service = Service::new(
            &cfg,
            0,
            Arc::new(RelayProtocol::new(0)),
            Arc::new(MockTransport::new()),
            Arc::new(ServiceStats::default()),
        );
        assert!(service.should_forward(&good_packet()));
        assert!(!service.should_forward(&bad_crc_packet()));
    }

    #[tokio::test]
    async fn uplink_worker_forwards_claimed_packets_then_stops_on_shutdown() {
        let cfg = config();
        let transport = Arc::new(MockTransport::new());
        let service = Arc::new(Service::new(
            &cfg,
            0,
            Arc::new(RelayProtocol::new(0)),
            transport.clone(),
            Arc::new(ServiceStats::default()),
        ));
        let list = Arc::new(ReceptionList::new());
        list.publish(ReceptionBatch::new(vec![good_packet()], 0));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(service.clone().run_uplink(list, rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(transport.sent_frames().len(), 1);
        assert_eq!(service.stats.snapshot().forwarded, 1);
    }

    #[tokio::test]
    async fn downlink_worker_decodes_frame_and_schedules_job() {
        let cfg = config();
        let transport = Arc::new(MockTransport::new());
        let frame = DownlinkPacket {
            hop_count: 0,
            dwlink_id: 7,
            data_rate: 7,
            frequency: 868_300_000,
            tx_power: 14,
            delay: 1,
            count_us: 1_000_000,
            phy_payload: vec![9, 9, 9],
        }
        .encode()
        .unwrap();
        transport.push_inbound(frame);

        let service = Arc::new(Service::new(
            &cfg,
            0,
            Arc::new(RelayProtocol::new(0)),
            transport,
            Arc::new(ServiceStats::default()),
        ));
        let sink = Arc::new(RecordingSink {
            jobs: std::sync::Mutex::new(Vec::new()),
        });
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(service.clone().run_downlink(sink.clone(), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let jobs = sink.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].freq_hz, 868_300_000);
        assert_eq!(service.stats.snapshot().ack_ok, 1);
    }

    #[test]
    fn record_failure_escalates_to_dead_past_autoquit_threshold() {
        let cfg = config();
        let service = Service::new(
            &cfg,
            0,
            Arc::new(RelayProtocol::new(0)),
            Arc::new(MockTransport::new()),
            Arc::new(ServiceStats::default()),
        );
        assert!(!service.record_failure());
        assert!(!service.record_failure());
        assert!(service.record_failure());
        assert_eq!(service.liveness(), LivenessState::Dead);
    }

    #[test]
    fn relay_event_type_is_reachable_from_protocol() {
        let protocol = RelayProtocol::new(0);
        assert!(protocol.encode_event(RelayEventType::Reset, vec![]).is_ok());
    }

    fn join_request(join_eui: u64, dev_eui: u64) -> RadioPacket {
        let mut buf = vec![0x00u8]; // MHDR: JoinRequest
        buf.extend_from_slice(&join_eui.to_le_bytes());
        buf.extend_from_slice(&dev_eui.to_le_bytes());
        buf.extend_from_slice(&[0u8; 2]); // DevNonce
        buf.extend_from_slice(&[0u8; 4]); // MIC
        RadioPacket::new(868_100_000, 0, Modulation::LoRa, 7, CrcStatus::Ok, buf, 0).unwrap()
    }

    #[test]
    fn service_wires_deveui_and_joineui_filters_from_config() {
        let mut cfg = config();
        cfg.filter.joineui = FilterModeConfig::Include;
        cfg.filter.joineui_values = vec![0x0102030405060708];
        cfg.filter.deveui = FilterModeConfig::Exclude;
        cfg.filter.deveui_values = vec![0xAABBCCDDEEFF0011];
        let service = Service::new(
            &cfg,
            0,
            Arc::new(RelayProtocol::new(0)),
            Arc::new(MockTransport::new()),
            Arc::new(ServiceStats::default()),
        );

        assert!(service.should_forward(&join_request(0x0102030405060708, 0x1122334455667788)));
        assert!(!service.should_forward(&join_request(0x0102030405060708, 0xAABBCCDDEEFF0011)));
        assert!(!service.should_forward(&join_request(0xFFFFFFFFFFFFFFFF, 0x1122334455667788)));
    }

    #[test]
    fn no_crc_drop_and_filter_drop_land_on_distinct_counters() {
        let mut cfg = config();
        cfg.fwd_nocrc_pkt = false;
        let service = Service::new(
            &cfg,
            0,
            Arc::new(RelayProtocol::new(0)),
            Arc::new(MockTransport::new()),
            Arc::new(ServiceStats::default()),
        );
        let mut no_crc_packet = good_packet();
        no_crc_packet.crc_status = CrcStatus::None;
        assert!(!service.should_forward(&no_crc_packet));
        assert!(!service.should_forward(&bad_crc_packet()));

        let snap = service.stats.snapshot();
        assert_eq!(snap.dropped_no_crc, 1);
        assert_eq!(snap.dropped_crc_bad, 1);
    }

    #[tokio::test]
    async fn uplink_worker_sends_one_frame_per_packet_for_unbatched_protocol() {
        let cfg = config();
        let transport = Arc::new(MockTransport::new());
        let service = Arc::new(Service::new(
            &cfg,
            0,
            Arc::new(RelayProtocol::new(0)),
            transport.clone(),
            Arc::new(ServiceStats::default()),
        ));
        let list = Arc::new(ReceptionList::new());
        list.publish(ReceptionBatch::new(
            vec![good_packet(), good_packet(), good_packet()],
            0,
        ));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(service.clone().run_uplink(list, rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(transport.sent_frames().len(), 3);
        assert_eq!(service.stats.snapshot().forwarded, 3);
    }

    #[tokio::test]
    async fn dead_service_stops_both_workers_without_shutdown_signal() {
        let cfg = config();
        let transport = Arc::new(MockTransport::new());
        let service = Arc::new(Service::new(
            &cfg,
            0,
            Arc::new(RelayProtocol::new(0)),
            transport,
            Arc::new(ServiceStats::default()),
        ));
        assert!(!service.record_failure());
        assert!(!service.record_failure());
        assert!(service.record_failure());
        assert_eq!(service.liveness(), LivenessState::Dead);

        let list = Arc::new(ReceptionList::new());
        let sink = Arc::new(RecordingSink {
            jobs: std::sync::Mutex::new(Vec::new()),
        });
        let (_tx, rx) = watch::channel(false);
        let uplink = tokio::spawn(service.clone().run_uplink(list, rx.clone()));
        let downlink = tokio::spawn(service.clone().run_downlink(sink, rx));

        tokio::time::timeout(Duration::from_millis(200), uplink)
            .await
            .expect("uplink worker did not exit on its own after going Dead")
            .unwrap();
        tokio::time::timeout(Duration::from_millis(200), downlink)
            .await
            .expect("downlink worker did not exit on its own after going Dead")
            .unwrap();
    }
}
