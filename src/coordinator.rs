//! # Gateway Coordinator
//!
//! Owns the concentrator, the shared reception list, one [`JitQueue`] per RF
//! chain, and every enabled service. Assigns each service a stamp bit
//! (0..63), spawns its uplink/downlink workers alongside the RX ingest loop,
//! and runs two periodic sweeps: reclamation (evicts reception batches every
//! still-active service has claimed) and the watchdog (restarts RX ingest if
//! it stops heartbeating, and tears down a dead, unrecoverable service —
//! stopping both of its workers and releasing its stamp bit from the
//! reclamation mask — rather than taking the whole gateway down with it).

use crate::concentrator::Concentrator;
use crate::config::{GatewayConfig, ServiceKind};
use crate::constants::{LGW_RF_CHAIN_NB, MAX_SERVICES, RECLAIM_PERIOD, RECV_STALE, WATCHDOG_PERIOD, WATCHDOG_TIMEOUT};
use crate::error::GatewayError;
use crate::gps::GpsSource;
use crate::instrumentation::stats::STATS;
use crate::jit::{JitClass, JitError, JitQueue};
use crate::model::{wallclock_us, TxJob, TxMode};
use crate::rx::{run_ingest, ReceptionList};
use crate::service::protocols::relay::RelayProtocol;
use crate::service::protocols::semtech::SemtechProtocol;
use crate::service::transport::{TcpTransport, Transport, UdpTransport};
use crate::service::{DownlinkSink, LivenessState, Service, ServiceHandle, ServiceProtocol};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Translates a decoded downlink into a JIT enqueue against the right RF
/// chain's queue, using the concentrator's free-running counter (and, once a
/// GPS fix exists, its UTC reference) to resolve `TxMode::Immediate`.
struct JitSink<C: Concentrator> {
    concentrator: Arc<C>,
    queues: Vec<Mutex<JitQueue>>,
    gps: Arc<dyn GpsSource>,
}

impl<C: Concentrator> DownlinkSink for JitSink<C> {
    fn schedule(&self, job: TxJob, class: JitClass) -> Result<(), JitError> {
        let queue = self
            .queues
            .get(job.rf_chain as usize)
            .ok_or(JitError::TxParamsInvalid)?;
        let now_us = self.concentrator.get_inst_cnt();
        let target_us = match job.tx_mode {
            TxMode::Immediate => now_us.wrapping_add(crate::constants::MIN_PREPARE_MARGIN_US * 2),
            TxMode::Timestamped => job.count_us,
            // No separate PPS-anchored scheduling path exists yet: treat
            // ON_GPS the same as a timestamped job relative to the
            // concentrator's own counter. The GPS reference is consulted
            // only to confirm a fix exists, not to translate the target.
            TxMode::OnPps => {
                if self.gps.time_ref().is_none() {
                    return Err(JitError::TxParamsInvalid);
                }
                job.count_us
            }
        };
        let mut queue = queue.lock().unwrap();
        let result = queue.enqueue(job, class, target_us, now_us);
        if let Err(e) = result {
            STATS.gateway().record_jit_reject(e.into());
        }
        result
    }
}

/// Millisecond-resolution "last made progress" marker, shared with the
/// watchdog sweep. Mirrors `Service`'s own heartbeat field.
#[derive(Default)]
struct Heartbeat {
    started_at: Mutex<Option<Instant>>,
    last_ms: AtomicU32,
}

impl Heartbeat {
    fn mark(&self) {
        let mut started = self.started_at.lock().unwrap();
        let start = *started.get_or_insert_with(Instant::now);
        self.last_ms
            .store(start.elapsed().as_millis() as u32, Ordering::Relaxed);
    }

    fn age(&self) -> Duration {
        let started = self.started_at.lock().unwrap();
        match *started {
            Some(start) => {
                let now_ms = start.elapsed().as_millis() as u32;
                let last_ms = self.last_ms.load(Ordering::Relaxed);
                Duration::from_millis(now_ms.saturating_sub(last_ms) as u64)
            }
            None => Duration::from_secs(0),
        }
    }
}

#[allow(unused_variables)]
async fn build_transport(
    kind: ServiceKind,
    addr: &str,
    port_up: u16,
    name: &str,
    gateway_eui: [u8; 8],
) -> Result<Arc<dyn Transport>, GatewayError> {
    match kind {
        ServiceKind::Semtech | ServiceKind::Ttn => {
            let remote = format!("{addr}:{port_up}");
            let transport = UdpTransport::connect("0.0.0.0:0", &remote).await?;
            Ok(Arc::new(transport))
        }
        ServiceKind::Relay | ServiceKind::Pkt | ServiceKind::Delay | ServiceKind::Gwtraf => {
            let remote = format!("{addr}:{port_up}");
            let transport = TcpTransport::connect(&remote).await?;
            Ok(Arc::new(transport))
        }
        #[cfg(feature = "mqtt")]
        ServiceKind::Mqtt => {
            let eui_hex = gateway_eui.iter().map(|b| format!("{b:02x}")).collect::<String>();
            let uplink_topic = format!("gateway/{eui_hex}/up");
            let downlink_topic = format!("gateway/{eui_hex}/down");
            let transport = crate::service::transport::MqttTransport::connect(
                addr,
                port_up,
                name,
                None,
                uplink_topic,
                downlink_topic,
            )
            .await?;
            Ok(Arc::new(transport))
        }
        #[cfg(not(feature = "mqtt"))]
        ServiceKind::Mqtt => Err(GatewayError::Config(
            "mqtt service kind requires the `mqtt` feature".to_string(),
        )),
    }
}

fn build_protocol(kind: ServiceKind, gateway_eui: [u8; 8], rf_chain: u8) -> Arc<dyn ServiceProtocol> {
    match kind {
        ServiceKind::Semtech | ServiceKind::Ttn => Arc::new(SemtechProtocol::new(gateway_eui, rf_chain)),
        #[cfg(feature = "mqtt")]
        ServiceKind::Mqtt => Arc::new(crate::service::protocols::mqtt::MqttProtocol::new(rf_chain)),
        _ => Arc::new(RelayProtocol::new(rf_chain)),
    }
}

/// Tears down any service that has gone `Dead` (past its autoquit
/// threshold with no recovery): stops both of its workers, releases its
/// stamp bit from `active_mask` so reclamation stops waiting on it, and
/// removes its handle so it is not joined twice. A service that is merely
/// stalled, not dead, only gets a stale-heartbeat warning.
async fn reap_dead_services(
    services: &[Arc<Service>],
    handles: &mut [Option<ServiceHandle>],
    active_mask: &AtomicU64,
) {
    for (i, service) in services.iter().enumerate() {
        if service.liveness() == LivenessState::Dead {
            if let Some(handle) = handles[i].take() {
                handle.uplink.abort();
                handle.downlink.abort();
                let _ = handle.uplink.await;
                let _ = handle.downlink.await;
                active_mask.fetch_and(!(1u64 << service.stamp_bit), Ordering::Relaxed);
                crate::logging::log_warn(&format!(
                    "service {} is dead, workers stopped and stamp bit released",
                    service.name
                ));
            }
        } else if service.heartbeat_age() > WATCHDOG_TIMEOUT {
            crate::logging::log_warn(&format!(
                "service {} heartbeat stale past watchdog timeout",
                service.name
            ));
        }
    }
}

/// Parses the gateway EUI string (16 hex chars, as stored in
/// `GatewayConfig::gateway_id`) into the 8 bytes the wire protocols need.
fn parse_gateway_eui(id: &str) -> [u8; 8] {
    let mut eui = [0u8; 8];
    for (i, byte) in eui.iter_mut().enumerate() {
        let offset = i * 2;
        if let Some(hex) = id.get(offset..offset + 2) {
            *byte = u8::from_str_radix(hex, 16).unwrap_or(0);
        }
    }
    eui
}

/// Owns the whole running gateway: ingest, JIT queues, and every enabled
/// service.
pub struct Coordinator<C: Concentrator + 'static> {
    concentrator: Arc<C>,
    reception_list: Arc<ReceptionList>,
    services: Vec<Arc<Service>>,
    sink: Arc<JitSink<C>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    ingest_heartbeat: Arc<Heartbeat>,
}

impl<C: Concentrator + 'static> Coordinator<C> {
    /// Builds every enabled service's transport and protocol, assigning
    /// stamp bits in config file order. Fails fast on the first transport
    /// that cannot be established, rather than partially starting.
    pub async fn build(
        config: &GatewayConfig,
        concentrator: Arc<C>,
        gps: Arc<dyn GpsSource>,
    ) -> Result<Self, GatewayError> {
        let gateway_eui = parse_gateway_eui(&config.gateway_id);
        let enabled: Vec<_> = config.enabled_services().collect();
        if enabled.len() > MAX_SERVICES {
            return Err(GatewayError::Config(format!(
                "{} enabled services exceeds the {MAX_SERVICES} stamp-bit limit",
                enabled.len()
            )));
        }

        let mut services = Vec::with_capacity(enabled.len());
        for (stamp_bit, server) in enabled.into_iter().enumerate() {
            let transport = build_transport(
                server.kind,
                &server.addr,
                server.port_up,
                &server.name,
                gateway_eui,
            )
            .await?;
            let protocol = build_protocol(server.kind, gateway_eui, 0);
            let stats = STATS.service(&server.name);
            services.push(Arc::new(Service::new(
                server,
                stamp_bit as u8,
                protocol,
                transport,
                stats,
            )));
        }

        let queues = (0..LGW_RF_CHAIN_NB).map(|_| Mutex::new(JitQueue::new())).collect();
        let sink = Arc::new(JitSink {
            concentrator: concentrator.clone(),
            queues,
            gps,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            concentrator,
            reception_list: Arc::new(ReceptionList::new()),
            services,
            sink,
            shutdown_tx,
            shutdown_rx,
            ingest_heartbeat: Arc::new(Heartbeat::default()),
        })
    }

    /// Every enabled service's stamp bit, ORed together — the mask RX
    /// ingest's reclamation sweep needs to know when a batch has been fully
    /// consumed.
    fn enabled_mask(&self) -> u64 {
        self.services.iter().fold(0u64, |mask, s| mask | (1u64 << s.stamp_bit))
    }

    /// Starts every worker (ingest, per-service uplink/downlink, reclamation,
    /// watchdog) and blocks until `shutdown()` is called from another task or
    /// a fatal condition is observed.
    pub async fn run(self) -> Result<(), GatewayError> {
        let mut handles: Vec<Option<ServiceHandle>> = Vec::new();
        for service in &self.services {
            handles.push(Some(service.clone().spawn(
                self.reception_list.clone(),
                self.sink.clone(),
                self.shutdown_rx.clone(),
            )));
        }

        let spawn_ingest = {
            let concentrator = self.concentrator.clone();
            let list = self.reception_list.clone();
            let heartbeat = self.ingest_heartbeat.clone();
            move |shutdown: watch::Receiver<bool>| {
                let concentrator = concentrator.clone();
                let list = list.clone();
                let heartbeat = heartbeat.clone();
                tokio::spawn(async move {
                    run_ingest(concentrator.as_ref(), &list, shutdown, || heartbeat.mark()).await;
                })
            }
        };

        // Every service's stamp bit starts set; the watchdog clears one once
        // that service is torn down, so reclamation stops waiting on a
        // service that will never claim anything again.
        let active_mask = Arc::new(AtomicU64::new(self.enabled_mask()));

        let reclaim_handle = {
            let list = self.reception_list.clone();
            let active_mask = active_mask.clone();
            let mut shutdown = self.shutdown_rx.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(RECLAIM_PERIOD) => {
                            list.reclaim(active_mask.load(Ordering::Relaxed), RECV_STALE);
                        }
                    }
                }
            })
        };

        let watchdog_handle = {
            let services = self.services.clone();
            let ingest_heartbeat = self.ingest_heartbeat.clone();
            let active_mask = active_mask.clone();
            let mut shutdown = self.shutdown_rx.clone();
            let ingest_shutdown = self.shutdown_rx.clone();
            tokio::spawn(async move {
                let mut handles = handles;
                let mut ingest_handle = spawn_ingest(ingest_shutdown.clone());
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(WATCHDOG_PERIOD) => {
                            if ingest_heartbeat.age() > WATCHDOG_TIMEOUT {
                                crate::logging::log_warn(
                                    "RX ingest heartbeat stale past watchdog timeout, restarting",
                                );
                                ingest_handle.abort();
                                ingest_handle = spawn_ingest(ingest_shutdown.clone());
                            }
                            reap_dead_services(&services, &mut handles, &active_mask).await;
                        }
                    }
                }
                ingest_handle.abort();
                let _ = ingest_handle.await;
                for handle in handles.into_iter().flatten() {
                    let _ = handle.uplink.await;
                    let _ = handle.downlink.await;
                }
            })
        };

        let _ = reclaim_handle.await;
        let _ = watchdog_handle.await;
        Ok(())
    }

    /// Signals every worker to stop and return from [`run`](Self::run).
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Current concentrator free-running counter, exposed for the periodic
    /// `stat` message a Semtech-kind service builds on its own timer.
    pub fn inst_cnt(&self) -> u32 {
        self.concentrator.get_inst_cnt()
    }

    pub fn wallclock_us(&self) -> u32 {
        wallclock_us()
    }
}
