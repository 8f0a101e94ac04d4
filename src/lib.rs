//! # lgwd - a LoRa packet-forwarder gateway core
//!
//! `lgwd` drives a LoRa concentrator through a small hardware-abstraction
//! trait ([`concentrator::Concentrator`]), batches and filters received
//! packets, and forwards them to one or more upstream services (Semtech UDP,
//! TTN, or a compact binary relay protocol) while scheduling downlinks
//! through a just-in-time transmit queue.
//!
//! ## Modules
//!
//! - [`concentrator`]: the hardware-abstraction trait and a mock backend.
//! - [`gps`]: GPS time/position source trait used for PPS-anchored downlinks.
//! - [`model`]: wire-independent packet and transmit-job types.
//! - [`rx`]: the shared reception list every enabled service claims from.
//! - [`filter`]: per-service DevAddr/FPort/EUI filtering.
//! - [`jit`]: the just-in-time transmit queue and its scheduling classes.
//! - [`codec`]: the Semtech UDP and binary relay wire codecs.
//! - [`service`]: per-service uplink/downlink worker runtime and transports.
//! - [`coordinator`]: wires concentrator, services, and JIT queues together.
//! - [`config`]: gateway and concentrator JSON configuration documents.
//! - [`instrumentation`]: process-wide stats registry.
//! - [`error`]: the gateway's error taxonomy.
//! - [`logging`]: `env_logger` initialization and levelled log helpers.

pub mod codec;
pub mod concentrator;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod filter;
pub mod gps;
pub mod instrumentation;
pub mod jit;
pub mod logging;
pub mod model;
pub mod rx;
pub mod service;

pub use crate::error::GatewayError;
pub use crate::logging::{init_logger, log_debug, log_error, log_info, log_warn};

pub use concentrator::{Concentrator, MockConcentrator, TxStatus};
pub use config::{ConcentratorConfig, GatewayConfig, ServerConfig, ServiceKind};
pub use coordinator::Coordinator;
pub use gps::{GeoPosition, GpsSource, StaticGpsSource, TimeRef};
pub use instrumentation::{GatewayStats, ServiceStats, StatsRegistry, STATS};
pub use jit::{JitClass, JitError, JitQueue};
pub use model::{CrcStatus, Modulation, RadioPacket, TxJob, TxMode};
pub use rx::ReceptionList;
pub use service::{DecodedDownlink, DownlinkSink, LivenessState, Service, ServiceHandle, ServiceProtocol};
