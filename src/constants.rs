//! Gateway Core Constants
//!
//! Tunable thresholds shared across the packet-forwarder pipeline, mirrored
//! from the original `gwcfg.h` defaults where named there.

use std::time::Duration;

/// Max packets per reception batch for SX1301-class concentrators.
pub const NB_PKT_MAX_SX1301: usize = 16;
/// Max packets per reception batch for SX1302/SX126x-class concentrators.
pub const NB_PKT_MAX_DEFAULT: usize = 32;

/// Max raw radio payload size, in bytes.
pub const MAX_RADIO_PAYLOAD: usize = 256;

/// Reception list capacity before the oldest batch is dropped.
pub const RECV_LIST_MAX: usize = 16;

/// A batch is eligible for reclamation once it is this old, regardless of
/// whether every enabled service has claimed it.
pub const RECV_STALE: Duration = Duration::from_millis(500);

/// RX ingest poll cadence.
pub const FETCH_SLEEP: Duration = Duration::from_millis(10);

/// Upper bound on a service's uplink-worker exponential backoff.
pub const MAX_BACKOFF: Duration = Duration::from_millis(30_000);

/// Minimum time before a TX job's target that hardware needs to prepare.
pub const MIN_PREPARE_MARGIN_US: u32 = 1_500;

/// Window before a JIT entry's target at which the dispatcher hands it to
/// the concentrator.
pub const PREPARE_MARGIN_US: u32 = 1_000;

/// Largest horizon (relative to "now") a TX job may be scheduled into.
pub const MAX_SCHEDULE_HORIZON_US: u32 = 15_000_000;

/// Minimum gap enforced between two non-beacon occupancy intervals.
pub const MIN_GAP_US: u32 = 2_000;

/// Post-transmission guard time folded into an entry's occupied interval.
pub const TX_POST_GUARD_US: u32 = 500;

/// Maximum number of enqueued entries per RF chain.
pub const JIT_QUEUE_MAX: usize = 32;

/// Number of RF chains a single concentrator board exposes.
pub const LGW_RF_CHAIN_NB: usize = 2;

/// Maximum number of services a single gateway can register (stamp bits 0..63).
pub const MAX_SERVICES: usize = 64;

/// Watchdog sweep cadence.
pub const WATCHDOG_PERIOD: Duration = Duration::from_secs(10);

/// A thread/task heartbeat older than this is declared dead.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinator reclamation sweep cadence.
pub const RECLAIM_PERIOD: Duration = Duration::from_millis(200);

/// Semtech UDP protocol version byte.
pub const SEMTECH_VERSION: u8 = 2;

/// Default Semtech UDP upstream/downstream port.
pub const SEMTECH_DEFAULT_PORT: u16 = 1700;

/// Max PHY payload carried by a relay uplink/downlink packet
/// (255 - 8 bytes of relay framing overhead, per the original protocol).
pub const RELAY_MAX_PHY_PAYLOAD: usize = 245;

/// Max payload carried by a relay event packet.
pub const RELAY_MAX_EVENT_PAYLOAD: usize = 240;

/// Relay MHDR meta-type value for LoRaWAN framing (the only defined value).
pub const RELAY_META_TYPE_LORAWAN: u8 = 0b111;
