//! # Stats Aggregator (C6)
//!
//! Rolling counters for each enabled service plus gateway-wide radio and
//! JIT counters. Snapshot semantics: a sampling call returns a copy, and
//! counters are monotonic non-decreasing until the whole registry is reset
//! at shutdown. Access is guarded by a single report lock; snapshot cost is
//! `O(services)`.

pub mod stats;

pub use stats::{GatewayStats, JitRejectReason, ServiceStats, StatsRegistry, STATS};
