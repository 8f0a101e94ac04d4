//! # Wire Codecs
//!
//! The gateway core speaks two wire formats to its upstream services:
//!
//! - [`semtech`]: the Semtech UDP packet-forwarder protocol (12-byte binary
//!   header plus a JSON body), used by `Semtech` and `Ttn` services.
//! - [`relay`]: a compact binary protocol for linking gateways together or
//!   forwarding to a lightweight collector, used by `Relay`, `TrafficMirror`,
//!   `Delay`, and `Packet` services.

pub mod relay;
pub mod semtech;
