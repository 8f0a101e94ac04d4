//! # Just-In-Time Transmit Queue
//!
//! A bounded, priority-ordered queue of [`TxJob`]s per RF chain. A dispatcher
//! task polls [`JitQueue::peek_ready`] and hands the result to the
//! concentrator at the moment it must be loaded; `enqueue` never blocks the
//! calling service, instead returning a typed reject reason that becomes a
//! protocol-level TX_ACK error.

use crate::constants::{
    JIT_QUEUE_MAX, MAX_SCHEDULE_HORIZON_US, MIN_GAP_US, MIN_PREPARE_MARGIN_US, PREPARE_MARGIN_US,
    TX_POST_GUARD_US,
};
use crate::model::TxJob;

/// Why a transmit job was scheduled the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JitClass {
    Beacon,
    ClassA,
    ClassB,
    ClassC,
    Immediate,
    UplinkEcho,
}

/// Reject reasons returned synchronously from [`JitQueue::enqueue`]. Mirrors
/// the Semtech `TX_ACK` error vocabulary one-to-one so a service can surface
/// it without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitError {
    TooLate,
    TooEarly,
    CollisionPacket,
    CollisionBeacon,
    TxFreqOutOfRange,
    TxPowerUnsupported,
    TxParamsInvalid,
    Full,
}

/// Lifecycle of a single queued entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitState {
    Scheduled,
    Loaded,
    Emitting,
    Done,
    DoneError,
}

/// A transmit job together with its scheduling classification and the
/// occupancy interval it reserves on the RF chain.
#[derive(Debug, Clone)]
pub struct JitEntry {
    pub job: TxJob,
    pub class: JitClass,
    pub target_us: u32,
    pub state: JitState,
}

impl JitEntry {
    fn occupied_start(&self) -> u32 {
        self.target_us
    }

    fn occupied_end(&self) -> u32 {
        let air_us = time_on_air_us(&self.job);
        self.target_us
            .wrapping_add(air_us)
            .wrapping_add(TX_POST_GUARD_US)
    }

    fn overlaps(&self, other_start: u32, other_end: u32) -> bool {
        let a_start = self.occupied_start().wrapping_sub(MIN_GAP_US);
        let a_end = self.occupied_end().wrapping_add(MIN_GAP_US);
        signed_diff(other_start, a_end) < 0 && signed_diff(a_start, other_end) < 0
    }
}

/// Signed difference `a - b` using unsigned 32-bit modular arithmetic, with
/// "future" meaning the signed 32-bit difference is positive. This lets a
/// microsecond counter wrap without
/// breaking ordering as long as events stay within ~35 minutes of each other.
fn signed_diff(a: u32, b: u32) -> i32 {
    a.wrapping_sub(b) as i32
}

/// Rough time-on-air estimate used only for occupancy-interval math; this is
/// deliberately coarse (actual time-on-air depends on SF/BW/CR/header/CRC in
/// ways the dispatcher does not need to reproduce exactly, only to avoid
/// scheduling two transmissions into the same airtime).
fn time_on_air_us(job: &TxJob) -> u32 {
    if job.datarate == 0 {
        return 0;
    }
    let payload_bits = (job.payload.len() as u32 + 13) * 8;
    let symbol_us = (1u32 << job.datarate.min(12)) * 1_000_000 / job.bandwidth.max(1);
    payload_bits.saturating_mul(symbol_us) / job.datarate.max(1)
}

/// A single RF chain's time-ordered transmit queue.
#[derive(Debug, Default)]
pub struct JitQueue {
    entries: Vec<JitEntry>,
}

impl JitQueue {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attempts to schedule `job` at `target_us` (already translated into
    /// concentrator microseconds) relative to `now_us`.
    pub fn enqueue(
        &mut self,
        job: TxJob,
        class: JitClass,
        target_us: u32,
        now_us: u32,
    ) -> Result<(), JitError> {
        if self.entries.len() >= JIT_QUEUE_MAX {
            return Err(JitError::Full);
        }

        let delta = signed_diff(target_us, now_us);
        if delta < 0 || delta as u32 > MAX_SCHEDULE_HORIZON_US {
            return Err(JitError::TooEarly);
        }
        if (delta as u32) < MIN_PREPARE_MARGIN_US {
            return Err(JitError::TooLate);
        }

        let candidate = JitEntry {
            job,
            class,
            target_us,
            state: JitState::Scheduled,
        };
        let cand_start = candidate.occupied_start();
        let cand_end = candidate.occupied_end();

        for existing in &self.entries {
            if existing.overlaps(cand_start, cand_end) {
                return Err(if existing.class == JitClass::Beacon {
                    JitError::CollisionBeacon
                } else {
                    JitError::CollisionPacket
                });
            }
        }

        let insert_at = self
            .entries
            .partition_point(|e| signed_diff(e.target_us, target_us) < 0);
        self.entries.insert(insert_at, candidate);
        Ok(())
    }

    /// Returns the index of the earliest entry within `PREPARE_MARGIN_US` of
    /// `now_us`, if any, without removing it.
    pub fn peek_ready(&self, now_us: u32) -> Option<usize> {
        self.entries.first().and_then(|first| {
            let delta = signed_diff(first.target_us, now_us);
            if delta <= PREPARE_MARGIN_US as i32 {
                Some(0)
            } else {
                None
            }
        })
    }

    /// Removes and returns the entry at `index`, normally one just returned
    /// by `peek_ready`.
    pub fn dequeue(&mut self, index: usize) -> Option<JitEntry> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    /// Microseconds until the next entry needs attention, capped at
    /// `FETCH_SLEEP`-scale polling for an empty queue. Used by the
    /// dispatcher to size its sleep between polls.
    pub fn next_wakeup_us(&self, now_us: u32) -> Option<u32> {
        self.entries.first().map(|first| {
            let delta = signed_diff(first.target_us, now_us) - PREPARE_MARGIN_US as i32;
            delta.max(0) as u32
        })
    }
}
