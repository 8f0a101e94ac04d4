//! # RX Ingest
//!
//! A single task polls the [`Concentrator`](crate::concentrator::Concentrator)
//! at a fixed cadence and publishes non-empty bursts onto a shared,
//! bounded [`ReceptionList`]. Ingest never filters; every per-service
//! decision happens downstream in the service uplink workers.

use crate::concentrator::Concentrator;
use crate::constants::{FETCH_SLEEP, RECV_LIST_MAX};
use crate::instrumentation::stats::STATS;
use crate::model::{wallclock_us, Modulation, ReceptionBatch};
use std::sync::Mutex;
use tokio::sync::watch;

/// The shared, mutex-guarded reception list. New batches are prepended;
/// callers walk it oldest-first per the ordering guarantee in the
/// concurrency model, even though storage is newest-first.
#[derive(Default)]
pub struct ReceptionList {
    inner: Mutex<Vec<ReceptionBatch>>,
    dropped: std::sync::atomic::AtomicU64,
}

impl ReceptionList {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            dropped: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Prepends a batch, dropping the oldest if the list is at capacity.
    pub fn publish(&self, batch: ReceptionBatch) {
        let mut list = self.inner.lock().unwrap();
        list.insert(0, batch);
        if list.len() > RECV_LIST_MAX {
            list.pop();
            self.dropped
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sets `stamp_bit` on every batch not yet claimed by this service,
    /// walking oldest-first, and returns a snapshot of the packets claimed
    /// this pass. Batches already stamped for this service are skipped so a
    /// repeated call never double-delivers.
    pub fn claim_unstamped(&self, stamp_bit: u8) -> Vec<ReceptionBatch> {
        let mut list = self.inner.lock().unwrap();
        let mut claimed = Vec::new();
        for batch in list.iter_mut().rev() {
            if !batch.is_stamped(stamp_bit) {
                batch.set_stamp(stamp_bit);
                claimed.push(batch.clone());
            }
        }
        claimed
    }

    /// Removes batches whose stamp covers every enabled service, or whose
    /// age exceeds the staleness threshold regardless of stamp coverage.
    pub fn reclaim(&self, enabled_mask: u64, stale_after: std::time::Duration) -> usize {
        let mut list = self.inner.lock().unwrap();
        let before = list.len();
        list.retain(|b| !(b.fully_stamped(enabled_mask) || b.age() >= stale_after));
        before - list.len()
    }
}

/// Runs the ingest loop until `shutdown` is signalled. `on_heartbeat` is
/// invoked once per iteration so a watchdog can observe liveness.
pub async fn run_ingest<C: Concentrator>(
    concentrator: &C,
    list: &ReceptionList,
    mut shutdown: watch::Receiver<bool>,
    on_heartbeat: impl Fn(),
) {
    loop {
        on_heartbeat();
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            result = concentrator.receive(crate::constants::NB_PKT_MAX_DEFAULT) => {
                match result {
                    Ok(packets) if !packets.is_empty() => {
                        for packet in &packets {
                            match packet.modulation {
                                Modulation::LoRa => {
                                    STATS.gateway().record_rx_lora(packet.datarate as u8);
                                }
                                Modulation::Fsk => STATS.gateway().record_rx_fsk(),
                                Modulation::Cw => {}
                            }
                        }
                        let batch = ReceptionBatch::new(packets, wallclock_us());
                        list.publish(batch);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        crate::logging::log_error(&format!("concentrator receive failed: {e}"));
                    }
                }
                tokio::time::sleep(FETCH_SLEEP).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CrcStatus, Modulation, RadioPacket};

    fn packet() -> RadioPacket {
        RadioPacket::new(868_100_000, 0, Modulation::LoRa, 7, CrcStatus::Ok, vec![1], 0).unwrap()
    }

    #[test]
    fn publish_respects_capacity_and_counts_drops() {
        let list = ReceptionList::new();
        for _ in 0..(RECV_LIST_MAX + 3) {
            list.publish(ReceptionBatch::new(vec![packet()], 0));
        }
        assert_eq!(list.len(), RECV_LIST_MAX);
        assert_eq!(list.dropped_count(), 3);
    }

    #[test]
    fn two_services_one_packet_each_gets_exactly_one_copy() {
        let list = ReceptionList::new();
        list.publish(ReceptionBatch::new(vec![packet()], 0));

        let claimed_a = list.claim_unstamped(0);
        let claimed_b = list.claim_unstamped(1);
        assert_eq!(claimed_a.len(), 1);
        assert_eq!(claimed_b.len(), 1);

        // A repeated claim by the same service sees nothing new.
        assert!(list.claim_unstamped(0).is_empty());
    }

    #[test]
    fn reclaim_drops_batch_once_all_enabled_services_have_claimed_it() {
        let list = ReceptionList::new();
        list.publish(ReceptionBatch::new(vec![packet()], 0));
        let enabled_mask = 0b11; // services 0 and 1

        list.claim_unstamped(0);
        assert_eq!(list.reclaim(enabled_mask, std::time::Duration::from_secs(500)), 0);

        list.claim_unstamped(1);
        assert_eq!(list.reclaim(enabled_mask, std::time::Duration::from_secs(500)), 1);
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn ingest_feeds_gateway_wide_modulation_counters() {
        let concentrator = crate::concentrator::MockConcentrator::new();
        let mut fsk_packet = packet();
        fsk_packet.modulation = Modulation::Fsk;
        concentrator.push_rx(packet());
        concentrator.push_rx(fsk_packet);

        let before = STATS.gateway().snapshot();
        let list = ReceptionList::new();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            run_ingest(&concentrator, &list, rx, || {}).await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
        let after = STATS.gateway().snapshot();

        // `>` rather than an exact delta: STATS is a process-wide singleton
        // other tests in this binary may also be incrementing concurrently.
        assert!(after.rx_lora > before.rx_lora);
        assert!(after.rx_fsk > before.rx_fsk);
    }

    #[test]
    fn reclaim_drops_stale_batch_even_if_unclaimed() {
        let list = ReceptionList::new();
        let mut batch = ReceptionBatch::new(vec![packet()], 0);
        batch.entry_instant = std::time::Instant::now() - std::time::Duration::from_secs(1);
        list.publish(batch);

        let removed = list.reclaim(0, std::time::Duration::from_millis(500));
        assert_eq!(removed, 1);
    }
}
