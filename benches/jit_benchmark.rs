use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lgwd::jit::{JitClass, JitQueue};
use lgwd::model::{Modulation, TxJob, TxMode};
use std::time::Duration;

fn sample_job(freq_hz: u32, payload_len: usize) -> TxJob {
    TxJob {
        freq_hz,
        tx_mode: TxMode::Timestamped,
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
        payload: vec![0u8; payload_len],
    }
}

fn benchmark_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("jit_enqueue");

    group.bench_function("enqueue_into_empty_queue", |b| {
        b.iter_batched(
            JitQueue::new,
            |mut queue| {
                let job = sample_job(868_100_000, 32);
                let _ = queue.enqueue(black_box(job), JitClass::ClassA, 1_000_000, 0);
            },
            criterion::BatchSize::SmallInput,
        );
    });

    for depth in [1usize, 8, 32] {
        group.bench_with_input(
            BenchmarkId::new("enqueue_with_existing_entries", depth),
            &depth,
            |b, &depth| {
                b.iter_batched(
                    || {
                        let mut queue = JitQueue::new();
                        for i in 0..depth {
                            let job = sample_job(868_100_000, 32);
                            let target = 1_000_000 + i as u32 * 200_000;
                            let _ = queue.enqueue(job, JitClass::ClassA, target, 0);
                        }
                        queue
                    },
                    |mut queue| {
                        let job = sample_job(868_300_000, 32);
                        let target = 1_000_000 + depth as u32 * 200_000;
                        let _ = queue.enqueue(black_box(job), JitClass::ClassA, target, 0);
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

fn benchmark_peek_and_dequeue(c: &mut Criterion) {
    let mut group = c.benchmark_group("jit_dispatch");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("peek_ready_against_16_entries", |b| {
        b.iter_batched(
            || {
                let mut queue = JitQueue::new();
                for i in 0..16 {
                    let job = sample_job(868_100_000, 32);
                    let target = 1_000_000 + i as u32 * 200_000;
                    let _ = queue.enqueue(job, JitClass::ClassA, target, 0);
                }
                queue
            },
            |queue| {
                black_box(queue.peek_ready(black_box(900_000)));
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("dequeue_first_of_16_entries", |b| {
        b.iter_batched(
            || {
                let mut queue = JitQueue::new();
                for i in 0..16 {
                    let job = sample_job(868_100_000, 32);
                    let target = 1_000_000 + i as u32 * 200_000;
                    let _ = queue.enqueue(job, JitClass::ClassA, target, 0);
                }
                queue
            },
            |mut queue| {
                black_box(queue.dequeue(0));
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(200)
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(3));
    targets = benchmark_enqueue, benchmark_peek_and_dequeue
}
criterion_main!(benches);
