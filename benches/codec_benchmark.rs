use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lgwd::codec::relay::{EventPacket, EventType, UplinkPacket};
use lgwd::codec::semtech::{Datagram, Header, Identifier, PushDataBody, Rxpk};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::time::Duration;

fn sample_rxpk(n: usize) -> Vec<Rxpk> {
    (0..n)
        .map(|i| Rxpk {
            tmst: 1_000_000 + i as u32,
            time: None,
            chan: (i % 8) as u8,
            rfch: 0,
            freq: 868.1,
            stat: 1,
            modu: "LORA".into(),
            datr: "SF7BW125".into(),
            codr: "4/5".into(),
            rssi: -80,
            lsnr: 7.5,
            size: 32,
            data: STANDARD.encode(vec![0u8; 32]),
        })
        .collect()
}

fn sample_push_data_datagram(n: usize) -> Datagram {
    let header = Header::new(0xBEEF, Identifier::PushData, [0xAA; 8]);
    let body = PushDataBody {
        rxpk: sample_rxpk(n),
        stat: None,
    };
    Datagram {
        header,
        body: serde_json::to_vec(&body).unwrap(),
    }
}

fn benchmark_semtech_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("semtech_encode");

    for batch_size in [1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("push_data_datagram", batch_size),
            &batch_size,
            |b, &batch_size| {
                let datagram = sample_push_data_datagram(batch_size);
                b.iter(|| black_box(datagram.encode()));
            },
        );
    }

    group.finish();
}

fn benchmark_semtech_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("semtech_decode");

    for batch_size in [1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("push_data_datagram", batch_size),
            &batch_size,
            |b, &batch_size| {
                let encoded = sample_push_data_datagram(batch_size).encode();
                b.iter(|| black_box(Datagram::decode(black_box(&encoded))));
            },
        );
    }

    group.finish();
}

fn benchmark_relay_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_encode");

    group.bench_function("uplink_packet", |b| {
        let pkt = UplinkPacket {
            hop_count: 1,
            uplink_id: 0x0AB,
            data_rate: 5,
            rssi: -90,
            snr: 7,
            channel: 2,
            phy_payload: vec![0u8; 64],
        };
        b.iter(|| black_box(pkt.encode()));
    });

    group.bench_function("event_packet", |b| {
        let pkt = EventPacket {
            hop_count: 0,
            event_id: 0x0001,
            event_type: EventType::Join,
            event_payload: vec![0u8; 16],
        };
        b.iter(|| black_box(pkt.encode()));
    });

    group.finish();
}

fn benchmark_relay_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_decode");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("uplink_packet", |b| {
        let pkt = UplinkPacket {
            hop_count: 1,
            uplink_id: 0x0AB,
            data_rate: 5,
            rssi: -90,
            snr: 7,
            channel: 2,
            phy_payload: vec![0u8; 64],
        };
        let encoded = pkt.encode().unwrap();
        b.iter(|| black_box(UplinkPacket::decode(black_box(&encoded))));
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(200)
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(3));
    targets = benchmark_semtech_encode,
              benchmark_semtech_decode,
              benchmark_relay_encode,
              benchmark_relay_decode
}
criterion_main!(benches);
