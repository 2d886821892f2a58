use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use signalwatch_core::{BroadcastHub, CongestionLevel, SignalPhase, Snapshot, WireFormat};
use std::time::Duration;

fn snapshot(seq: u64) -> Snapshot {
    Snapshot::builder()
        .sequence_number(seq)
        .frame_number(seq)
        .vehicle_count(12)
        .average_vehicle_count(9.4)
        .congestion_level(CongestionLevel::Medium)
        .signal(SignalPhase::Red, Duration::from_millis(8_250))
        .cycle_rate(Some(29.97))
        .build()
}

/// Benchmark publish fan-out with varying subscriber counts
fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fanout");

    for subscribers in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*subscribers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            subscribers,
            |b, &subscribers| {
                let hub = BroadcastHub::default();
                let mut receivers: Vec<_> = (0..subscribers)
                    .map(|_| hub.subscribe_channel(1).1)
                    .collect();
                let mut seq = 0;

                b.iter(|| {
                    seq += 1;
                    black_box(hub.publish(black_box(&snapshot(seq))));
                    for rx in receivers.iter_mut() {
                        let _ = rx.try_recv();
                    }
                });
            },
        );
    }
    group.finish();
}

/// Benchmark snapshot encoding per wire format
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let snapshot = snapshot(42);

    for format in [WireFormat::Json, WireFormat::Cbor] {
        group.bench_function(format.name(), |b| {
            b.iter(|| black_box(format.encode(black_box(&snapshot))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_publish_fanout, bench_encode);
criterion_main!(benches);
