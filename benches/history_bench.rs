// Benchmark for sample history appends and batch collection
// Run with: cargo bench

use criterion::{Criterion, criterion_group, criterion_main};
use memlog_rs::device::{AxisSelection, LogBatch, MemoryLogOptions, MotionLogDevice};
use memlog_rs::history::{SampleHistory, shared};
use memlog_rs::worker::collect_log_data;
use memlog_rs::{ChannelHandle, SimulatedDevice};

fn bench_history_append(c: &mut Criterion) {
    c.bench_function("append 100k samples (chunk 1000)", |b| {
        b.iter(|| {
            let mut history = SampleHistory::with_chunk_size(1000);
            for i in 0..100_000 {
                history.append(i as f64, -(i as f64));
            }
            assert_eq!(history.len(), 100_000);
        });
    });
}

fn bench_collect_batches(c: &mut Criterion) {
    let device = SimulatedDevice::scripted(2);
    device.open_memory_log_buffer(1).unwrap();
    device
        .set_memory_log(1, &AxisSelection::first(2), &MemoryLogOptions::default())
        .unwrap();
    let pairs: Vec<(f64, f64)> = (0..1000).map(|i| (i as f64, 1.0)).collect();
    let batch = LogBatch::from_pairs(&pairs, false);

    c.bench_function("collect 100 batches of 1000 cycles", |b| {
        b.iter(|| {
            let history = shared(SampleHistory::new());
            for _ in 0..100 {
                device.push_batch(1, batch.clone());
                collect_log_data(&device, ChannelHandle::new(1), 0, &history).unwrap();
            }
            assert_eq!(history.lock().unwrap().len(), 100_000);
        });
    });
}

criterion_group!(benches, bench_history_append, bench_collect_batches);
criterion_main!(benches);
