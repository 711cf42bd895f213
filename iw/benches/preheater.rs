//! Preheater benchmarks
//!
//! Benchmarks cover:
//! - RequestKey derivation
//! - start/stop of already-registered keys (refcount only)
//! - start/stop of fresh keys (queue + executor round trip)
//! - registry contention from several threads

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use imagewarm::events::EventBus;
use imagewarm::executor::{LoaderConfig, PipelineExecutor, SimulatedLoader};
use imagewarm::preheater::{Preheater, PreheaterConfig};
use imagewarm::queue::{TaskQueue, TaskQueueConfig};
use imagewarm::request::{FnProcessor, ImageRequest};
use tokio::runtime::Runtime;

type BenchPreheater = Preheater<PipelineExecutor<SimulatedLoader>>;

fn build(runtime: &Runtime) -> BenchPreheater {
    let _guard = runtime.enter();
    let events = Arc::new(EventBus::new(1024));
    let queue = TaskQueue::with_tokio(TaskQueueConfig::default().suspended(true)).unwrap();
    let executor = PipelineExecutor::new(SimulatedLoader::new(LoaderConfig::instant()), queue, events.clone());
    Preheater::with_tokio(Arc::new(executor), events, PreheaterConfig::default()).unwrap()
}

fn requests(n: usize) -> Vec<ImageRequest> {
    (0..n)
        .map(|i| {
            ImageRequest::new(format!("https://cdn.example.com/photos/{}.jpeg", i))
                .processed(FnProcessor::identity("resize-200x200"))
                .processed(FnProcessor::identity("rounded-corners"))
        })
        .collect()
}

fn bench_key_derivation(c: &mut Criterion) {
    let request = &requests(1)[0];
    c.bench_function("request_key", |b| b.iter(|| black_box(request).key()));
}

fn bench_refcount_only(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let preheater = build(&runtime);
    let mut group = c.benchmark_group("refcount_only");

    for size in [1, 16, 128] {
        let batch = requests(size);
        // Hold one reference so the timed calls never create or remove entries
        preheater.start_preheating(&batch);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| {
                preheater.start_preheating(batch);
                preheater.stop_preheating(batch);
            })
        });
        preheater.stop_all();
    }
    group.finish();
}

fn bench_fresh_keys(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let preheater = build(&runtime);
    let mut group = c.benchmark_group("fresh_keys");

    for size in [1, 16, 128] {
        let batch = requests(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| {
                preheater.start_preheating(batch);
                preheater.stop_preheating(batch);
            })
        });
    }
    group.finish();
}

fn bench_contention(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let preheater = build(&runtime);
    let batch = requests(32);
    let mut group = c.benchmark_group("contention");

    for threads in [2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                std::thread::scope(|scope| {
                    for t in 0..threads {
                        let preheater = &preheater;
                        let slice = &batch[t % 4 * 8..t % 4 * 8 + 8];
                        scope.spawn(move || {
                            for _ in 0..100 {
                                preheater.start_preheating(slice);
                                preheater.stop_preheating(slice);
                            }
                        });
                    }
                })
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_key_derivation,
    bench_refcount_only,
    bench_fresh_keys,
    bench_contention
);
criterion_main!(benches);
