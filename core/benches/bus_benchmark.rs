/// MessageBus dispatch benchmarks using Criterion
///
/// Run with: cargo bench --bench bus_benchmark
///
/// Benchmarks cover:
/// - Direct send to a single handler
/// - Fan-out to several handlers on one receiver
/// - A full coordinator round trip with stub workers
/// - Draining a start-up backlog
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parley_core::message::{FinalResponse, QueryRequest, RetrievalResult};
use parley_core::{
    names, Coordinator, CoordinatorConfig, Envelope, Message, MessageBus, Outbox,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn make_query(i: u64) -> Message {
    Message::QueryRequest(QueryRequest {
        query: format!("question {}", i),
    })
}

/// Benchmark: send to one counting handler
fn bench_direct_send(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_direct_send");

    for count in [100u64, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let bus = MessageBus::new();
            let hits = Arc::new(AtomicU64::new(0));
            let counter = Arc::clone(&hits);
            bus.register_fn("bench.sink", move |_: &Envelope, _: &dyn Outbox| {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });

            b.iter(|| {
                for i in 0..count {
                    black_box(bus.send(Envelope::new("bench", "bench.sink", make_query(i))));
                }
            });
        });
    }
    group.finish();
}

/// Benchmark: one receiver with several handlers
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_fan_out");

    for handlers in [1usize, 4, 16].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(handlers),
            handlers,
            |b, &handlers| {
                let bus = MessageBus::new();
                for _ in 0..handlers {
                    bus.register_fn("bench.fan", |env: &Envelope, _: &dyn Outbox| {
                        black_box(env.correlation_id());
                        Ok(())
                    });
                }
                b.iter(|| black_box(bus.send(Envelope::new("bench", "bench.fan", make_query(0)))));
            },
        );
    }
    group.finish();
}

/// Benchmark: query -> retrieval -> responder -> coordinator -> boundary
fn bench_coordinator_round_trip(c: &mut Criterion) {
    let bus = MessageBus::new();
    let delivered = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&delivered);
    let coordinator = Arc::new(Coordinator::new(
        CoordinatorConfig::default(),
        Arc::new(move |_: Envelope| {
            sink.fetch_add(1, Ordering::Relaxed);
        }),
    ));
    bus.register_worker(coordinator);
    bus.register_fn(names::RETRIEVAL, |env: &Envelope, outbox: &dyn Outbox| {
        if let Message::QueryRequest(q) = env.message() {
            outbox.post(env.reply(
                names::RETRIEVAL,
                names::RESPONDER,
                Message::RetrievalResult(RetrievalResult {
                    query: q.query.clone(),
                    retrieved_context: vec!["context".into()],
                    source_metadata: vec![],
                }),
            ));
        }
        Ok(())
    });
    bus.register_fn(names::RESPONDER, |env: &Envelope, outbox: &dyn Outbox| {
        if let Message::RetrievalResult(r) = env.message() {
            outbox.post(env.reply(
                names::RESPONDER,
                names::COORDINATOR,
                Message::FinalResponse(FinalResponse {
                    answer: "answer".into(),
                    source_chunks: r.retrieved_context.clone(),
                    source_metadata: vec![],
                    original_query: r.query.clone(),
                }),
            ));
        }
        Ok(())
    });

    let mut i = 0u64;
    c.bench_function("coordinator_round_trip", |b| {
        b.iter(|| {
            i += 1;
            bus.send(Envelope::new(names::BOUNDARY, names::COORDINATOR, make_query(i)));
        })
    });
    black_box(delivered.load(Ordering::Relaxed));
}

/// Benchmark: drain a backlog queued before registration
fn bench_drain_pending(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_drain_pending");

    for backlog in [100u64, 1_000].iter() {
        group.throughput(Throughput::Elements(*backlog));
        group.bench_with_input(BenchmarkId::from_parameter(backlog), backlog, |b, &backlog| {
            b.iter(|| {
                let bus = MessageBus::new();
                for i in 0..backlog {
                    bus.send(Envelope::new("bench", "bench.late", make_query(i)));
                }
                bus.register_fn("bench.late", |_: &Envelope, _: &dyn Outbox| Ok(()));
                black_box(bus.drain_pending())
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_direct_send,
    bench_fan_out,
    bench_coordinator_round_trip,
    bench_drain_pending
);
criterion_main!(benches);
