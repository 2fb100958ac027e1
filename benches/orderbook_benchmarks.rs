use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::Arc;
use std::thread;

use lockfree_matching_engine::orderbook::NullSink;
use lockfree_matching_engine::{EngineConfig, MatchingEngine, Side};

fn engine(instruments: usize) -> MatchingEngine {
    MatchingEngine::new(
        EngineConfig::default().with_instruments(instruments),
        Arc::new(NullSink),
    )
    .expect("valid engine config")
}

fn bench_submit(c: &mut Criterion) {
    let engine = engine(1024);
    let mut i = 0usize;

    c.bench_function("submit_order", |b| {
        b.iter(|| {
            i = i.wrapping_add(1);
            let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
            black_box(engine.submit_order(side, i % 1024, 1 + (i % 1000) as u64, 1 + (i % 500) as u64))
        })
    });
}

fn bench_match_against_book(c: &mut Criterion) {
    c.bench_function("match_incoming_100_resting", |b| {
        b.iter_batched(
            || {
                let engine = engine(1);
                for i in 0..100u64 {
                    engine.submit_order(Side::Sell, 0, 10, 1 + i * 5).unwrap();
                }
                engine
            },
            |engine| black_box(engine.match_incoming(0, Side::Buy, 250, 300)),
            BatchSize::SmallInput,
        )
    });
}

fn bench_contended_mix(c: &mut Criterion) {
    c.bench_function("contended_4_threads_1000_ops", |b| {
        b.iter(|| {
            let engine = Arc::new(engine(4));
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for i in 0..250u64 {
                            let instrument = ((t + i) % 4) as usize;
                            engine.submit_order(Side::Sell, instrument, 10, 100).unwrap();
                            engine.match_incoming(instrument, Side::Buy, 5, 100).unwrap();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        })
    });
}

criterion_group!(
    benches,
    bench_submit,
    bench_match_against_book,
    bench_contended_mix
);
criterion_main!(benches);
