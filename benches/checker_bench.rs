//! Benchmarks for mc-coordinator
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

fn benchmark_queue_operations(c: &mut Criterion) {
    use mc_coordinator::checker::queue::{QueueStats, StateQueue, StateTask};
    use mc_coordinator::fingerprint::Fingerprint;
    use std::sync::Arc;

    c.bench_function("queue_enqueue_dequeue", |b| {
        let queue = StateQueue::new(Arc::new(QueueStats::default()));

        b.iter(|| {
            queue.enqueue(StateTask::new((3u8, 5u8), Fingerprint(42), 7));
            let received = queue.dequeue(Duration::ZERO).map(|(task, _guard)| task);
            black_box(received);
        })
    });
}

fn benchmark_fingerprinting(c: &mut Criterion) {
    use mc_coordinator::fingerprint::{FingerprintSet, Fp64, FP64_INIT};
    use mc_coordinator::models::Ring;

    let fp = Fp64::new(FP64_INIT);
    let state = Ring {
        holder: 3,
        requesting: vec![true, false, true, false, true, false, true, false],
    };

    c.bench_function("fingerprint_state", |b| {
        b.iter(|| black_box(fp.fingerprint(black_box(&state))))
    });

    c.bench_function("fingerprint_set_insert", |b| {
        let seen = FingerprintSet::new();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            black_box(seen.insert(fp.fingerprint(&n)))
        })
    });
}

fn benchmark_die_hard(c: &mut Criterion) {
    use mc_coordinator::models::DieHard;
    use mc_coordinator::{Checker, CheckerConfig};

    c.bench_function("die_hard_continuation", |b| {
        b.iter(|| {
            let config = CheckerConfig {
                workers: 2,
                continuation: true,
                initial_wait: Duration::from_millis(50),
                progress_interval: Duration::from_millis(50),
                ..Default::default()
            };
            let checker = Checker::new(DieHard, config).unwrap();
            black_box(checker.model_check().unwrap())
        })
    });
}

criterion_group!(
    benches,
    benchmark_queue_operations,
    benchmark_fingerprinting,
    benchmark_die_hard
);
criterion_main!(benches);
