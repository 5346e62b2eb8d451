//! Hot-path latency benchmarks for the link core.
//!
//! Measures:
//! - CommandScheduler admit + dispatch with a mixed command stream
//! - Merge-heavy admission (continuous steering input)
//! - One full stats cycle through the coordinator
//!
//! Run with: cargo bench --package teleop-link

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::Duration;

use teleop_link::{
    CommandKind, CommandScheduler, LinkConfig, NullSink, OperatorCommand,
    PerformanceCoordinator, QualityTier, RawStatsReport,
};

const KINDS: [&str; 6] = ["direction", "speed", "camera", "light", "horn", "emergency_stop"];

fn bench_admit_dispatch_mixed(c: &mut Criterion) {
    let config = LinkConfig::default();
    let mut group = c.benchmark_group("scheduler_admit_dispatch");
    for depth in [8usize, 64, 256] {
        group.bench_function(format!("depth_{depth}"), |b| {
            let (clock, mock) = quanta::Clock::mock();
            b.iter_batched(
                || {
                    let mut s = CommandScheduler::new(&config.scheduler);
                    for i in 0..depth {
                        let kind = CommandKind::parse(KINDS[i % KINDS.len()]);
                        s.admit(OperatorCommand::new(kind, i as u64), clock.now());
                        mock.increment(Duration::from_millis(60));
                    }
                    s
                },
                |mut s| {
                    s.admit(OperatorCommand::new(CommandKind::Light, 1), clock.now());
                    black_box(s.dispatch_next())
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_merge_burst(c: &mut Criterion) {
    let config = LinkConfig::default();
    let (clock, mock) = quanta::Clock::mock();
    let mut s = CommandScheduler::new(&config.scheduler);
    s.set_tier(QualityTier::Good);
    c.bench_function("scheduler_merge_steering", |b| {
        b.iter(|| {
            mock.increment(Duration::from_millis(5));
            black_box(s.admit(OperatorCommand::new(CommandKind::Direction, 0.25), clock.now()));
        });
    });
}

fn bench_stats_cycle(c: &mut Criterion) {
    let coordinator = PerformanceCoordinator::new(LinkConfig::default(), Arc::new(NullSink));
    let mut i = 0u64;
    c.bench_function("coordinator_stats_cycle", |b| {
        b.iter(|| {
            i += 1;
            let report = RawStatsReport {
                timestamp: i as f64 * 500.0,
                round_trip_time: Some(if i % 7 == 0 { 0.7 } else { 0.08 }),
                jitter: Some(0.02),
                packets_lost: Some((i / 10) as i64),
                packets_received: Some(i * 100),
                bytes_received: Some(i * 50_000),
                frames_per_second: Some(30.0),
                available_outgoing_bitrate: Some(2_000_000.0),
                ..Default::default()
            };
            black_box(coordinator.run_stats_cycle(Some(report)))
        });
    });
}

criterion_group!(
    benches,
    bench_admit_dispatch_mixed,
    bench_merge_burst,
    bench_stats_cycle
);
criterion_main!(benches);
