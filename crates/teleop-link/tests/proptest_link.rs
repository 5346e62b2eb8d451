//! Property-based tests for the link core invariants.
//!
//! Scores stay in range and never improve as a metric worsens, the
//! bandwidth estimate never drops below the floor, encoder settings never
//! leave their bounds, and the scheduler's ordering guarantees hold for
//! arbitrary command streams.

use std::time::Duration;

use proptest::prelude::*;
use teleop_link::scheduler::Dispatch;
use teleop_link::*;

// ─── Strategies ─────────────────────────────────────────────────────────────

fn metric() -> impl Strategy<Value = f64> {
    prop_oneof![
        0.0f64..2_000.0,
        Just(0.0),
        Just(f64::MAX),
        Just(f64::NAN),
        Just(-1.0),
    ]
}

prop_compose! {
    fn sample()(
        rtt_ms in 0.0f64..2_000.0,
        jitter_ms in 0.0f64..500.0,
        packet_loss_pct in 0.0f64..100.0,
        bitrate_bps in 0.0f64..10_000_000.0,
        frame_rate in 0.0f64..120.0,
        available in proptest::option::of(0.0f64..10_000_000.0),
    ) -> NetworkSample {
        NetworkSample {
            rtt_ms,
            jitter_ms,
            packet_loss_pct,
            bitrate_bps,
            frame_rate,
            available_bitrate_bps: available,
            ..Default::default()
        }
    }
}

fn command_kind() -> impl Strategy<Value = CommandKind> {
    prop_oneof![
        Just(CommandKind::Direction),
        Just(CommandKind::Speed),
        Just(CommandKind::Camera),
        Just(CommandKind::Light),
        "[a-z]{3,8}".prop_map(|s| CommandKind::parse(&s)),
    ]
}

// ─── Quality Score ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn score_stays_in_range(
        rtt in metric(),
        jitter in metric(),
        loss in metric(),
        fps in metric(),
        util in proptest::option::of(metric()),
    ) {
        let scorer = QualityScorer::new(&LinkConfig::default());
        let s = NetworkSample {
            rtt_ms: rtt,
            jitter_ms: jitter,
            packet_loss_pct: loss,
            frame_rate: fps,
            ..Default::default()
        };
        let q = scorer.score(&s, util);
        prop_assert!((0.0..=100.0).contains(&q.value));
        prop_assert_eq!(q.tier, QualityTier::from_score(q.value));
    }

    #[test]
    fn score_never_improves_as_metrics_worsen(
        base in sample(),
        a in 0.0f64..2_000.0,
        b in 0.0f64..2_000.0,
        which in 0usize..3,
    ) {
        let scorer = QualityScorer::new(&LinkConfig::default());
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let with = |v: f64| {
            let mut s = base;
            match which {
                0 => s.rtt_ms = v,
                1 => s.packet_loss_pct = v.min(100.0),
                _ => s.jitter_ms = v,
            }
            scorer.score(&s, None).value
        };
        prop_assert!(with(lo) >= with(hi));
    }
}

// ─── Bandwidth Estimator ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn estimate_never_below_floor(
        samples in proptest::collection::vec(0.0f64..10_000_000.0, 0..20),
        fallback in 0.0f64..10_000_000.0,
    ) {
        let config = LinkConfig::default();
        let min = config.encoding.bitrate.min_bps as f64;
        let mut est = BandwidthEstimator::from_config(&config);
        for s in samples {
            est.observe(s);
            prop_assert!(est.len() <= est.capacity());
        }
        prop_assert!(est.estimate(fallback) >= min);
    }

    #[test]
    fn single_sample_estimate_is_the_sample(s in 100_000.0f64..10_000_000.0) {
        let mut est = BandwidthEstimator::from_config(&LinkConfig::default());
        est.observe(s);
        prop_assert!((est.estimate(0.0) - s).abs() < 1e-6);
    }

    #[test]
    fn estimate_lies_within_sample_range(
        samples in proptest::collection::vec(100_000.0f64..10_000_000.0, 1..20),
    ) {
        let mut est = BandwidthEstimator::from_config(&LinkConfig::default());
        for &s in &samples {
            est.observe(s);
        }
        let window: Vec<f64> = est.samples().collect();
        let lo = window.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let e = est.estimate(0.0);
        prop_assert!(e >= lo - 1e-6 && e <= hi + 1e-6);
    }
}

// ─── Encoding Optimizer ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn settings_never_leave_bounds(
        ticks in proptest::collection::vec((sample(), 0.0f64..10_000_000.0), 1..80),
    ) {
        let config = LinkConfig::default();
        let mut opt = EncodingOptimizer::new(&config);
        for (s, estimate) in ticks {
            let out = opt.optimize(&s, estimate);
            prop_assert!(out.settings.within(&config.encoding), "{:?}", out.settings);
        }
    }

    #[test]
    fn coordinator_settings_never_leave_bounds(
        reports in proptest::collection::vec(
            proptest::option::of((0.0f64..2.0, 0.0f64..0.5, 0i64..50, 0u64..200_000)),
            1..40,
        ),
    ) {
        let config = LinkConfig::default();
        let c = PerformanceCoordinator::new(config.clone(), std::sync::Arc::new(NullSink));
        let (mut lost, mut received, mut bytes) = (0i64, 0u64, 0u64);
        for (i, r) in reports.into_iter().enumerate() {
            let raw = r.map(|(rtt, jitter, d_lost, d_bytes)| {
                lost += d_lost;
                received += 100;
                bytes += d_bytes;
                RawStatsReport {
                    timestamp: i as f64 * 500.0,
                    round_trip_time: Some(rtt),
                    jitter: Some(jitter),
                    packets_lost: Some(lost),
                    packets_received: Some(received),
                    bytes_received: Some(bytes),
                    frames_per_second: Some(24.0),
                    ..Default::default()
                }
            });
            let cycle = c.run_stats_cycle(raw);
            prop_assert!(cycle.settings.within(&config.encoding));
            prop_assert!((0.0..=100.0).contains(&cycle.score.value));
        }
    }
}

// ─── Command Scheduler ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn speed_burst_collapses_to_last(
        gaps in proptest::collection::vec(0u64..=50, 1..30),
        values in proptest::collection::vec(-10i64..10, 31),
    ) {
        let (clock, mock) = quanta::Clock::mock();
        let mut s = CommandScheduler::new(&LinkConfig::default().scheduler);
        s.admit(OperatorCommand::new(CommandKind::Speed, values[0]), clock.now());
        for (i, gap) in gaps.iter().enumerate() {
            mock.increment(Duration::from_millis(*gap));
            s.admit(OperatorCommand::new(CommandKind::Speed, values[i + 1]), clock.now());
        }
        prop_assert_eq!(s.len(), 1);
        let last = serde_json::json!(values[gaps.len()]);
        match s.dispatch_next() {
            Some(Dispatch::Send(c)) => prop_assert_eq!(c.value, last),
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    #[test]
    fn emergency_stop_always_first(
        kinds in proptest::collection::vec(command_kind(), 0..50),
        gap_ms in 0u64..100,
    ) {
        let (clock, mock) = quanta::Clock::mock();
        let mut s = CommandScheduler::new(&LinkConfig::default().scheduler);
        for k in kinds {
            s.admit(OperatorCommand::new(k, 1), clock.now());
            mock.increment(Duration::from_millis(gap_ms));
        }
        s.admit(OperatorCommand::new(CommandKind::EmergencyStop, true), clock.now());
        match s.dispatch_next() {
            Some(Dispatch::Send(c)) => prop_assert_eq!(c.kind, CommandKind::EmergencyStop),
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    #[test]
    fn poor_link_never_sends_below_critical(
        kinds in proptest::collection::vec(command_kind(), 0..50),
        gap_ms in 0u64..100,
    ) {
        let (clock, mock) = quanta::Clock::mock();
        let mut s = CommandScheduler::new(&LinkConfig::default().scheduler);
        s.set_tier(QualityTier::Poor);
        for k in kinds {
            s.admit(OperatorCommand::new(k, 1), clock.now());
            mock.increment(Duration::from_millis(gap_ms));
        }
        let queued = s.status().distribution;
        let mut dropped = 0;
        while let Some(d) = s.dispatch_next() {
            match d {
                Dispatch::Send(c) => prop_assert!(c.priority <= Priority::Critical),
                Dispatch::Dropped(c, reason) => {
                    prop_assert!(c.priority > Priority::Critical);
                    prop_assert_eq!(reason, DropReason::PoorLink);
                    dropped += 1;
                }
            }
        }
        prop_assert_eq!(dropped, queued.normal + queued.low);
    }

    #[test]
    fn queue_stays_sorted(
        kinds in proptest::collection::vec(command_kind(), 0..60),
        gaps in proptest::collection::vec(0u64..120, 60),
    ) {
        let (clock, mock) = quanta::Clock::mock();
        let mut s = CommandScheduler::new(&LinkConfig::default().scheduler);
        for (k, gap) in kinds.into_iter().zip(gaps) {
            s.admit(OperatorCommand::new(k, 1), clock.now());
            mock.increment(Duration::from_millis(gap));
        }
        let order: Vec<_> = s.snapshot().iter().map(|c| c.priority).collect();
        prop_assert!(order.windows(2).all(|w| w[0] <= w[1]));
    }
}
