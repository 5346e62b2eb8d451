//! # Performance Coordinator
//!
//! Ties normalisation, scoring, estimation, optimisation and command
//! scheduling together. Two independent cycles drive it:
//!
//! - the **stats cycle** ([`PerformanceCoordinator::run_stats_cycle`]) is the
//!   single writer of the published [`LinkSnapshot`];
//! - the **dispatch cycle** ([`PerformanceCoordinator::run_dispatch_step`])
//!   drains the command queue at the cadence of the current tier.
//!
//! Readers (reports, the dispatch cycle, UI polling) load the snapshot
//! lock-free through `arc-swap`. The optimizer's private state sits behind
//! one mutex and the command queue behind another; the stats cycle takes
//! them in that order, every other path takes only the queue lock.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use arc_swap::ArcSwap;
use quanta::Instant;
use serde::Serialize;

use crate::advisory::{self, AdvisoryInput, Suggestion};
use crate::config::LinkConfig;
use crate::encoding::{EncodingOptimizer, EncodingSettings};
use crate::estimator::BandwidthEstimator;
use crate::events::{DropReason, EventSink, LinkEvent};
use crate::history::{HistorySummary, QualityHistory};
use crate::interface::{Actuator, EncoderSink};
use crate::quality::{QualityScore, QualityScorer, QualityTier};
use crate::report::PerformanceReport;
use crate::scheduler::{Admission, CommandScheduler, Dispatch, OperatorCommand, QueueStatus};
use crate::stats::{self, NetworkSample, RawStatsReport};

/// Immutable view of the link published after every stats cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkSnapshot {
    pub sample: Option<NetworkSample>,
    pub score: QualityScore,
    pub settings: EncodingSettings,
    pub bandwidth_estimate_bps: f64,
    pub utilization_pct: f64,
    pub stale_misses: u32,
    pub trend: Option<f64>,
    pub history: HistorySummary,
}

/// Outcome of one stats cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsCycle {
    pub score: QualityScore,
    pub settings: EncodingSettings,
    /// Whether the optimizer changed the settings this cycle.
    pub settings_changed: bool,
    /// New dispatch interval when the tier changed this cycle.
    pub dispatch_interval: Option<Duration>,
    /// Whether this cycle ran on the last known sample instead of a fresh one.
    pub stale: bool,
}

/// State touched only by the stats cycle.
#[derive(Debug)]
struct StatsState {
    estimator: BandwidthEstimator,
    optimizer: EncodingOptimizer,
    history: QualityHistory,
    previous_report: Option<RawStatsReport>,
    last_sample: Option<NetworkSample>,
    stale_misses: u32,
    /// Settings not yet confirmed by the encoder.
    pending_push: bool,
}

pub struct PerformanceCoordinator {
    config: LinkConfig,
    scorer: QualityScorer,
    snapshot: ArcSwap<LinkSnapshot>,
    stats: Mutex<StatsState>,
    scheduler: Mutex<CommandScheduler>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PerformanceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceCoordinator")
            .field("snapshot", &*self.snapshot.load_full())
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl PerformanceCoordinator {
    pub fn new(config: LinkConfig, events: Arc<dyn EventSink>) -> Self {
        let optimizer = EncodingOptimizer::new(&config);
        let settings = optimizer.settings();
        let state = StatsState {
            estimator: BandwidthEstimator::from_config(&config),
            optimizer,
            history: QualityHistory::new(config.monitor.history_capacity),
            previous_report: None,
            last_sample: None,
            stale_misses: 0,
            // The encoder has not seen the initial settings yet.
            pending_push: true,
        };
        let snapshot = LinkSnapshot {
            sample: None,
            score: QualityScore::default(),
            settings,
            bandwidth_estimate_bps: settings.bitrate_bps as f64,
            utilization_pct: 0.0,
            stale_misses: 0,
            trend: None,
            history: HistorySummary::default(),
        };

        Self {
            scorer: QualityScorer::new(&config),
            scheduler: Mutex::new(CommandScheduler::new(&config.scheduler)),
            snapshot: ArcSwap::from_pointee(snapshot),
            stats: Mutex::new(state),
            events,
            config,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    // ─── Stats Cycle ────────────────────────────────────────────────────

    /// Run one stats/quality/optimizer cycle.
    ///
    /// `report` is `None` when stats collection failed or produced nothing.
    /// A stale cycle rescores the last known sample but leaves the
    /// estimator and encoding settings untouched.
    pub fn run_stats_cycle(&self, report: Option<RawStatsReport>) -> StatsCycle {
        let mut events = Vec::new();
        let mut state = lock(&self.stats);
        let previous = self.snapshot.load_full();

        let fresh = report.is_some();
        let sample = match report {
            Some(report) => {
                let sample = stats::normalize(&report, state.previous_report.as_ref());
                state.previous_report = Some(report);
                state.last_sample = Some(sample);
                state.stale_misses = 0;
                Some(sample)
            }
            None => {
                state.stale_misses = state.stale_misses.saturating_add(1);
                if state.stale_misses == self.config.monitor.stale_after_misses {
                    tracing::warn!(
                        consecutive_misses = state.stale_misses,
                        "transport statistics stale"
                    );
                    events.push(LinkEvent::StatsStale {
                        consecutive_misses: state.stale_misses,
                    });
                }
                state.last_sample
            }
        };

        let Some(sample) = sample else {
            // Nothing observed yet: only staleness moves.
            self.snapshot.store(Arc::new(LinkSnapshot {
                stale_misses: state.stale_misses,
                ..(*previous).clone()
            }));
            drop(state);
            self.emit_all(events);
            return StatsCycle {
                score: previous.score,
                settings: previous.settings,
                settings_changed: false,
                dispatch_interval: None,
                stale: true,
            };
        };

        let prior_settings = state.optimizer.settings();
        let target_utilization = (prior_settings.bitrate_bps > 0)
            .then(|| sample.bitrate_bps / prior_settings.bitrate_bps as f64 * 100.0);
        let score = self.scorer.score(&sample, target_utilization);

        let (settings, settings_changed, estimate, utilization_pct) = if fresh {
            let observed = sample.bandwidth_sample();
            if observed > 0.0 {
                state.estimator.observe(observed);
            }
            let estimate = state.estimator.estimate(prior_settings.bitrate_bps as f64);
            let opt = state.optimizer.optimize(&sample, estimate);
            events.extend(opt.events);
            if opt.changed {
                state.pending_push = true;
                events.push(LinkEvent::SettingsUpdated {
                    settings: opt.settings,
                });
            }
            (opt.settings, opt.changed, estimate, opt.utilization_pct)
        } else {
            (
                prior_settings,
                false,
                previous.bandwidth_estimate_bps,
                previous.utilization_pct,
            )
        };

        if fresh {
            state.history.push(sample, score);
        }
        let snapshot = LinkSnapshot {
            sample: Some(sample),
            score,
            settings,
            bandwidth_estimate_bps: estimate,
            utilization_pct,
            stale_misses: state.stale_misses,
            trend: state.history.trend(),
            history: state.history.summary(),
        };

        let mut dispatch_interval = None;
        if score.tier != previous.score.tier {
            dispatch_interval = lock(&self.scheduler).set_tier(score.tier);
            tracing::info!(
                previous = %previous.score.tier,
                current = %score.tier,
                score = score.value,
                "link quality changed"
            );
            events.push(LinkEvent::QualityChange {
                previous: previous.score.tier,
                current: score.tier,
                score: score.value,
            });
        }

        self.snapshot.store(Arc::new(snapshot));
        drop(state);

        tracing::debug!(
            fresh,
            rtt_ms = sample.rtt_ms,
            loss_pct = sample.packet_loss_pct,
            jitter_ms = sample.jitter_ms,
            score = score.value,
            tier = %score.tier,
            estimate_bps = estimate,
            "stats cycle"
        );
        self.emit_all(events);

        StatsCycle {
            score,
            settings,
            settings_changed,
            dispatch_interval,
            stale: !fresh,
        }
    }

    /// Push settings to the encoder if it has not confirmed the current
    /// ones. A failed push is logged and retried on the next call; the
    /// settings are not rolled back.
    pub fn apply_settings(&self, encoder: &dyn EncoderSink) -> bool {
        let mut state = lock(&self.stats);
        if !state.pending_push {
            return false;
        }
        let settings = state.optimizer.settings();
        match encoder.apply(&settings) {
            Ok(()) => {
                state.pending_push = false;
                tracing::debug!(
                    bitrate_bps = settings.bitrate_bps,
                    resolution_scale = settings.resolution_scale,
                    frame_rate = settings.frame_rate,
                    jitter_buffer_ms = settings.jitter_buffer_ms,
                    "encoder settings applied"
                );
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "encoder apply failed, retrying next cycle");
                false
            }
        }
    }

    // ─── Command Path ───────────────────────────────────────────────────

    /// Admit an operator command received at `now`.
    pub fn handle_incoming_command(&self, command: OperatorCommand, now: Instant) -> Admission {
        let admission = lock(&self.scheduler).admit(command, now);
        tracing::debug!(
            disposition = ?admission.disposition,
            priority = ?admission.priority,
            queue_len = admission.queue_len,
            "command admitted"
        );
        if let Some(evicted) = admission.evicted.clone() {
            self.events.emit(LinkEvent::CommandDropped {
                command: evicted,
                reason: DropReason::Overflow,
            });
        }
        admission
    }

    /// Run one dispatch step: dequeue at most one command and hand it to
    /// `actuator`, or report it dropped.
    pub fn run_dispatch_step(&self, actuator: &dyn Actuator) -> Option<Dispatch> {
        let dispatch = lock(&self.scheduler).dispatch_next()?;
        match &dispatch {
            Dispatch::Send(command) => {
                if let Err(e) = actuator.send(command) {
                    tracing::warn!(kind = %command.kind, error = %e, "actuator send failed");
                }
            }
            Dispatch::Dropped(command, reason) => {
                self.events.emit(LinkEvent::CommandDropped {
                    command: command.clone(),
                    reason: *reason,
                });
            }
        }
        Some(dispatch)
    }

    pub fn dispatch_interval(&self) -> Duration {
        lock(&self.scheduler).dispatch_interval()
    }

    pub fn queue_status(&self) -> QueueStatus {
        lock(&self.scheduler).status()
    }

    // ─── Readers ────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<LinkSnapshot> {
        self.snapshot.load_full()
    }

    pub fn tier(&self) -> QualityTier {
        self.snapshot.load().score.tier
    }

    pub fn settings(&self) -> EncodingSettings {
        self.snapshot.load().settings
    }

    pub fn suggestions(&self) -> Vec<Suggestion> {
        let snap = self.snapshot.load();
        let sample = snap.sample.unwrap_or_default();
        advisory::suggestions(
            &self.config,
            AdvisoryInput {
                sample: &sample,
                utilization_pct: snap.utilization_pct,
                stale_misses: snap.stale_misses,
            },
        )
    }

    pub fn report(&self) -> PerformanceReport {
        let snap = self.snapshot.load_full();
        PerformanceReport {
            sample: snap.sample,
            score: snap.score,
            settings: snap.settings,
            bandwidth_estimate_bps: snap.bandwidth_estimate_bps,
            utilization_pct: snap.utilization_pct,
            stale_misses: snap.stale_misses,
            trend: snap.trend,
            history: snap.history,
            queue: self.queue_status(),
            suggestions: self.suggestions(),
        }
    }

    fn emit_all(&self, events: Vec<LinkEvent>) {
        for event in events {
            self.events.emit(event);
        }
    }
}
