//! Human-actionable advisories derived from the latest link state.
//!
//! Each advisory uses the same ceilings as scoring: the `good` ceiling
//! marks a warning, the `fair` ceiling a critical finding.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::LinkConfig;
use crate::stats::NetworkSample;

const SATURATED_UTILIZATION_PCT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ReduceBitrate,
    ReduceQuality,
    ReduceResolution,
    CheckNetwork,
    IncreaseJitterBuffer,
    ReduceComplexity,
    OptimizeBandwidth,
    OptimizeSystem,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub severity: Severity,
    pub action: Action,
    pub message: String,
    /// Metric values that triggered the advisory.
    pub metrics: BTreeMap<&'static str, f64>,
}

impl Suggestion {
    fn new(severity: Severity, action: Action, message: impl Into<String>) -> Self {
        Self {
            severity,
            action,
            message: message.into(),
            metrics: BTreeMap::new(),
        }
    }

    fn metric(mut self, name: &'static str, value: f64) -> Self {
        self.metrics.insert(name, value);
        self
    }
}

/// Inputs to advisory derivation.
#[derive(Debug, Clone, Copy)]
pub struct AdvisoryInput<'a> {
    pub sample: &'a NetworkSample,
    pub utilization_pct: f64,
    pub stale_misses: u32,
}

/// Derive advisories for the current state.
pub fn suggestions(config: &LinkConfig, input: AdvisoryInput<'_>) -> Vec<Suggestion> {
    let good = &config.thresholds.good;
    let fair = &config.thresholds.fair;
    let s = input.sample;
    let mut out = Vec::new();

    if input.stale_misses >= config.monitor.stale_after_misses {
        out.push(
            Suggestion::new(
                Severity::Critical,
                Action::CheckNetwork,
                "transport statistics are stale; check the connection",
            )
            .metric("consecutive_misses", input.stale_misses as f64),
        );
    }

    if s.rtt_ms > good.rtt_ms {
        let critical = s.rtt_ms > fair.rtt_ms;
        out.push(
            if critical {
                Suggestion::new(
                    Severity::Critical,
                    Action::ReduceQuality,
                    "latency is very high; lower overall video quality",
                )
            } else {
                Suggestion::new(
                    Severity::Warning,
                    Action::ReduceBitrate,
                    "latency is elevated; lower the bitrate",
                )
            }
            .metric("rtt_ms", s.rtt_ms)
            .metric("threshold_ms", if critical { fair.rtt_ms } else { good.rtt_ms }),
        );
    }

    if s.packet_loss_pct > good.loss_pct {
        let critical = s.packet_loss_pct > fair.loss_pct;
        out.push(
            if critical {
                Suggestion::new(
                    Severity::Critical,
                    Action::CheckNetwork,
                    "packet loss is severe; check network stability",
                )
            } else {
                Suggestion::new(
                    Severity::Warning,
                    Action::ReduceResolution,
                    "packet loss is elevated; lower the resolution",
                )
            }
            .metric("packet_loss_pct", s.packet_loss_pct)
            .metric(
                "threshold_pct",
                if critical { fair.loss_pct } else { good.loss_pct },
            ),
        );
    }

    if s.jitter_ms > good.jitter_ms {
        let severity = if s.jitter_ms > fair.jitter_ms {
            Severity::Critical
        } else {
            Severity::Warning
        };
        out.push(
            Suggestion::new(
                severity,
                Action::IncreaseJitterBuffer,
                "arrival jitter is high; increase the jitter buffer",
            )
            .metric("jitter_ms", s.jitter_ms),
        );
    }

    let min_fps = config.encoding.frame_rate.min_fps as f64;
    if s.frame_rate > 0.0 && s.frame_rate < min_fps * 2.0 {
        let critical = s.frame_rate < min_fps * 1.5;
        out.push(
            if critical {
                Suggestion::new(
                    Severity::Critical,
                    Action::ReduceQuality,
                    "frame rate is critically low; lower overall video quality",
                )
            } else {
                Suggestion::new(
                    Severity::Warning,
                    Action::ReduceComplexity,
                    "frame rate is low; reduce encoding complexity",
                )
            }
            .metric("frame_rate", s.frame_rate)
            .metric("min_fps", min_fps),
        );
    }

    if input.utilization_pct > SATURATED_UTILIZATION_PCT {
        out.push(
            Suggestion::new(
                Severity::Warning,
                Action::OptimizeBandwidth,
                "bandwidth is nearly saturated",
            )
            .metric("utilization_pct", input.utilization_pct),
        );
    }

    let critical = out
        .iter()
        .filter(|s| s.severity == Severity::Critical)
        .count();
    if critical >= 2 {
        let total = out.len();
        out.push(
            Suggestion::new(
                Severity::Critical,
                Action::OptimizeSystem,
                "multiple severe problems; lower overall quality and check the network",
            )
            .metric("critical_issues", critical as f64)
            .metric("total_issues", total as f64),
        );
    }

    out
}
