//! # Link Quality Scoring
//!
//! Composite score (0–100) from RTT, packet loss, jitter and media
//! delivery. Each metric is compared against the three tier ceilings and
//! costs a fixed penalty for the worst ceiling it crosses:
//!
//! | Metric       | > excellent | > good | > fair |
//! |--------------|-------------|--------|--------|
//! | RTT          | 10          | 20     | 30     |
//! | Packet loss  | 10          | 20     | 30     |
//! | Jitter       | 5           | 15     | 20     |
//!
//! Media delivery costs up to 20 more: the worse of the frame-rate
//! penalty and the bandwidth-utilisation penalty.

use serde::{Deserialize, Serialize};

use crate::config::{FrameRateBounds, LinkConfig, QualityThresholds};
use crate::stats::NetworkSample;

const RTT_PENALTY: [f64; 3] = [10.0, 20.0, 30.0];
const LOSS_PENALTY: [f64; 3] = [10.0, 20.0, 30.0];
const JITTER_PENALTY: [f64; 3] = [5.0, 15.0, 20.0];
const DELIVERY_PENALTY: [f64; 2] = [10.0, 20.0];

const UTILIZATION_HIGH_PCT: f64 = 75.0;
const UTILIZATION_SATURATED_PCT: f64 = 90.0;

/// Discrete link-health bucket. Ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            QualityTier::Excellent
        } else if score >= 75.0 {
            QualityTier::Good
        } else if score >= 60.0 {
            QualityTier::Fair
        } else {
            QualityTier::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Excellent => "excellent",
            QualityTier::Good => "good",
            QualityTier::Fair => "fair",
            QualityTier::Poor => "poor",
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// Composite score in [0, 100].
    pub value: f64,
    pub tier: QualityTier,
}

impl Default for QualityScore {
    fn default() -> Self {
        Self {
            value: 100.0,
            tier: QualityTier::Excellent,
        }
    }
}

/// Scores samples against the configured ceilings. Stateless.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    thresholds: QualityThresholds,
    frame_rate: FrameRateBounds,
}

impl QualityScorer {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            frame_rate: config.encoding.frame_rate.clone(),
        }
    }

    /// Score a sample.
    ///
    /// `utilization_pct` is the bandwidth utilisation measured against the
    /// encoding settings in force before this sample (measured bitrate over
    /// target bitrate), or `None` when it is unknown.
    pub fn score(&self, sample: &NetworkSample, utilization_pct: Option<f64>) -> QualityScore {
        let t = &self.thresholds;
        let mut score = 100.0;

        score -= tiered_penalty(
            sample.rtt_ms,
            [t.excellent.rtt_ms, t.good.rtt_ms, t.fair.rtt_ms],
            RTT_PENALTY,
        );
        score -= tiered_penalty(
            sample.packet_loss_pct,
            [t.excellent.loss_pct, t.good.loss_pct, t.fair.loss_pct],
            LOSS_PENALTY,
        );
        score -= tiered_penalty(
            sample.jitter_ms,
            [t.excellent.jitter_ms, t.good.jitter_ms, t.fair.jitter_ms],
            JITTER_PENALTY,
        );
        score -= self
            .frame_rate_penalty(sample.frame_rate)
            .max(utilization_penalty(utilization_pct));

        let value = if score.is_finite() {
            score.clamp(0.0, 100.0)
        } else {
            0.0
        };
        QualityScore {
            value,
            tier: QualityTier::from_score(value),
        }
    }

    /// Frame rate below 1.5× the configured minimum is severe; below the
    /// default rate is mild. A frame rate of 0 means "not reported".
    fn frame_rate_penalty(&self, fps: f64) -> f64 {
        if fps <= 0.0 {
            return 0.0;
        }
        if fps < self.frame_rate.min_fps as f64 * 1.5 {
            DELIVERY_PENALTY[1]
        } else if fps < self.frame_rate.default_fps as f64 {
            DELIVERY_PENALTY[0]
        } else {
            0.0
        }
    }
}

fn utilization_penalty(utilization_pct: Option<f64>) -> f64 {
    match utilization_pct {
        Some(u) if u > UTILIZATION_SATURATED_PCT => DELIVERY_PENALTY[1],
        Some(u) if u > UTILIZATION_HIGH_PCT => DELIVERY_PENALTY[0],
        _ => 0.0,
    }
}

/// Fixed penalty for the worst ceiling `value` exceeds.
fn tiered_penalty(value: f64, [excellent, good, fair]: [f64; 3], penalty: [f64; 3]) -> f64 {
    if value.is_nan() {
        return penalty[2];
    }
    if value > fair {
        penalty[2]
    } else if value > good {
        penalty[1]
    } else if value > excellent {
        penalty[0]
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> QualityScorer {
        QualityScorer::new(&LinkConfig::default())
    }

    fn sample(rtt_ms: f64, loss: f64, jitter_ms: f64) -> NetworkSample {
        NetworkSample {
            rtt_ms,
            packet_loss_pct: loss,
            jitter_ms,
            frame_rate: 30.0,
            ..Default::default()
        }
    }

    #[test]
    fn clean_link_is_excellent() {
        let q = scorer().score(&sample(40.0, 0.0, 5.0), Some(50.0));
        assert_eq!(q.value, 100.0);
        assert_eq!(q.tier, QualityTier::Excellent);
    }

    #[test]
    fn penalties_are_fixed_per_ceiling_not_interpolated() {
        let s = scorer();
        // Just over and far over the fair RTT ceiling cost the same.
        let a = s.score(&sample(501.0, 0.0, 0.0), None);
        let b = s.score(&sample(5_000.0, 0.0, 0.0), None);
        assert_eq!(a.value, 70.0);
        assert_eq!(a.value, b.value);
    }

    #[test]
    fn each_ceiling_costs_its_penalty() {
        let s = scorer();
        assert_eq!(s.score(&sample(200.0, 0.0, 0.0), None).value, 90.0);
        assert_eq!(s.score(&sample(400.0, 0.0, 0.0), None).value, 80.0);
        assert_eq!(s.score(&sample(0.0, 3.0, 0.0), None).value, 90.0);
        assert_eq!(s.score(&sample(0.0, 7.0, 0.0), None).value, 80.0);
        assert_eq!(s.score(&sample(0.0, 11.0, 0.0), None).value, 70.0);
        assert_eq!(s.score(&sample(0.0, 0.0, 50.0), None).value, 95.0);
        assert_eq!(s.score(&sample(0.0, 0.0, 100.0), None).value, 85.0);
        assert_eq!(s.score(&sample(0.0, 0.0, 200.0), None).value, 80.0);
    }

    #[test]
    fn ceilings_are_exclusive() {
        // Exactly at the excellent ceilings is still excellent.
        let q = scorer().score(&sample(150.0, 2.0, 40.0), None);
        assert_eq!(q.value, 100.0);
    }

    #[test]
    fn worst_case_clamps_to_zero_or_above() {
        let mut s = sample(10_000.0, 100.0, 10_000.0);
        s.frame_rate = 1.0;
        let q = scorer().score(&s, Some(500.0));
        assert_eq!(q.value, 0.0);
        assert_eq!(q.tier, QualityTier::Poor);
    }

    #[test]
    fn delivery_penalty_takes_worse_of_frame_rate_and_utilization() {
        let s = scorer();
        let mut low_fps = sample(0.0, 0.0, 0.0);
        low_fps.frame_rate = 12.0;
        assert_eq!(s.score(&low_fps, None).value, 80.0);
        assert_eq!(s.score(&low_fps, Some(95.0)).value, 80.0);

        let mut mild_fps = sample(0.0, 0.0, 0.0);
        mild_fps.frame_rate = 20.0;
        assert_eq!(s.score(&mild_fps, None).value, 90.0);
        assert_eq!(s.score(&mild_fps, Some(95.0)).value, 80.0);
        assert_eq!(s.score(&sample(0.0, 0.0, 0.0), Some(80.0)).value, 90.0);
    }

    #[test]
    fn unreported_frame_rate_is_not_penalised() {
        let mut s = sample(0.0, 0.0, 0.0);
        s.frame_rate = 0.0;
        assert_eq!(scorer().score(&s, None).value, 100.0);
    }

    #[test]
    fn nan_metric_counts_as_worst() {
        let q = scorer().score(&sample(f64::NAN, 0.0, 0.0), None);
        assert_eq!(q.value, 70.0);
    }

    #[test]
    fn tier_cutoffs() {
        assert_eq!(QualityTier::from_score(100.0), QualityTier::Excellent);
        assert_eq!(QualityTier::from_score(90.0), QualityTier::Excellent);
        assert_eq!(QualityTier::from_score(89.9), QualityTier::Good);
        assert_eq!(QualityTier::from_score(75.0), QualityTier::Good);
        assert_eq!(QualityTier::from_score(74.0), QualityTier::Fair);
        assert_eq!(QualityTier::from_score(60.0), QualityTier::Fair);
        assert_eq!(QualityTier::from_score(59.0), QualityTier::Poor);
        assert_eq!(QualityTier::from_score(0.0), QualityTier::Poor);
    }

    #[test]
    fn tiers_order_worst_to_best() {
        assert!(QualityTier::Poor < QualityTier::Fair);
        assert!(QualityTier::Good < QualityTier::Excellent);
    }
}
