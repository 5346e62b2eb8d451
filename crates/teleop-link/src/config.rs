//! Link tuning configuration.
//!
//! Every threshold and step used by the scorer, the optimizer and the
//! command scheduler lives here. Defaults are tuned for a cellular (4G)
//! uplink; a TOML document may override any subset of them.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::quality::QualityTier;

pub const CONFIG_VERSION: u32 = 1;

// ─── Quality Thresholds ─────────────────────────────────────────────────────

/// Ceilings for one quality tier. Exceeding any of them costs score.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TierCeiling {
    pub rtt_ms: f64,
    pub loss_pct: f64,
    pub jitter_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub excellent: TierCeiling,
    pub good: TierCeiling,
    pub fair: TierCeiling,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excellent: TierCeiling {
                rtt_ms: 150.0,
                loss_pct: 2.0,
                jitter_ms: 40.0,
            },
            good: TierCeiling {
                rtt_ms: 300.0,
                loss_pct: 5.0,
                jitter_ms: 70.0,
            },
            fair: TierCeiling {
                rtt_ms: 500.0,
                loss_pct: 10.0,
                jitter_ms: 120.0,
            },
        }
    }
}

// ─── Encoding Bounds ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BitrateBounds {
    pub min_bps: u64,
    pub max_bps: u64,
    pub default_bps: u64,
}

impl Default for BitrateBounds {
    fn default() -> Self {
        Self {
            min_bps: 100_000,
            max_bps: 4_000_000,
            default_bps: 800_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameRateBounds {
    pub min_fps: u32,
    pub max_fps: u32,
    pub default_fps: u32,
}

impl Default for FrameRateBounds {
    fn default() -> Self {
        Self {
            min_fps: 10,
            max_fps: 60,
            default_fps: 24,
        }
    }
}

/// Allowed resolution scale-down divisors, ascending.
///
/// A divisor of 2.0 halves width and height; moving up the ladder lowers
/// the delivered resolution.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResolutionLadder {
    pub scales: Vec<f64>,
    pub default_scale: f64,
}

impl Default for ResolutionLadder {
    fn default() -> Self {
        Self {
            scales: vec![0.5, 0.75, 1.0, 1.5, 2.0],
            default_scale: 0.75,
        }
    }
}

impl ResolutionLadder {
    /// Ladder index of the default scale.
    pub fn default_index(&self) -> usize {
        self.index_of(self.default_scale).unwrap_or(0)
    }

    pub fn index_of(&self, scale: f64) -> Option<usize> {
        self.scales.iter().position(|s| (s - scale).abs() < 1e-9)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct JitterBufferBounds {
    pub initial_ms: u32,
    pub min_ms: u32,
    pub max_ms: u32,
    pub step_ms: u32,
}

impl Default for JitterBufferBounds {
    fn default() -> Self {
        Self {
            initial_ms: 200,
            min_ms: 100,
            max_ms: 400,
            step_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EncodingBounds {
    pub bitrate: BitrateBounds,
    pub frame_rate: FrameRateBounds,
    pub resolution: ResolutionLadder,
    pub jitter_buffer: JitterBufferBounds,
}

// ─── Adaptation Strategy ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FastRecoveryConfig {
    pub enabled: bool,
    /// RTT below which the optimizer is allowed to ramp up (ms).
    pub rtt_threshold_ms: f64,
    /// Fractional bitrate increase per recovery step.
    pub step: f64,
}

impl Default for FastRecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rtt_threshold_ms: 400.0,
            step: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    /// Fractional bitrate change on degradation (negative).
    pub bitrate_decrease: f64,
    /// Fractional bitrate change used when fast recovery is disabled.
    pub bitrate_increase: f64,
    /// Frame-rate step on degradation (fps, negative).
    pub frame_rate_decrease: i32,
    /// Frame-rate step on recovery (fps).
    pub frame_rate_increase: i32,
    /// RTT above which the link is treated as congested (ms).
    pub congestion_rtt_ms: f64,
    /// Multiplier applied to `bitrate_decrease` under congestion.
    pub congestion_factor: f64,
    pub fast_recovery: FastRecoveryConfig,
    /// Bandwidth estimator window length (samples).
    pub estimator_window: usize,
    /// Recency weight `w` of the estimator (0 < w ≤ 1).
    pub recency_weight: f64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            bitrate_decrease: -0.4,
            bitrate_increase: 0.1,
            frame_rate_decrease: -6,
            frame_rate_increase: 4,
            congestion_rtt_ms: 600.0,
            congestion_factor: 1.5,
            fast_recovery: FastRecoveryConfig::default(),
            estimator_window: 5,
            recency_weight: 0.7,
        }
    }
}

// ─── Monitoring & Scheduling ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub stats_interval_ms: u64,
    /// Consecutive missed stats ticks before `stats-stale` fires.
    pub stale_after_misses: u32,
    pub history_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stats_interval_ms: 500,
            stale_after_misses: 3,
            history_capacity: 60,
        }
    }
}

impl MonitorConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

/// Dispatch cadence per quality tier (ms).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DispatchIntervals {
    pub poor: u64,
    pub fair: u64,
    pub good: u64,
    pub excellent: u64,
}

impl Default for DispatchIntervals {
    fn default() -> Self {
        Self {
            poor: 100,
            fair: 75,
            good: 50,
            excellent: 25,
        }
    }
}

impl DispatchIntervals {
    pub fn for_tier(&self, tier: QualityTier) -> Duration {
        let ms = match tier {
            QualityTier::Excellent => self.excellent,
            QualityTier::Good => self.good,
            QualityTier::Fair => self.fair,
            QualityTier::Poor => self.poor,
        };
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub merge_window_ms: u64,
    pub max_queue: usize,
    pub intervals_ms: DispatchIntervals,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            merge_window_ms: 50,
            max_queue: 256,
            intervals_ms: DispatchIntervals::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn merge_window(&self) -> Duration {
        Duration::from_millis(self.merge_window_ms)
    }
}

// ─── Top Level ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinkConfigInput {
    pub version: u32,
    pub thresholds: QualityThresholds,
    pub encoding: EncodingBounds,
    pub adaptation: AdaptationConfig,
    pub monitor: MonitorConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub version: u32,
    pub thresholds: QualityThresholds,
    pub encoding: EncodingBounds,
    pub adaptation: AdaptationConfig,
    pub monitor: MonitorConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            thresholds: QualityThresholds::default(),
            encoding: EncodingBounds::default(),
            adaptation: AdaptationConfig::default(),
            monitor: MonitorConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl LinkConfigInput {
    pub fn resolve(self) -> Result<LinkConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        let mut monitor = self.monitor;
        monitor.history_capacity = monitor.history_capacity.max(2);

        let config = LinkConfig {
            version,
            thresholds: self.thresholds,
            encoding: self.encoding,
            adaptation: self.adaptation,
            monitor,
            scheduler: self.scheduler,
        };
        config.validate()?;
        Ok(config)
    }
}

impl LinkConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(LinkConfig::default());
        }
        let parsed: LinkConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    /// Check every bound and step for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.encoding.bitrate;
        check_bounds("encoding.bitrate", b.min_bps as f64, b.max_bps as f64)?;
        check_default(
            "encoding.bitrate",
            b.default_bps as f64,
            b.min_bps as f64,
            b.max_bps as f64,
        )?;
        if b.min_bps == 0 {
            return Err(ConfigError::OutOfRange {
                field: "encoding.bitrate.min_bps",
                expected: "> 0",
                value: 0.0,
            });
        }

        let f = &self.encoding.frame_rate;
        check_bounds("encoding.frame_rate", f.min_fps as f64, f.max_fps as f64)?;
        check_default(
            "encoding.frame_rate",
            f.default_fps as f64,
            f.min_fps as f64,
            f.max_fps as f64,
        )?;

        let r = &self.encoding.resolution;
        if r.scales.is_empty() || r.scales.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::InvalidScaleLadder);
        }
        if r.index_of(r.default_scale).is_none() {
            return Err(ConfigError::DefaultScaleNotOnLadder(r.default_scale));
        }

        let j = &self.encoding.jitter_buffer;
        check_bounds("encoding.jitter_buffer", j.min_ms as f64, j.max_ms as f64)?;
        check_default(
            "encoding.jitter_buffer",
            j.initial_ms as f64,
            j.min_ms as f64,
            j.max_ms as f64,
        )?;

        let t = &self.thresholds;
        check_ceilings("rtt_ms", [t.excellent.rtt_ms, t.good.rtt_ms, t.fair.rtt_ms])?;
        check_ceilings(
            "loss_pct",
            [t.excellent.loss_pct, t.good.loss_pct, t.fair.loss_pct],
        )?;
        check_ceilings(
            "jitter_ms",
            [t.excellent.jitter_ms, t.good.jitter_ms, t.fair.jitter_ms],
        )?;

        let a = &self.adaptation;
        if !(a.recency_weight > 0.0 && a.recency_weight <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "adaptation.recency_weight",
                expected: "in (0, 1]",
                value: a.recency_weight,
            });
        }
        if a.estimator_window == 0 {
            return Err(ConfigError::OutOfRange {
                field: "adaptation.estimator_window",
                expected: ">= 1",
                value: 0.0,
            });
        }
        if !(a.bitrate_decrease < 0.0 && a.bitrate_decrease * a.congestion_factor > -1.0) {
            return Err(ConfigError::OutOfRange {
                field: "adaptation.bitrate_decrease",
                expected: "negative, and above -1 once scaled by congestion_factor",
                value: a.bitrate_decrease,
            });
        }
        if a.bitrate_decrease * 1.2 <= -1.0 {
            return Err(ConfigError::OutOfRange {
                field: "adaptation.bitrate_decrease",
                expected: "above -1/1.2",
                value: a.bitrate_decrease,
            });
        }

        if self.scheduler.max_queue == 0 {
            return Err(ConfigError::OutOfRange {
                field: "scheduler.max_queue",
                expected: ">= 1",
                value: 0.0,
            });
        }
        if self.monitor.stale_after_misses == 0 {
            return Err(ConfigError::OutOfRange {
                field: "monitor.stale_after_misses",
                expected: ">= 1",
                value: 0.0,
            });
        }
        let i = &self.scheduler.intervals_ms;
        if [i.poor, i.fair, i.good, i.excellent].contains(&0) || self.monitor.stats_interval_ms == 0
        {
            return Err(ConfigError::OutOfRange {
                field: "intervals",
                expected: "> 0 ms",
                value: 0.0,
            });
        }

        Ok(())
    }
}

fn check_bounds(field: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::InvertedBounds { field, min, max });
    }
    Ok(())
}

fn check_ceilings(field: &'static str, [excellent, good, fair]: [f64; 3]) -> Result<(), ConfigError> {
    if excellent <= good && good <= fair {
        Ok(())
    } else {
        Err(ConfigError::UnorderedCeilings(field))
    }
}

fn check_default(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::DefaultOutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}
