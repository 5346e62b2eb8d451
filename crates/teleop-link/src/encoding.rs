//! # Encoder Parameter Adaptation: Closed-Loop Feedback
//!
//! Turns each link sample into bounded adjustments of the encoder's
//! bitrate, resolution scale, frame rate and the receiver's jitter-buffer
//! delay.
//!
//! ## Policy
//!
//! Rules run in a fixed order every tick:
//!
//! 1. **Congestion**: RTT above the congestion threshold cuts bitrate by
//!    `bitrate_decrease × congestion_factor`, drops frame rate and steps
//!    resolution down. Otherwise, if RTT is under the fast-recovery
//!    threshold and utilisation is below 70 %, bitrate and frame rate step
//!    up (and resolution too when RTT is inside the `good` ceiling).
//! 2. **Loss / saturation**: loss above the `fair` ceiling or utilisation
//!    above 90 % caps the bitrate change at `bitrate_decrease × 1.2` and
//!    forces a resolution and frame-rate step down.
//! 3. **Frame-rate floor**: a delivered frame rate under 1.5× the minimum
//!    forces resolution and bitrate down.
//! 4. **Jitter buffer**: grows by one step when jitter exceeds 1.5× the
//!    current delay, shrinks by one step when jitter is under half of it.
//!
//! Rules 2 and 3 only ever tighten what an earlier rule produced in the
//! same tick. All results are clamped to the configured bounds, and the
//! resolution scale moves along the configured ladder.

use serde::{Deserialize, Serialize};

use crate::config::{AdaptationConfig, EncodingBounds, LinkConfig, TierCeiling};
use crate::events::LinkEvent;
use crate::stats::NetworkSample;

const RECOVERY_UTILIZATION_PCT: f64 = 70.0;
const SATURATED_UTILIZATION_PCT: f64 = 90.0;
const LOSS_DECREASE_FACTOR: f64 = 1.2;
const FRAME_RATE_FLOOR_FACTOR: f64 = 1.5;

/// Encoder-facing parameters. Every field stays inside its configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodingSettings {
    pub bitrate_bps: u64,
    /// Resolution scale-down divisor; always a value from the scale ladder.
    pub resolution_scale: f64,
    pub frame_rate: u32,
    pub jitter_buffer_ms: u32,
}

impl EncodingSettings {
    pub fn initial(bounds: &EncodingBounds) -> Self {
        Self {
            bitrate_bps: bounds.bitrate.default_bps,
            resolution_scale: bounds.resolution.default_scale,
            frame_rate: bounds.frame_rate.default_fps,
            jitter_buffer_ms: bounds.jitter_buffer.initial_ms,
        }
    }

    /// Whether every field lies inside `bounds`.
    pub fn within(&self, bounds: &EncodingBounds) -> bool {
        let b = &bounds.bitrate;
        let f = &bounds.frame_rate;
        let j = &bounds.jitter_buffer;
        (b.min_bps..=b.max_bps).contains(&self.bitrate_bps)
            && (f.min_fps..=f.max_fps).contains(&self.frame_rate)
            && (j.min_ms..=j.max_ms).contains(&self.jitter_buffer_ms)
            && bounds.resolution.index_of(self.resolution_scale).is_some()
    }
}

/// Deltas computed for one tick before they are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Adjustments {
    /// Fractional bitrate change (-0.4 = 40 % cut).
    bitrate: f64,
    /// Ladder steps; positive moves towards lower resolution.
    scale_steps: i32,
    /// Frame-rate change in fps.
    frame_rate: i32,
}

impl Adjustments {
    fn tighten_bitrate(&mut self, delta: f64) {
        self.bitrate = self.bitrate.min(delta);
    }

    fn tighten_resolution(&mut self) {
        self.scale_steps = self.scale_steps.max(1);
    }

    fn tighten_frame_rate(&mut self, delta: i32) {
        self.frame_rate = self.frame_rate.min(delta);
    }
}

/// Result of one optimizer tick.
#[derive(Debug, Clone)]
pub struct Optimization {
    pub settings: EncodingSettings,
    /// Whether `settings` differs from the previous tick.
    pub changed: bool,
    /// Measured bitrate over the bandwidth estimate, in percent.
    pub utilization_pct: f64,
    pub congested: bool,
    pub events: Vec<LinkEvent>,
}

/// Encoder parameter optimizer.
///
/// Owns the current [`EncodingSettings`]; nothing else mutates them.
#[derive(Debug, Clone)]
pub struct EncodingOptimizer {
    bounds: EncodingBounds,
    strategy: AdaptationConfig,
    good: TierCeiling,
    fair: TierCeiling,
    settings: EncodingSettings,
    scale_index: usize,
}

impl EncodingOptimizer {
    pub fn new(config: &LinkConfig) -> Self {
        let bounds = config.encoding.clone();
        let settings = EncodingSettings::initial(&bounds);
        let scale_index = bounds.resolution.default_index();
        Self {
            bounds,
            strategy: config.adaptation.clone(),
            good: config.thresholds.good,
            fair: config.thresholds.fair,
            settings,
            scale_index,
        }
    }

    pub fn settings(&self) -> EncodingSettings {
        self.settings
    }

    pub fn bounds(&self) -> &EncodingBounds {
        &self.bounds
    }

    /// Run one tick against `sample` and the current bandwidth estimate.
    pub fn optimize(&mut self, sample: &NetworkSample, estimate_bps: f64) -> Optimization {
        let mut events = Vec::new();
        let utilization_pct = if estimate_bps > 0.0 {
            sample.bitrate_bps / estimate_bps * 100.0
        } else {
            0.0
        };

        let mut adj = Adjustments::default();
        let a = &self.strategy;

        // 1. Congestion / fast recovery
        let congested = sample.rtt_ms > a.congestion_rtt_ms;
        if congested {
            adj.bitrate = a.bitrate_decrease * a.congestion_factor;
            adj.frame_rate = a.frame_rate_decrease;
            adj.scale_steps = 1;
            events.push(LinkEvent::CongestionDetected {
                rtt_ms: sample.rtt_ms,
                threshold_ms: a.congestion_rtt_ms,
            });
        } else if sample.rtt_ms < a.fast_recovery.rtt_threshold_ms
            && utilization_pct < RECOVERY_UTILIZATION_PCT
        {
            if a.fast_recovery.enabled {
                adj.bitrate = a.fast_recovery.step;
                adj.frame_rate = a.frame_rate_increase;
                if sample.rtt_ms < self.good.rtt_ms {
                    adj.scale_steps = -1;
                }
            } else {
                adj.bitrate = a.bitrate_increase;
            }
        }

        // 2. Loss / utilisation
        if sample.packet_loss_pct > self.fair.loss_pct
            || utilization_pct > SATURATED_UTILIZATION_PCT
        {
            adj.tighten_bitrate(a.bitrate_decrease * LOSS_DECREASE_FACTOR);
            adj.tighten_resolution();
            adj.tighten_frame_rate(a.frame_rate_decrease);
            events.push(LinkEvent::BandwidthWarning {
                packet_loss_pct: sample.packet_loss_pct,
                utilization_pct,
                bitrate_bps: sample.bitrate_bps,
            });
        }

        // 3. Frame-rate floor
        let floor = self.bounds.frame_rate.min_fps as f64 * FRAME_RATE_FLOOR_FACTOR;
        if sample.frame_rate > 0.0 && sample.frame_rate < floor {
            adj.tighten_resolution();
            adj.tighten_bitrate(a.bitrate_decrease);
        }

        // 4. Jitter buffer
        let previous_delay = self.settings.jitter_buffer_ms;
        let jitter_buffer_ms = self.next_jitter_delay(sample.jitter_ms);
        if jitter_buffer_ms != previous_delay {
            events.push(LinkEvent::JitterBufferAdjusted {
                jitter_ms: sample.jitter_ms,
                previous_delay_ms: previous_delay,
                delay_ms: jitter_buffer_ms,
            });
        }

        // 5. Bounded apply
        let before = self.settings;
        self.apply(adj, jitter_buffer_ms);
        let changed = self.settings != before;

        tracing::debug!(
            rtt_ms = sample.rtt_ms,
            loss_pct = sample.packet_loss_pct,
            utilization_pct,
            bitrate_delta = adj.bitrate,
            scale_steps = adj.scale_steps,
            fps_delta = adj.frame_rate,
            bitrate_bps = self.settings.bitrate_bps,
            resolution_scale = self.settings.resolution_scale,
            frame_rate = self.settings.frame_rate,
            jitter_buffer_ms = self.settings.jitter_buffer_ms,
            "optimizer tick"
        );

        Optimization {
            settings: self.settings,
            changed,
            utilization_pct,
            congested,
            events,
        }
    }

    fn next_jitter_delay(&self, jitter_ms: f64) -> u32 {
        let j = &self.bounds.jitter_buffer;
        let delay = self.settings.jitter_buffer_ms;
        if !jitter_ms.is_finite() {
            return delay;
        }
        if jitter_ms > delay as f64 * 1.5 {
            delay.saturating_add(j.step_ms).min(j.max_ms)
        } else if jitter_ms < delay as f64 * 0.5 {
            delay.saturating_sub(j.step_ms).max(j.min_ms)
        } else {
            delay
        }
    }

    fn apply(&mut self, adj: Adjustments, jitter_buffer_ms: u32) {
        let b = &self.bounds.bitrate;
        let bitrate = (self.settings.bitrate_bps as f64 * (1.0 + adj.bitrate)).round();
        let bitrate = if bitrate.is_finite() {
            bitrate.clamp(b.min_bps as f64, b.max_bps as f64) as u64
        } else {
            self.settings.bitrate_bps
        };

        let ladder = &self.bounds.resolution.scales;
        let last = ladder.len().saturating_sub(1) as i64;
        let index = (self.scale_index as i64 + adj.scale_steps as i64).clamp(0, last) as usize;

        let f = &self.bounds.frame_rate;
        let frame_rate = (self.settings.frame_rate as i64 + adj.frame_rate as i64)
            .clamp(f.min_fps as i64, f.max_fps as i64) as u32;

        let j = &self.bounds.jitter_buffer;
        self.scale_index = index;
        self.settings = EncodingSettings {
            bitrate_bps: bitrate,
            resolution_scale: ladder[index],
            frame_rate,
            jitter_buffer_ms: jitter_buffer_ms.clamp(j.min_ms, j.max_ms),
        };
    }

    /// Restore the configured initial settings (e.g. on stream restart).
    pub fn reset(&mut self) {
        self.settings = EncodingSettings::initial(&self.bounds);
        self.scale_index = self.bounds.resolution.default_index();
    }
}
