use std::collections::VecDeque;

use crate::config::LinkConfig;

/// Windowed bandwidth estimator.
///
/// Keeps the last `capacity` bitrate samples and estimates available
/// bandwidth as a recency-weighted mean: the sample `k` positions behind
/// the newest carries weight `w^k`, so with `w < 1` recent samples
/// dominate. The estimate never falls below the configured minimum
/// bitrate.
#[derive(Debug, Clone)]
pub struct BandwidthEstimator {
    window: VecDeque<f64>,
    capacity: usize,
    recency_weight: f64,
    min_bitrate_bps: f64,
}

impl BandwidthEstimator {
    /// Creates an estimator; `capacity` is raised to at least 1.
    pub fn new(capacity: usize, recency_weight: f64, min_bitrate_bps: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            recency_weight,
            min_bitrate_bps,
        }
    }

    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(
            config.adaptation.estimator_window,
            config.adaptation.recency_weight,
            config.encoding.bitrate.min_bps as f64,
        )
    }

    /// Appends a sample, evicting the oldest once the window is full.
    ///
    /// NaN, infinite and negative samples are ignored so a single bad
    /// report cannot poison the estimate.
    pub fn observe(&mut self, bitrate_bps: f64) {
        if !bitrate_bps.is_finite() || bitrate_bps < 0.0 {
            return;
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(bitrate_bps);
    }

    /// Current estimate in bits/sec.
    ///
    /// `fallback_bps` (the current encoder bitrate) is returned while the
    /// window is still empty.
    pub fn estimate(&self, fallback_bps: f64) -> f64 {
        if self.window.is_empty() {
            return fallback_bps.max(self.min_bitrate_bps);
        }

        let mut weighted = 0.0;
        let mut weights = 0.0;
        let mut w = 1.0;
        for &sample in self.window.iter().rev() {
            weighted += sample * w;
            weights += w;
            w *= self.recency_weight;
        }

        (weighted / weights).max(self.min_bitrate_bps)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }
}
