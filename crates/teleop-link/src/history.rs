use std::collections::VecDeque;

use serde::Serialize;

use crate::quality::QualityScore;
use crate::stats::NetworkSample;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub sample: NetworkSample,
    pub score: QualityScore,
}

/// Averages and peaks over the retained window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HistorySummary {
    pub samples: usize,
    pub avg_rtt_ms: f64,
    pub max_rtt_ms: f64,
    pub avg_bitrate_bps: f64,
    pub peak_bitrate_bps: f64,
    pub avg_packet_loss_pct: f64,
    pub max_packet_loss_pct: f64,
    pub avg_frame_rate: f64,
    pub avg_score: f64,
    pub min_score: f64,
}

/// Bounded in-memory quality history (oldest evicted first).
#[derive(Debug, Clone)]
pub struct QualityHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl QualityHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: NetworkSample, score: QualityScore) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry { sample, score });
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn previous(&self) -> Option<&HistoryEntry> {
        self.entries.iter().rev().nth(1)
    }

    /// Score change between the two newest entries.
    pub fn trend(&self) -> Option<f64> {
        Some(self.latest()?.score.value - self.previous()?.score.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn summary(&self) -> HistorySummary {
        let n = self.entries.len();
        if n == 0 {
            return HistorySummary::default();
        }

        let mut s = HistorySummary {
            samples: n,
            min_score: f64::INFINITY,
            ..Default::default()
        };
        for e in &self.entries {
            s.avg_rtt_ms += e.sample.rtt_ms;
            s.max_rtt_ms = s.max_rtt_ms.max(e.sample.rtt_ms);
            s.avg_bitrate_bps += e.sample.bitrate_bps;
            s.peak_bitrate_bps = s.peak_bitrate_bps.max(e.sample.bitrate_bps);
            s.avg_packet_loss_pct += e.sample.packet_loss_pct;
            s.max_packet_loss_pct = s.max_packet_loss_pct.max(e.sample.packet_loss_pct);
            s.avg_frame_rate += e.sample.frame_rate;
            s.avg_score += e.score.value;
            s.min_score = s.min_score.min(e.score.value);
        }
        let n = n as f64;
        s.avg_rtt_ms /= n;
        s.avg_bitrate_bps /= n;
        s.avg_packet_loss_pct /= n;
        s.avg_frame_rate /= n;
        s.avg_score /= n;
        s
    }
}
