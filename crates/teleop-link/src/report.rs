use serde::Serialize;

use crate::advisory::Suggestion;
use crate::encoding::EncodingSettings;
use crate::history::HistorySummary;
use crate::quality::QualityScore;
use crate::scheduler::QueueStatus;
use crate::stats::NetworkSample;

/// Point-in-time view of the link for telemetry and UI collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    /// Last known sample; `None` until the first stats tick succeeds.
    pub sample: Option<NetworkSample>,
    pub score: QualityScore,
    pub settings: EncodingSettings,
    pub bandwidth_estimate_bps: f64,
    pub utilization_pct: f64,
    /// Consecutive stats ticks without a fresh report.
    pub stale_misses: u32,
    /// Score change between the two newest history entries.
    pub trend: Option<f64>,
    pub history: HistorySummary,
    pub queue: QueueStatus,
    pub suggestions: Vec<Suggestion>,
}

impl PerformanceReport {
    pub fn is_stale(&self) -> bool {
        self.stale_misses > 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
