//! Link events delivered to telemetry, UI and actuation collaborators.

use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;

use crate::encoding::EncodingSettings;
use crate::quality::QualityTier;
use crate::scheduler::DispatchedCommand;

/// Why a command never reached the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Dispatched while the link was `poor` and the command was below
    /// `critical` priority.
    PoorLink,
    /// Evicted because the queue exceeded its maximum size.
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum LinkEvent {
    CongestionDetected {
        rtt_ms: f64,
        threshold_ms: f64,
    },
    BandwidthWarning {
        packet_loss_pct: f64,
        utilization_pct: f64,
        bitrate_bps: f64,
    },
    JitterBufferAdjusted {
        jitter_ms: f64,
        previous_delay_ms: u32,
        delay_ms: u32,
    },
    CommandDropped {
        command: DispatchedCommand,
        reason: DropReason,
    },
    QualityChange {
        previous: QualityTier,
        current: QualityTier,
        score: f64,
    },
    StatsStale {
        consecutive_misses: u32,
    },
    SettingsUpdated {
        settings: EncodingSettings,
    },
}

impl LinkEvent {
    /// Wire name of the event, e.g. `congestion-detected`.
    pub fn name(&self) -> &'static str {
        match self {
            LinkEvent::CongestionDetected { .. } => "congestion-detected",
            LinkEvent::BandwidthWarning { .. } => "bandwidth-warning",
            LinkEvent::JitterBufferAdjusted { .. } => "jitter-buffer-adjusted",
            LinkEvent::CommandDropped { .. } => "command-dropped",
            LinkEvent::QualityChange { .. } => "quality-change",
            LinkEvent::StatsStale { .. } => "stats-stale",
            LinkEvent::SettingsUpdated { .. } => "settings-updated",
        }
    }
}

/// Observer for link events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LinkEvent);
}

impl EventSink for Sender<LinkEvent> {
    fn emit(&self, event: LinkEvent) {
        match self.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                tracing::debug!(event = ev.name(), "event channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: LinkEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_with_kebab_case_tag() {
        let ev = LinkEvent::CongestionDetected {
            rtt_ms: 700.0,
            threshold_ms: 600.0,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "congestion-detected");
        assert_eq!(json["rtt_ms"], 700.0);
        assert_eq!(ev.name(), "congestion-detected");
    }

    #[test]
    fn quality_change_serialises_tiers_lowercase() {
        let ev = LinkEvent::QualityChange {
            previous: QualityTier::Excellent,
            current: QualityTier::Poor,
            score: 50.0,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "quality-change");
        assert_eq!(json["previous"], "excellent");
        assert_eq!(json["current"], "poor");
    }

    #[test]
    fn full_channel_never_blocks() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.emit(LinkEvent::StatsStale {
            consecutive_misses: 3,
        });
        tx.emit(LinkEvent::StatsStale {
            consecutive_misses: 4,
        });
        assert_eq!(rx.len(), 1);
        drop(rx);
        tx.emit(LinkEvent::StatsStale {
            consecutive_misses: 5,
        });
    }
}
