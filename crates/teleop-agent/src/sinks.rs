//! Logging stand-ins for the encoder and actuation collaborators, plus the
//! event log.

use crossbeam_channel::Receiver;
use teleop_link::{Actuator, DispatchedCommand, EncoderSink, EncodingSettings, LinkEvent};

/// Encoder collaborator that records each update in the log.
pub struct LoggingEncoder;

impl EncoderSink for LoggingEncoder {
    fn apply(&self, settings: &EncodingSettings) -> anyhow::Result<()> {
        tracing::info!(
            bitrate_kbps = settings.bitrate_bps / 1000,
            resolution_scale = settings.resolution_scale,
            frame_rate = settings.frame_rate,
            jitter_buffer_ms = settings.jitter_buffer_ms,
            "encoder update"
        );
        Ok(())
    }
}

/// Actuation collaborator that writes each command to stdout as JSON.
pub struct StdoutActuator;

impl Actuator for StdoutActuator {
    fn send(&self, command: &DispatchedCommand) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string(command)?);
        Ok(())
    }
}

/// Log events until every sender is gone.
pub fn log_events(rx: Receiver<LinkEvent>) {
    for event in rx {
        let json = serde_json::to_string(&event).unwrap_or_default();
        match event {
            LinkEvent::CommandDropped { .. }
            | LinkEvent::CongestionDetected { .. }
            | LinkEvent::StatsStale { .. } => {
                tracing::warn!(event = event.name(), payload = %json, "link event")
            }
            LinkEvent::SettingsUpdated { .. } | LinkEvent::JitterBufferAdjusted { .. } => {
                tracing::debug!(event = event.name(), payload = %json, "link event")
            }
            _ => tracing::info!(event = event.name(), payload = %json, "link event"),
        }
    }
}
