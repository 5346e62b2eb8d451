//! Collaborator boundaries of the link core.
//!
//! The transport, encoder and actuation layers live outside this crate; the
//! core only sees them through these traits. Failures are reported as
//! [`anyhow::Error`] and absorbed by the coordinator, never propagated.

use anyhow::Result;
use crossbeam_channel::TryRecvError;

use crate::encoding::EncodingSettings;
use crate::scheduler::DispatchedCommand;
use crate::stats::RawStatsReport;

/// Source of per-tick transport statistics (the peer connection).
pub trait StatsSource: Send {
    /// Fetch the latest report. `Ok(None)` means nothing new this tick;
    /// both `None` and `Err` count as a stale tick.
    fn poll_stats(&mut self) -> Result<Option<RawStatsReport>>;
}

/// Media encoder consuming parameter updates.
pub trait EncoderSink: Send + Sync {
    fn apply(&self, settings: &EncodingSettings) -> Result<()>;
}

/// Actuation layer consuming dispatched commands in scheduler order.
pub trait Actuator: Send + Sync {
    fn send(&self, command: &DispatchedCommand) -> Result<()>;
}

/// Stats source fed from a channel, for relays and tests.
impl StatsSource for crossbeam_channel::Receiver<RawStatsReport> {
    fn poll_stats(&mut self) -> Result<Option<RawStatsReport>> {
        // Only the newest report matters; older ones are superseded.
        let mut latest = None;
        loop {
            match self.try_recv() {
                Ok(report) => latest = Some(report),
                Err(TryRecvError::Empty) => return Ok(latest),
                Err(TryRecvError::Disconnected) => {
                    return match latest {
                        Some(r) => Ok(Some(r)),
                        None => Err(anyhow::anyhow!("stats channel disconnected")),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_source_keeps_newest_report() {
        let (tx, mut rx) = crossbeam_channel::unbounded();
        assert!(rx.poll_stats().unwrap().is_none());
        for ts in [1.0, 2.0, 3.0] {
            tx.send(RawStatsReport {
                timestamp: ts,
                ..Default::default()
            })
            .unwrap();
        }
        assert_eq!(rx.poll_stats().unwrap().unwrap().timestamp, 3.0);
        drop(tx);
        assert!(rx.poll_stats().is_err());
    }
}
