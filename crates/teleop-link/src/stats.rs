//! # Statistics Normalisation
//!
//! Converts the raw report delivered by the transport collaborator into a
//! [`NetworkSample`]. Counters in the raw report are cumulative, so the
//! loss rate and received bitrate are derived from the delta against the
//! previous report. Normalisation itself keeps no state.

use serde::{Deserialize, Serialize};

// ─── Raw Report ─────────────────────────────────────────────────────────────

/// Statistics report as produced by the peer connection.
///
/// Field names follow the WebRTC stats dictionary, so a JSON stats export
/// deserialises directly. RTT and jitter are in seconds; counters are
/// cumulative since the connection started. Missing fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawStatsReport {
    /// Report time in milliseconds (any monotonic epoch).
    pub timestamp: f64,
    #[serde(alias = "currentRoundTripTime")]
    pub round_trip_time: Option<f64>,
    pub jitter: Option<f64>,
    /// Signed in the stats dictionary; duplicates can drive it negative.
    pub packets_lost: Option<i64>,
    pub packets_received: Option<u64>,
    pub bytes_received: Option<u64>,
    pub frames_per_second: Option<f64>,
    pub frame_width: Option<u32>,
    pub frame_height: Option<u32>,
    pub available_outgoing_bitrate: Option<f64>,
}

// ─── Normalised Sample ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// One link observation. Produced once per stats tick and never mutated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSample {
    pub timestamp_ms: f64,
    pub rtt_ms: f64,
    pub jitter_ms: f64,
    /// Packet loss over the last interval, in percent (0–100).
    pub packet_loss_pct: f64,
    /// Received media bitrate over the last interval (bits/sec).
    pub bitrate_bps: f64,
    /// Decoded frame rate; 0 when the transport did not report one.
    pub frame_rate: f64,
    pub resolution: Resolution,
    /// Transport's own outgoing capacity estimate (bits/sec), if reported.
    pub available_bitrate_bps: Option<f64>,
}

impl NetworkSample {
    /// Bitrate sample fed to the bandwidth estimator: the transport's
    /// capacity estimate when present, the measured bitrate otherwise.
    pub fn bandwidth_sample(&self) -> f64 {
        match self.available_bitrate_bps {
            Some(bps) if bps.is_finite() && bps > 0.0 => bps,
            _ => self.bitrate_bps,
        }
    }
}

/// Normalise `report` against the `previous` report of the same link.
pub fn normalize(report: &RawStatsReport, previous: Option<&RawStatsReport>) -> NetworkSample {
    let rtt_ms = seconds_to_ms(report.round_trip_time);
    let jitter_ms = seconds_to_ms(report.jitter);

    let lost = lost_count(report.packets_lost);
    let received = report.packets_received.unwrap_or(0);

    let (packet_loss_pct, bitrate_bps) = match previous {
        Some(prev) => {
            let d_lost = lost.saturating_sub(lost_count(prev.packets_lost));
            let d_received = received.saturating_sub(prev.packets_received.unwrap_or(0));
            let elapsed_ms = report.timestamp - prev.timestamp;
            let bitrate = match (report.bytes_received, prev.bytes_received) {
                (Some(now), Some(before)) if elapsed_ms > 0.0 => {
                    now.saturating_sub(before) as f64 * 8.0 * 1000.0 / elapsed_ms
                }
                _ => 0.0,
            };
            (loss_pct(d_lost, d_received), bitrate)
        }
        None => (loss_pct(lost, received), 0.0),
    };

    let resolution = match (report.frame_width, report.frame_height) {
        (Some(width), Some(height)) => Resolution { width, height },
        _ => previous
            .and_then(|p| p.frame_width.zip(p.frame_height))
            .map(|(width, height)| Resolution { width, height })
            .unwrap_or_default(),
    };

    NetworkSample {
        timestamp_ms: report.timestamp,
        rtt_ms,
        jitter_ms,
        packet_loss_pct,
        bitrate_bps,
        frame_rate: finite_non_negative(report.frames_per_second.unwrap_or(0.0)),
        resolution,
        available_bitrate_bps: report
            .available_outgoing_bitrate
            .filter(|b| b.is_finite() && *b > 0.0),
    }
}

fn seconds_to_ms(value: Option<f64>) -> f64 {
    finite_non_negative(value.unwrap_or(0.0) * 1000.0)
}

fn finite_non_negative(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

fn lost_count(value: Option<i64>) -> u64 {
    value.map_or(0, |n| n.max(0) as u64)
}

fn loss_pct(lost: u64, received: u64) -> f64 {
    let total = lost.saturating_add(received);
    if total == 0 {
        0.0
    } else {
        lost as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(ts: f64, lost: i64, received: u64, bytes: u64) -> RawStatsReport {
        RawStatsReport {
            timestamp: ts,
            round_trip_time: Some(0.120),
            jitter: Some(0.015),
            packets_lost: Some(lost),
            packets_received: Some(received),
            bytes_received: Some(bytes),
            frames_per_second: Some(30.0),
            frame_width: Some(1280),
            frame_height: Some(720),
            available_outgoing_bitrate: Some(2_500_000.0),
        }
    }

    #[test]
    fn converts_seconds_to_milliseconds() {
        let s = normalize(&report(0.0, 0, 100, 0), None);
        assert!((s.rtt_ms - 120.0).abs() < 1e-9);
        assert!((s.jitter_ms - 15.0).abs() < 1e-9);
        assert_eq!(s.resolution, Resolution { width: 1280, height: 720 });
        assert_eq!(s.frame_rate, 30.0);
    }

    #[test]
    fn first_report_uses_cumulative_loss_and_zero_bitrate() {
        let s = normalize(&report(0.0, 5, 95, 1_000_000), None);
        assert!((s.packet_loss_pct - 5.0).abs() < 1e-9);
        assert_eq!(s.bitrate_bps, 0.0);
    }

    #[test]
    fn derives_interval_loss_and_bitrate_from_deltas() {
        let prev = report(1_000.0, 10, 1_000, 500_000);
        // 500 ms later: 2 lost, 198 received, 62_500 bytes → 1 Mbps
        let cur = report(1_500.0, 12, 1_198, 562_500);
        let s = normalize(&cur, Some(&prev));
        assert!((s.packet_loss_pct - 1.0).abs() < 1e-9);
        assert!((s.bitrate_bps - 1_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn counter_reset_does_not_underflow() {
        let prev = report(1_000.0, 50, 5_000, 9_000_000);
        let cur = report(1_500.0, 0, 10, 1_000);
        let s = normalize(&cur, Some(&prev));
        assert_eq!(s.packet_loss_pct, 0.0);
        assert_eq!(s.bitrate_bps, 0.0);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let s = normalize(&RawStatsReport::default(), None);
        assert_eq!(s.rtt_ms, 0.0);
        assert_eq!(s.frame_rate, 0.0);
        assert_eq!(s.available_bitrate_bps, None);
        assert_eq!(s.bandwidth_sample(), 0.0);
    }

    #[test]
    fn resolution_carries_over_when_missing() {
        let prev = report(0.0, 0, 100, 0);
        let mut cur = report(500.0, 0, 200, 10_000);
        cur.frame_width = None;
        let s = normalize(&cur, Some(&prev));
        assert_eq!(s.resolution, Resolution { width: 1280, height: 720 });
    }

    #[test]
    fn bandwidth_sample_prefers_transport_estimate() {
        let prev = report(0.0, 0, 100, 0);
        let cur = report(1_000.0, 0, 200, 125_000);
        let s = normalize(&cur, Some(&prev));
        assert_eq!(s.bandwidth_sample(), 2_500_000.0);

        let mut no_estimate = cur.clone();
        no_estimate.available_outgoing_bitrate = None;
        let s = normalize(&no_estimate, Some(&prev));
        assert!((s.bandwidth_sample() - 1_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn deserialises_webrtc_json() {
        let json = r#"{
            "timestamp": 1700.0,
            "currentRoundTripTime": 0.05,
            "jitter": 0.004,
            "packetsLost": 3,
            "packetsReceived": 997,
            "bytesReceived": 123456,
            "framesPerSecond": 29.97,
            "frameWidth": 640,
            "frameHeight": 480,
            "availableOutgoingBitrate": 1500000
        }"#;
        let r: RawStatsReport = serde_json::from_str(json).unwrap();
        assert_eq!(r.round_trip_time, Some(0.05));
        assert_eq!(r.packets_lost, Some(3));
        assert_eq!(r.frame_height, Some(480));
    }

    #[test]
    fn non_finite_inputs_are_sanitised() {
        let mut r = report(0.0, 0, 100, 0);
        r.round_trip_time = Some(f64::NAN);
        r.frames_per_second = Some(f64::INFINITY);
        r.available_outgoing_bitrate = Some(f64::NAN);
        let s = normalize(&r, None);
        assert_eq!(s.rtt_ms, 0.0);
        assert_eq!(s.frame_rate, 0.0);
        assert_eq!(s.available_bitrate_bps, None);
    }

    #[test]
    fn negative_packets_lost_deserialises_and_counts_as_zero() {
        let json = r#"{"timestamp": 1.0, "packetsLost": -2, "packetsReceived": 100}"#;
        let r: RawStatsReport = serde_json::from_str(json).unwrap();
        assert_eq!(r.packets_lost, Some(-2));
        let s = normalize(&r, None);
        assert_eq!(s.packet_loss_pct, 0.0);

        // Recovering from a negative count is ordinary loss against zero.
        let mut next = r.clone();
        next.timestamp = 501.0;
        next.packets_lost = Some(1);
        next.packets_received = Some(199);
        let s = normalize(&next, Some(&r));
        assert!((s.packet_loss_pct - 1.0).abs() < 1e-9);
    }

    #[test]
    fn huge_counters_saturate_instead_of_overflowing() {
        let zeros = report(0.0, 0, 0, 0);
        let cur = report(500.0, 10, u64::MAX, 0);
        let s = normalize(&cur, Some(&zeros));
        assert!(s.packet_loss_pct.is_finite());
        assert!((0.0..=100.0).contains(&s.packet_loss_pct));

        let s = normalize(&report(500.0, i64::MAX, u64::MAX, 0), None);
        assert!((0.0..=100.0).contains(&s.packet_loss_pct));
    }
}
