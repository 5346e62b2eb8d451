//! Statistics feeds for the link runtime.
//!
//! In production the transport process relays its WebRTC stats report as
//! JSON datagrams to a local UDP port. In simulation mode a synthetic link
//! with periodic degradation episodes stands in for it.

use std::net::UdpSocket;

use anyhow::Context;
use quanta::Clock;
use rand::Rng;
use teleop_link::{RawStatsReport, StatsSource};

/// Reads JSON stats reports from a non-blocking UDP socket.
pub struct UdpStatsFeed {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpStatsFeed {
    pub fn bind(addr: &str) -> anyhow::Result<Self> {
        let socket =
            UdpSocket::bind(addr).with_context(|| format!("binding stats listener on {addr}"))?;
        socket.set_nonblocking(true)?;
        tracing::info!(addr, "stats UDP listener bound");
        Ok(Self {
            socket,
            buf: vec![0u8; 8192],
        })
    }
}

impl StatsSource for UdpStatsFeed {
    fn poll_stats(&mut self) -> anyhow::Result<Option<RawStatsReport>> {
        // Drain everything pending and keep the newest parseable report.
        let mut latest = None;
        loop {
            match self.socket.recv_from(&mut self.buf) {
                Ok((n, from)) => match serde_json::from_slice::<RawStatsReport>(&self.buf[..n]) {
                    Ok(report) => latest = Some(report),
                    Err(e) => tracing::debug!(%from, error = %e, "ignoring malformed stats datagram"),
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e).context("stats socket receive failed"),
            }
        }
        Ok(latest)
    }
}

/// Synthetic link: mostly healthy, with a congestion episode every
/// `episode_every` reports.
pub struct SimulatedFeed {
    clock: Clock,
    start: quanta::Instant,
    tick: u64,
    episode_every: u64,
    packets_lost: u64,
    packets_received: u64,
    bytes_received: u64,
}

impl SimulatedFeed {
    pub fn new(clock: Clock) -> Self {
        let start = clock.now();
        Self {
            clock,
            start,
            tick: 0,
            episode_every: 40,
            packets_lost: 0,
            packets_received: 0,
            bytes_received: 0,
        }
    }
}

impl StatsSource for SimulatedFeed {
    fn poll_stats(&mut self) -> anyhow::Result<Option<RawStatsReport>> {
        let mut rng = rand::rng();
        self.tick += 1;

        // Roughly one tick in fifty goes missing.
        if rng.random_range(0..50) == 0 {
            return Ok(None);
        }

        let phase = self.tick % self.episode_every;
        let congested = phase >= self.episode_every - 6;

        let (rtt_s, jitter_s, loss_ratio, kbps) = if congested {
            (
                0.55 + rng.random_range(0.0..0.35_f64),
                0.08 + rng.random_range(0.0..0.10_f64),
                rng.random_range(0.02..0.15_f64),
                rng.random_range(150.0..400.0_f64),
            )
        } else {
            (
                0.04 + rng.random_range(0.0..0.08_f64),
                0.005 + rng.random_range(0.0..0.02_f64),
                rng.random_range(0.0..0.004_f64),
                rng.random_range(700.0..1_200.0_f64),
            )
        };

        let packets = 100 + rng.random_range(0..20u64);
        let lost = (packets as f64 * loss_ratio).round() as u64;
        self.packets_lost += lost;
        self.packets_received += packets - lost.min(packets);
        // Reports arrive roughly every 500 ms.
        self.bytes_received += (kbps * 1000.0 / 8.0 * 0.5) as u64;

        let elapsed_ms = self
            .clock
            .now()
            .saturating_duration_since(self.start)
            .as_secs_f64()
            * 1000.0;

        Ok(Some(RawStatsReport {
            timestamp: elapsed_ms,
            round_trip_time: Some(rtt_s),
            jitter: Some(jitter_s),
            packets_lost: Some(self.packets_lost as i64),
            packets_received: Some(self.packets_received),
            bytes_received: Some(self.bytes_received),
            frames_per_second: Some(if congested {
                rng.random_range(10.0..18.0)
            } else {
                rng.random_range(24.0..30.0)
            }),
            frame_width: Some(1280),
            frame_height: Some(720),
            available_outgoing_bitrate: Some(kbps * 1000.0 * rng.random_range(1.3..2.0)),
        }))
    }
}
