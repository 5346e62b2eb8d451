//! Teleoperation Link Agent
//!
//! Field daemon running next to the vehicle's media pipeline.
//!
//! - Loads the link configuration from TOML (defaults when absent)
//! - Feeds transport statistics into the link core, from the transport's
//!   UDP JSON relay or, in `--simulate` mode, from a synthetic link
//! - Reads operator commands as JSON lines on stdin
//! - Writes dispatched commands to stdout and logs encoder updates and
//!   link events

mod feed;
mod sinks;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use quanta::Clock;
use tracing_subscriber::EnvFilter;

use teleop_link::timer::CancelToken;
use teleop_link::{
    Collaborators, LinkConfig, LinkRuntime, OperatorCommand, PerformanceCoordinator, StatsSource,
};

/// Teleoperation link agent daemon.
#[derive(Parser, Debug)]
#[command(name = "teleop-agent", about = "Teleoperation link quality agent")]
struct Cli {
    /// Link configuration file (TOML). Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run against a synthetic link instead of the UDP stats relay.
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Address the transport's stats relay sends JSON reports to.
    #[arg(long, default_value = "127.0.0.1:9200")]
    stats_addr: String,

    /// Stop after this many seconds (runs until Ctrl-C when omitted).
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Interval between performance report log lines, in seconds.
    #[arg(long, default_value_t = 5)]
    report_interval: u64,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<LinkConfig> {
    let Some(path) = path else {
        return Ok(LinkConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    LinkConfig::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    tracing::info!(
        simulate = cli.simulate,
        stats_addr = %cli.stats_addr,
        stats_interval_ms = config.monitor.stats_interval_ms,
        "teleop-agent starting"
    );

    let clock = Clock::new();
    let (event_tx, event_rx) = crossbeam_channel::bounded(1024);
    std::thread::Builder::new()
        .name("event-log".into())
        .spawn(move || sinks::log_events(event_rx))
        .context("failed to spawn event logger")?;

    let coordinator = Arc::new(PerformanceCoordinator::new(config, Arc::new(event_tx)));

    let stats: Box<dyn StatsSource> = if cli.simulate {
        Box::new(feed::SimulatedFeed::new(clock.clone()))
    } else {
        Box::new(feed::UdpStatsFeed::bind(&cli.stats_addr)?)
    };

    let mut runtime = LinkRuntime::start(
        coordinator.clone(),
        Collaborators {
            stats,
            encoder: Arc::new(sinks::LoggingEncoder),
            actuator: Arc::new(sinks::StdoutActuator),
        },
        clock.clone(),
    )?;

    // Shutdown signal
    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::info!("received shutdown signal");
        on_signal.cancel();
    })
    .context("setting signal handler")?;

    // ── Operator input: JSON lines on stdin ─────────────────────
    let input_coordinator = coordinator.clone();
    let input_clock = clock.clone();
    std::thread::Builder::new()
        .name("operator-input".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<OperatorCommand>(line) {
                    Ok(command) => {
                        input_coordinator.handle_incoming_command(command, input_clock.now());
                    }
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed command"),
                }
            }
            tracing::debug!("operator input closed");
        })
        .context("failed to spawn operator input reader")?;

    // ── Main loop: periodic report until stopped ─────────────────
    let started = clock.now();
    let report_every = Duration::from_secs(cli.report_interval.max(1));
    let mut last_report = started;
    while !cancel.is_cancelled() {
        std::thread::sleep(Duration::from_millis(100));
        let now = clock.now();

        let limit_reached = cli
            .duration_secs
            .is_some_and(|limit| now.saturating_duration_since(started) >= Duration::from_secs(limit));
        if limit_reached {
            tracing::info!(duration_secs = ?cli.duration_secs, "run duration reached");
            break;
        }

        if now.saturating_duration_since(last_report) >= report_every {
            last_report = now;
            let report = coordinator.report();
            tracing::info!(
                score = report.score.value,
                tier = %report.score.tier,
                bitrate_kbps = report.settings.bitrate_bps / 1000,
                estimate_kbps = (report.bandwidth_estimate_bps / 1000.0) as u64,
                queue_len = report.queue.queue_len,
                stale = report.is_stale(),
                stale_misses = report.stale_misses,
                suggestions = report.suggestions.len(),
                "link report"
            );
            for s in &report.suggestions {
                tracing::info!(severity = ?s.severity, action = ?s.action, "{}", s.message);
            }
        }
    }

    runtime.shutdown();
    match coordinator.report().to_json() {
        Ok(json) => tracing::info!(report = %json, "final link report"),
        Err(e) => tracing::warn!(error = %e, "could not serialise final report"),
    }
    Ok(())
}
