use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use quanta::Clock;

use crate::coordinator::PerformanceCoordinator;
use crate::interface::{Actuator, EncoderSink, StatsSource};
use crate::scheduler::{Admission, OperatorCommand};
use crate::timer::{CancelToken, Ticker};

/// Upper bound on a worker's sleep so cancellation is observed promptly.
const MAX_IDLE: Duration = Duration::from_millis(5);

/// Collaborators wired into a running link.
pub struct Collaborators {
    pub stats: Box<dyn StatsSource>,
    pub encoder: Arc<dyn EncoderSink>,
    pub actuator: Arc<dyn Actuator>,
}

/// Runs the stats cycle and the dispatch cycle on two worker threads.
///
/// Both loops share one [`Clock`] and one [`CancelToken`]. Dropping the
/// runtime cancels both loops and joins the threads; commands still queued
/// at that point stay in the coordinator.
pub struct LinkRuntime {
    coordinator: Arc<PerformanceCoordinator>,
    clock: Clock,
    cancel: CancelToken,
    handles: Vec<thread::JoinHandle<()>>,
}

impl LinkRuntime {
    pub fn start(
        coordinator: Arc<PerformanceCoordinator>,
        collaborators: Collaborators,
        clock: Clock,
    ) -> anyhow::Result<Self> {
        let cancel = CancelToken::new();
        let Collaborators {
            stats,
            encoder,
            actuator,
        } = collaborators;

        let mut runtime = Self {
            coordinator: coordinator.clone(),
            clock: clock.clone(),
            cancel: cancel.clone(),
            handles: Vec::with_capacity(2),
        };

        let stats_handle = {
            let coordinator = coordinator.clone();
            let clock = clock.clone();
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("link-stats".into())
                .spawn(move || stats_worker(coordinator, stats, encoder, clock, cancel))
                .context("failed to spawn link stats worker")?
        };
        runtime.handles.push(stats_handle);

        // On failure `runtime` is dropped, which stops the stats worker.
        let dispatch_handle = thread::Builder::new()
            .name("link-dispatch".into())
            .spawn(move || dispatch_worker(coordinator, actuator, clock, cancel))
            .context("failed to spawn link dispatch worker")?;
        runtime.handles.push(dispatch_handle);

        tracing::info!("link runtime started");
        Ok(runtime)
    }

    /// Admit an operator command stamped with the runtime clock.
    pub fn submit(&self, command: OperatorCommand) -> Admission {
        self.coordinator
            .handle_incoming_command(command, self.clock.now())
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop both cycles and join the workers. Idempotent.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        let joined = !self.handles.is_empty();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("link worker panicked");
            }
        }
        if joined {
            tracing::info!(
                queued = self.coordinator.queue_status().queue_len,
                "link runtime stopped"
            );
        }
    }
}

impl Drop for LinkRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn stats_worker(
    coordinator: Arc<PerformanceCoordinator>,
    mut source: Box<dyn StatsSource>,
    encoder: Arc<dyn EncoderSink>,
    clock: Clock,
    cancel: CancelToken,
) {
    let mut ticker = Ticker::new(coordinator.config().monitor.stats_interval(), clock.now());
    while !cancel.is_cancelled() {
        if ticker.poll(clock.now()) {
            let report = match source.poll_stats() {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(error = %e, "stats collection failed");
                    None
                }
            };
            coordinator.run_stats_cycle(report);
            coordinator.apply_settings(encoder.as_ref());
        }
        thread::sleep(ticker.remaining(clock.now()).min(MAX_IDLE));
    }
}

fn dispatch_worker(
    coordinator: Arc<PerformanceCoordinator>,
    actuator: Arc<dyn Actuator>,
    clock: Clock,
    cancel: CancelToken,
) {
    let mut ticker = Ticker::new(coordinator.dispatch_interval(), clock.now());
    while !cancel.is_cancelled() {
        if ticker.poll(clock.now()) {
            coordinator.run_dispatch_step(actuator.as_ref());
            // Takes effect from the next scheduled step.
            ticker.set_interval(coordinator.dispatch_interval());
        }
        thread::sleep(ticker.remaining(clock.now()).min(MAX_IDLE));
    }
}
