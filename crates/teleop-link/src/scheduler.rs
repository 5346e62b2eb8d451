//! Priority command scheduler for operator input.
//!
//! Commands are admitted with a priority derived from their type and kept
//! sorted by `(priority, admission time)`. Bursty continuous-control input
//! coalesces inside the merge window. Dispatch takes at most one command per
//! step at a cadence selected by the current quality tier; while the link is
//! `poor`, anything below `critical` is dropped at dispatch time instead of
//! being sent.

use std::collections::VecDeque;
use std::time::Duration;

use quanta::Instant;
use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::events::DropReason;
use crate::quality::QualityTier;

/// Command type as sent by the operator console.
///
/// Unknown types are kept verbatim in [`CommandKind::Other`] and scheduled
/// at `low` priority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CommandKind {
    EmergencyStop,
    Direction,
    Speed,
    Camera,
    Light,
    Other(String),
}

impl CommandKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "emergency_stop" => CommandKind::EmergencyStop,
            "direction" => CommandKind::Direction,
            "speed" => CommandKind::Speed,
            "camera" => CommandKind::Camera,
            "light" => CommandKind::Light,
            other => CommandKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CommandKind::EmergencyStop => "emergency_stop",
            CommandKind::Direction => "direction",
            CommandKind::Speed => "speed",
            CommandKind::Camera => "camera",
            CommandKind::Light => "light",
            CommandKind::Other(s) => s,
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            CommandKind::EmergencyStop => Priority::Emergency,
            CommandKind::Direction | CommandKind::Speed => Priority::Critical,
            CommandKind::Camera | CommandKind::Light => Priority::Normal,
            CommandKind::Other(_) => Priority::Low,
        }
    }
}

impl From<String> for CommandKind {
    fn from(s: String) -> Self {
        CommandKind::parse(&s)
    }
}

impl From<CommandKind> for String {
    fn from(kind: CommandKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch priority; lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Emergency = 0,
    Critical = 1,
    Normal = 2,
    Low = 3,
}

impl Priority {
    /// `emergency` and `critical` commands are never dropped.
    pub fn is_protected(self) -> bool {
        self <= Priority::Critical
    }
}

/// `{type, value}` command from the operator-input collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorCommand {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl OperatorCommand {
    pub fn new(kind: CommandKind, value: impl Into<serde_json::Value>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Command handed to the actuator (or reported as dropped).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchedCommand {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub value: serde_json::Value,
    pub priority: Priority,
}

#[derive(Debug, Clone)]
struct QueuedCommand {
    kind: CommandKind,
    value: serde_json::Value,
    priority: Priority,
    admitted_at: Instant,
    /// Admission sequence; breaks timestamp ties.
    seq: u64,
}

impl QueuedCommand {
    fn key(&self) -> (Priority, Instant, u64) {
        (self.priority, self.admitted_at, self.seq)
    }

    fn into_dispatched(self) -> DispatchedCommand {
        DispatchedCommand {
            kind: self.kind,
            value: self.value,
            priority: self.priority,
        }
    }

    fn to_dispatched(&self) -> DispatchedCommand {
        DispatchedCommand {
            kind: self.kind.clone(),
            value: self.value.clone(),
            priority: self.priority,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Queued,
    /// Coalesced into an earlier entry of the same type.
    Merged,
}

/// Result of admitting a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Admission {
    pub disposition: Disposition,
    pub priority: Priority,
    pub queue_len: usize,
    /// Entry evicted because the queue exceeded its maximum size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evicted: Option<DispatchedCommand>,
}

/// Result of one dispatch step.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Send(DispatchedCommand),
    Dropped(DispatchedCommand, DropReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PriorityDistribution {
    pub emergency: usize,
    pub critical: usize,
    pub normal: usize,
    pub low: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub queue_len: usize,
    pub tier: QualityTier,
    pub dispatch_interval_ms: u64,
    pub distribution: PriorityDistribution,
    pub merged_total: u64,
    pub dispatched_total: u64,
    pub dropped_total: u64,
}

/// Tier-aware priority command queue.
#[derive(Debug)]
pub struct CommandScheduler {
    config: SchedulerConfig,
    queue: VecDeque<QueuedCommand>,
    tier: QualityTier,
    next_seq: u64,
    merged_total: u64,
    dispatched_total: u64,
    dropped_total: u64,
}

impl CommandScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            config: config.clone(),
            queue: VecDeque::with_capacity(config.max_queue.min(1024) + 1),
            tier: QualityTier::Excellent,
            next_seq: 0,
            merged_total: 0,
            dispatched_total: 0,
            dropped_total: 0,
        }
    }

    /// Admit a command received at `now`.
    pub fn admit(&mut self, command: OperatorCommand, now: Instant) -> Admission {
        let priority = command.kind.priority();
        let seq = self.next_seq;
        self.next_seq += 1;

        if priority != Priority::Emergency {
            let candidate = self
                .merge_candidate(&command.kind, now)
                .and_then(|idx| self.queue.remove(idx));
            if let Some(mut entry) = candidate {
                entry.value = command.value;
                entry.admitted_at = now;
                entry.seq = seq;
                self.insert_sorted(entry);
                self.merged_total += 1;
                tracing::trace!(kind = %command.kind, "command merged");
                return Admission {
                    disposition: Disposition::Merged,
                    priority,
                    queue_len: self.queue.len(),
                    evicted: None,
                };
            }
        }

        self.insert_sorted(QueuedCommand {
            kind: command.kind,
            value: command.value,
            priority,
            admitted_at: now,
            seq,
        });
        let evicted = self.evict_overflow();

        Admission {
            disposition: Disposition::Queued,
            priority,
            queue_len: self.queue.len(),
            evicted,
        }
    }

    /// Index of the newest queued entry of `kind` admitted within the
    /// merge window before `now`.
    fn merge_candidate(&self, kind: &CommandKind, now: Instant) -> Option<usize> {
        let window = self.config.merge_window();
        self.queue
            .iter()
            .enumerate()
            .filter(|(_, e)| &e.kind == kind)
            .max_by_key(|(_, e)| (e.admitted_at, e.seq))
            .filter(|(_, e)| now.saturating_duration_since(e.admitted_at) <= window)
            .map(|(idx, _)| idx)
    }

    fn insert_sorted(&mut self, entry: QueuedCommand) {
        let key = entry.key();
        let idx = self.queue.partition_point(|e| e.key() <= key);
        self.queue.insert(idx, entry);
    }

    /// Evict the lowest-priority, oldest unprotected entry once the queue
    /// exceeds its maximum size.
    fn evict_overflow(&mut self) -> Option<DispatchedCommand> {
        if self.queue.len() <= self.config.max_queue {
            return None;
        }
        let lowest = self.queue.back()?.priority;
        if lowest.is_protected() {
            tracing::warn!(
                queue_len = self.queue.len(),
                max_queue = self.config.max_queue,
                "command queue over capacity with only protected commands"
            );
            return None;
        }
        let idx = self.queue.partition_point(|e| e.priority < lowest);
        let evicted = self.queue.remove(idx)?.into_dispatched();
        self.dropped_total += 1;
        tracing::warn!(
            kind = %evicted.kind,
            priority = ?evicted.priority,
            max_queue = self.config.max_queue,
            "command queue overflow, evicting"
        );
        Some(evicted)
    }

    /// Dequeue at most one command. Returns `None` when the queue is empty.
    pub fn dispatch_next(&mut self) -> Option<Dispatch> {
        let entry = self.queue.pop_front()?;
        let command = entry.into_dispatched();
        if self.tier == QualityTier::Poor && !command.priority.is_protected() {
            self.dropped_total += 1;
            tracing::warn!(kind = %command.kind, priority = ?command.priority, "command dropped on poor link");
            return Some(Dispatch::Dropped(command, DropReason::PoorLink));
        }
        self.dispatched_total += 1;
        Some(Dispatch::Send(command))
    }

    /// Record the current tier. Returns the new dispatch interval when the
    /// tier changed.
    pub fn set_tier(&mut self, tier: QualityTier) -> Option<Duration> {
        if tier == self.tier {
            return None;
        }
        self.tier = tier;
        let interval = self.dispatch_interval();
        tracing::debug!(%tier, interval_ms = interval.as_millis() as u64, "dispatch cadence changed");
        Some(interval)
    }

    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    pub fn dispatch_interval(&self) -> Duration {
        self.config.intervals_ms.for_tier(self.tier)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued commands in dispatch order.
    pub fn snapshot(&self) -> Vec<DispatchedCommand> {
        self.queue.iter().map(QueuedCommand::to_dispatched).collect()
    }

    pub fn status(&self) -> QueueStatus {
        let mut distribution = PriorityDistribution::default();
        for entry in &self.queue {
            match entry.priority {
                Priority::Emergency => distribution.emergency += 1,
                Priority::Critical => distribution.critical += 1,
                Priority::Normal => distribution.normal += 1,
                Priority::Low => distribution.low += 1,
            }
        }
        QueueStatus {
            queue_len: self.queue.len(),
            tier: self.tier,
            dispatch_interval_ms: self.dispatch_interval().as_millis() as u64,
            distribution,
            merged_total: self.merged_total,
            dispatched_total: self.dispatched_total,
            dropped_total: self.dropped_total,
        }
    }
}
