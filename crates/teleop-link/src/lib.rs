//! Telemetry-driven feedback core for a live teleoperation link.
//!
//! - **Quality**: raw transport stats are normalised into a
//!   [`NetworkSample`] and scored into a [`QualityTier`]
//! - **Adaptation**: a windowed bandwidth estimate drives bounded encoder
//!   adjustments with congestion detection and fast recovery
//! - **Commands**: operator input is merged, prioritised and dispatched at
//!   a tier-selected cadence so critical commands are never starved
//!
//! [`PerformanceCoordinator`] ties the pieces together; [`LinkRuntime`]
//! runs its two cycles on worker threads.

pub mod advisory;
pub mod config;
pub mod coordinator;
pub mod encoding;
pub mod error;
pub mod estimator;
pub mod events;
pub mod history;
pub mod interface;
pub mod quality;
pub mod report;
pub mod runtime;
pub mod scheduler;
pub mod stats;
pub mod timer;

pub use config::LinkConfig;
pub use coordinator::{LinkSnapshot, PerformanceCoordinator, StatsCycle};
pub use encoding::{EncodingOptimizer, EncodingSettings};
pub use error::ConfigError;
pub use estimator::BandwidthEstimator;
pub use events::{DropReason, EventSink, LinkEvent, NullSink};
pub use interface::{Actuator, EncoderSink, StatsSource};
pub use quality::{QualityScore, QualityScorer, QualityTier};
pub use report::PerformanceReport;
pub use runtime::{Collaborators, LinkRuntime};
pub use scheduler::{
    Admission, CommandKind, CommandScheduler, Dispatch, DispatchedCommand, OperatorCommand,
    Priority,
};
pub use stats::{NetworkSample, RawStatsReport, normalize};
