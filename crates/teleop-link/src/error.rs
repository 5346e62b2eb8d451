use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

/// Errors raised while loading or validating a [`LinkConfig`](crate::config::LinkConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
    #[error("{field}: min {min} exceeds max {max}")]
    InvertedBounds {
        field: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{field}: default {value} outside [{min}, {max}]")]
    DefaultOutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("resolution scale ladder must be non-empty and strictly ascending")]
    InvalidScaleLadder,
    #[error("default resolution scale {0} is not on the scale ladder")]
    DefaultScaleNotOnLadder(f64),
    #[error("quality ceilings must widen from excellent to fair ({0})")]
    UnorderedCeilings(&'static str),
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },
}
