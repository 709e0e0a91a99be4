//! ⚠️ Error taxonomy
//!
//! Two classes of failure can leave the engine:
//! - `ValidationError`: structurally invalid input, rejected before any guard runs.
//! - `InvariantViolation`: the engine produced an output that breaks its own
//!   contract. These are programming errors and are never downgraded to NO_TRADE.
//!
//! Guard failures are NOT errors. They become NO_TRADE decisions with a veto reason.

use thiserror::Error;

/// Structural input problems (no `Decision` is minted for these)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unknown underlying '{0}'")]
    UnknownUnderlying(String),

    #[error("unknown session phase '{0}'")]
    UnknownSessionPhase(String),

    #[error("unknown option type '{0}'")]
    UnknownOptionType(String),

    #[error("malformed tick input: {0}")]
    Malformed(String),

    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("{field}={value} is out of range ({expected})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
}

/// Contract breaches in a finalized decision
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("{name} score {value} outside [0,100]")]
    ScoreOutOfRange { name: &'static str, value: f64 },

    #[error("options weights sum to {0}, expected 1.0")]
    WeightsDoNotSumToOne(f64),

    #[error("nullability mismatch for {action}: strike={strike}, stop={stop}, target={target}")]
    NullabilityMismatch {
        action: &'static str,
        strike: bool,
        stop: bool,
        target: bool,
    },

    #[error("strike {strike} is not a multiple of step {step}")]
    MisalignedStrike { strike: i64, step: i64 },

    #[error("low-confidence decision carries directional action {0}")]
    LowConfidenceDirectional(&'static str),

    #[error("veto reason {0} set on a directional action")]
    VetoOnDirectional(String),

    #[error("failed risk check {0} did not veto the decision")]
    UnvetoedRiskFailure(String),

    #[error("memory window holds {len} entries (capacity {capacity})")]
    MemoryOverCapacity { len: usize, capacity: usize },
}

/// Anything `DecisionEngine::evaluate` can return instead of a `Decision`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl EngineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }

    pub fn is_invariant(&self) -> bool {
        matches!(self, EngineError::Invariant(_))
    }
}
