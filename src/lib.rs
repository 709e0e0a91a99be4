//! 🧠 Options Decision Engine
//!
//! Turns per-tick market, option-chain, volatility and account snapshots into
//! one auditable trading `Decision` per underlying: risk guards and session
//! state veto first, then momentum / options / regime / risk-officer /
//! execution-planner votes are merged by a consensus arbiter and sized.
//!
//! The engine only ever proposes a decision. It never places orders.

pub mod config;
pub mod decision_engine;
pub mod error;
pub mod market;
pub mod metrics;

pub use config::{Config, EngineConfig};
pub use decision_engine::{Decision, DecisionDesk, DecisionEngine};
pub use error::{EngineError, InvariantViolation, ValidationError};
pub use market::{TickInput, Underlying};
