pub mod consensus;
pub mod decision;
pub mod engine;
pub mod guardrails;
pub mod logging;
pub mod memory;
pub mod momentum;
pub mod position_sizer;
pub mod scoring;
pub mod session;
pub mod votes;


// Re-export main types for convenience
pub use consensus::{ConsensusArbiter, ConsensusOutcome, Verdict};
pub use decision::{
    Action, Confidence, Decision, GuardName, GuardStatus, RiskCheck, RiskChecks, SignalBreakdown, SizingPlan,
    VetoReason,
};
pub use engine::{DecisionDesk, DecisionEngine, Lane};
pub use guardrails::{EventAssessment, RiskGuardEvaluator};
pub use logging::{DecisionLogger, DecisionStats};
pub use memory::{MemoryEntry, MemoryWindow, MEMORY_CAPACITY};
pub use momentum::{MomentumBucket, MomentumSignal, MomentumSignalEngine};
pub use position_sizer::{PositionSizer, SizingOutcome};
pub use scoring::{weighted_score, OptionsAssessment, OptionsStructureScorer, OptionsSubScores, OptionsWeights};
pub use session::{SessionState, SessionStateMachine, TradeOutcome};
pub use votes::{Agent, AgentVote, Regime, VoteContext};
