//! 🗳️ Agent Votes
//!
//! Every vote-producing role sits behind one interface, `Agent::produce_vote`,
//! so the consensus arbiter iterates a flat list of votes instead of
//! branching on who said what.
//!
//! Roles:
//! - Momentum: threshold bias from the tick's change %
//! - OptionsStructure: composite options score and its bias
//! - Regime: trend continuation read from rolling memory
//! - RiskOfficer: event-window and portfolio-exposure filter (veto only)
//! - ExecutionPlanner: time-of-day sizing guidance (never directional)

use crate::config::{ConsensusConfig, SignalConfig};
use crate::decision_engine::decision::{Action, Confidence, GuardName, RiskCheck, VetoReason};
use crate::decision_engine::guardrails::{EventAssessment, RiskGuardEvaluator};
use crate::decision_engine::memory::MemoryWindow;
use crate::decision_engine::momentum::MomentumSignal;
use crate::decision_engine::scoring::OptionsAssessment;
use crate::market::{SessionPhase, TickInput};
use serde::{Deserialize, Serialize};

/// Vote-producing roles (also the vote's source tag)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agent {
    Momentum,
    OptionsStructure,
    Regime,
    RiskOfficer,
    ExecutionPlanner,
}

impl Agent {
    /// Fixed evaluation order; arbitration depends on it for stable output
    pub const ALL: [Agent; 5] = [
        Agent::Momentum,
        Agent::OptionsStructure,
        Agent::Regime,
        Agent::RiskOfficer,
        Agent::ExecutionPlanner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::Momentum => "momentum",
            Agent::OptionsStructure => "options_structure",
            Agent::Regime => "regime",
            Agent::RiskOfficer => "risk_officer",
            Agent::ExecutionPlanner => "execution_planner",
        }
    }

    pub fn weight(&self, weights: &ConsensusConfig) -> f64 {
        match self {
            Agent::Momentum => weights.momentum_weight,
            Agent::OptionsStructure => weights.options_weight,
            Agent::Regime => weights.regime_weight,
            Agent::RiskOfficer => weights.risk_officer_weight,
            Agent::ExecutionPlanner => weights.execution_planner_weight,
        }
    }

    pub fn produce_vote(&self, ctx: &VoteContext<'_>) -> AgentVote {
        let weight = self.weight(ctx.weights);
        match self {
            Agent::Momentum => momentum_vote(ctx.momentum, weight),
            Agent::OptionsStructure => options_vote(ctx.options, weight),
            Agent::Regime => regime_vote(ctx, weight),
            Agent::RiskOfficer => risk_officer_vote(ctx, weight),
            Agent::ExecutionPlanner => execution_planner_vote(ctx.tick.market.session_phase, weight),
        }
    }
}

/// Everything a role may look at. Signals are computed once by the engine.
pub struct VoteContext<'a> {
    pub tick: &'a TickInput,
    pub change_pct: f64,
    pub memory: &'a MemoryWindow,
    pub momentum: &'a MomentumSignal,
    pub options: &'a OptionsAssessment,
    pub guards: &'a RiskGuardEvaluator,
    pub signal: &'a SignalConfig,
    pub weights: &'a ConsensusConfig,
}

/// One role's opinion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentVote {
    pub source: Agent,
    pub direction: Action,
    /// 0-100
    pub confidence: u8,
    /// 0-1
    pub weight: f64,
    pub rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub veto: Option<VetoReason>,
    /// Advisory sizing factor for the position sizer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_multiplier: Option<f64>,
    /// Confidence points added to the arbitrated consensus (time of day)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub confidence_adjustment: Option<i8>,
    /// Guards this role evaluated; merged into the decision's risk checks
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub checks: Vec<RiskCheck>,
}

impl AgentVote {
    fn new(source: Agent, direction: Action, confidence: u8, weight: f64, rationale: String) -> Self {
        Self {
            source,
            direction,
            confidence: confidence.min(100),
            weight,
            rationale,
            veto: None,
            size_multiplier: None,
            confidence_adjustment: None,
            checks: Vec::new(),
        }
    }

    /// weight × direction (+1 / -1 / 0)
    pub fn signed_weight(&self) -> f64 {
        self.weight * f64::from(self.direction.sign())
    }
}

fn momentum_vote(signal: &MomentumSignal, weight: f64) -> AgentVote {
    AgentVote::new(
        Agent::Momentum,
        signal.action,
        signal.confidence.score(),
        weight,
        format!(
            "change {:+.2}% ({:?}, trend shift {:+})",
            signal.change_pct, signal.bucket, signal.trend_shift
        ),
    )
}

fn options_vote(assessment: &OptionsAssessment, weight: f64) -> AgentVote {
    let mut vote = AgentVote::new(
        Agent::OptionsStructure,
        assessment.action,
        assessment.confidence.score(),
        weight,
        format!(
            "score {:.1} ({}), bias {:?}{}",
            assessment.composite,
            assessment.sub_scores.breakdown(),
            assessment.bias,
            if assessment.breakout { ", straddle breakout" } else { "" }
        ),
    );
    let check = match &assessment.data_veto {
        Some(reason) => {
            vote.direction = Action::NoTrade;
            vote.veto = Some(VetoReason::OptionsDataGuard);
            vote.rationale = reason.clone();
            RiskCheck::fail(GuardName::OptionsDataGuard, reason.clone())
        }
        None => RiskCheck::pass(GuardName::OptionsDataGuard),
    };
    vote.checks.push(check);
    vote
}

/// Market regime read from memory plus this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Trend,
    MeanReversion,
    Neutral,
}

pub fn classify_regime(memory: &MemoryWindow, change_pct: f64, signal: &SignalConfig) -> Regime {
    if memory.len() < signal.trend_min_samples {
        return Regime::Neutral;
    }
    let strength = memory.trend_strength();
    let avg = memory.average_change().unwrap_or(0.0);
    if strength.abs() >= signal.regime_trend_strength && avg.abs() >= signal.regime_trend_move {
        Regime::Trend
    } else if strength.abs() <= signal.mean_reversion_strength && change_pct.abs() >= signal.mean_reversion_move {
        Regime::MeanReversion
    } else {
        Regime::Neutral
    }
}

fn regime_vote(ctx: &VoteContext<'_>, weight: f64) -> AgentVote {
    let regime = classify_regime(ctx.memory, ctx.change_pct, ctx.signal);
    let avg = ctx.memory.average_change().unwrap_or(0.0);
    match regime {
        Regime::Trend => AgentVote::new(
            Agent::Regime,
            Action::from_sign(avg),
            Confidence::High.score(),
            weight,
            format!(
                "TREND: strength {:.2}, avg change {:+.2}% over {} ticks",
                ctx.memory.trend_strength(),
                avg,
                ctx.memory.len()
            ),
        ),
        Regime::MeanReversion => AgentVote::new(
            Agent::Regime,
            Action::NoTrade,
            Confidence::Medium.score(),
            weight,
            format!("MEAN_REVERSION: choppy memory, move {:+.2}% may fade", ctx.change_pct),
        ),
        Regime::Neutral => AgentVote::new(
            Agent::Regime,
            Action::NoTrade,
            Confidence::Low.score(),
            weight,
            format!("NEUTRAL ({} ticks remembered)", ctx.memory.len()),
        ),
    }
}

fn risk_officer_vote(ctx: &VoteContext<'_>, weight: f64) -> AgentVote {
    let mut notes = Vec::new();
    let mut veto = None;

    let event_check = match ctx.guards.check_event_risk(ctx.tick.event.as_ref()) {
        Ok(EventAssessment::Clear) => RiskCheck::pass(GuardName::EventRiskGuard),
        Ok(EventAssessment::Noted(name)) => {
            notes.push(format!("event window {} noted", name));
            RiskCheck::pass(GuardName::EventRiskGuard)
        }
        Err(reason) => {
            veto = Some(VetoReason::EventRiskGuard);
            notes.push(reason.clone());
            RiskCheck::fail(GuardName::EventRiskGuard, reason)
        }
    };

    let exposure_check = match ctx.guards.check_exposure(&ctx.tick.account) {
        Ok(()) => RiskCheck::pass(GuardName::ExposureGuard),
        Err(reason) => {
            veto = veto.or(Some(VetoReason::ExposureGuard));
            notes.push(reason.clone());
            RiskCheck::fail(GuardName::ExposureGuard, reason)
        }
    };

    let taper = veto.is_none() && ctx.guards.exposure_near_cap(&ctx.tick.account);
    if taper {
        notes.push(format!("exposure {:.1}% near cap, halving size", ctx.tick.account.exposure_pct()));
    }
    if notes.is_empty() {
        notes.push("no event or exposure concerns".to_string());
    }

    let confidence = if veto.is_some() { 90 } else { 50 };
    let mut vote = AgentVote::new(Agent::RiskOfficer, Action::NoTrade, confidence, weight, notes.join("; "));
    vote.veto = veto;
    vote.size_multiplier = taper.then_some(0.5);
    vote.checks = vec![event_check, exposure_check];
    vote
}

/// (confidence adjustment, size multiplier, urgency) per session phase
pub fn time_of_day_profile(phase: SessionPhase) -> (i8, f64, &'static str) {
    match phase {
        SessionPhase::PreOpen => (0, 0.5, "hold"),
        SessionPhase::Open => (-8, 0.7, "patient"),
        SessionPhase::Midday => (2, 1.0, "normal"),
        SessionPhase::Close => (6, 0.9, "urgent"),
    }
}

fn execution_planner_vote(phase: SessionPhase, weight: f64) -> AgentVote {
    let (adjustment, multiplier, urgency) = time_of_day_profile(phase);
    let confidence = (50i16 + i16::from(adjustment)).clamp(0, 100) as u8;
    let mut vote = AgentVote::new(
        Agent::ExecutionPlanner,
        Action::NoTrade,
        confidence,
        weight,
        format!(
            "{:?}: confidence {:+}, size ×{:.1}, urgency {}",
            phase, adjustment, multiplier, urgency
        ),
    );
    vote.size_multiplier = Some(multiplier);
    vote.confidence_adjustment = Some(adjustment);
    vote
}
