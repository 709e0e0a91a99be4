//! 🧾 Decision Record
//!
//! The engine's only output. A `Decision` is assembled as a `DecisionDraft`,
//! checked against every output invariant in `finalize()`, and from then on is
//! read-only: fields are private and exposed through accessors so the audit
//! record cannot be edited after the fact.

use crate::decision_engine::session::SessionState;
use crate::decision_engine::votes::AgentVote;
use crate::error::InvariantViolation;
use crate::market::{FeatureFlags, OptionType, Underlying};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Proposed trading action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    BuyCall,
    BuyPut,
    NoTrade,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::BuyCall => "BUY_CALL",
            Action::BuyPut => "BUY_PUT",
            Action::NoTrade => "NO_TRADE",
        }
    }

    pub fn is_directional(&self) -> bool {
        !matches!(self, Action::NoTrade)
    }

    /// +1 for calls, -1 for puts, 0 for no-trade
    pub fn sign(&self) -> i8 {
        match self {
            Action::BuyCall => 1,
            Action::BuyPut => -1,
            Action::NoTrade => 0,
        }
    }

    pub fn from_sign(sign: f64) -> Self {
        if sign > 0.0 {
            Action::BuyCall
        } else if sign < 0.0 {
            Action::BuyPut
        } else {
            Action::NoTrade
        }
    }

    pub fn option_type(&self) -> Option<OptionType> {
        match self {
            Action::BuyCall => Some(OptionType::Call),
            Action::BuyPut => Some(OptionType::Put),
            Action::NoTrade => None,
        }
    }
}

/// Three-tier confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
        }
    }

    pub fn up(self) -> Self {
        match self {
            Confidence::Low => Confidence::Medium,
            _ => Confidence::High,
        }
    }

    pub fn down(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            _ => Confidence::Low,
        }
    }

    /// Representative 0-100 value used on votes
    pub fn score(self) -> u8 {
        match self {
            Confidence::High => 85,
            Confidence::Medium => 65,
            Confidence::Low => 35,
        }
    }

    /// Tier for a 0-100 vote confidence
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Confidence::High,
            60..=79 => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

/// Named risk guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardName {
    DataQualityGuard,
    DailyLossGuard,
    PositionSizeGuard,
    LiquidityGuard,
    EventRiskGuard,
    ExposureGuard,
    OptionsDataGuard,
}

impl GuardName {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardName::DataQualityGuard => "data_quality_guard",
            GuardName::DailyLossGuard => "daily_loss_guard",
            GuardName::PositionSizeGuard => "position_size_guard",
            GuardName::LiquidityGuard => "liquidity_guard",
            GuardName::EventRiskGuard => "event_risk_guard",
            GuardName::ExposureGuard => "exposure_guard",
            GuardName::OptionsDataGuard => "options_data_guard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GuardStatus {
    Pass,
    Fail,
}

/// One guard's verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCheck {
    pub guard: GuardName,
    pub status: GuardStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RiskCheck {
    pub fn pass(guard: GuardName) -> Self {
        Self { guard, status: GuardStatus::Pass, reason: None }
    }

    pub fn fail(guard: GuardName, reason: impl Into<String>) -> Self {
        Self {
            guard,
            status: GuardStatus::Fail,
            reason: Some(reason.into()),
        }
    }

    pub fn from_result(guard: GuardName, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(guard),
            Err(reason) => Self::fail(guard, reason),
        }
    }

    pub fn failed(&self) -> bool {
        self.status == GuardStatus::Fail
    }
}

/// Ordered guard verdicts (order is fixed, so audit output is stable)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskChecks(Vec<RiskCheck>);

impl RiskChecks {
    pub fn new(checks: Vec<RiskCheck>) -> Self {
        Self(checks)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RiskCheck> {
        self.0.iter()
    }

    pub fn get(&self, guard: GuardName) -> Option<&RiskCheck> {
        self.0.iter().find(|c| c.guard == guard)
    }

    /// Composite veto: any failed guard
    pub fn vetoed(&self) -> bool {
        self.0.iter().any(RiskCheck::failed)
    }

    pub fn first_failure(&self) -> Option<&RiskCheck> {
        self.0.iter().find(|c| c.failed())
    }

    /// Replace (or append) a guard's verdict
    pub fn record(&mut self, check: RiskCheck) {
        match self.0.iter_mut().find(|c| c.guard == check.guard) {
            Some(existing) => *existing = check,
            None => self.0.push(check),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Why a decision was forced to NO_TRADE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VetoReason {
    DataQualityGuard,
    DailyLossGuard,
    PositionSizeGuard,
    LiquidityGuard,
    EventRiskGuard,
    ExposureGuard,
    OptionsDataGuard,
    SessionHaltedDailyLoss,
    SessionCooldown,
    SessionClosingBlackout,
}

impl VetoReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            VetoReason::DataQualityGuard => "data_quality_guard",
            VetoReason::DailyLossGuard => "daily_loss_guard",
            VetoReason::PositionSizeGuard => "position_size_guard",
            VetoReason::LiquidityGuard => "liquidity_guard",
            VetoReason::EventRiskGuard => "event_risk_guard",
            VetoReason::ExposureGuard => "exposure_guard",
            VetoReason::OptionsDataGuard => "options_data_guard",
            VetoReason::SessionHaltedDailyLoss => "session_halted_daily_loss",
            VetoReason::SessionCooldown => "session_cooldown",
            VetoReason::SessionClosingBlackout => "session_closing_blackout",
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(
            self,
            VetoReason::SessionHaltedDailyLoss | VetoReason::SessionCooldown | VetoReason::SessionClosingBlackout
        )
    }
}

impl From<GuardName> for VetoReason {
    fn from(guard: GuardName) -> Self {
        match guard {
            GuardName::DataQualityGuard => VetoReason::DataQualityGuard,
            GuardName::DailyLossGuard => VetoReason::DailyLossGuard,
            GuardName::PositionSizeGuard => VetoReason::PositionSizeGuard,
            GuardName::LiquidityGuard => VetoReason::LiquidityGuard,
            GuardName::EventRiskGuard => VetoReason::EventRiskGuard,
            GuardName::ExposureGuard => VetoReason::ExposureGuard,
            GuardName::OptionsDataGuard => VetoReason::OptionsDataGuard,
        }
    }
}

/// Component scores (each 0-100), kept for audit display
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub momentum: f64,
    pub volatility: f64,
    pub liquidity: f64,
    pub greeks: f64,
    pub straddle: f64,
    pub options_composite: f64,
}

impl SignalBreakdown {
    fn named(&self) -> [(&'static str, f64); 6] {
        [
            ("momentum", self.momentum),
            ("volatility", self.volatility),
            ("liquidity", self.liquidity),
            ("greeks", self.greeks),
            ("straddle", self.straddle),
            ("options_composite", self.options_composite),
        ]
    }
}

/// Concrete size for a directional decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingPlan {
    /// Contracts (lots × lot size)
    pub quantity: u32,
    pub lots: u32,
    pub lot_size: u32,
    /// Premium of the selected leg
    pub premium: f64,
    pub risk_amount: f64,
    /// Per-contract loss at the stop
    pub stop_distance: f64,
    /// Advisory scaling from confidence, IV, time of day and exposure
    pub size_multiplier: f64,
}

/// Immutable, fully-populated audit record for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    decision_id: Uuid,
    tick_seq: u64,
    timestamp: Option<NaiveDateTime>,
    underlying: Underlying,
    action: Action,
    confidence: Confidence,
    preferred_strike: Option<i64>,
    stop_loss_pct: Option<f64>,
    target_pct: Option<f64>,
    sizing: Option<SizingPlan>,
    rationale: String,
    signal_breakdown: SignalBreakdown,
    risk_checks: RiskChecks,
    veto_reason: Option<VetoReason>,
    votes: Vec<AgentVote>,
    net_score: Option<f64>,
    session_state: SessionState,
    model_version: String,
    feature_flags: FeatureFlags,
}

impl Decision {
    pub fn decision_id(&self) -> Uuid {
        self.decision_id
    }
    pub fn tick_seq(&self) -> u64 {
        self.tick_seq
    }
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }
    pub fn underlying(&self) -> Underlying {
        self.underlying
    }
    pub fn action(&self) -> Action {
        self.action
    }
    pub fn confidence(&self) -> Confidence {
        self.confidence
    }
    pub fn preferred_strike(&self) -> Option<i64> {
        self.preferred_strike
    }
    pub fn stop_loss_pct(&self) -> Option<f64> {
        self.stop_loss_pct
    }
    pub fn target_pct(&self) -> Option<f64> {
        self.target_pct
    }
    pub fn sizing(&self) -> Option<&SizingPlan> {
        self.sizing.as_ref()
    }
    pub fn rationale(&self) -> &str {
        &self.rationale
    }
    pub fn signal_breakdown(&self) -> &SignalBreakdown {
        &self.signal_breakdown
    }
    pub fn risk_checks(&self) -> &RiskChecks {
        &self.risk_checks
    }
    pub fn veto_reason(&self) -> Option<VetoReason> {
        self.veto_reason
    }
    pub fn votes(&self) -> &[AgentVote] {
        &self.votes
    }
    pub fn net_score(&self) -> Option<f64> {
        self.net_score
    }
    pub fn session_state(&self) -> SessionState {
        self.session_state
    }
    pub fn model_version(&self) -> &str {
        &self.model_version
    }
    pub fn feature_flags(&self) -> FeatureFlags {
        self.feature_flags
    }

    /// One JSON line for the audit log
    pub fn to_audit_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Mutable assembly area; only `finalize()` produces a `Decision`
#[derive(Debug, Clone)]
pub(crate) struct DecisionDraft {
    pub tick_seq: u64,
    pub timestamp: Option<NaiveDateTime>,
    pub underlying: Underlying,
    pub action: Action,
    pub confidence: Confidence,
    pub preferred_strike: Option<i64>,
    pub stop_loss_pct: Option<f64>,
    pub target_pct: Option<f64>,
    pub sizing: Option<SizingPlan>,
    pub rationale: String,
    pub signal_breakdown: SignalBreakdown,
    pub risk_checks: RiskChecks,
    pub veto_reason: Option<VetoReason>,
    pub votes: Vec<AgentVote>,
    pub net_score: Option<f64>,
    pub session_state: SessionState,
    pub model_version: String,
    pub feature_flags: FeatureFlags,
}

impl DecisionDraft {
    /// Force NO_TRADE and clear every trade-only field
    pub fn veto(&mut self, reason: VetoReason, rationale: String) {
        self.action = Action::NoTrade;
        self.confidence = Confidence::High;
        self.preferred_strike = None;
        self.stop_loss_pct = None;
        self.target_pct = None;
        self.sizing = None;
        self.veto_reason = Some(reason);
        self.rationale = rationale;
    }

    /// Check output invariants and seal the record
    pub fn finalize(self, strike_step: i64) -> Result<Decision, InvariantViolation> {
        for (name, value) in self.signal_breakdown.named() {
            if !(0.0..=100.0).contains(&value) {
                return Err(InvariantViolation::ScoreOutOfRange { name, value });
            }
        }

        let directional = self.action.is_directional();
        let strike = self.preferred_strike.is_some();
        let stop = self.stop_loss_pct.is_some();
        let target = self.target_pct.is_some();
        if strike != directional || stop != directional || target != directional || self.sizing.is_some() != directional {
            return Err(InvariantViolation::NullabilityMismatch {
                action: self.action.as_str(),
                strike,
                stop,
                target,
            });
        }

        if let Some(strike) = self.preferred_strike {
            if strike_step <= 0 || strike % strike_step != 0 {
                return Err(InvariantViolation::MisalignedStrike { strike, step: strike_step });
            }
        }

        if directional && self.confidence == Confidence::Low {
            return Err(InvariantViolation::LowConfidenceDirectional(self.action.as_str()));
        }

        if let Some(reason) = self.veto_reason {
            if directional {
                return Err(InvariantViolation::VetoOnDirectional(reason.as_str().to_string()));
            }
        }

        if let Some(failed) = self.risk_checks.first_failure() {
            if directional || self.veto_reason.is_none() {
                return Err(InvariantViolation::UnvetoedRiskFailure(failed.guard.as_str().to_string()));
            }
        }

        let name = format!(
            "{}|{}|{}|{}",
            self.underlying,
            self.timestamp.map(|t| t.to_string()).unwrap_or_default(),
            self.tick_seq,
            self.model_version
        );
        let decision_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes());

        Ok(Decision {
            decision_id,
            tick_seq: self.tick_seq,
            timestamp: self.timestamp,
            underlying: self.underlying,
            action: self.action,
            confidence: self.confidence,
            preferred_strike: self.preferred_strike,
            stop_loss_pct: self.stop_loss_pct,
            target_pct: self.target_pct,
            sizing: self.sizing,
            rationale: self.rationale,
            signal_breakdown: self.signal_breakdown,
            risk_checks: self.risk_checks,
            veto_reason: self.veto_reason,
            votes: self.votes,
            net_score: self.net_score,
            session_state: self.session_state,
            model_version: self.model_version,
            feature_flags: self.feature_flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(action: Action) -> DecisionDraft {
        let directional = action.is_directional();
        DecisionDraft {
            tick_seq: 1,
            timestamp: None,
            underlying: Underlying::Nifty50,
            action,
            confidence: if directional { Confidence::Medium } else { Confidence::Low },
            preferred_strike: directional.then_some(22_550),
            stop_loss_pct: directional.then_some(12.0),
            target_pct: directional.then_some(24.0),
            sizing: directional.then(|| SizingPlan {
                quantity: 75,
                lots: 1,
                lot_size: 75,
                premium: 120.0,
                risk_amount: 10_000.0,
                stop_distance: 14.4,
                size_multiplier: 0.85,
            }),
            rationale: String::new(),
            signal_breakdown: SignalBreakdown::default(),
            risk_checks: RiskChecks::new(vec![RiskCheck::pass(GuardName::DailyLossGuard)]),
            veto_reason: None,
            votes: Vec::new(),
            net_score: None,
            session_state: SessionState::Active,
            model_version: "test".to_string(),
            feature_flags: FeatureFlags::default(),
        }
    }

    #[test]
    fn test_finalize_accepts_consistent_drafts() {
        assert!(draft(Action::BuyCall).finalize(50).is_ok());
        assert!(draft(Action::NoTrade).finalize(50).is_ok());
    }

    #[test]
    fn test_finalize_rejects_strike_on_no_trade() {
        let mut d = draft(Action::NoTrade);
        d.preferred_strike = Some(22_500);
        assert!(matches!(d.finalize(50), Err(InvariantViolation::NullabilityMismatch { .. })));
    }

    #[test]
    fn test_finalize_rejects_misaligned_strike() {
        let mut d = draft(Action::BuyPut);
        d.preferred_strike = Some(22_525);
        assert_eq!(
            d.finalize(50),
            Err(InvariantViolation::MisalignedStrike { strike: 22_525, step: 50 })
        );
    }

    #[test]
    fn test_finalize_rejects_out_of_range_score() {
        let mut d = draft(Action::NoTrade);
        d.signal_breakdown.greeks = 101.0;
        assert!(matches!(d.finalize(50), Err(InvariantViolation::ScoreOutOfRange { name: "greeks", .. })));
    }

    #[test]
    fn test_finalize_rejects_low_confidence_directional() {
        let mut d = draft(Action::BuyCall);
        d.confidence = Confidence::Low;
        assert!(matches!(d.finalize(50), Err(InvariantViolation::LowConfidenceDirectional(_))));
    }

    #[test]
    fn test_finalize_rejects_failed_guard_without_veto() {
        let mut d = draft(Action::NoTrade);
        d.risk_checks.record(RiskCheck::fail(GuardName::LiquidityGuard, "thin"));
        assert!(matches!(d.finalize(50), Err(InvariantViolation::UnvetoedRiskFailure(_))));

        let mut d = draft(Action::BuyCall);
        d.risk_checks.record(RiskCheck::fail(GuardName::LiquidityGuard, "thin"));
        d.veto(VetoReason::LiquidityGuard, "vetoed".to_string());
        let decision = d.finalize(50).expect("vetoed draft is consistent");
        assert_eq!(decision.action(), Action::NoTrade);
        assert_eq!(decision.preferred_strike(), None);
        assert_eq!(decision.veto_reason(), Some(VetoReason::LiquidityGuard));
    }

    #[test]
    fn test_decision_id_is_deterministic() {
        let a = draft(Action::BuyCall).finalize(50).expect("valid");
        let b = draft(Action::BuyCall).finalize(50).expect("valid");
        assert_eq!(a.decision_id(), b.decision_id());
        assert_eq!(a.to_audit_line().expect("json"), b.to_audit_line().expect("json"));
    }

    #[test]
    fn test_veto_reason_serialization() {
        let json = serde_json::to_string(&VetoReason::DailyLossGuard).expect("json");
        assert_eq!(json, "\"daily_loss_guard\"");
        assert_eq!(serde_json::to_string(&Action::BuyCall).expect("json"), "\"BUY_CALL\"");
    }
}
