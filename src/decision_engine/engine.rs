//! 🧠 Decision Engine and Desk
//!
//! `DecisionEngine::evaluate` is the per-tick pipeline. It is pure given the
//! tick and the lane (memory window + session machine) it is handed:
//!
//! 1. structural validation (errors, no decision minted)
//! 2. core risk guards and the session machine (veto tier)
//! 3. momentum + options scoring (always computed for audit display)
//! 4. agent votes → consensus arbiter (skipped when step 2 vetoed)
//! 5. position sizing (may downgrade to NO_TRADE)
//! 6. invariant check, then one memory append for the tick
//!
//! `DecisionDesk` owns one lane per underlying behind its own mutex, so ticks
//! for the same underlying are serialized while different underlyings run in
//! parallel.

use crate::config::EngineConfig;
use crate::decision_engine::consensus::{ConsensusArbiter, Verdict};
use crate::decision_engine::decision::{
    Action, Confidence, Decision, DecisionDraft, GuardName, RiskCheck, SignalBreakdown, VetoReason,
};
use crate::decision_engine::guardrails::RiskGuardEvaluator;
use crate::decision_engine::memory::{MemoryEntry, MemoryWindow};
use crate::decision_engine::momentum::MomentumSignalEngine;
use crate::decision_engine::position_sizer::{PositionSizer, SizingOutcome};
use crate::decision_engine::scoring::OptionsStructureScorer;
use crate::decision_engine::session::{SessionState, SessionStateMachine, TradeOutcome};
use crate::decision_engine::votes::{Agent, AgentVote, VoteContext};
use crate::error::{EngineError, InvariantViolation};
use crate::market::{TickInput, Underlying};
use crate::metrics;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use log::{error, info, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// State that survives across ticks for one underlying
#[derive(Debug, Clone)]
pub struct Lane {
    memory: MemoryWindow,
    session: SessionStateMachine,
    ticks: u64,
}

impl Lane {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            memory: MemoryWindow::new(),
            session: SessionStateMachine::new(&config.session),
            ticks: 0,
        }
    }

    pub fn memory(&self) -> &MemoryWindow {
        &self.memory
    }

    pub fn session(&self) -> &SessionStateMachine {
        &self.session
    }

    pub fn record_trade_outcome(&mut self, outcome: TradeOutcome, at: Option<NaiveDateTime>) {
        self.session.record_outcome(outcome, at);
    }
}

pub struct DecisionEngine {
    config: EngineConfig,
    guards: RiskGuardEvaluator,
    momentum: MomentumSignalEngine,
    scorer: OptionsStructureScorer,
    arbiter: ConsensusArbiter,
    sizer: PositionSizer,
}

impl DecisionEngine {
    /// Build the engine; configuration problems surface here, never per tick
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate().context("invalid engine configuration")?;

        info!("🧠 Decision engine {} initialized:", config.model_version);
        info!(
            "   Momentum: bullish {:+.2}% / bearish {:+.2}% / strong {:.2}%",
            config.signal.bullish_threshold, config.signal.bearish_threshold, config.signal.strong_move_threshold
        );
        info!(
            "   Weights: momentum {:.2}, options {:.2}, regime {:.2}, risk officer {:.2}, planner {:.2} (threshold {:.2})",
            config.consensus.momentum_weight,
            config.consensus.options_weight,
            config.consensus.regime_weight,
            config.consensus.risk_officer_weight,
            config.consensus.execution_planner_weight,
            config.consensus.strength_threshold
        );
        info!(
            "   Risk: spread ≤ {:.0}bps, OI ≥ {:.0}, volume ≥ {:.0}, stop {:.0}% / target {:.0}%",
            config.risk.max_spread_bps,
            config.risk.min_oi,
            config.risk.min_volume,
            config.sizing.stop_loss_pct,
            config.sizing.target_pct
        );

        Ok(Self {
            guards: RiskGuardEvaluator::new(&config),
            momentum: MomentumSignalEngine::new(&config.signal),
            scorer: OptionsStructureScorer::new(&config),
            arbiter: ConsensusArbiter::new(&config.consensus),
            sizer: PositionSizer::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn new_lane(&self) -> Lane {
        Lane::new(&self.config)
    }

    /// Evaluate one tick against its underlying's lane.
    ///
    /// The lane's memory is appended exactly once, after the decision is sealed.
    pub fn evaluate(&self, tick: &TickInput, lane: &mut Lane) -> Result<Decision, EngineError> {
        tick.validate()?;

        lane.ticks += 1;
        let underlying = tick.underlying();
        let change_pct = tick.market.effective_change_pct().unwrap_or(0.0);

        let mut risk_checks = self.guards.evaluate(tick);
        let session_state = lane.session.on_tick(tick);

        let momentum = self.momentum.evaluate(change_pct, &lane.memory);
        let options = self.scorer.assess(tick, change_pct)?;

        let mut draft = DecisionDraft {
            tick_seq: lane.ticks,
            timestamp: tick.market.timestamp,
            underlying,
            action: Action::NoTrade,
            confidence: Confidence::Low,
            preferred_strike: None,
            stop_loss_pct: None,
            target_pct: None,
            sizing: None,
            rationale: String::new(),
            signal_breakdown: SignalBreakdown {
                momentum: momentum.score,
                volatility: options.sub_scores.volatility,
                liquidity: options.sub_scores.liquidity,
                greeks: options.sub_scores.greeks,
                straddle: options.sub_scores.straddle,
                options_composite: options.composite,
            },
            risk_checks: Default::default(),
            veto_reason: None,
            votes: Vec::new(),
            net_score: None,
            session_state,
            model_version: self.config.model_version.clone(),
            feature_flags: tick.flags,
        };

        if let Some(failed) = risk_checks.first_failure() {
            let reason = VetoReason::from(failed.guard);
            let rationale = format!(
                "risk guard {} failed: {}",
                failed.guard.as_str(),
                failed.reason.as_deref().unwrap_or("-")
            );
            draft.veto(reason, rationale);
        } else if let Some(reason) = session_state.veto_reason() {
            draft.veto(reason, format!("session {}", session_state.as_str()));
        } else {
            let ctx = VoteContext {
                tick,
                change_pct,
                memory: &lane.memory,
                momentum: &momentum,
                options: &options,
                guards: &self.guards,
                signal: &self.config.signal,
                weights: &self.config.consensus,
            };
            let votes: Vec<AgentVote> = Agent::ALL.iter().map(|agent| agent.produce_vote(&ctx)).collect();
            for check in votes.iter().flat_map(|v| v.checks.iter()) {
                risk_checks.record(check.clone());
            }

            match self.arbiter.arbitrate(&votes) {
                Verdict::Veto { reason, source, rationale } => {
                    draft.veto(reason, format!("{} veto: {}", source.as_str(), rationale));
                }
                Verdict::Consensus(outcome) if outcome.action.is_directional() => {
                    let guidance: f64 = votes.iter().filter_map(|v| v.size_multiplier).product();
                    match self.sizer.size(tick, outcome.action, outcome.confidence, guidance) {
                        SizingOutcome::Sized { strike, plan } => {
                            draft.action = outcome.action;
                            draft.confidence = outcome.confidence;
                            draft.preferred_strike = Some(strike);
                            draft.stop_loss_pct = Some(self.sizer.stop_loss_pct());
                            draft.target_pct = Some(self.sizer.target_pct());
                            draft.rationale = format!(
                                "{} {}{} x{} | momentum {:+.2}% {:?} | options {:.1} bias {:?} | {}",
                                outcome.action.as_str(),
                                strike,
                                outcome.action.option_type().map(|t| t.to_string()).unwrap_or_default(),
                                plan.quantity,
                                change_pct,
                                momentum.bucket,
                                options.composite,
                                options.bias,
                                outcome.rationale
                            );
                            draft.sizing = Some(plan);
                        }
                        SizingOutcome::Downgraded { reason } => {
                            risk_checks.record(RiskCheck::fail(GuardName::PositionSizeGuard, reason.clone()));
                            draft.veto(
                                VetoReason::PositionSizeGuard,
                                format!("{} downgraded: {}", outcome.action.as_str(), reason),
                            );
                        }
                    }
                    draft.net_score = Some(outcome.net_score);
                }
                Verdict::Consensus(outcome) => {
                    draft.confidence = outcome.confidence;
                    draft.rationale = outcome.rationale;
                    draft.net_score = Some(outcome.net_score);
                }
            }
            draft.votes = votes;
        }
        draft.risk_checks = risk_checks;

        let step = self.config.strike_steps.step(underlying);
        let decision = draft.finalize(step).map_err(|violation| {
            error!("🚨 {} invariant violation: {}", underlying, violation);
            EngineError::from(violation)
        })?;

        lane.memory.push(MemoryEntry {
            change_pct,
            action: decision.action(),
            timestamp: decision.timestamp(),
        });
        lane.memory.check_capacity()?;

        match decision.veto_reason() {
            Some(reason) => warn!(
                "🚫 {} #{} NO_TRADE vetoed by {}: {}",
                underlying,
                decision.tick_seq(),
                reason.as_str(),
                decision.rationale()
            ),
            None => info!(
                "🎯 {} #{} {} {} | {}",
                underlying,
                decision.tick_seq(),
                decision.action().as_str(),
                decision.confidence().as_str(),
                decision.rationale()
            ),
        }

        Ok(decision)
    }
}

/// Engine plus one serialized lane per underlying
pub struct DecisionDesk {
    engine: DecisionEngine,
    lanes: [Mutex<Lane>; 3],
}

impl DecisionDesk {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let engine = DecisionEngine::new(config)?;
        let lanes = [
            Mutex::new(engine.new_lane()),
            Mutex::new(engine.new_lane()),
            Mutex::new(engine.new_lane()),
        ];
        Ok(Self { engine, lanes })
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    fn lane(&self, underlying: Underlying) -> MutexGuard<'_, Lane> {
        // A panic inside evaluation never leaves a lane half-written
        self.lanes[underlying.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Evaluate one tick; only its own underlying's lane is locked
    pub fn evaluate(&self, tick: &TickInput) -> Result<Decision, EngineError> {
        let result = {
            let mut lane = self.lane(tick.underlying());
            self.engine.evaluate(tick, &mut lane)
        };
        match &result {
            Ok(decision) => metrics::record_decision(decision),
            Err(e) => metrics::record_error(e),
        }
        result
    }

    /// Parse a JSON tick line and evaluate it
    pub fn evaluate_json(&self, line: &str) -> Result<Decision, EngineError> {
        match TickInput::from_json(line) {
            Ok(tick) => self.evaluate(&tick),
            Err(e) => {
                let err = EngineError::from(e);
                metrics::record_error(&err);
                Err(err)
            }
        }
    }

    /// Feed a closed trade's result into the underlying's loss streak
    pub fn record_trade_outcome(&self, underlying: Underlying, outcome: TradeOutcome, at: Option<NaiveDateTime>) {
        let mut lane = self.lane(underlying);
        lane.record_trade_outcome(outcome, at);
        if lane.session().state() == SessionState::Cooldown {
            warn!("🥶 {} in COOLDOWN after {} losses", underlying, lane.session().loss_streak());
        }
    }

    pub fn memory_len(&self, underlying: Underlying) -> usize {
        self.lane(underlying).memory().len()
    }

    pub fn session_state(&self, underlying: Underlying) -> SessionState {
        self.lane(underlying).session().state()
    }

    /// Check every lane's memory bound
    pub fn check_lanes(&self) -> Result<(), InvariantViolation> {
        for underlying in Underlying::ALL {
            self.lane(underlying).memory().check_capacity()?;
        }
        Ok(())
    }
}
