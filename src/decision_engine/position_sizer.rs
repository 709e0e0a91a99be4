//! 💰 Position Sizer - strike selection and risk-based quantity
//!
//! Only runs for an arbitrated BUY_CALL / BUY_PUT. Picks the strike, prices the
//! leg from the chain, and converts the per-trade risk budget into whole lots:
//!
//!   risk_amount   = balance × max_trade_risk_pct
//!   stop_distance = premium × stop_loss_pct   (stop bounded to [8%, 20%])
//!   quantity      = floor(risk_amount / stop_distance), rounded down to lots
//!
//! Fewer than one lot downgrades the decision to NO_TRADE (position_size_guard).

use crate::config::{EngineConfig, SizingConfig, StrikeSteps};
use crate::decision_engine::decision::{Action, Confidence, SizingPlan};
use crate::market::{AccountContext, OptionChainRow, OptionType, TickInput};
use log::debug;

/// Stop-loss percent of premium is always clamped into this band
pub const STOP_BOUNDS_PCT: (f64, f64) = (8.0, 20.0);

/// Upper bound on the advisory size multiplier
pub const MAX_SIZE_MULTIPLIER: f64 = 1.5;

/// Nearest valid strike to the underlying price
pub fn atm_strike(ltp: f64, step: i64) -> i64 {
    if step <= 0 {
        return ltp.round() as i64;
    }
    ((ltp / step as f64).round() as i64).saturating_mul(step)
}

/// HIGH confidence takes the first OTM strike, anything else stays ATM
pub fn select_strike(atm: i64, step: i64, action: Action, confidence: Confidence) -> i64 {
    if confidence < Confidence::High {
        return atm;
    }
    match action {
        Action::BuyCall => atm.saturating_add(step),
        Action::BuyPut => atm.saturating_sub(step),
        Action::NoTrade => atm,
    }
}

/// Premium of the exact `(strike, option_type)` leg, if the chain prices it
pub fn leg_premium(chain: &[OptionChainRow], strike: i64, option_type: OptionType) -> Option<f64> {
    chain
        .iter()
        .find(|r| r.strike == strike && r.option_type == option_type)
        .and_then(|r| r.ltp)
        .filter(|p| *p > 0.0)
}

/// Contracts the per-trade risk budget can carry at this premium
pub fn affordable_contracts(account: &AccountContext, premium: f64, stop_loss_pct: f64) -> u32 {
    let stop_distance = stop_distance(premium, stop_loss_pct);
    if stop_distance <= 0.0 {
        return 0;
    }
    let risk_amount = account.balance * account.max_trade_risk_pct / 100.0;
    let contracts = (risk_amount / stop_distance).floor();
    if contracts.is_finite() && contracts > 0.0 {
        contracts.min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Per-contract loss when the stop is hit
pub fn stop_distance(premium: f64, stop_loss_pct: f64) -> f64 {
    premium * stop_loss_pct.clamp(STOP_BOUNDS_PCT.0, STOP_BOUNDS_PCT.1) / 100.0
}

/// Cheaper implied vol gets the larger allocation
pub fn iv_factor(iv_percentile: Option<f64>) -> f64 {
    match iv_percentile {
        Some(iv) if iv <= 30.0 => 1.0,
        Some(iv) if iv <= 60.0 => 0.85,
        Some(iv) if iv <= 80.0 => 0.7,
        Some(_) => 0.55,
        None => 0.85,
    }
}

/// Result of sizing an arbitrated directional action
#[derive(Debug, Clone, PartialEq)]
pub enum SizingOutcome {
    Sized { strike: i64, plan: SizingPlan },
    /// Below one lot (or unpriceable leg); becomes a position_size_guard veto
    Downgraded { reason: String },
}

pub struct PositionSizer {
    sizing: SizingConfig,
    steps: StrikeSteps,
}

impl PositionSizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            sizing: config.sizing.clone(),
            steps: config.strike_steps,
        }
    }

    /// Size an arbitrated action.
    ///
    /// `guidance` is the product of the size hints carried on the votes
    /// (time of day from the execution planner, exposure taper from the
    /// risk officer).
    pub fn size(&self, tick: &TickInput, action: Action, confidence: Confidence, guidance: f64) -> SizingOutcome {
        let option_type = match action.option_type() {
            Some(t) => t,
            None => {
                return SizingOutcome::Downgraded {
                    reason: "no-trade action cannot be sized".to_string(),
                }
            }
        };
        let ltp = match tick.market.ltp {
            Some(ltp) => ltp,
            None => {
                return SizingOutcome::Downgraded {
                    reason: "no reference price".to_string(),
                }
            }
        };

        let underlying = tick.underlying();
        let step = self.steps.step(underlying);
        let atm = atm_strike(ltp, step);
        let preferred = select_strike(atm, step, action, confidence);

        // An unpriced OTM leg falls back to ATM; an unpriced ATM leg cannot be traded
        let (strike, premium) = match leg_premium(&tick.chain, preferred, option_type) {
            Some(p) => (preferred, p),
            None => match leg_premium(&tick.chain, atm, option_type) {
                Some(p) => {
                    debug!("💰 {} {}{} unpriced, using ATM {}", underlying, preferred, option_type, atm);
                    (atm, p)
                }
                None => {
                    return SizingOutcome::Downgraded {
                        reason: format!("no priced {} leg at {} or ATM {}", option_type, preferred, atm),
                    }
                }
            },
        };

        let lot_size = self.sizing.lot_sizes.lot(underlying);
        let contracts = affordable_contracts(&tick.account, premium, self.sizing.stop_loss_pct);
        let lots = if lot_size == 0 { 0 } else { contracts / lot_size };
        if lots == 0 {
            return SizingOutcome::Downgraded {
                reason: format!(
                    "{} contracts at premium {:.2} is below one lot of {}",
                    contracts, premium, lot_size
                ),
            };
        }

        let multiplier = self.size_multiplier(
            confidence,
            tick.volatility.iv_percentile.or(tick.volatility.iv_rank),
            guidance,
        );

        let plan = SizingPlan {
            quantity: lots * lot_size,
            lots,
            lot_size,
            premium,
            risk_amount: tick.account.balance * tick.account.max_trade_risk_pct / 100.0,
            stop_distance: stop_distance(premium, self.sizing.stop_loss_pct),
            size_multiplier: multiplier,
        };

        debug!(
            "💰 {} {} {}{} @ {:.2}: {} lots ({} qty), multiplier {:.2}",
            underlying,
            action.as_str(),
            strike,
            option_type,
            premium,
            plan.lots,
            plan.quantity,
            plan.size_multiplier
        );

        SizingOutcome::Sized { strike, plan }
    }

    /// Confidence × IV × vote guidance
    pub fn size_multiplier(&self, confidence: Confidence, iv_percentile: Option<f64>, guidance: f64) -> f64 {
        let confidence_factor = if confidence == Confidence::High { 1.0 } else { 0.8 };
        (confidence_factor * iv_factor(iv_percentile) * guidance).clamp(0.0, MAX_SIZE_MULTIPLIER)
    }

    pub fn stop_loss_pct(&self) -> f64 {
        self.sizing.stop_loss_pct.clamp(STOP_BOUNDS_PCT.0, STOP_BOUNDS_PCT.1)
    }

    pub fn target_pct(&self) -> f64 {
        self.sizing.target_pct
    }
}
