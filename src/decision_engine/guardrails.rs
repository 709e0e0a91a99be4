//! 🛡️ Risk Guardrails
//!
//! Pure predicates over account, market and option-chain state. These are the
//! highest-priority veto source: any failure forces NO_TRADE for the tick.
//!
//! Core guards, always evaluated in this order:
//! 1. data_quality_guard - critical fields present, ≥95% coverage of required fields
//! 2. daily_loss_guard - realized P&L not below -max_daily_loss_pct
//! 3. position_size_guard - at least one ATM leg can be sized to a full lot
//! 4. liquidity_guard - spread / OI / volume of the tradable legs
//!
//! The risk-officer checks (event_risk_guard, exposure_guard) live here too
//! but are raised through the vote channel, see `votes.rs`.

use crate::config::{EngineConfig, RiskConfig, SizingConfig, StrikeSteps};
use crate::decision_engine::decision::{GuardName, RiskCheck, RiskChecks};
use crate::decision_engine::position_sizer::{affordable_contracts, atm_strike, leg_premium};
use crate::market::{AccountContext, EventContext, OptionChainRow, OptionType, TickInput};
use log::debug;

/// Outcome of the event filter when it does not veto
#[derive(Debug, Clone, PartialEq)]
pub enum EventAssessment {
    /// No active event window
    Clear,
    /// Active window for an event outside the block list
    Noted(String),
}

/// Stateless evaluator for the core guards
#[derive(Debug, Clone)]
pub struct RiskGuardEvaluator {
    risk: RiskConfig,
    sizing: SizingConfig,
    steps: StrikeSteps,
}

impl RiskGuardEvaluator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            risk: config.risk.clone(),
            sizing: config.sizing.clone(),
            steps: config.strike_steps,
        }
    }

    /// Run the four core guards. Order is fixed so audit output is stable.
    pub fn evaluate(&self, tick: &TickInput) -> RiskChecks {
        let checks = RiskChecks::new(vec![
            RiskCheck::from_result(GuardName::DataQualityGuard, self.check_data_quality(tick)),
            RiskCheck::from_result(GuardName::DailyLossGuard, self.check_daily_loss(&tick.account)),
            RiskCheck::from_result(GuardName::PositionSizeGuard, self.check_position_size(tick)),
            RiskCheck::from_result(GuardName::LiquidityGuard, self.check_liquidity(tick)),
        ]);

        for check in checks.iter().filter(|c| c.failed()) {
            debug!(
                "🛡️ {} {} failed: {}",
                tick.underlying(),
                check.guard.as_str(),
                check.reason.as_deref().unwrap_or("-")
            );
        }
        checks
    }

    /// Critical fields must be present; overall coverage of the declared
    /// required-field list must reach `min_field_coverage`.
    pub fn check_data_quality(&self, tick: &TickInput) -> Result<(), String> {
        let m = &tick.market;
        if m.timestamp.is_none() {
            return Err("missing timestamp".to_string());
        }
        match m.ltp {
            Some(ltp) if ltp > 0.0 => {}
            _ => return Err("missing or non-positive ltp".to_string()),
        }
        match m.prev_close {
            Some(pc) if pc > 0.0 => {}
            _ => return Err("missing or non-positive prev_close".to_string()),
        }
        if tick.chain.is_empty() {
            return Err("option chain is empty".to_string());
        }

        let (present, total) = required_field_coverage(tick);
        let coverage = present as f64 / total as f64;
        if coverage < self.risk.min_field_coverage {
            return Err(format!(
                "field coverage {:.1}% below {:.1}% ({}/{} present)",
                coverage * 100.0,
                self.risk.min_field_coverage * 100.0,
                present,
                total
            ));
        }
        Ok(())
    }

    pub fn check_daily_loss(&self, account: &AccountContext) -> Result<(), String> {
        let pnl_pct = account.daily_pnl_pct();
        if pnl_pct < -account.max_daily_loss_pct {
            return Err(format!(
                "daily P&L {:.2}% breaches -{:.2}% limit",
                pnl_pct, account.max_daily_loss_pct
            ));
        }
        Ok(())
    }

    /// Pre-arbitration: direction is unknown, so the cheaper ATM leg must size
    /// to a lot. The traded leg is re-checked by the sizer after arbitration.
    pub fn check_position_size(&self, tick: &TickInput) -> Result<(), String> {
        let ltp = tick.market.ltp.ok_or_else(|| "no reference price for sizing".to_string())?;
        let underlying = tick.underlying();
        let atm = atm_strike(ltp, self.steps.step(underlying));

        let premium = [OptionType::Call, OptionType::Put]
            .iter()
            .filter_map(|&t| leg_premium(&tick.chain, atm, t))
            .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.min(p))))
            .ok_or_else(|| format!("no priced ATM leg at strike {}", atm))?;

        let lot = self.sizing.lot_sizes.lot(underlying);
        let contracts = affordable_contracts(&tick.account, premium, self.sizing.stop_loss_pct);
        if contracts < lot {
            return Err(format!(
                "{} contracts affordable at premium {:.2}, minimum lot is {}",
                contracts, premium, lot
            ));
        }
        Ok(())
    }

    /// Legs within one strike step of ATM must all be liquid
    pub fn check_liquidity(&self, tick: &TickInput) -> Result<(), String> {
        let ltp = tick.market.ltp.ok_or_else(|| "no reference price for liquidity".to_string())?;
        let step = self.steps.step(tick.underlying());
        let atm = atm_strike(ltp, step);

        let mut candidates = tick
            .chain
            .iter()
            .filter(|r| (r.strike - atm).abs() <= step)
            .peekable();
        if candidates.peek().is_none() {
            return Err(format!("no tradable strikes around {}", atm));
        }

        for row in candidates {
            if let Err(reason) = self.row_liquidity(row) {
                return Err(format!("{}{} {}", row.strike, row.option_type, reason));
            }
        }
        Ok(())
    }

    /// Single-row liquidity thresholds (missing values fail)
    pub fn row_liquidity(&self, row: &OptionChainRow) -> Result<(), String> {
        let r = &self.risk;
        match row.spread_bps {
            Some(s) if s <= r.max_spread_bps => {}
            Some(s) => return Err(format!("spread {:.1}bps > {:.1}bps", s, r.max_spread_bps)),
            None => return Err("spread missing".to_string()),
        }
        match row.oi {
            Some(oi) if oi >= r.min_oi => {}
            Some(oi) => return Err(format!("OI {:.0} < {:.0}", oi, r.min_oi)),
            None => return Err("OI missing".to_string()),
        }
        match row.volume {
            Some(v) if v >= r.min_volume => {}
            Some(v) => return Err(format!("volume {:.0} < {:.0}", v, r.min_volume)),
            None => return Err("volume missing".to_string()),
        }
        Ok(())
    }

    /// Share of chain rows that clear every liquidity threshold
    pub fn liquid_fraction(&self, chain: &[OptionChainRow]) -> f64 {
        if chain.is_empty() {
            return 0.0;
        }
        let liquid = chain.iter().filter(|r| self.row_liquidity(r).is_ok()).count();
        liquid as f64 / chain.len() as f64
    }

    /// Block-listed event inside its window vetoes; anything else only annotates
    pub fn check_event_risk(&self, event: Option<&EventContext>) -> Result<EventAssessment, String> {
        let event = match event {
            Some(e) if e.window_active => e,
            _ => return Ok(EventAssessment::Clear),
        };
        let name = event.name.to_uppercase();
        let blocked = self
            .risk
            .high_risk_events
            .iter()
            .any(|h| name.contains(&h.to_uppercase()));
        if blocked {
            return Err(format!("high-risk event window active: {}", event.name));
        }
        Ok(EventAssessment::Noted(event.name.clone()))
    }

    /// Open exposure at or above the cap vetoes
    pub fn check_exposure(&self, account: &AccountContext) -> Result<(), String> {
        let exposure = account.exposure_pct();
        if exposure >= self.risk.max_portfolio_exposure_pct {
            return Err(format!(
                "portfolio exposure {:.1}% at or above {:.1}% cap",
                exposure, self.risk.max_portfolio_exposure_pct
            ));
        }
        Ok(())
    }

    /// Exposure close enough to the cap that size should taper
    pub fn exposure_near_cap(&self, account: &AccountContext) -> bool {
        account.exposure_pct() >= self.risk.max_portfolio_exposure_pct * self.risk.exposure_taper_ratio
    }
}

/// (present, total) over the declared required-field list
fn required_field_coverage(tick: &TickInput) -> (usize, usize) {
    let m = &tick.market;
    let v = &tick.volatility;
    let mut fields = vec![
        m.timestamp.is_some(),
        m.ltp.is_some(),
        m.prev_close.is_some(),
        v.iv_percentile.is_some(),
        v.atm_straddle_price.is_some(),
        v.upper_band.is_some(),
        v.lower_band.is_some(),
    ];
    for row in &tick.chain {
        fields.extend([row.ltp.is_some(), row.oi.is_some(), row.volume.is_some(), row.spread_bps.is_some()]);
    }
    let present = fields.iter().filter(|&&f| f).count();
    (present, fields.len())
}
