//! 📈 Tick Inputs
//!
//! Immutable, already-fetched inputs for one evaluation tick of one underlying:
//! market context, option-chain rows, volatility context and account state.
//!
//! Structural problems (unknown underlying, unknown enum values, NaN, negative
//! prices) are rejected here as `ValidationError`. Values that are merely absent
//! stay `None` and are judged later by the data-quality guard.

use crate::error::ValidationError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ceiling for any price or strike; keeps strike arithmetic inside i64
pub const MAX_PRICE: f64 = 1e9;

/// Tradable index underlyings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Underlying {
    #[serde(rename = "NIFTY50")]
    Nifty50,
    #[serde(rename = "BANKNIFTY")]
    BankNifty,
    #[serde(rename = "SENSEX")]
    Sensex,
}

impl Underlying {
    pub const ALL: [Underlying; 3] = [Underlying::Nifty50, Underlying::BankNifty, Underlying::Sensex];

    /// Stable arena index (0..3)
    pub fn index(self) -> usize {
        match self {
            Underlying::Nifty50 => 0,
            Underlying::BankNifty => 1,
            Underlying::Sensex => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Underlying::Nifty50 => "NIFTY50",
            Underlying::BankNifty => "BANKNIFTY",
            Underlying::Sensex => "SENSEX",
        }
    }
}

impl fmt::Display for Underlying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Underlying {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NIFTY50" | "NIFTY" => Ok(Underlying::Nifty50),
            "BANKNIFTY" => Ok(Underlying::BankNifty),
            "SENSEX" => Ok(Underlying::Sensex),
            _ => Err(ValidationError::UnknownUnderlying(s.to_string())),
        }
    }
}

impl TryFrom<String> for Underlying {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Intraday session phase as reported by the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum SessionPhase {
    #[serde(rename = "PRE_OPEN")]
    PreOpen,
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "MIDDAY")]
    Midday,
    #[serde(rename = "CLOSE")]
    Close,
}

impl FromStr for SessionPhase {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PRE_OPEN" | "PREOPEN" => Ok(SessionPhase::PreOpen),
            "OPEN" => Ok(SessionPhase::Open),
            "MIDDAY" => Ok(SessionPhase::Midday),
            "CLOSE" => Ok(SessionPhase::Close),
            _ => Err(ValidationError::UnknownSessionPhase(s.to_string())),
        }
    }
}

impl TryFrom<String> for SessionPhase {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Option leg type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum OptionType {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl FromStr for OptionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CE" | "CALL" => Ok(OptionType::Call),
            "PE" | "PUT" => Ok(OptionType::Put),
            _ => Err(ValidationError::UnknownOptionType(s.to_string())),
        }
    }
}

impl TryFrom<String> for OptionType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptionType::Call => "CE",
            OptionType::Put => "PE",
        })
    }
}

/// Underlying price snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    /// Exchange-local tick time
    pub timestamp: Option<NaiveDateTime>,
    pub underlying: Underlying,
    /// Last traded price
    pub ltp: Option<f64>,
    pub prev_close: Option<f64>,
    /// Feed-supplied change; derived from ltp/prev_close when absent
    #[serde(default)]
    pub change_pct: Option<f64>,
    pub session_phase: SessionPhase,
}

impl MarketContext {
    /// Change vs previous close in percent
    pub fn effective_change_pct(&self) -> Option<f64> {
        if let Some(change) = self.change_pct {
            return Some(change);
        }
        match (self.ltp, self.prev_close) {
            (Some(ltp), Some(prev)) if prev > 0.0 => Some((ltp - prev) / prev * 100.0),
            _ => None,
        }
    }
}

/// One option-chain row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChainRow {
    pub strike: i64,
    pub option_type: OptionType,
    pub ltp: Option<f64>,
    pub oi: Option<f64>,
    #[serde(default)]
    pub oi_change: f64,
    pub volume: Option<f64>,
    pub spread_bps: Option<f64>,
    #[serde(default)]
    pub delta: Option<f64>,
    #[serde(default)]
    pub gamma: Option<f64>,
    #[serde(default)]
    pub theta: Option<f64>,
    #[serde(default)]
    pub vega: Option<f64>,
}

impl OptionChainRow {
    /// Number of Greeks fields that are absent (0..=4)
    pub fn missing_greeks(&self) -> usize {
        [self.delta, self.gamma, self.theta, self.vega]
            .iter()
            .filter(|g| g.is_none())
            .count()
    }
}

/// Implied-volatility and straddle context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolatilityContext {
    #[serde(default)]
    pub iv_rank: Option<f64>,
    pub iv_percentile: Option<f64>,
    pub atm_straddle_price: Option<f64>,
    /// Upper breakout level for the underlying
    pub upper_band: Option<f64>,
    /// Lower breakout level for the underlying
    pub lower_band: Option<f64>,
}

/// An open paper position (for exposure control)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub underlying: Underlying,
    pub option_type: OptionType,
    pub strike: i64,
    pub quantity: u32,
    pub entry_premium: f64,
}

impl OpenPosition {
    pub fn notional(&self) -> f64 {
        self.quantity as f64 * self.entry_premium
    }
}

/// Account and per-account risk limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountContext {
    pub balance: f64,
    /// Percent, e.g. 2.0 = 2%
    pub max_daily_loss_pct: f64,
    /// Percent of balance risked per trade
    pub max_trade_risk_pct: f64,
    #[serde(default)]
    pub open_positions: Vec<OpenPosition>,
    pub daily_realized_pnl: f64,
}

impl AccountContext {
    /// Realized P&L as percent of balance (negative = drawdown)
    pub fn daily_pnl_pct(&self) -> f64 {
        self.daily_realized_pnl / self.balance * 100.0
    }

    /// Open-position notional as percent of balance
    pub fn exposure_pct(&self) -> f64 {
        let notional: f64 = self.open_positions.iter().map(OpenPosition::notional).sum();
        notional / self.balance * 100.0
    }
}

/// Scheduled macro/event window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    pub name: String,
    pub window_active: bool,
}

/// Rollout flags snapshot, passed through to the audit record untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub institutional_agent_enabled: bool,
    pub shadow_mode_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            institutional_agent_enabled: false,
            shadow_mode_enabled: true,
        }
    }
}

/// Complete input for one tick of one underlying
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickInput {
    pub market: MarketContext,
    #[serde(default)]
    pub chain: Vec<OptionChainRow>,
    #[serde(default)]
    pub volatility: VolatilityContext,
    pub account: AccountContext,
    #[serde(default)]
    pub event: Option<EventContext>,
    #[serde(default)]
    pub flags: FeatureFlags,
}

impl TickInput {
    /// Parse one JSON line and validate its structure
    pub fn from_json(line: &str) -> Result<Self, ValidationError> {
        let tick: TickInput =
            serde_json::from_str(line).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        tick.validate()?;
        Ok(tick)
    }

    pub fn underlying(&self) -> Underlying {
        self.market.underlying
    }

    /// Structural validation. Absent values pass; present values must be sane.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let m = &self.market;
        check_opt("market.ltp", m.ltp, 0.0, MAX_PRICE, "ltp in [0, 1e9]")?;
        check_opt("market.prev_close", m.prev_close, 0.0, MAX_PRICE, "prev_close in [0, 1e9]")?;
        check_opt("market.change_pct", m.change_pct, -100.0, f64::MAX, "change_pct >= -100")?;

        for row in &self.chain {
            check("chain.strike", row.strike as f64, 1.0, MAX_PRICE, "strike in [1, 1e9]")?;
            check_opt("chain.ltp", row.ltp, 0.0, MAX_PRICE, "premium in [0, 1e9]")?;
            check_opt("chain.oi", row.oi, 0.0, f64::MAX, "open interest >= 0")?;
            check("chain.oi_change", row.oi_change, f64::MIN, f64::MAX, "finite")?;
            check_opt("chain.volume", row.volume, 0.0, f64::MAX, "volume >= 0")?;
            check_opt("chain.spread_bps", row.spread_bps, 0.0, f64::MAX, "spread >= 0")?;
            check_opt("chain.delta", row.delta, -1.0, 1.0, "delta in [-1,1]")?;
            check_opt("chain.gamma", row.gamma, 0.0, f64::MAX, "gamma >= 0")?;
            check_opt("chain.theta", row.theta, f64::MIN, f64::MAX, "finite")?;
            check_opt("chain.vega", row.vega, 0.0, f64::MAX, "vega >= 0")?;
        }

        let v = &self.volatility;
        check_opt("volatility.iv_rank", v.iv_rank, 0.0, 100.0, "iv rank in [0,100]")?;
        check_opt("volatility.iv_percentile", v.iv_percentile, 0.0, 100.0, "iv percentile in [0,100]")?;
        check_opt("volatility.atm_straddle_price", v.atm_straddle_price, 0.0, f64::MAX, "straddle >= 0")?;
        check_opt("volatility.upper_band", v.upper_band, 0.0, f64::MAX, "band >= 0")?;
        check_opt("volatility.lower_band", v.lower_band, 0.0, f64::MAX, "band >= 0")?;

        let a = &self.account;
        check("account.balance", a.balance, f64::MIN_POSITIVE, f64::MAX, "balance > 0")?;
        check("account.max_daily_loss_pct", a.max_daily_loss_pct, 0.0, 100.0, "percent in [0,100]")?;
        check("account.max_trade_risk_pct", a.max_trade_risk_pct, 0.0, 100.0, "percent in [0,100]")?;
        check("account.daily_realized_pnl", a.daily_realized_pnl, f64::MIN, f64::MAX, "finite")?;
        for pos in &a.open_positions {
            check("position.entry_premium", pos.entry_premium, 0.0, f64::MAX, "premium >= 0")?;
        }

        Ok(())
    }
}

fn check(field: &'static str, value: f64, min: f64, max: f64, expected: &'static str) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite { field });
    }
    if value < min || value > max {
        return Err(ValidationError::OutOfRange { field, value, expected });
    }
    Ok(())
}

fn check_opt(
    field: &'static str,
    value: Option<f64>,
    min: f64,
    max: f64,
    expected: &'static str,
) -> Result<(), ValidationError> {
    match value {
        Some(v) => check(field, v, min, max, expected),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::NaiveDate;

    pub fn ts(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .expect("valid fixture timestamp")
    }

    pub fn row(strike: i64, option_type: OptionType, ltp: f64, delta: f64, oi_change: f64) -> OptionChainRow {
        OptionChainRow {
            strike,
            option_type,
            ltp: Some(ltp),
            oi: Some(50_000.0),
            oi_change,
            volume: Some(20_000.0),
            spread_bps: Some(12.0),
            delta: Some(delta),
            gamma: Some(0.002),
            theta: Some(-8.0),
            vega: Some(6.0),
        }
    }

    /// NIFTY50 tick (prev close 22_500) with a healthy chain of three
    /// strikes centred on the ATM strike of the moved price.
    /// `change_pct` drives momentum; the chain leans the same way.
    pub fn tick(change_pct: f64) -> TickInput {
        let prev_close = 22_500.0;
        let ltp = prev_close * (1.0 + change_pct / 100.0);
        let atm = (ltp / 50.0).round() as i64 * 50;
        let (call_oi, put_oi) = if change_pct >= 0.0 { (9_000.0, -4_000.0) } else { (-4_000.0, 9_000.0) };
        let upper = 22_500.0 + 120.0;
        let lower = 22_500.0 - 120.0;
        TickInput {
            market: MarketContext {
                timestamp: Some(ts(11, 15)),
                underlying: Underlying::Nifty50,
                ltp: Some(ltp),
                prev_close: Some(prev_close),
                change_pct: Some(change_pct),
                session_phase: SessionPhase::Midday,
            },
            chain: vec![
                row(atm - 50, OptionType::Call, 180.0, 0.62, call_oi),
                row(atm, OptionType::Call, 150.0, 0.55, call_oi),
                row(atm + 50, OptionType::Call, 120.0, 0.48, call_oi),
                row(atm - 50, OptionType::Put, 110.0, -0.40, put_oi),
                row(atm, OptionType::Put, 130.0, -0.47, put_oi),
                row(atm + 50, OptionType::Put, 160.0, -0.55, put_oi),
            ],
            volatility: VolatilityContext {
                iv_rank: Some(40.0),
                iv_percentile: Some(45.0),
                atm_straddle_price: Some(240.0),
                upper_band: Some(upper),
                lower_band: Some(lower),
            },
            account: AccountContext {
                balance: 1_000_000.0,
                max_daily_loss_pct: 2.0,
                max_trade_risk_pct: 1.0,
                open_positions: Vec::new(),
                daily_realized_pnl: 0.0,
            },
            event: None,
            flags: FeatureFlags::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_underlying_parsing() {
        assert_eq!("NIFTY50".parse::<Underlying>(), Ok(Underlying::Nifty50));
        assert_eq!("banknifty".parse::<Underlying>(), Ok(Underlying::BankNifty));
        assert!(matches!(
            "FINNIFTY".parse::<Underlying>(),
            Err(ValidationError::UnknownUnderlying(_))
        ));
    }

    #[test]
    fn test_change_pct_derived_when_absent() {
        let mut t = tick(0.0);
        t.market.change_pct = None;
        t.market.ltp = Some(22_725.0);
        let change = t.market.effective_change_pct().expect("derivable");
        assert!((change - 1.0).abs() < 1e-9);

        t.market.prev_close = Some(0.0);
        assert_eq!(t.market.effective_change_pct(), None);
    }

    #[test]
    fn test_validation_rejects_nan_and_ranges() {
        let mut t = tick(0.5);
        t.market.ltp = Some(f64::NAN);
        assert_eq!(t.validate(), Err(ValidationError::NonFinite { field: "market.ltp" }));

        let mut t = tick(0.5);
        t.volatility.iv_percentile = Some(140.0);
        assert!(matches!(t.validate(), Err(ValidationError::OutOfRange { field: "volatility.iv_percentile", .. })));

        let mut t = tick(0.5);
        t.account.balance = 0.0;
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_prices_above_ceiling() {
        let mut t = tick(0.5);
        t.market.ltp = Some(1e20);
        assert!(matches!(t.validate(), Err(ValidationError::OutOfRange { field: "market.ltp", .. })));

        let mut t = tick(0.5);
        t.market.prev_close = Some(MAX_PRICE * 2.0);
        assert!(matches!(t.validate(), Err(ValidationError::OutOfRange { field: "market.prev_close", .. })));

        let mut t = tick(0.5);
        t.market.ltp = Some(MAX_PRICE);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_validation_allows_absent_values() {
        let mut t = tick(0.5);
        t.market.timestamp = None;
        t.volatility.iv_percentile = None;
        t.chain[0].delta = None;
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_from_json_round_trip_and_unknown_enum() {
        let t = tick(0.86);
        let line = serde_json::to_string(&t).expect("serialize");
        let parsed = TickInput::from_json(&line).expect("parse");
        assert_eq!(parsed, t);

        let bad = line.replace("NIFTY50", "DOWJONES");
        match TickInput::from_json(&bad) {
            Err(ValidationError::Malformed(msg)) => assert!(msg.contains("DOWJONES")),
            other => panic!("expected malformed error, got {:?}", other),
        }
    }

    #[test]
    fn test_account_ratios() {
        let mut t = tick(0.0);
        t.account.daily_realized_pnl = -21_000.0;
        assert!((t.account.daily_pnl_pct() + 2.1).abs() < 1e-9);

        t.account.open_positions.push(OpenPosition {
            underlying: Underlying::BankNifty,
            option_type: OptionType::Put,
            strike: 48_000,
            quantity: 350,
            entry_premium: 200.0,
        });
        assert!((t.account.exposure_pct() - 7.0).abs() < 1e-9);
    }
}
