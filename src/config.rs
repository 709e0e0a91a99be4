//! Configuration management for the decision engine
//!
//! Loads configuration from environment variables (via .env file) and provides
//! validated, type-safe access to every threshold, weight and cap the engine uses.
//! There are no free-form key/value maps: each knob is a named field.

use crate::market::Underlying;
use anyhow::{Context, Result};
use chrono::NaiveTime;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Complete configuration for the replay service
#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Everything the decision pipeline needs, per component
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub signal: SignalConfig,
    pub options: OptionsConfig,
    pub risk: RiskConfig,
    pub session: SessionConfig,
    pub consensus: ConsensusConfig,
    pub sizing: SizingConfig,
    pub strike_steps: StrikeSteps,
    /// Stamped on every decision
    pub model_version: String,
}

/// Momentum and regime thresholds (percent change vs previous close)
#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub bullish_threshold: f64,
    pub bearish_threshold: f64,
    pub strong_move_threshold: f64,
    /// Minimum memory entries before the trend feature may shift confidence
    pub trend_min_samples: usize,
    /// |average recent change| needed to shift confidence one tier
    pub trend_shift_threshold: f64,
    /// |trend strength| and |change| for a TREND regime
    pub regime_trend_strength: f64,
    pub regime_trend_move: f64,
    /// |trend strength| and |change| ceilings for MEAN_REVERSION
    pub mean_reversion_strength: f64,
    pub mean_reversion_move: f64,
}

/// Options-structure scoring
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsConfig {
    pub greeks_weight: f64,
    pub volatility_weight: f64,
    pub liquidity_weight: f64,
    pub straddle_weight: f64,
    /// Composite score needed for a directional options vote
    pub min_directional_score: f64,
    /// Composite score for HIGH options confidence
    pub high_confidence_score: f64,
    /// Above this fraction of missing Greeks the options vote vetoes
    pub max_missing_greeks_fraction: f64,
}

/// Hard risk policy
#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub max_spread_bps: f64,
    pub min_oi: f64,
    pub min_volume: f64,
    /// Required non-null ratio across the declared required-field list
    pub min_field_coverage: f64,
    pub max_portfolio_exposure_pct: f64,
    /// Fraction of the exposure cap above which size is halved
    pub exposure_taper_ratio: f64,
    /// Event names that block trading while their window is active
    pub high_risk_events: Vec<String>,
}

/// How a cooldown expires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownWindow {
    Ticks(u32),
    Seconds(i64),
}

/// Session halt / cooldown / blackout policy
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Drawdown (percent of balance) that halts the session
    pub halt_drawdown_pct: f64,
    pub loss_streak_limit: u32,
    pub cooldown: CooldownWindow,
    pub session_close: NaiveTime,
    pub closing_blackout_mins: u32,
}

/// Vote weights and arbitration thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusConfig {
    pub momentum_weight: f64,
    pub options_weight: f64,
    pub regime_weight: f64,
    pub risk_officer_weight: f64,
    pub execution_planner_weight: f64,
    /// |net score| below this is NO_TRADE
    pub strength_threshold: f64,
    /// |net| / max ratio for HIGH confidence
    pub high_ratio: f64,
    /// |net| / max ratio for MEDIUM confidence
    pub medium_ratio: f64,
}

/// Stop/target policy and lot sizes
#[derive(Debug, Clone, PartialEq)]
pub struct SizingConfig {
    /// Stop as percent of premium, bounded to [8, 20]
    pub stop_loss_pct: f64,
    /// Target as percent of premium, must be >= 1.5R
    pub target_pct: f64,
    pub lot_sizes: LotSizes,
}

/// Minimum tradable lot per underlying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotSizes {
    pub nifty50: u32,
    pub banknifty: u32,
    pub sensex: u32,
}

impl LotSizes {
    pub fn lot(&self, underlying: Underlying) -> u32 {
        match underlying {
            Underlying::Nifty50 => self.nifty50,
            Underlying::BankNifty => self.banknifty,
            Underlying::Sensex => self.sensex,
        }
    }
}

/// Strike increment per underlying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikeSteps {
    pub nifty50: i64,
    pub banknifty: i64,
    pub sensex: i64,
}

impl StrikeSteps {
    pub fn step(&self, underlying: Underlying) -> i64 {
        match underlying {
            Underlying::Nifty50 => self.nifty50,
            Underlying::BankNifty => self.banknifty,
            Underlying::Sensex => self.sensex,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Path to the JSON-lines decision audit log
    pub audit_log_path: PathBuf,
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signal: SignalConfig {
                bullish_threshold: 0.30,
                bearish_threshold: -0.30,
                strong_move_threshold: 0.60,
                trend_min_samples: 3,
                trend_shift_threshold: 0.15,
                regime_trend_strength: 0.65,
                regime_trend_move: 0.35,
                mean_reversion_strength: 0.25,
                mean_reversion_move: 0.20,
            },
            options: OptionsConfig {
                greeks_weight: 0.35,
                volatility_weight: 0.25,
                liquidity_weight: 0.25,
                straddle_weight: 0.15,
                min_directional_score: 55.0,
                high_confidence_score: 70.0,
                max_missing_greeks_fraction: 0.5,
            },
            risk: RiskConfig {
                max_spread_bps: 50.0,
                min_oi: 1000.0,
                min_volume: 500.0,
                min_field_coverage: 0.95,
                max_portfolio_exposure_pct: 35.0,
                exposure_taper_ratio: 0.85,
                high_risk_events: vec![
                    "RBI".to_string(),
                    "FED".to_string(),
                    "CPI".to_string(),
                    "EARNINGS".to_string(),
                ],
            },
            session: SessionConfig {
                halt_drawdown_pct: 2.0,
                loss_streak_limit: 3,
                cooldown: CooldownWindow::Ticks(5),
                session_close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
                closing_blackout_mins: 15,
            },
            consensus: ConsensusConfig {
                momentum_weight: 0.45,
                options_weight: 0.55,
                regime_weight: 0.20,
                risk_officer_weight: 0.0,
                execution_planner_weight: 0.0,
                strength_threshold: 0.50,
                high_ratio: 0.80,
                medium_ratio: 0.50,
            },
            sizing: SizingConfig {
                stop_loss_pct: 12.0,
                target_pct: 24.0,
                lot_sizes: LotSizes {
                    nifty50: 75,
                    banknifty: 35,
                    sensex: 20,
                },
            },
            strike_steps: StrikeSteps {
                nifty50: 50,
                banknifty: 100,
                sensex: 100,
            },
            model_version: "institutional_desk_v1".to_string(),
        }
    }
}

impl EngineConfig {
    /// Sum of the four options sub-score weights
    pub fn options_weight_sum(&self) -> f64 {
        let o = &self.options;
        o.greeks_weight + o.volatility_weight + o.liquidity_weight + o.straddle_weight
    }

    /// Validate configuration values are within acceptable ranges
    pub fn validate(&self) -> Result<()> {
        // Momentum thresholds
        let s = &self.signal;
        if s.bullish_threshold <= 0.0 {
            anyhow::bail!("BULLISH_THRESHOLD must be > 0");
        }
        if s.bearish_threshold >= 0.0 {
            anyhow::bail!("BEARISH_THRESHOLD must be < 0");
        }
        if s.strong_move_threshold < s.bullish_threshold || s.strong_move_threshold < -s.bearish_threshold {
            anyhow::bail!("STRONG_MOVE_THRESHOLD must be >= both directional thresholds");
        }

        // Options weights
        let o = &self.options;
        for (name, w) in [
            ("GREEKS_WEIGHT", o.greeks_weight),
            ("VOLATILITY_WEIGHT", o.volatility_weight),
            ("LIQUIDITY_WEIGHT", o.liquidity_weight),
            ("STRADDLE_WEIGHT", o.straddle_weight),
        ] {
            if !(0.0..=1.0).contains(&w) {
                anyhow::bail!("{} must be between 0.0 and 1.0", name);
            }
        }
        let sum = self.options_weight_sum();
        if (sum - 1.0).abs() > 1e-9 {
            anyhow::bail!("Options weights must sum to 1.0 (got {:.6})", sum);
        }
        if !(0.0..=1.0).contains(&o.max_missing_greeks_fraction) {
            anyhow::bail!("MAX_MISSING_GREEKS_FRACTION must be between 0.0 and 1.0");
        }
        if o.high_confidence_score < o.min_directional_score {
            anyhow::bail!("OPTIONS_HIGH_CONFIDENCE_SCORE must be >= OPTIONS_MIN_DIRECTIONAL_SCORE");
        }

        // Risk policy
        let r = &self.risk;
        if r.min_field_coverage <= 0.0 || r.min_field_coverage > 1.0 {
            anyhow::bail!("MIN_FIELD_COVERAGE must be in (0.0, 1.0]");
        }
        if r.max_spread_bps < 0.0 || r.min_oi < 0.0 || r.min_volume < 0.0 {
            anyhow::bail!("Liquidity floors and spread ceiling must be >= 0");
        }
        if r.max_portfolio_exposure_pct <= 0.0 {
            anyhow::bail!("MAX_PORTFOLIO_EXPOSURE_PCT must be > 0");
        }

        // Session
        let ss = &self.session;
        if ss.halt_drawdown_pct <= 0.0 {
            anyhow::bail!("HALT_DRAWDOWN_PCT must be > 0");
        }
        if ss.loss_streak_limit == 0 {
            anyhow::bail!("LOSS_STREAK_LIMIT must be > 0");
        }

        // Consensus
        let c = &self.consensus;
        for (name, w) in [
            ("MOMENTUM_WEIGHT", c.momentum_weight),
            ("OPTIONS_VOTE_WEIGHT", c.options_weight),
            ("REGIME_WEIGHT", c.regime_weight),
            ("RISK_OFFICER_WEIGHT", c.risk_officer_weight),
            ("EXECUTION_PLANNER_WEIGHT", c.execution_planner_weight),
        ] {
            if !(0.0..=1.0).contains(&w) {
                anyhow::bail!("{} must be between 0.0 and 1.0", name);
            }
        }
        if c.strength_threshold <= 0.0 {
            anyhow::bail!("CONSENSUS_STRENGTH_THRESHOLD must be > 0");
        }
        if c.medium_ratio > c.high_ratio {
            anyhow::bail!("CONSENSUS_MEDIUM_RATIO cannot exceed CONSENSUS_HIGH_RATIO");
        }

        // Stop / target (1.5R)
        let z = &self.sizing;
        if !(8.0..=20.0).contains(&z.stop_loss_pct) {
            anyhow::bail!("STOP_LOSS_PCT must be between 8 and 20 (got {})", z.stop_loss_pct);
        }
        if z.target_pct < 1.5 * z.stop_loss_pct {
            anyhow::bail!(
                "TARGET_PCT {} violates 1.5R (needs >= {})",
                z.target_pct,
                1.5 * z.stop_loss_pct
            );
        }
        for u in Underlying::ALL {
            if z.lot_sizes.lot(u) == 0 {
                anyhow::bail!("Lot size for {} must be > 0", u);
            }
            if self.strike_steps.step(u) <= 0 {
                anyhow::bail!("Strike step for {} must be > 0", u);
            }
        }

        if self.model_version.is_empty() {
            anyhow::bail!("MODEL_VERSION must be set");
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Reads a .env file in the working directory if present. Every key has a
    /// default; a key that is set but unparsable is an error.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (ignoring error if not found)
        let _ = dotenv::dotenv();

        let d = EngineConfig::default();

        let cooldown = match env::var("COOLDOWN_SECS").ok() {
            Some(raw) => CooldownWindow::Seconds(
                raw.parse().context("Invalid COOLDOWN_SECS value")?,
            ),
            None => {
                let ticks = match d.session.cooldown {
                    CooldownWindow::Ticks(t) => t,
                    CooldownWindow::Seconds(_) => 5,
                };
                CooldownWindow::Ticks(get_env("COOLDOWN_TICKS", ticks)?)
            }
        };

        let session_close = match env::var("SESSION_CLOSE").ok() {
            Some(raw) => NaiveTime::parse_from_str(&raw, "%H:%M")
                .context("Invalid SESSION_CLOSE value (expected HH:MM)")?,
            None => d.session.session_close,
        };

        let high_risk_events = match env::var("HIGH_RISK_EVENTS").ok() {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => d.risk.high_risk_events.clone(),
        };

        let engine = EngineConfig {
            signal: SignalConfig {
                bullish_threshold: get_env("BULLISH_THRESHOLD", d.signal.bullish_threshold)?,
                bearish_threshold: get_env("BEARISH_THRESHOLD", d.signal.bearish_threshold)?,
                strong_move_threshold: get_env("STRONG_MOVE_THRESHOLD", d.signal.strong_move_threshold)?,
                trend_min_samples: get_env("TREND_MIN_SAMPLES", d.signal.trend_min_samples)?,
                trend_shift_threshold: get_env("TREND_SHIFT_THRESHOLD", d.signal.trend_shift_threshold)?,
                regime_trend_strength: get_env("REGIME_TREND_STRENGTH", d.signal.regime_trend_strength)?,
                regime_trend_move: get_env("REGIME_TREND_MOVE", d.signal.regime_trend_move)?,
                mean_reversion_strength: get_env("MEAN_REVERSION_STRENGTH", d.signal.mean_reversion_strength)?,
                mean_reversion_move: get_env("MEAN_REVERSION_MOVE", d.signal.mean_reversion_move)?,
            },
            options: OptionsConfig {
                greeks_weight: get_env("GREEKS_WEIGHT", d.options.greeks_weight)?,
                volatility_weight: get_env("VOLATILITY_WEIGHT", d.options.volatility_weight)?,
                liquidity_weight: get_env("LIQUIDITY_WEIGHT", d.options.liquidity_weight)?,
                straddle_weight: get_env("STRADDLE_WEIGHT", d.options.straddle_weight)?,
                min_directional_score: get_env("OPTIONS_MIN_DIRECTIONAL_SCORE", d.options.min_directional_score)?,
                high_confidence_score: get_env("OPTIONS_HIGH_CONFIDENCE_SCORE", d.options.high_confidence_score)?,
                max_missing_greeks_fraction: get_env(
                    "MAX_MISSING_GREEKS_FRACTION",
                    d.options.max_missing_greeks_fraction,
                )?,
            },
            risk: RiskConfig {
                max_spread_bps: get_env("MAX_SPREAD_BPS", d.risk.max_spread_bps)?,
                min_oi: get_env("MIN_OI", d.risk.min_oi)?,
                min_volume: get_env("MIN_VOLUME", d.risk.min_volume)?,
                min_field_coverage: get_env("MIN_FIELD_COVERAGE", d.risk.min_field_coverage)?,
                max_portfolio_exposure_pct: get_env("MAX_PORTFOLIO_EXPOSURE_PCT", d.risk.max_portfolio_exposure_pct)?,
                exposure_taper_ratio: get_env("EXPOSURE_TAPER_RATIO", d.risk.exposure_taper_ratio)?,
                high_risk_events,
            },
            session: SessionConfig {
                halt_drawdown_pct: get_env("HALT_DRAWDOWN_PCT", d.session.halt_drawdown_pct)?,
                loss_streak_limit: get_env("LOSS_STREAK_LIMIT", d.session.loss_streak_limit)?,
                cooldown,
                session_close,
                closing_blackout_mins: get_env("CLOSING_BLACKOUT_MINS", d.session.closing_blackout_mins)?,
            },
            consensus: ConsensusConfig {
                momentum_weight: get_env("MOMENTUM_WEIGHT", d.consensus.momentum_weight)?,
                options_weight: get_env("OPTIONS_VOTE_WEIGHT", d.consensus.options_weight)?,
                regime_weight: get_env("REGIME_WEIGHT", d.consensus.regime_weight)?,
                risk_officer_weight: get_env("RISK_OFFICER_WEIGHT", d.consensus.risk_officer_weight)?,
                execution_planner_weight: get_env("EXECUTION_PLANNER_WEIGHT", d.consensus.execution_planner_weight)?,
                strength_threshold: get_env("CONSENSUS_STRENGTH_THRESHOLD", d.consensus.strength_threshold)?,
                high_ratio: get_env("CONSENSUS_HIGH_RATIO", d.consensus.high_ratio)?,
                medium_ratio: get_env("CONSENSUS_MEDIUM_RATIO", d.consensus.medium_ratio)?,
            },
            sizing: SizingConfig {
                stop_loss_pct: get_env("STOP_LOSS_PCT", d.sizing.stop_loss_pct)?,
                target_pct: get_env("TARGET_PCT", d.sizing.target_pct)?,
                lot_sizes: LotSizes {
                    nifty50: get_env("LOT_SIZE_NIFTY50", d.sizing.lot_sizes.nifty50)?,
                    banknifty: get_env("LOT_SIZE_BANKNIFTY", d.sizing.lot_sizes.banknifty)?,
                    sensex: get_env("LOT_SIZE_SENSEX", d.sizing.lot_sizes.sensex)?,
                },
            },
            strike_steps: StrikeSteps {
                nifty50: get_env("STRIKE_STEP_NIFTY50", d.strike_steps.nifty50)?,
                banknifty: get_env("STRIKE_STEP_BANKNIFTY", d.strike_steps.banknifty)?,
                sensex: get_env("STRIKE_STEP_SENSEX", d.strike_steps.sensex)?,
            },
            model_version: get_env_string("MODEL_VERSION", &d.model_version),
        };

        Ok(Config {
            engine,
            logging: LoggingConfig {
                audit_log_path: PathBuf::from(get_env_string("AUDIT_LOG_PATH", "./data/decisions.jsonl")),
                log_level: get_env_string("LOG_LEVEL", "info"),
            },
        })
    }

    /// Validate the whole service configuration
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        if self.logging.audit_log_path.as_os_str().is_empty() {
            anyhow::bail!("AUDIT_LOG_PATH must be set");
        }
        Ok(())
    }
}

// Helper functions for environment variable parsing

fn get_env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .ok()
            .with_context(|| format!("Invalid {} value: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.options_weight_sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_strike_steps_are_per_underlying() {
        let steps = EngineConfig::default().strike_steps;
        assert_eq!(steps.step(Underlying::Nifty50), 50);
        assert_eq!(steps.step(Underlying::BankNifty), 100);
        assert_eq!(steps.step(Underlying::Sensex), 100);
    }

    #[test]
    fn test_config_validation_weights_must_sum_to_one() {
        let mut config = EngineConfig::default();
        config.options.greeks_weight = 0.40;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_stop_bounds() {
        let mut config = EngineConfig::default();
        config.sizing.stop_loss_pct = 25.0;
        config.sizing.target_pct = 50.0;
        assert!(config.validate().is_err());

        config.sizing.stop_loss_pct = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_target_must_be_one_and_half_r() {
        let mut config = EngineConfig::default();
        config.sizing.stop_loss_pct = 12.0;
        config.sizing.target_pct = 17.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("1.5R"));

        config.sizing.target_pct = 18.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_thresholds() {
        let mut config = EngineConfig::default();
        config.signal.bearish_threshold = 0.1;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.signal.strong_move_threshold = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_strike_step() {
        let mut config = EngineConfig::default();
        config.strike_steps.sensex = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[ignore] // Mutates process env: cargo test test_env_var_override -- --ignored
    fn test_env_var_override() {
        env::set_var("BULLISH_THRESHOLD", "0.45");
        env::set_var("COOLDOWN_SECS", "600");
        let config = Config::from_env().expect("Failed to load config");
        assert_eq!(config.engine.signal.bullish_threshold, 0.45);
        assert_eq!(config.engine.session.cooldown, CooldownWindow::Seconds(600));
        env::remove_var("BULLISH_THRESHOLD");
        env::remove_var("COOLDOWN_SECS");

        env::set_var("STOP_LOSS_PCT", "not-a-number");
        assert!(Config::from_env().is_err());
        env::remove_var("STOP_LOSS_PCT");
    }
}
