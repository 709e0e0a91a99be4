//! 📊 Options Structure Scoring
//!
//! Computes a 0-100 options-structure score from four sub-scores:
//! - 35% Greeks (delta strength and OI-flow agreement on the biased side)
//! - 25% Volatility (IV percentile bucket)
//! - 25% Liquidity (share of chain rows clearing spread/OI/volume floors)
//! - 15% Straddle breakout (price outside the ATM straddle bands)
//!
//! The bias comes from a straddle breakout when there is one, else from the
//! sign of the delta-weighted OI change across the chain.

use crate::config::{EngineConfig, OptionsConfig};
use crate::decision_engine::decision::{Action, Confidence};
use crate::decision_engine::guardrails::RiskGuardEvaluator;
use crate::error::InvariantViolation;
use crate::market::{OptionChainRow, OptionType, TickInput};
use log::debug;
use serde::{Deserialize, Serialize};

/// Tolerance when checking the weights sum
const WEIGHT_EPSILON: f64 = 1e-9;

/// Greeks sub-score when the chain has no directional lean
const NEUTRAL_GREEKS_SCORE: f64 = 25.0;

/// Sub-scores, each 0-100
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionsSubScores {
    pub greeks: f64,
    pub volatility: f64,
    pub liquidity: f64,
    pub straddle: f64,
}

impl OptionsSubScores {
    pub fn breakdown(&self) -> String {
        format!(
            "greeks={:.1} vol={:.1} liq={:.1} straddle={:.1}",
            self.greeks, self.volatility, self.liquidity, self.straddle
        )
    }
}

/// Composite weights; must sum to 1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionsWeights {
    pub greeks: f64,
    pub volatility: f64,
    pub liquidity: f64,
    pub straddle: f64,
}

impl OptionsWeights {
    pub fn from_config(config: &OptionsConfig) -> Self {
        Self {
            greeks: config.greeks_weight,
            volatility: config.volatility_weight,
            liquidity: config.liquidity_weight,
            straddle: config.straddle_weight,
        }
    }

    pub fn sum(&self) -> f64 {
        self.greeks + self.volatility + self.liquidity + self.straddle
    }
}

/// Weighted composite. Errors if the weights or any sub-score break their range.
pub fn weighted_score(sub: &OptionsSubScores, weights: &OptionsWeights) -> Result<f64, InvariantViolation> {
    let sum = weights.sum();
    if (sum - 1.0).abs() > WEIGHT_EPSILON {
        return Err(InvariantViolation::WeightsDoNotSumToOne(sum));
    }
    for (name, value) in [
        ("greeks", sub.greeks),
        ("volatility", sub.volatility),
        ("liquidity", sub.liquidity),
        ("straddle", sub.straddle),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(InvariantViolation::ScoreOutOfRange { name, value });
        }
    }
    let score = weights.greeks * sub.greeks
        + weights.volatility * sub.volatility
        + weights.liquidity * sub.liquidity
        + weights.straddle * sub.straddle;
    // Rounding can leave the composite a hair outside the band
    Ok(score.clamp(0.0, 100.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl Bias {
    pub fn action(&self) -> Action {
        match self {
            Bias::Bullish => Action::BuyCall,
            Bias::Bearish => Action::BuyPut,
            Bias::Neutral => Action::NoTrade,
        }
    }

    fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Bias::Bullish
        } else if value < 0.0 {
            Bias::Bearish
        } else {
            Bias::Neutral
        }
    }
}

/// Full options-structure verdict for one tick
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsAssessment {
    pub sub_scores: OptionsSubScores,
    pub composite: f64,
    pub bias: Bias,
    pub breakout: bool,
    pub action: Action,
    pub confidence: Confidence,
    pub missing_greeks_fraction: f64,
    /// Set when too many Greeks are missing to trust the structure
    pub data_veto: Option<String>,
}

pub struct OptionsStructureScorer {
    config: OptionsConfig,
    weights: OptionsWeights,
    bullish_threshold: f64,
    guards: RiskGuardEvaluator,
}

impl OptionsStructureScorer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.options.clone(),
            weights: OptionsWeights::from_config(&config.options),
            bullish_threshold: config.signal.bullish_threshold,
            guards: RiskGuardEvaluator::new(config),
        }
    }

    pub fn assess(&self, tick: &TickInput, change_pct: f64) -> Result<OptionsAssessment, InvariantViolation> {
        let breakout = straddle_breakout(tick);
        let bias = match breakout {
            Some(b) => b,
            None => Bias::from_sign(oi_flow(&tick.chain)),
        };

        let sub_scores = OptionsSubScores {
            greeks: self.greeks_score(&tick.chain, bias),
            volatility: volatility_score(tick.volatility.iv_percentile.or(tick.volatility.iv_rank)),
            liquidity: 20.0 + 60.0 * self.guards.liquid_fraction(&tick.chain),
            straddle: self.straddle_score(tick, breakout.is_some(), change_pct),
        };
        let composite = weighted_score(&sub_scores, &self.weights)?;

        let missing_greeks_fraction = missing_greeks_fraction(&tick.chain);
        let data_veto = (missing_greeks_fraction > self.config.max_missing_greeks_fraction).then(|| {
            format!(
                "{:.0}% of Greeks missing (max {:.0}%)",
                missing_greeks_fraction * 100.0,
                self.config.max_missing_greeks_fraction * 100.0
            )
        });

        let (mut action, mut confidence) = if bias == Bias::Neutral || composite < self.config.min_directional_score {
            (Action::NoTrade, Confidence::Low)
        } else if composite >= self.config.high_confidence_score {
            (bias.action(), Confidence::High)
        } else {
            (bias.action(), Confidence::Medium)
        };
        if missing_greeks_fraction > 0.0 {
            confidence = confidence.down();
        }
        if confidence == Confidence::Low || data_veto.is_some() {
            action = Action::NoTrade;
        }

        debug!(
            "📊 options {:.1} ({}) bias={:?} breakout={} → {} {}",
            composite,
            sub_scores.breakdown(),
            bias,
            breakout.is_some(),
            action.as_str(),
            confidence.as_str()
        );

        Ok(OptionsAssessment {
            sub_scores,
            composite,
            bias,
            breakout: breakout.is_some(),
            action,
            confidence,
            missing_greeks_fraction,
            data_veto,
        })
    }

    /// Delta strength (60) plus OI-flow agreement (40) on the biased side
    fn greeks_score(&self, chain: &[OptionChainRow], bias: Bias) -> f64 {
        let side = match bias {
            Bias::Bullish => OptionType::Call,
            Bias::Bearish => OptionType::Put,
            Bias::Neutral => return NEUTRAL_GREEKS_SCORE,
        };
        let bias_sign = if bias == Bias::Bullish { 1.0 } else { -1.0 };

        let deltas: Vec<f64> = chain
            .iter()
            .filter(|r| r.option_type == side)
            .filter_map(|r| r.delta)
            .collect();
        let delta_part = if deltas.is_empty() {
            0.0
        } else {
            let avg = deltas.iter().sum::<f64>() / deltas.len() as f64;
            (avg.abs() / 0.5).min(1.0) * 60.0
        };

        let flows: Vec<f64> = chain
            .iter()
            .filter_map(|r| r.delta.map(|d| d * r.oi_change))
            .filter(|f| *f != 0.0)
            .collect();
        let flow_part = if flows.is_empty() {
            0.0
        } else {
            let agreeing = flows.iter().filter(|f| f.signum() == bias_sign).count();
            agreeing as f64 / flows.len() as f64 * 40.0
        };

        (delta_part + flow_part).clamp(0.0, 100.0)
    }

    fn straddle_score(&self, tick: &TickInput, breakout: bool, change_pct: f64) -> f64 {
        let v = &tick.volatility;
        let has_structure = v.atm_straddle_price.is_some() || (v.upper_band.is_some() && v.lower_band.is_some());
        if !has_structure {
            20.0
        } else if breakout && change_pct.abs() >= self.bullish_threshold {
            80.0
        } else if breakout {
            60.0
        } else {
            35.0
        }
    }
}

/// IV percentile bucket (falls back to 50 when unknown)
pub fn volatility_score(iv_percentile: Option<f64>) -> f64 {
    match iv_percentile {
        Some(iv) if iv < 25.0 => 40.0,
        Some(iv) if iv < 60.0 => 70.0,
        Some(iv) if iv < 85.0 => 55.0,
        Some(_) => 35.0,
        None => 50.0,
    }
}

/// Price beyond the straddle bands. Missing bands fall back to
/// prev_close ± ATM straddle price.
pub fn straddle_breakout(tick: &TickInput) -> Option<Bias> {
    let ltp = tick.market.ltp?;
    let v = &tick.volatility;
    let (upper, lower) = match (v.upper_band, v.lower_band) {
        (Some(u), Some(l)) => (u, l),
        _ => {
            let anchor = tick.market.prev_close?;
            let straddle = v.atm_straddle_price?;
            (anchor + straddle, anchor - straddle)
        }
    };
    if ltp > upper {
        Some(Bias::Bullish)
    } else if ltp < lower {
        Some(Bias::Bearish)
    } else {
        None
    }
}

/// Σ delta × OI change; positive means bullish positioning
pub fn oi_flow(chain: &[OptionChainRow]) -> f64 {
    chain.iter().filter_map(|r| r.delta.map(|d| d * r.oi_change)).sum()
}

/// Share of the four Greeks missing across the chain (1.0 for an empty chain)
pub fn missing_greeks_fraction(chain: &[OptionChainRow]) -> f64 {
    if chain.is_empty() {
        return 1.0;
    }
    let missing: usize = chain.iter().map(OptionChainRow::missing_greeks).sum();
    missing as f64 / (chain.len() * 4) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fixtures::tick;

    fn scorer() -> OptionsStructureScorer {
        OptionsStructureScorer::new(&EngineConfig::default())
    }

    fn default_weights() -> OptionsWeights {
        OptionsWeights::from_config(&EngineConfig::default().options)
    }

    #[test]
    fn test_weighted_score_reference_values() {
        let sub = OptionsSubScores { greeks: 80.0, volatility: 60.0, liquidity: 70.0, straddle: 50.0 };
        let score = weighted_score(&sub, &default_weights()).unwrap();
        // 28 + 15 + 17.5 + 7.5
        assert!((score - 68.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_score_rejects_bad_inputs() {
        let sub = OptionsSubScores { greeks: 120.0, ..Default::default() };
        assert!(matches!(
            weighted_score(&sub, &default_weights()),
            Err(InvariantViolation::ScoreOutOfRange { name: "greeks", .. })
        ));

        let mut weights = default_weights();
        weights.straddle = 0.25;
        assert!(matches!(
            weighted_score(&OptionsSubScores::default(), &weights),
            Err(InvariantViolation::WeightsDoNotSumToOne(_))
        ));
    }

    #[test]
    fn test_weighted_score_stays_in_range() {
        let weights = default_weights();
        let grid = [0.0, 12.5, 50.0, 99.9, 100.0];
        for &g in &grid {
            for &v in &grid {
                for &l in &grid {
                    for &s in &grid {
                        let sub = OptionsSubScores { greeks: g, volatility: v, liquidity: l, straddle: s };
                        let score = weighted_score(&sub, &weights).unwrap();
                        assert!((0.0..=100.0).contains(&score));
                    }
                }
            }
        }
    }

    #[test]
    fn test_bullish_breakout_assessment() {
        let a = scorer().assess(&tick(0.86), 0.86).unwrap();
        assert_eq!(a.bias, Bias::Bullish);
        assert!(a.breakout);
        assert_eq!(a.sub_scores.greeks, 100.0);
        assert_eq!(a.sub_scores.volatility, 70.0);
        assert_eq!(a.sub_scores.liquidity, 80.0);
        assert_eq!(a.sub_scores.straddle, 80.0);
        assert!((a.composite - 84.5).abs() < 1e-9);
        assert_eq!((a.action, a.confidence), (Action::BuyCall, Confidence::High));
        assert!(a.data_veto.is_none());
    }

    #[test]
    fn test_oi_flow_bias_without_breakout() {
        let mut t = tick(0.2);
        t.volatility.upper_band = Some(23_000.0);
        t.volatility.lower_band = Some(22_000.0);
        let a = scorer().assess(&t, 0.2).unwrap();
        assert_eq!(a.bias, Bias::Bullish);
        assert!(!a.breakout);
        assert_eq!(a.sub_scores.straddle, 35.0);
    }

    #[test]
    fn test_band_fallback_uses_straddle_price() {
        let mut t = tick(-1.5);
        t.volatility.upper_band = None;
        t.volatility.lower_band = None;
        // 22_500 - 240 = 22_260 > 22_162.5
        assert_eq!(straddle_breakout(&t), Some(Bias::Bearish));
    }

    #[test]
    fn test_missing_greeks_downgrade_and_veto() {
        let s = scorer();
        let mut t = tick(0.86);
        t.chain[0].vega = None;
        let a = s.assess(&t, 0.86).unwrap();
        assert_eq!((a.action, a.confidence), (Action::BuyCall, Confidence::Medium));
        assert!(a.data_veto.is_none());

        let mut t = tick(0.86);
        for row in t.chain.iter_mut() {
            row.gamma = None;
            row.theta = None;
            row.vega = None;
        }
        let a = s.assess(&t, 0.86).unwrap();
        assert!((a.missing_greeks_fraction - 0.75).abs() < 1e-12);
        assert!(a.data_veto.is_some());
        assert_eq!(a.action, Action::NoTrade);
    }

    #[test]
    fn test_volatility_buckets() {
        assert_eq!(volatility_score(Some(10.0)), 40.0);
        assert_eq!(volatility_score(Some(45.0)), 70.0);
        assert_eq!(volatility_score(Some(70.0)), 55.0);
        assert_eq!(volatility_score(Some(95.0)), 35.0);
        assert_eq!(volatility_score(None), 50.0);
    }
}
