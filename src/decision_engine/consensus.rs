//! ⚖️ Consensus Arbiter
//!
//! Merges agent votes into one action:
//! 1. Vote-level vetoes (risk officer first, then options data) win outright.
//! 2. Equal-weight top votes pointing opposite ways resolve to NO_TRADE.
//! 3. net = Σ weight × direction; |net| below the strength threshold is NO_TRADE.
//! 4. Confidence from |net| / Σ weight, shifted by vote confidence adjustments
//!    (points / 100), capped by the most confident agreeing vote.
//!
//! Guard and session vetoes are applied before this stage and skip it entirely.

use crate::config::ConsensusConfig;
use crate::decision_engine::decision::{Action, Confidence, VetoReason};
use crate::decision_engine::votes::{Agent, AgentVote};
use log::debug;

/// Equal-weight tolerance for the tie-break
const TIE_EPSILON: f64 = 1e-12;

/// Whose vetoes are honoured first
const VETO_PRIORITY: [Agent; 5] = [
    Agent::RiskOfficer,
    Agent::OptionsStructure,
    Agent::Momentum,
    Agent::Regime,
    Agent::ExecutionPlanner,
];

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusOutcome {
    pub action: Action,
    pub confidence: Confidence,
    pub net_score: f64,
    pub max_score: f64,
    pub tie_break: bool,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Veto {
        reason: VetoReason,
        source: Agent,
        rationale: String,
    },
    Consensus(ConsensusOutcome),
}

pub struct ConsensusArbiter {
    config: ConsensusConfig,
}

impl ConsensusArbiter {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn arbitrate(&self, votes: &[AgentVote]) -> Verdict {
        for agent in VETO_PRIORITY {
            if let Some(vote) = votes.iter().find(|v| v.source == agent && v.veto.is_some()) {
                if let Some(reason) = vote.veto {
                    return Verdict::Veto {
                        reason,
                        source: vote.source,
                        rationale: vote.rationale.clone(),
                    };
                }
            }
        }
        Verdict::Consensus(self.merge(votes))
    }

    fn merge(&self, votes: &[AgentVote]) -> ConsensusOutcome {
        let net_score: f64 = votes.iter().map(AgentVote::signed_weight).sum();
        let max_score: f64 = votes.iter().map(|v| v.weight).sum();
        let contributions = votes
            .iter()
            .filter(|v| v.direction.is_directional())
            .map(|v| format!("{} {:+.2}", v.source.as_str(), v.signed_weight()))
            .collect::<Vec<_>>()
            .join(", ");
        let adjustment: f64 = votes
            .iter()
            .filter_map(|v| v.confidence_adjustment)
            .map(|points| f64::from(points) / 100.0)
            .sum();
        let summary = format!(
            "net {:+.2} of {:.2} [{}]{}",
            net_score,
            max_score,
            if contributions.is_empty() { "no directional votes" } else { contributions.as_str() },
            if adjustment != 0.0 { format!(", ratio adjusted {:+.2}", adjustment) } else { String::new() }
        );

        let no_trade = |tie_break: bool, why: &str| ConsensusOutcome {
            action: Action::NoTrade,
            confidence: Confidence::Low,
            net_score,
            max_score,
            tie_break,
            rationale: format!("{}: {}", why, summary),
        };

        if is_opposing_tie(votes) {
            debug!("⚖️ tie between top opposing votes → NO_TRADE ({})", summary);
            return no_trade(true, "equal-weight opposing votes");
        }
        if max_score <= 0.0 || net_score.abs() < self.config.strength_threshold {
            return no_trade(false, "consensus below threshold");
        }

        let ratio = net_score.abs() / max_score + adjustment;
        let tier = if ratio >= self.config.high_ratio {
            Confidence::High
        } else if ratio >= self.config.medium_ratio {
            Confidence::Medium
        } else {
            return no_trade(false, "weak consensus");
        };

        let action = Action::from_sign(net_score);
        let cap = votes
            .iter()
            .filter(|v| v.direction == action)
            .map(|v| Confidence::from_score(v.confidence))
            .max()
            .unwrap_or(Confidence::Low);
        let confidence = tier.min(cap);
        if confidence == Confidence::Low {
            return no_trade(false, "agreeing votes lack confidence");
        }

        debug!("⚖️ {} {} ({})", action.as_str(), confidence.as_str(), summary);

        ConsensusOutcome {
            action,
            confidence,
            net_score,
            max_score,
            tie_break: false,
            rationale: format!("{} {} by consensus, {}", action.as_str(), confidence.as_str(), summary),
        }
    }
}

/// The heaviest call vote and the heaviest put vote carry equal weight
fn is_opposing_tie(votes: &[AgentVote]) -> bool {
    let heaviest = |direction: Action| {
        votes
            .iter()
            .filter(|v| v.direction == direction && v.weight > 0.0)
            .map(|v| v.weight)
            .fold(None, |acc: Option<f64>, w| Some(acc.map_or(w, |a| a.max(w))))
    };
    match (heaviest(Action::BuyCall), heaviest(Action::BuyPut)) {
        (Some(call), Some(put)) => (call - put).abs() <= TIE_EPSILON,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn vote(source: Agent, direction: Action, confidence: u8, weight: f64) -> AgentVote {
        AgentVote {
            source,
            direction,
            confidence,
            weight,
            rationale: String::new(),
            veto: None,
            size_multiplier: None,
            confidence_adjustment: None,
            checks: Vec::new(),
        }
    }

    fn arbiter() -> ConsensusArbiter {
        ConsensusArbiter::new(&EngineConfig::default().consensus)
    }

    fn consensus(verdict: Verdict) -> ConsensusOutcome {
        match verdict {
            Verdict::Consensus(outcome) => outcome,
            other => panic!("expected consensus, got {:?}", other),
        }
    }

    #[test]
    fn test_agreeing_votes_high_confidence() {
        let votes = vec![
            vote(Agent::Momentum, Action::BuyCall, 85, 0.45),
            vote(Agent::OptionsStructure, Action::BuyCall, 85, 0.55),
            vote(Agent::Regime, Action::NoTrade, 35, 0.20),
        ];
        let out = consensus(arbiter().arbitrate(&votes));
        assert_eq!((out.action, out.confidence), (Action::BuyCall, Confidence::High));
        assert!((out.net_score - 1.0).abs() < 1e-12);
        assert!((out.max_score - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_opposing_votes_below_threshold() {
        let votes = vec![
            vote(Agent::Momentum, Action::BuyCall, 85, 0.45),
            vote(Agent::OptionsStructure, Action::BuyPut, 85, 0.55),
        ];
        let out = consensus(arbiter().arbitrate(&votes));
        assert_eq!(out.action, Action::NoTrade);
        assert!(!out.tie_break);
        assert!((out.net_score + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_equal_weight_tie_is_no_trade() {
        let votes = vec![
            vote(Agent::Momentum, Action::BuyCall, 85, 0.5),
            vote(Agent::OptionsStructure, Action::BuyPut, 85, 0.5),
            vote(Agent::Regime, Action::BuyCall, 85, 0.4),
        ];
        let out = consensus(arbiter().arbitrate(&votes));
        assert_eq!(out.action, Action::NoTrade);
        assert!(out.tie_break);

        // Order of the tied votes does not matter
        let reversed: Vec<AgentVote> = votes.iter().rev().cloned().collect();
        assert!(consensus(arbiter().arbitrate(&reversed)).tie_break);
    }

    #[test]
    fn test_tie_independent_of_vote_order() {
        let votes = vec![
            vote(Agent::Momentum, Action::BuyCall, 85, 0.5),
            vote(Agent::OptionsStructure, Action::BuyCall, 85, 0.5),
            vote(Agent::Regime, Action::BuyPut, 85, 0.5),
        ];
        let reversed: Vec<AgentVote> = votes.iter().rev().cloned().collect();
        let fwd = consensus(arbiter().arbitrate(&votes));
        let rev = consensus(arbiter().arbitrate(&reversed));
        assert!(fwd.tie_break);
        assert_eq!((fwd.action, fwd.tie_break), (rev.action, rev.tie_break));
    }

    fn planner(adjustment: i8) -> AgentVote {
        let mut v = vote(Agent::ExecutionPlanner, Action::NoTrade, 50, 0.0);
        v.confidence_adjustment = Some(adjustment);
        v
    }

    #[test]
    fn test_time_of_day_adjustment_shifts_tier() {
        // ratio 0.55: MEDIUM on its own
        let base = vec![
            vote(Agent::Momentum, Action::NoTrade, 35, 0.45),
            vote(Agent::OptionsStructure, Action::BuyCall, 85, 0.55),
        ];

        let mut open = base.clone();
        open.push(planner(-8));
        let out = consensus(arbiter().arbitrate(&open));
        assert_eq!((out.action, out.confidence), (Action::NoTrade, Confidence::Low));

        let mut midday = base.clone();
        midday.push(planner(2));
        let out = consensus(arbiter().arbitrate(&midday));
        assert_eq!((out.action, out.confidence), (Action::BuyCall, Confidence::Medium));
        assert!(out.rationale.contains("ratio adjusted +0.02"));

        // 0.78 + 0.06 crosses the 0.80 HIGH line
        let strong = vec![
            vote(Agent::Momentum, Action::NoTrade, 35, 0.22),
            vote(Agent::OptionsStructure, Action::BuyCall, 85, 0.78),
            planner(6),
        ];
        assert_eq!(consensus(arbiter().arbitrate(&strong)).confidence, Confidence::High);
    }

    #[test]
    fn test_confidence_capped_by_agreeing_votes() {
        let votes = vec![
            vote(Agent::Momentum, Action::BuyPut, 65, 0.45),
            vote(Agent::OptionsStructure, Action::BuyPut, 65, 0.55),
        ];
        let out = consensus(arbiter().arbitrate(&votes));
        assert_eq!((out.action, out.confidence), (Action::BuyPut, Confidence::Medium));
    }

    #[test]
    fn test_medium_ratio_band() {
        // net 0.55 of 1.0 → ratio 0.55 → MEDIUM
        let votes = vec![
            vote(Agent::Momentum, Action::NoTrade, 35, 0.45),
            vote(Agent::OptionsStructure, Action::BuyCall, 85, 0.55),
        ];
        let out = consensus(arbiter().arbitrate(&votes));
        assert_eq!((out.action, out.confidence), (Action::BuyCall, Confidence::Medium));
    }

    #[test]
    fn test_vote_veto_priority() {
        let mut officer = vote(Agent::RiskOfficer, Action::NoTrade, 90, 0.0);
        officer.veto = Some(VetoReason::ExposureGuard);
        let mut options = vote(Agent::OptionsStructure, Action::NoTrade, 35, 0.55);
        options.veto = Some(VetoReason::OptionsDataGuard);
        let votes = vec![vote(Agent::Momentum, Action::BuyCall, 85, 0.45), options, officer];

        match arbiter().arbitrate(&votes) {
            Verdict::Veto { reason, source, .. } => {
                assert_eq!(reason, VetoReason::ExposureGuard);
                assert_eq!(source, Agent::RiskOfficer);
            }
            other => panic!("expected veto, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_weights_are_no_trade() {
        let votes = vec![vote(Agent::ExecutionPlanner, Action::NoTrade, 52, 0.0)];
        assert_eq!(consensus(arbiter().arbitrate(&votes)).action, Action::NoTrade);
    }
}
