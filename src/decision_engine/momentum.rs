//! 🚀 Momentum Signal
//!
//! Buckets the tick's change % against the configured thresholds and turns it
//! into a directional bias with a confidence tier. The rolling-memory trend can
//! move confidence one tier either way but never flips the direction.

use crate::config::SignalConfig;
use crate::decision_engine::decision::{Action, Confidence};
use crate::decision_engine::memory::MemoryWindow;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumBucket {
    StrongUp,
    MildUp,
    Range,
    MildDown,
    StrongDown,
}

/// Momentum verdict for one tick
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumSignal {
    pub change_pct: f64,
    pub bucket: MomentumBucket,
    pub action: Action,
    pub confidence: Confidence,
    /// -1, 0 or +1 tier shift applied from the memory trend
    pub trend_shift: i8,
    /// 0-100 strength for the signal breakdown
    pub score: f64,
}

pub struct MomentumSignalEngine {
    config: SignalConfig,
}

impl MomentumSignalEngine {
    pub fn new(config: &SignalConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn classify(&self, change_pct: f64) -> MomentumBucket {
        let c = &self.config;
        if change_pct >= c.bullish_threshold {
            if change_pct.abs() >= c.strong_move_threshold {
                MomentumBucket::StrongUp
            } else {
                MomentumBucket::MildUp
            }
        } else if change_pct <= c.bearish_threshold {
            if change_pct.abs() >= c.strong_move_threshold {
                MomentumBucket::StrongDown
            } else {
                MomentumBucket::MildDown
            }
        } else {
            MomentumBucket::Range
        }
    }

    /// Evaluate `change_pct` against prior memory (this tick not yet included)
    pub fn evaluate(&self, change_pct: f64, memory: &MemoryWindow) -> MomentumSignal {
        let bucket = self.classify(change_pct);
        let (action, base) = match bucket {
            MomentumBucket::StrongUp => (Action::BuyCall, Confidence::High),
            MomentumBucket::MildUp => (Action::BuyCall, Confidence::Medium),
            MomentumBucket::MildDown => (Action::BuyPut, Confidence::Medium),
            MomentumBucket::StrongDown => (Action::BuyPut, Confidence::High),
            MomentumBucket::Range => (Action::NoTrade, Confidence::Low),
        };

        let trend_shift = if action.is_directional() { self.trend_shift(action, memory) } else { 0 };
        let confidence = match trend_shift {
            1 => base.up(),
            -1 => base.down(),
            _ => base,
        };
        // Low confidence is never actionable
        let action = if confidence == Confidence::Low { Action::NoTrade } else { action };

        let score = (change_pct.abs() / self.config.strong_move_threshold * 70.0).clamp(0.0, 100.0);

        debug!(
            "🚀 momentum {:+.2}% → {:?} {} {} (trend shift {:+})",
            change_pct,
            bucket,
            action.as_str(),
            confidence.as_str(),
            trend_shift
        );

        MomentumSignal {
            change_pct,
            bucket,
            action,
            confidence,
            trend_shift,
            score,
        }
    }

    /// +1 if memory agrees with `action`, -1 if it opposes, else 0
    fn trend_shift(&self, action: Action, memory: &MemoryWindow) -> i8 {
        if memory.len() < self.config.trend_min_samples {
            return 0;
        }
        let avg = match memory.average_change() {
            Some(avg) if avg.abs() >= self.config.trend_shift_threshold => avg,
            _ => return 0,
        };
        if avg.signum() as i8 == action.sign() {
            1
        } else {
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::decision_engine::memory::MemoryEntry;

    fn engine() -> MomentumSignalEngine {
        MomentumSignalEngine::new(&EngineConfig::default().signal)
    }

    fn memory(changes: &[f64]) -> MemoryWindow {
        let mut window = MemoryWindow::new();
        for &change_pct in changes {
            window.push(MemoryEntry { change_pct, action: Action::NoTrade, timestamp: None });
        }
        window
    }

    #[test]
    fn test_buckets() {
        let e = engine();
        assert_eq!(e.classify(0.86), MomentumBucket::StrongUp);
        assert_eq!(e.classify(0.30), MomentumBucket::MildUp);
        assert_eq!(e.classify(0.10), MomentumBucket::Range);
        assert_eq!(e.classify(-0.30), MomentumBucket::MildDown);
        assert_eq!(e.classify(-0.72), MomentumBucket::StrongDown);
    }

    #[test]
    fn test_threshold_actions_without_memory() {
        let e = engine();
        let empty = MemoryWindow::new();
        let s = e.evaluate(0.86, &empty);
        assert_eq!((s.action, s.confidence), (Action::BuyCall, Confidence::High));
        let s = e.evaluate(-0.72, &empty);
        assert_eq!((s.action, s.confidence), (Action::BuyPut, Confidence::High));
        let s = e.evaluate(0.4, &empty);
        assert_eq!((s.action, s.confidence), (Action::BuyCall, Confidence::Medium));
        let s = e.evaluate(0.05, &empty);
        assert_eq!((s.action, s.confidence), (Action::NoTrade, Confidence::Low));
    }

    #[test]
    fn test_trend_shifts_one_tier_only() {
        let e = engine();
        let up = memory(&[0.3, 0.2, 0.4]);
        let s = e.evaluate(0.4, &up);
        assert_eq!((s.action, s.confidence, s.trend_shift), (Action::BuyCall, Confidence::High, 1));

        let down = memory(&[-0.3, -0.2, -0.4]);
        let s = e.evaluate(0.86, &down);
        assert_eq!((s.action, s.confidence), (Action::BuyCall, Confidence::Medium));

        // Medium moved down to Low is no longer actionable
        let s = e.evaluate(0.4, &down);
        assert_eq!((s.action, s.confidence), (Action::NoTrade, Confidence::Low));
    }

    #[test]
    fn test_trend_needs_samples_and_magnitude() {
        let e = engine();
        let short = memory(&[-0.5, -0.5]);
        assert_eq!(e.evaluate(0.4, &short).trend_shift, 0);
        let flat = memory(&[0.1, -0.1, 0.05]);
        assert_eq!(e.evaluate(0.4, &flat).trend_shift, 0);
    }

    #[test]
    fn test_range_never_takes_direction_from_memory() {
        let s = engine().evaluate(0.1, &memory(&[0.9, 0.9, 0.9]));
        assert_eq!(s.action, Action::NoTrade);
        assert_eq!(s.trend_shift, 0);
    }

    #[test]
    fn test_score_in_range() {
        let e = engine();
        let empty = MemoryWindow::new();
        for c in [-5.0, -0.72, 0.0, 0.3, 0.86, 12.0] {
            let s = e.evaluate(c, &empty);
            assert!((0.0..=100.0).contains(&s.score));
        }
    }
}
