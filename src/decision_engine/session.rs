//! ⏱️ Session State Machine
//!
//! Per-underlying trading-session gate, advanced once per tick before scoring.
//!
//! ```text
//! ACTIVE ──drawdown ≤ -2%──────────▶ HALTED_DAILY_LOSS   (terminal until next date)
//! ACTIVE ──final 15 minutes────────▶ CLOSING_BLACKOUT    (terminal until next date)
//! ACTIVE ──3 consecutive losses────▶ COOLDOWN ──window elapses, no new loss──▶ ACTIVE
//! ```
//!
//! Any state other than ACTIVE vetoes the tick with its own reason.

use crate::config::{CooldownWindow, SessionConfig};
use crate::decision_engine::decision::VetoReason;
use crate::market::TickInput;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Active,
    HaltedDailyLoss,
    Cooldown,
    ClosingBlackout,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Active => "ACTIVE",
            SessionState::HaltedDailyLoss => "HALTED_DAILY_LOSS",
            SessionState::Cooldown => "COOLDOWN",
            SessionState::ClosingBlackout => "CLOSING_BLACKOUT",
        }
    }

    pub fn veto_reason(&self) -> Option<VetoReason> {
        match self {
            SessionState::Active => None,
            SessionState::HaltedDailyLoss => Some(VetoReason::SessionHaltedDailyLoss),
            SessionState::Cooldown => Some(VetoReason::SessionCooldown),
            SessionState::ClosingBlackout => Some(VetoReason::SessionClosingBlackout),
        }
    }

    /// Only a new trading date leaves these
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::HaltedDailyLoss | SessionState::ClosingBlackout)
    }
}

/// Trade outcome for loss-streak tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
}

#[derive(Debug, Clone, PartialEq)]
struct CooldownProgress {
    started_at: Option<NaiveDateTime>,
    ticks_seen: u32,
}

#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    config: SessionConfig,
    state: SessionState,
    session_date: Option<NaiveDate>,
    loss_streak: u32,
    cooldown: Option<CooldownProgress>,
}

impl SessionStateMachine {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            config: config.clone(),
            state: SessionState::Active,
            session_date: None,
            loss_streak: 0,
            cooldown: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn loss_streak(&self) -> u32 {
        self.loss_streak
    }

    /// Advance the machine for this tick and return the resulting state
    pub fn on_tick(&mut self, tick: &TickInput) -> SessionState {
        let timestamp = tick.market.timestamp;
        if let Some(ts) = timestamp {
            self.roll_session(ts.date());
        }

        if self.state.is_terminal() {
            return self.state;
        }

        let pnl_pct = tick.account.daily_pnl_pct();
        if pnl_pct <= -self.config.halt_drawdown_pct {
            warn!(
                "⛔ {} session HALTED: daily P&L {:.2}% reached -{:.2}%",
                tick.underlying(),
                pnl_pct,
                self.config.halt_drawdown_pct
            );
            return self.transition(SessionState::HaltedDailyLoss);
        }

        if let Some(ts) = timestamp {
            let blackout_start =
                self.config.session_close - Duration::minutes(i64::from(self.config.closing_blackout_mins));
            if ts.time() >= blackout_start {
                warn!(
                    "🌙 {} closing blackout from {} (session close {})",
                    tick.underlying(),
                    blackout_start.format("%H:%M"),
                    self.config.session_close.format("%H:%M")
                );
                return self.transition(SessionState::ClosingBlackout);
            }
        }

        if self.state == SessionState::Cooldown && self.cooldown_elapsed(timestamp) {
            info!(
                "✅ {} cooldown elapsed, session ACTIVE again",
                tick.underlying()
            );
            self.loss_streak = 0;
            self.cooldown = None;
            return self.transition(SessionState::Active);
        }

        self.state
    }

    /// Feed a closed trade's outcome into the loss streak
    pub fn record_outcome(&mut self, outcome: TradeOutcome, at: Option<NaiveDateTime>) {
        match outcome {
            TradeOutcome::Win => {
                self.loss_streak = 0;
            }
            TradeOutcome::Loss => {
                self.loss_streak += 1;
                match self.state {
                    SessionState::Cooldown => {
                        // A fresh loss restarts the window
                        self.cooldown = Some(CooldownProgress { started_at: at, ticks_seen: 0 });
                    }
                    SessionState::Active if self.loss_streak >= self.config.loss_streak_limit => {
                        warn!(
                            "🥶 {} consecutive losses, entering COOLDOWN ({:?})",
                            self.loss_streak, self.config.cooldown
                        );
                        self.cooldown = Some(CooldownProgress { started_at: at, ticks_seen: 0 });
                        self.state = SessionState::Cooldown;
                    }
                    _ => {}
                }
            }
        }
    }

    fn cooldown_elapsed(&mut self, now: Option<NaiveDateTime>) -> bool {
        let progress = match self.cooldown.as_mut() {
            Some(p) => p,
            None => return true,
        };
        match self.config.cooldown {
            CooldownWindow::Ticks(n) => {
                if progress.ticks_seen >= n {
                    return true;
                }
                progress.ticks_seen += 1;
                false
            }
            CooldownWindow::Seconds(secs) => {
                let now = match now {
                    Some(now) => now,
                    None => return false,
                };
                let started = *progress.started_at.get_or_insert(now);
                (now - started).num_seconds() >= secs
            }
        }
    }

    fn roll_session(&mut self, date: NaiveDate) {
        match self.session_date {
            Some(current) if current == date => return,
            None => {
                // First tick dates the session; outcomes recorded before it stand
                self.session_date = Some(date);
                return;
            }
            Some(_) => {}
        }
        if self.state != SessionState::Active {
            info!("🌅 new session {}: {} → ACTIVE", date, self.state.as_str());
        }
        self.session_date = Some(date);
        self.state = SessionState::Active;
        self.loss_streak = 0;
        self.cooldown = None;
    }

    fn transition(&mut self, next: SessionState) -> SessionState {
        self.state = next;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::market::fixtures::{tick, ts};
    use chrono::NaiveDate;

    fn machine() -> SessionStateMachine {
        SessionStateMachine::new(&EngineConfig::default().session)
    }

    #[test]
    fn test_active_on_healthy_tick() {
        let mut sm = machine();
        assert_eq!(sm.on_tick(&tick(0.5)), SessionState::Active);
        assert_eq!(sm.state().veto_reason(), None);
    }

    #[test]
    fn test_halt_is_terminal_for_the_day() {
        let mut sm = machine();
        let mut t = tick(0.5);
        t.account.daily_realized_pnl = -20_000.0; // -2.0% reaches the halt level
        assert_eq!(sm.on_tick(&t), SessionState::HaltedDailyLoss);

        t.account.daily_realized_pnl = 5_000.0;
        assert_eq!(sm.on_tick(&t), SessionState::HaltedDailyLoss);

        let next_day = NaiveDate::from_ymd_opt(2026, 3, 3).and_then(|d| d.and_hms_opt(10, 0, 0));
        t.market.timestamp = next_day;
        assert_eq!(sm.on_tick(&t), SessionState::Active);
    }

    #[test]
    fn test_closing_blackout() {
        let mut sm = machine();
        let mut t = tick(0.5);
        t.market.timestamp = Some(ts(15, 14));
        assert_eq!(sm.on_tick(&t), SessionState::Active);
        t.market.timestamp = Some(ts(15, 15));
        assert_eq!(sm.on_tick(&t), SessionState::ClosingBlackout);
        assert_eq!(sm.state().veto_reason(), Some(VetoReason::SessionClosingBlackout));
    }

    #[test]
    fn test_halt_takes_precedence_over_blackout() {
        let mut sm = machine();
        let mut t = tick(0.5);
        t.market.timestamp = Some(ts(15, 20));
        t.account.daily_realized_pnl = -25_000.0;
        assert_eq!(sm.on_tick(&t), SessionState::HaltedDailyLoss);
    }

    #[test]
    fn test_cooldown_after_loss_streak_by_ticks() {
        let mut sm = machine();
        let t = tick(0.5);
        sm.record_outcome(TradeOutcome::Loss, None);
        sm.record_outcome(TradeOutcome::Loss, None);
        assert_eq!(sm.on_tick(&t), SessionState::Active);
        sm.record_outcome(TradeOutcome::Loss, None);
        assert_eq!(sm.state(), SessionState::Cooldown);

        // 5 vetoed ticks, released on the 6th
        for _ in 0..5 {
            assert_eq!(sm.on_tick(&t), SessionState::Cooldown);
        }
        assert_eq!(sm.on_tick(&t), SessionState::Active);
        assert_eq!(sm.loss_streak(), 0);
    }

    #[test]
    fn test_loss_during_cooldown_restarts_window() {
        let mut sm = machine();
        let t = tick(0.5);
        for _ in 0..3 {
            sm.record_outcome(TradeOutcome::Loss, None);
        }
        for _ in 0..4 {
            sm.on_tick(&t);
        }
        sm.record_outcome(TradeOutcome::Loss, None);
        for _ in 0..5 {
            assert_eq!(sm.on_tick(&t), SessionState::Cooldown);
        }
        assert_eq!(sm.on_tick(&t), SessionState::Active);
    }

    #[test]
    fn test_win_resets_streak() {
        let mut sm = machine();
        sm.record_outcome(TradeOutcome::Loss, None);
        sm.record_outcome(TradeOutcome::Loss, None);
        sm.record_outcome(TradeOutcome::Win, None);
        sm.record_outcome(TradeOutcome::Loss, None);
        assert_eq!(sm.loss_streak(), 1);
        assert_eq!(sm.state(), SessionState::Active);
    }

    #[test]
    fn test_cooldown_by_seconds() {
        let mut config = EngineConfig::default().session;
        config.cooldown = CooldownWindow::Seconds(300);
        let mut sm = SessionStateMachine::new(&config);
        let mut t = tick(0.5);
        t.market.timestamp = Some(ts(11, 0));
        sm.on_tick(&t);
        for _ in 0..3 {
            sm.record_outcome(TradeOutcome::Loss, Some(ts(11, 0)));
        }
        t.market.timestamp = Some(ts(11, 4));
        assert_eq!(sm.on_tick(&t), SessionState::Cooldown);
        t.market.timestamp = Some(ts(11, 5));
        assert_eq!(sm.on_tick(&t), SessionState::Active);
    }
}
