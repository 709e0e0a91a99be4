//! 📝 Decision Audit Log
//!
//! Appends one JSON line per sealed `Decision` to an audit file and keeps
//! running stats (per action, per veto reason, rejected ticks).

use crate::decision_engine::decision::{Action, Decision};
use crate::error::EngineError;
use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Running totals over everything the logger has seen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionStats {
    pub total: u64,
    pub buy_call: u64,
    pub buy_put: u64,
    pub no_trade: u64,
    /// Veto reason → count (ordered for stable printing)
    pub vetoes: BTreeMap<&'static str, u64>,
    pub validation_errors: u64,
    pub invariant_violations: u64,
}

impl DecisionStats {
    pub fn record(&mut self, decision: &Decision) {
        self.total += 1;
        match decision.action() {
            Action::BuyCall => self.buy_call += 1,
            Action::BuyPut => self.buy_put += 1,
            Action::NoTrade => self.no_trade += 1,
        }
        if let Some(reason) = decision.veto_reason() {
            *self.vetoes.entry(reason.as_str()).or_insert(0) += 1;
        }
    }

    pub fn record_error(&mut self, err: &EngineError) {
        match err {
            EngineError::Validation(_) => self.validation_errors += 1,
            EngineError::Invariant(_) => self.invariant_violations += 1,
        }
    }

    /// Share of decisions that proposed a trade
    pub fn directional_pct(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.buy_call + self.buy_put) as f64 / self.total as f64 * 100.0
    }

    pub fn vetoed(&self) -> u64 {
        self.vetoes.values().sum()
    }
}

/// JSON-lines audit writer
pub struct DecisionLogger {
    log_file: Arc<Mutex<File>>,
    stats: Arc<Mutex<DecisionStats>>,
}

impl DecisionLogger {
    /// Open (or create) the audit log in append mode
    pub fn new<P: AsRef<Path>>(log_path: P) -> Result<Self> {
        let path = log_path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {:?}", parent))?;
        }
        let existed = path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open audit log: {:?}", path))?;

        if existed {
            info!("📝 Appending to existing audit log: {:?}", path);
        } else {
            info!("📝 Created new audit log: {:?}", path);
        }

        Ok(Self {
            log_file: Arc::new(Mutex::new(file)),
            stats: Arc::new(Mutex::new(DecisionStats::default())),
        })
    }

    /// Write the decision verbatim as one JSON line
    pub fn log_decision(&self, decision: &Decision) -> Result<()> {
        let line = decision.to_audit_line().context("Failed to serialize decision")?;
        {
            let mut file = self.log_file.lock().unwrap_or_else(PoisonError::into_inner);
            writeln!(file, "{}", line).context("Failed to write audit line")?;
            file.flush()?;
        }
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(decision);

        debug!(
            "📝 Logged {} {} {} ({})",
            decision.decision_id(),
            decision.underlying(),
            decision.action().as_str(),
            decision.veto_reason().map(|r| r.as_str()).unwrap_or("no veto")
        );
        Ok(())
    }

    /// Count a rejected tick (nothing is written to the audit file)
    pub fn log_error(&self, err: &EngineError) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_error(err);
    }

    pub fn stats(&self) -> DecisionStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn print_stats(&self) {
        let s = self.stats();
        info!("📊 Decision Stats:");
        info!("   Total: {} ({:.1}% directional)", s.total, s.directional_pct());
        info!("   BUY_CALL: {}, BUY_PUT: {}, NO_TRADE: {}", s.buy_call, s.buy_put, s.no_trade);
        info!("   Vetoed: {}", s.vetoed());
        for (reason, count) in &s.vetoes {
            info!("     {}: {}", reason, count);
        }
        info!(
            "   Rejected: {} validation, {} invariant",
            s.validation_errors, s.invariant_violations
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::decision_engine::engine::DecisionEngine;
    use crate::error::ValidationError;
    use crate::market::fixtures::tick;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ode_{}_{}.jsonl", name, std::process::id()))
    }

    fn decisions() -> Vec<Decision> {
        let engine = DecisionEngine::new(EngineConfig::default()).unwrap();
        let mut lane = engine.new_lane();
        let mut vetoed = tick(0.86);
        vetoed.account.daily_realized_pnl = -21_000.0;
        [tick(0.86), tick(-0.72), tick(0.05), vetoed]
            .iter()
            .map(|t| engine.evaluate(t, &mut lane).unwrap())
            .collect()
    }

    #[test]
    fn test_log_writes_one_json_line_per_decision() {
        let path = temp_path("lines");
        let _ = fs::remove_file(&path);

        let logger = DecisionLogger::new(&path).unwrap();
        let all = decisions();
        for d in &all {
            logger.log_decision(d).unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), all.len());
        for line in &lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("decision_id").is_some());
            assert!(value.get("risk_checks").is_some());
        }
        assert!(lines[3].contains("\"daily_loss_guard\""));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_stats_accumulate() {
        let path = temp_path("stats");
        let _ = fs::remove_file(&path);

        let logger = DecisionLogger::new(&path).unwrap();
        for d in &decisions() {
            logger.log_decision(d).unwrap();
        }
        logger.log_error(&EngineError::Validation(ValidationError::Malformed("bad".to_string())));

        let s = logger.stats();
        assert_eq!(s.total, 4);
        assert_eq!((s.buy_call, s.buy_put, s.no_trade), (1, 1, 2));
        assert_eq!(s.vetoes.get("daily_loss_guard"), Some(&1));
        assert_eq!(s.validation_errors, 1);
        assert!((s.directional_pct() - 50.0).abs() < 1e-9);

        let _ = fs::remove_file(&path);
    }
}
