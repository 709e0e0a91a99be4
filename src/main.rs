//! 🧠 Decision Desk Replay Runner
//!
//! Replays a JSON-lines file of ticks through the decision desk:
//! - one blocking task per underlying, joined at the end
//! - every decision appended to the JSON-lines audit log
//! - stats and Prometheus counters printed on exit
//!
//! Usage: `options_decision_engine [ticks.jsonl]` (or `TICKS_PATH`)

use anyhow::{Context, Result};
use log::{error, info, warn};
use options_decision_engine::config::Config;
use options_decision_engine::decision_engine::{DecisionDesk, DecisionLogger};
use options_decision_engine::error::EngineError;
use options_decision_engine::market::{TickInput, Underlying};
use options_decision_engine::metrics;
use std::collections::BTreeMap;
use std::sync::Arc;

const DEFAULT_TICKS_PATH: &str = "./data/ticks.jsonl";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (reads .env) before the logger so LOG_LEVEL applies
    let config = Config::from_env().context("Failed to load configuration")?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.logging.log_level.as_str()))
        .init();
    config.validate().context("Invalid configuration")?;
    info!("✅ Configuration: Loaded");

    let ticks_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TICKS_PATH").ok())
        .unwrap_or_else(|| DEFAULT_TICKS_PATH.to_string());

    print_banner(&config, &ticks_path);

    let desk = Arc::new(DecisionDesk::new(config.engine.clone())?);
    let logger = Arc::new(DecisionLogger::new(&config.logging.audit_log_path)?);
    info!("✅ Audit log: {:?}", config.logging.audit_log_path);

    let raw = tokio::fs::read_to_string(&ticks_path)
        .await
        .with_context(|| format!("Failed to read ticks from {}", ticks_path))?;
    let lanes = group_by_underlying(&raw, &logger);
    info!(
        "📥 Loaded {} ticks across {} underlyings",
        lanes.values().map(Vec::len).sum::<usize>(),
        lanes.len()
    );

    // Fan out: one blocking task per underlying, ticks kept in file order
    let handles = lanes.into_iter().map(|(underlying, ticks)| {
        let desk = Arc::clone(&desk);
        let logger = Arc::clone(&logger);
        tokio::task::spawn_blocking(move || replay_lane(underlying, ticks, &desk, &logger))
    });

    let mut invariant_violations = 0u64;
    for joined in futures::future::join_all(handles).await {
        match joined {
            Ok(violations) => invariant_violations += violations,
            Err(e) => error!("❌ Replay task panicked: {}", e),
        }
    }

    logger.print_stats();
    println!("{}", metrics::encode());

    if invariant_violations > 0 {
        anyhow::bail!("{} decisions broke an engine invariant", invariant_violations);
    }
    info!("✅ Replay complete");
    Ok(())
}

/// Parse tick lines, keeping per-underlying order. Malformed lines are
/// counted and skipped.
fn group_by_underlying(raw: &str, logger: &DecisionLogger) -> BTreeMap<Underlying, Vec<TickInput>> {
    let mut lanes: BTreeMap<Underlying, Vec<TickInput>> = BTreeMap::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match TickInput::from_json(line) {
            Ok(tick) => lanes.entry(tick.underlying()).or_default().push(tick),
            Err(e) => {
                warn!("⚠️  line {}: {}", idx + 1, e);
                let err = EngineError::from(e);
                metrics::record_error(&err);
                logger.log_error(&err);
            }
        }
    }
    lanes
}

/// Evaluate one underlying's ticks in order; returns invariant violations seen
fn replay_lane(underlying: Underlying, ticks: Vec<TickInput>, desk: &DecisionDesk, logger: &DecisionLogger) -> u64 {
    let mut violations = 0;
    for tick in &ticks {
        match desk.evaluate(tick) {
            Ok(decision) => {
                if let Err(e) = logger.log_decision(&decision) {
                    error!("❌ {} audit write failed: {:#}", underlying, e);
                }
            }
            Err(e) => {
                logger.log_error(&e);
                if e.is_invariant() {
                    violations += 1;
                    error!("🚨 {}: {}", underlying, e);
                } else {
                    warn!("⚠️  {}: {}", underlying, e);
                }
            }
        }
    }
    info!(
        "🏁 {} replayed {} ticks (memory holds {})",
        underlying,
        ticks.len(),
        desk.memory_len(underlying)
    );
    violations
}

fn print_banner(config: &Config, ticks_path: &str) {
    let e = &config.engine;
    println!("\n======================================================================");
    println!("🧠 OPTIONS DECISION DESK - REPLAY");
    println!("======================================================================");
    println!("🏷️  Model: {}", e.model_version);
    println!("📥 Ticks: {}", ticks_path);
    println!(
        "⚖️  Consensus threshold: {:.2} (momentum {:.2} / options {:.2})",
        e.consensus.strength_threshold, e.consensus.momentum_weight, e.consensus.options_weight
    );
    println!(
        "🛡️  Halt at -{:.1}% | blackout {} min before {}",
        e.session.halt_drawdown_pct,
        e.session.closing_blackout_mins,
        e.session.session_close.format("%H:%M")
    );
    println!("🚫 Proposals only: no orders are placed");
    println!("======================================================================\n");
}
