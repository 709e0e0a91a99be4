/*!
 * Prometheus metrics for the decision desk
 *
 * Counters only. They are recorded by `DecisionDesk` after a decision is
 * sealed, never read back by the engine, and exported as text via `encode()`.
 */

use crate::decision_engine::decision::{Decision, VetoReason};
use crate::error::EngineError;
use log::error;
use once_cell::sync::Lazy;
use prometheus::{IntCounter, Opts, Registry, TextEncoder};

/// Global metrics registry (None if registration failed at startup)
static METRICS: Lazy<Option<DeskMetrics>> = Lazy::new(|| match DeskMetrics::new() {
    Ok(metrics) => Some(metrics),
    Err(e) => {
        error!("❌ Failed to register metrics: {}", e);
        None
    }
});

pub struct DeskMetrics {
    registry: Registry,

    // Decisions
    pub decisions_total: IntCounter,
    pub decisions_directional: IntCounter,
    pub decisions_no_trade: IntCounter,

    // Veto sources
    pub vetoes_risk_guard: IntCounter,
    pub vetoes_session: IntCounter,
    pub vetoes_agent: IntCounter,
    pub sizing_downgrades: IntCounter,

    // Errors
    pub invariant_violations: IntCounter,
    pub validation_errors: IntCounter,
}

impl DeskMetrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let c = IntCounter::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let decisions_total = counter("desk_decisions_total", "Decisions minted")?;
        let decisions_directional = counter("desk_decisions_directional", "BUY_CALL / BUY_PUT decisions")?;
        let decisions_no_trade = counter("desk_decisions_no_trade", "NO_TRADE decisions")?;
        let vetoes_risk_guard = counter("desk_vetoes_risk_guard", "Vetoes from core risk guards")?;
        let vetoes_session = counter("desk_vetoes_session", "Vetoes from the session state machine")?;
        let vetoes_agent = counter("desk_vetoes_agent", "Vetoes raised through agent votes")?;
        let sizing_downgrades = counter("desk_sizing_downgrades", "Directional decisions downgraded below one lot")?;
        let invariant_violations = counter("desk_invariant_violations", "Decisions rejected for breaking an invariant")?;
        let validation_errors = counter("desk_validation_errors", "Ticks rejected as structurally invalid")?;

        Ok(Self {
            registry,
            decisions_total,
            decisions_directional,
            decisions_no_trade,
            vetoes_risk_guard,
            vetoes_session,
            vetoes_agent,
            sizing_downgrades,
            invariant_violations,
            validation_errors,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Global metrics handle
pub fn metrics() -> Option<&'static DeskMetrics> {
    METRICS.as_ref()
}

/// Count one sealed decision
pub fn record_decision(decision: &Decision) {
    let m = match metrics() {
        Some(m) => m,
        None => return,
    };
    m.decisions_total.inc();
    if decision.action().is_directional() {
        m.decisions_directional.inc();
    } else {
        m.decisions_no_trade.inc();
    }
    match decision.veto_reason() {
        None => {}
        Some(VetoReason::PositionSizeGuard) if !decision.votes().is_empty() => m.sizing_downgrades.inc(),
        Some(reason) if reason.is_session() => m.vetoes_session.inc(),
        Some(
            VetoReason::EventRiskGuard | VetoReason::ExposureGuard | VetoReason::OptionsDataGuard,
        ) => m.vetoes_agent.inc(),
        Some(_) => m.vetoes_risk_guard.inc(),
    }
}

pub fn record_error(err: &EngineError) {
    if let Some(m) = metrics() {
        match err {
            EngineError::Validation(_) => m.validation_errors.inc(),
            EngineError::Invariant(_) => m.invariant_violations.inc(),
        }
    }
}

/// Prometheus text exposition of every desk counter
pub fn encode() -> String {
    let m = match metrics() {
        Some(m) => m,
        None => return String::new(),
    };
    match TextEncoder::new().encode_to_string(&m.registry().gather()) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn test_metrics_register_and_encode() {
        let m = metrics().expect("metrics registered");
        let before = m.validation_errors.get();
        record_error(&EngineError::Validation(ValidationError::Malformed("x".to_string())));
        assert!(m.validation_errors.get() > before);

        let text = encode();
        assert!(text.contains("desk_validation_errors"));
        assert!(text.contains("desk_decisions_total"));
    }
}
