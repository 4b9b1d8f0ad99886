use serde::{Deserialize, Serialize};
use std::fmt;

use crate::metrics::Metrics;

/// Outcome of the information gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Answer,
    Refuse,
}

impl Decision {
    pub fn is_answer(self) -> bool {
        matches!(self, Decision::Answer)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Answer => f.write_str("ANSWER"),
            Decision::Refuse => f.write_str("REFUSE"),
        }
    }
}

/// A decision together with the human-readable reasoning behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub decision: Decision,
    pub decision_answer: bool,
    pub rationale: String,
}

/// Apply both gates: enough information relative to the target
/// (`isr ≥ isr_threshold`) and enough margin over it
/// (`delta_bar ≥ b2t + margin_extra_bits`).
pub fn decide(metrics: &Metrics, isr_threshold: f64, margin_extra_bits: f64) -> GateDecision {
    let isr_ok = metrics.isr >= isr_threshold;
    let margin_ok = metrics.delta_bar >= metrics.b2t + margin_extra_bits;
    let decision = if isr_ok && margin_ok {
        Decision::Answer
    } else {
        Decision::Refuse
    };

    let outcome = match (isr_ok, margin_ok) {
        (true, true) => "both gates pass".to_string(),
        (false, true) => format!("ISR below threshold {isr_threshold:.3}"),
        (true, false) => format!("information margin below {margin_extra_bits:.3} nats"),
        (false, false) => format!(
            "ISR below threshold {isr_threshold:.3} and information margin below {margin_extra_bits:.3} nats"
        ),
    };

    let rationale = format!(
        "Δ̄={:.4} nats, B2T={:.4} nats, ISR={:.3}, RoH bound={:.4}, q_lo={:.4}; {} → {}",
        metrics.delta_bar,
        metrics.b2t,
        metrics.isr,
        metrics.roh_bound,
        metrics.q_conservative,
        outcome,
        decision
    );

    GateDecision {
        decision,
        decision_answer: decision.is_answer(),
        rationale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(delta_bar: f64, b2t: f64) -> Metrics {
        Metrics {
            delta_bar,
            b2t,
            isr: delta_bar / b2t,
            roh_bound: 0.1,
            q_conservative: 0.2,
            q_avg: 0.3,
        }
    }

    #[test]
    fn answers_when_both_gates_hold() {
        let d = decide(&metrics(3.0, 1.0), 1.0, 0.2);
        assert_eq!(d.decision, Decision::Answer);
        assert!(d.decision_answer);
        assert!(d.rationale.ends_with("ANSWER"));
    }

    #[test]
    fn exact_boundaries_pass() {
        // isr == threshold and delta_bar == b2t + margin
        let d = decide(&metrics(2.0, 1.0), 2.0, 1.0);
        assert_eq!(d.decision, Decision::Answer);
    }

    #[test]
    fn margin_gate_alone_can_refuse() {
        let d = decide(&metrics(1.1, 1.0), 1.0, 0.2);
        assert_eq!(d.decision, Decision::Refuse);
        assert!(!d.decision_answer);
        assert!(d.rationale.contains("margin"));
    }

    #[test]
    fn rationale_cites_metrics_in_order() {
        let d = decide(&metrics(0.0, 0.5), 1.0, 0.2);
        let r = &d.rationale;
        let order = ["Δ̄=", "B2T=", "ISR=", "RoH bound=", "q_lo=", "REFUSE"];
        let positions: Vec<usize> = order.iter().map(|k| r.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{r}");
    }

    #[test]
    fn decision_serializes_uppercase() {
        assert_eq!(serde_json::to_value(Decision::Refuse).unwrap(), "REFUSE");
    }
}
