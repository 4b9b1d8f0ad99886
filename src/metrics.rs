//! Information metrics of the EDFL gate.
//!
//! All quantities are in nats. `delta_bar` is how much information the full
//! prompt adds over its skeletons, `b2t` is how much is needed to reach the
//! target hallucination rate, and their ratio is the information sufficiency
//! ratio.

use serde::{Deserialize, Serialize};

use crate::config::{ClipMode, Settings};
use crate::errors::{GateError, GateResult};
use crate::prior::{Grader, PriorEstimate};
use crate::sampler::SampleSet;

/// Floor for empirical answer probabilities, keeps `ln P` finite
pub const PROBABILITY_FLOOR: f64 = 1e-9;
/// One minus the certificate confidence level
pub const ALPHA: f64 = 0.05;
pub const CONFIDENCE: f64 = 1.0 - ALPHA;

const BISECTION_STEPS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub delta_bar: f64,
    pub b2t: f64,
    pub isr: f64,
    pub roh_bound: f64,
    pub q_conservative: f64,
    pub q_avg: f64,
}

/// Clip a per-sample lift to `B_clip`
pub fn clip(value: f64, b_clip: f64, mode: ClipMode) -> f64 {
    match mode {
        ClipMode::OneSided => value.min(b_clip),
        ClipMode::Symmetric => value.clamp(-b_clip, b_clip),
    }
}

/// `KL(Ber(p) ‖ Ber(q))` for `p ∈ [0,1]`, `q ∈ (0,1)`
pub fn kl_bernoulli(p: f64, q: f64) -> f64 {
    fn term(a: f64, b: f64) -> f64 {
        if a <= 0.0 {
            0.0
        } else {
            a * (a / b).ln()
        }
    }
    term(p, q) + term(1.0 - p, 1.0 - q)
}

/// Upper-tail KL: zero unless `p > q`
pub fn kl_plus(p: f64, q: f64) -> f64 {
    if p > q {
        kl_bernoulli(p, q)
    } else {
        0.0
    }
}

/// Bits-to-trust: information needed to certify a hallucination rate of at
/// most `h_star` against a prior of `q_conservative`, with a finite-sample
/// term for `n_eff` observations.
pub fn bits_to_trust(h_star: f64, q_conservative: f64, n_eff: usize) -> GateResult<f64> {
    if n_eff == 0 {
        return Err(GateError::insufficient_samples(
            "bits-to-trust needs at least one original completion",
        ));
    }
    check_probability("q_conservative", q_conservative)?;
    let b2t = kl_plus(1.0 - h_star, q_conservative) + (1.0 / ALPHA).ln() / n_eff as f64;
    if !b2t.is_finite() || b2t <= 0.0 {
        return Err(GateError::metric(format!(
            "bits-to-trust must be positive and finite, got {b2t}"
        )));
    }
    Ok(b2t)
}

/// Hallucination-risk bound: the lowest rate `delta_bar` nats of information
/// can push the prior mass `q_avg` down to,
/// `inf{p ∈ [0, q_avg] : KL(Ber(p) ‖ Ber(q_avg)) ≤ max(delta_bar, 0)}`.
///
/// Non-increasing in `delta_bar`, non-decreasing in `q_avg`.
pub fn roh_bound(delta_bar: f64, q_avg: f64) -> f64 {
    let budget = delta_bar.max(0.0);
    if kl_bernoulli(0.0, q_avg) <= budget {
        return 0.0;
    }
    // KL(p ‖ q_avg) falls on [0, q_avg]; keep `hi` inside the budget.
    let (mut lo, mut hi) = (0.0, q_avg);
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if kl_bernoulli(mid, q_avg) <= budget {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi.clamp(0.0, 1.0)
}

/// Fraction of `set` the grader judges equivalent to `answer`, floored
fn answer_probability(prompt: &str, answer: &str, set: &SampleSet, grader: &dyn Grader) -> f64 {
    if set.is_empty() {
        return PROBABILITY_FLOOR;
    }
    let hits = set
        .texts()
        .filter(|candidate| grader.equivalent(prompt, answer, candidate))
        .count();
    (hits as f64 / set.len() as f64).max(PROBABILITY_FLOOR)
}

/// Mean clipped lift `ln P_full(y) − ln P_k(y)` over every original
/// completion `y` and every surviving skeleton `k`.
pub fn mean_lift(
    prompt: &str,
    original: &SampleSet,
    skeletons: &[SampleSet],
    b_clip: f64,
    mode: ClipMode,
    grader: &dyn Grader,
) -> GateResult<f64> {
    let surviving: Vec<&SampleSet> = skeletons.iter().filter(|s| !s.is_empty()).collect();
    if original.is_empty() || surviving.is_empty() {
        return Err(GateError::insufficient_evidence(
            "information lift needs original and skeleton completions",
        ));
    }

    let mut total = 0.0;
    let mut pairs = 0usize;
    for answer in original.texts() {
        let full = answer_probability(prompt, answer, original, grader).ln();
        for skeleton in &surviving {
            let reduced = answer_probability(prompt, answer, skeleton, grader).ln();
            total += clip(full - reduced, b_clip, mode);
            pairs += 1;
        }
    }
    Ok(total / pairs as f64)
}

/// Compute the full metric bundle for one evaluation.
pub fn compute(
    prompt: &str,
    original: &SampleSet,
    skeletons: &[SampleSet],
    prior: &PriorEstimate,
    settings: &Settings,
    grader: &dyn Grader,
) -> GateResult<Metrics> {
    check_probability("q_avg", prior.q_avg)?;
    if prior.q_conservative > prior.q_avg {
        return Err(GateError::metric(format!(
            "q_conservative {} exceeds q_avg {}",
            prior.q_conservative, prior.q_avg
        )));
    }

    let delta_bar = mean_lift(
        prompt,
        original,
        skeletons,
        settings.b_clip,
        settings.clip_mode,
        grader,
    )?;
    if !delta_bar.is_finite() {
        return Err(GateError::metric(format!("delta_bar is not finite: {delta_bar}")));
    }

    let b2t = bits_to_trust(settings.h_star, prior.q_conservative, original.len())?;
    let metrics = Metrics {
        delta_bar,
        b2t,
        isr: delta_bar / b2t,
        roh_bound: roh_bound(delta_bar, prior.q_avg),
        q_conservative: prior.q_conservative,
        q_avg: prior.q_avg,
    };
    tracing::debug!(?metrics, "information metrics computed");
    Ok(metrics)
}

fn check_probability(name: &str, value: f64) -> GateResult<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(GateError::metric(format!("{name} must lie in (0, 1), got {value}")))
    }
}
