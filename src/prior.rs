//! Prior estimation from skeleton samples.
//!
//! The prior `q` for a skeleton is how often the model, without the
//! information the prompt supplies, still lands on the reference answer.

use serde::{Deserialize, Serialize};

use crate::errors::{GateError, GateResult};
use crate::sampler::SampleSet;

/// Judges whether a candidate completion gives the same answer as a reference
pub trait Grader: Send + Sync {
    fn equivalent(&self, prompt: &str, reference: &str, candidate: &str) -> bool;
}

/// Default grader: equality after [`normalize_answer`]
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedMatch;

impl Grader for NormalizedMatch {
    fn equivalent(&self, _prompt: &str, reference: &str, candidate: &str) -> bool {
        normalize_answer(reference) == normalize_answer(candidate)
    }
}

/// Lowercase, drop punctuation, collapse whitespace
pub fn normalize_answer(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !c.is_ascii_punctuation() && !matches!(*c, '“' | '”' | '‘' | '’' | '…'))
        .collect::<String>()
        .to_lowercase();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Majority answer among the original prompt's completions.
///
/// Completions are grouped by grader equivalence; on a tie the group whose
/// first member appears earliest wins.
pub fn reference_answer(prompt: &str, original: &SampleSet, grader: &dyn Grader) -> GateResult<String> {
    let texts: Vec<&str> = original.texts().collect();
    let mut best: Option<(usize, usize)> = None;
    for (i, candidate) in texts.iter().enumerate() {
        // Only count from the first member of each group.
        if texts[..i].iter().any(|earlier| grader.equivalent(prompt, earlier, candidate)) {
            continue;
        }
        let support = texts
            .iter()
            .filter(|other| grader.equivalent(prompt, candidate, other))
            .count();
        match best {
            Some((_, top)) if support <= top => {}
            _ => best = Some((i, support)),
        }
    }
    best.map(|(i, _)| texts[i].to_string()).ok_or_else(|| {
        GateError::insufficient_samples("no completions of the original prompt to take a reference from")
    })
}

/// Agreement of one skeleton variant with the reference answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantPrior {
    pub index: usize,
    pub samples: usize,
    pub agreeing: usize,
    /// Jeffreys-smoothed agreement rate; `None` when the variant was excluded
    pub q: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorEstimate {
    pub q_conservative: f64,
    pub q_avg: f64,
    pub variants: Vec<VariantPrior>,
    pub excluded: Vec<usize>,
    pub degraded: bool,
}

/// `(k + ½) / (n + 1)`, strictly inside (0, 1)
pub fn jeffreys_rate(agreeing: usize, samples: usize) -> f64 {
    (agreeing as f64 + 0.5) / (samples as f64 + 1.0)
}

/// Estimate `(q_conservative, q_avg)` from the skeleton sample sets.
pub fn estimate(
    prompt: &str,
    reference: &str,
    skeletons: &[SampleSet],
    grader: &dyn Grader,
) -> GateResult<PriorEstimate> {
    let mut variants = Vec::with_capacity(skeletons.len());
    let mut excluded = Vec::new();

    for (index, set) in skeletons.iter().enumerate() {
        if set.is_empty() {
            tracing::warn!(variant = index, "skeleton variant has no completions; excluded");
            excluded.push(index);
            variants.push(VariantPrior {
                index,
                samples: 0,
                agreeing: 0,
                q: None,
            });
            continue;
        }
        let agreeing = set
            .texts()
            .filter(|candidate| grader.equivalent(prompt, reference, candidate))
            .count();
        let q = jeffreys_rate(agreeing, set.len());
        tracing::debug!(variant = index, agreeing, samples = set.len(), q, "skeleton prior");
        variants.push(VariantPrior {
            index,
            samples: set.len(),
            agreeing,
            q: Some(q),
        });
    }

    let rates: Vec<f64> = variants.iter().filter_map(|v| v.q).collect();
    if rates.is_empty() {
        return Err(GateError::insufficient_evidence(format!(
            "all {} skeleton variants returned no completions",
            skeletons.len()
        )));
    }

    let q_avg = rates.iter().sum::<f64>() / rates.len() as f64;
    let q_conservative = rates.iter().copied().fold(f64::INFINITY, f64::min);

    Ok(PriorEstimate {
        q_conservative,
        q_avg,
        variants,
        degraded: !excluded.is_empty(),
        excluded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_ignores_case_punctuation_and_spacing() {
        assert_eq!(normalize_answer("  Frank   Herbert. "), "frank herbert");
        assert_eq!(normalize_answer("“Dune!”"), "dune");
        assert!(NormalizedMatch.equivalent("", "Paris", "paris."));
        assert!(!NormalizedMatch.equivalent("", "Paris", "Lyon"));
    }

    #[test]
    fn reference_is_majority_with_first_occurrence_tiebreak() {
        let set = SampleSet::from_texts(["Lyon", "Paris", "paris", "Lyon!", "Nice"]);
        // Lyon and Paris both have two votes; Lyon appears first.
        assert_eq!(reference_answer("", &set, &NormalizedMatch).unwrap(), "Lyon");

        let set = SampleSet::from_texts(["Nice", "Paris", "paris"]);
        assert_eq!(reference_answer("", &set, &NormalizedMatch).unwrap(), "Paris");
    }

    #[test]
    fn empty_original_has_no_reference() {
        let err = reference_answer("", &SampleSet::default(), &NormalizedMatch).unwrap_err();
        assert_eq!(err.type_name(), "InsufficientSamplesError");
    }

    #[test]
    fn priors_are_smoothed_and_ordered() {
        let sets = vec![
            SampleSet::from_texts(["Paris", "Paris", "Lyon", "Paris"]),
            SampleSet::from_texts(["Lyon", "Nice", "Lyon", "Lyon"]),
        ];
        let prior = estimate("", "Paris", &sets, &NormalizedMatch).unwrap();
        assert_eq!(prior.variants[0].q, Some(3.5 / 5.0));
        assert_eq!(prior.variants[1].q, Some(0.5 / 5.0));
        assert_eq!(prior.q_conservative, 0.1);
        assert!((prior.q_avg - 0.4).abs() < 1e-12);
        assert!(!prior.degraded);
    }

    #[test]
    fn empty_variant_is_excluded() {
        let sets = vec![
            SampleSet::from_texts(["Paris"]),
            SampleSet {
                completions: vec![],
                dropped: 3,
            },
        ];
        let prior = estimate("", "Paris", &sets, &NormalizedMatch).unwrap();
        assert!(prior.degraded);
        assert_eq!(prior.excluded, vec![1]);
        assert_eq!(prior.q_avg, prior.q_conservative);
    }

    #[test]
    fn all_variants_empty_is_insufficient_evidence() {
        let sets = vec![SampleSet::default(), SampleSet::default()];
        let err = estimate("", "Paris", &sets, &NormalizedMatch).unwrap_err();
        assert_eq!(err.type_name(), "InsufficientEvidenceError");
    }
}
