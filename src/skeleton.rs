//! Skeleton prompt generation.
//!
//! A skeleton is the original prompt with the information it supplies taken
//! away. Sampling skeletons tells us what the model produces from parametric
//! memory alone, which is the prior the information lift is measured against.

use lazy_static::lazy_static;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{SkeletonPolicy, MIN_SKELETONS};
use crate::errors::{GateError, GateResult};

pub const MASK_TOKEN: &str = "[…]";

lazy_static! {
    static ref EVIDENCE_HEADER: Regex =
        Regex::new(r"(?i)^\s*(evidence|context|passage|document|source|background)\s*:").unwrap();
    static ref QUESTION_HEADER: Regex = Regex::new(r"(?i)^\s*(question|q)\s*:").unwrap();
    static ref QUOTED_SPAN: Regex = Regex::new(r#""[^"\n]+"|“[^”\n]+”"#).unwrap();
    static ref NUMBER_SPAN: Regex = Regex::new(r"\b\d[\d,.:/-]*\b").unwrap();
    static ref ENTITY_SPAN: Regex =
        Regex::new(r"\b[A-Z][\w'’-]*(?:\s+(?:of|the|de|von|van|la)?\s*[A-Z][\w'’-]*)*").unwrap();
}

/// One context-reduced version of the prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkeletonVariant {
    pub index: usize,
    pub text: String,
    /// Policy actually applied (`auto` resolves to one of the other two)
    pub policy: SkeletonPolicy,
}

/// Produce `m` skeleton variants of `prompt` under `policy`.
pub fn generate(prompt: &str, m: usize, policy: SkeletonPolicy) -> GateResult<Vec<SkeletonVariant>> {
    if m < MIN_SKELETONS {
        return Err(GateError::configuration(format!(
            "at least {MIN_SKELETONS} skeleton variants are required, got {m}"
        )));
    }

    let resolved = match policy {
        SkeletonPolicy::Auto if has_evidence_block(prompt) => SkeletonPolicy::EvidenceErase,
        SkeletonPolicy::Auto => SkeletonPolicy::ClosedBook,
        other => other,
    };

    let variants = match resolved {
        SkeletonPolicy::EvidenceErase => {
            let erased = erase_evidence(prompt);
            if erased.is_empty() {
                // Nothing but evidence: fall back to masking the whole prompt.
                closed_book_variants(prompt, m, resolved)
            } else {
                (0..m)
                    .map(|index| SkeletonVariant {
                        index,
                        text: erased.clone(),
                        policy: resolved,
                    })
                    .collect()
            }
        }
        _ => closed_book_variants(prompt, m, resolved),
    };

    tracing::debug!(
        requested = %policy,
        applied = %resolved,
        count = variants.len(),
        "generated skeleton variants"
    );
    Ok(variants)
}

/// Whether the prompt carries a delimited evidence/context block
pub fn has_evidence_block(prompt: &str) -> bool {
    prompt.lines().any(|line| EVIDENCE_HEADER.is_match(line))
}

/// Remove every evidence block, keeping the question frame.
///
/// A block starts at an evidence header line and runs until a blank line or
/// a question header.
pub fn erase_evidence(prompt: &str) -> String {
    let mut kept = Vec::new();
    let mut in_block = false;
    for line in prompt.lines() {
        if EVIDENCE_HEADER.is_match(line) {
            in_block = true;
            continue;
        }
        if in_block {
            if line.trim().is_empty() {
                in_block = false;
            } else if QUESTION_HEADER.is_match(line) {
                in_block = false;
                kept.push(line);
            }
            continue;
        }
        kept.push(line);
    }
    kept.join("\n").trim().to_string()
}

fn closed_book_variants(prompt: &str, m: usize, policy: SkeletonPolicy) -> Vec<SkeletonVariant> {
    let spans = salient_spans(prompt);
    (0..m)
        .map(|index| {
            let text = if spans.is_empty() {
                prompt.trim().to_string()
            } else {
                let count = masked_span_count(spans.len(), index, m);
                let mut order: Vec<usize> = (0..spans.len()).collect();
                let mut rng = StdRng::seed_from_u64(index as u64);
                order.shuffle(&mut rng);
                let mut chosen = order[..count].to_vec();
                chosen.sort_unstable();
                mask_spans(prompt, &spans, &chosen)
            };
            SkeletonVariant {
                index,
                text,
                policy,
            }
        })
        .collect()
}

/// Spans masked by variant `index`: from 30% for the first variant up to all
/// spans for the last one, never fewer than one.
fn masked_span_count(spans: usize, index: usize, m: usize) -> usize {
    let den = 10 * (m - 1);
    let num = spans * (3 * (m - 1) + 7 * index);
    num.div_ceil(den).clamp(1, spans)
}

/// Quoted strings, numbers and capitalised entity phrases, non-overlapping
/// and in text order. Sentence-initial capitals are not entities on their own.
fn salient_spans(prompt: &str) -> Vec<(usize, usize)> {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    spans.extend(QUOTED_SPAN.find_iter(prompt).map(|m| (m.start(), m.end())));
    spans.extend(NUMBER_SPAN.find_iter(prompt).map(|m| (m.start(), m.end())));

    for found in ENTITY_SPAN.find_iter(prompt) {
        let (mut start, end) = (found.start(), found.end());
        if is_sentence_start(prompt, start) {
            // Drop the leading word; keep the rest if it is still an entity.
            match prompt[start..end].find(char::is_whitespace) {
                Some(offset) => {
                    let rest = &prompt[start + offset..end];
                    let skip = rest.len() - rest.trim_start().len();
                    start += offset + skip;
                    if !prompt[start..end].starts_with(|c: char| c.is_uppercase()) {
                        continue;
                    }
                }
                None => continue,
            }
        }
        spans.push((start, end));
    }

    spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last() {
            Some(last) if span.0 < last.1 => {}
            _ => merged.push(span),
        }
    }
    merged
}

fn is_sentence_start(text: &str, at: usize) -> bool {
    match text[..at].trim_end().chars().last() {
        None => true,
        Some(c) => matches!(c, '.' | '?' | '!' | ':' | '\n'),
    }
}

fn mask_spans(prompt: &str, spans: &[(usize, usize)], chosen: &[usize]) -> String {
    let mut out = String::with_capacity(prompt.len());
    let mut cursor = 0;
    for &i in chosen {
        let (start, end) = spans[i];
        out.push_str(&prompt[cursor..start]);
        out.push_str(MASK_TOKEN);
        cursor = end;
    }
    out.push_str(&prompt[cursor..]);
    out.trim().to_string()
}
