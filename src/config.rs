// Evaluation settings for the EDFL gate
// Purpose: the immutable settings bundle one evaluation runs under, plus the
// partial overlay callers use to adjust it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{GateError, GateResult};

/// Models the bundled provider adapter is known to serve.
pub const SUPPORTED_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4.1",
    "gpt-4.1-mini",
    "gpt-4.1-nano",
    "gpt-5",
    "gpt-5-mini",
    "gpt-5-nano",
];

pub const RECOMMENDED_MODEL: &str = "gpt-4.1-mini";

pub const MAX_SAMPLES: usize = 15;
pub const MAX_SKELETONS: usize = 12;
pub const MIN_SKELETONS: usize = 2;
pub const MAX_ISR_THRESHOLD: f64 = 5.0;
pub const MAX_MARGIN_NATS: f64 = 5.0;
pub const MAX_B_CLIP: f64 = 50.0;

const VERBOSITY_LEVELS: &[&str] = &["low", "medium", "high"];
const REASONING_EFFORTS: &[&str] = &["minimal", "low", "medium", "high"];

/// How skeleton prompts are derived from the original prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkeletonPolicy {
    Auto,
    EvidenceErase,
    ClosedBook,
}

impl fmt::Display for SkeletonPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SkeletonPolicy::Auto => "auto",
            SkeletonPolicy::EvidenceErase => "evidence_erase",
            SkeletonPolicy::ClosedBook => "closed_book",
        };
        f.write_str(name)
    }
}

impl FromStr for SkeletonPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(SkeletonPolicy::Auto),
            "evidence_erase" => Ok(SkeletonPolicy::EvidenceErase),
            "closed_book" => Ok(SkeletonPolicy::ClosedBook),
            other => Err(format!("unknown skeleton policy '{other}'")),
        }
    }
}

/// Which side(s) of the per-sample information lift get clipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipMode {
    #[serde(rename = "one-sided")]
    OneSided,
    #[serde(rename = "symmetric")]
    Symmetric,
}

impl fmt::Display for ClipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipMode::OneSided => f.write_str("one-sided"),
            ClipMode::Symmetric => f.write_str("symmetric"),
        }
    }
}

impl FromStr for ClipMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one-sided" | "one_sided" => Ok(ClipMode::OneSided),
            "symmetric" => Ok(ClipMode::Symmetric),
            other => Err(format!("unknown clip mode '{other}'")),
        }
    }
}

/// Settings for a single evaluation.
///
/// Field names on the wire match the public API (`B_clip`, `h_star`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub model: String,
    pub h_star: f64,
    pub n_samples: usize,
    pub m: usize,
    pub skeleton_policy: SkeletonPolicy,
    pub temperature: f64,
    pub isr_threshold: f64,
    pub margin_extra_bits: f64,
    #[serde(rename = "B_clip")]
    pub b_clip: f64,
    pub clip_mode: ClipMode,
    pub generate_answer: bool,
    pub verbosity: String,
    pub reasoning_effort: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: RECOMMENDED_MODEL.to_string(),
            h_star: 0.05,
            n_samples: 7,
            m: 6,
            skeleton_policy: SkeletonPolicy::ClosedBook,
            temperature: 0.3,
            isr_threshold: 1.0,
            margin_extra_bits: 0.2,
            b_clip: 12.0,
            clip_mode: ClipMode::OneSided,
            generate_answer: false,
            verbosity: "low".to_string(),
            reasoning_effort: "minimal".to_string(),
        }
    }
}

/// Partial settings; every present field replaces the base value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_star: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_samples: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skeleton_policy: Option<SkeletonPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isr_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_extra_bits: Option<f64>,
    #[serde(rename = "B_clip", default, skip_serializing_if = "Option::is_none")]
    pub b_clip: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_mode: Option<ClipMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_answer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

impl Settings {
    /// Overlay `overrides` on a copy of these settings
    pub fn with_overrides(&self, overrides: &SettingsOverrides) -> Self {
        let mut next = self.clone();
        if let Some(model) = &overrides.model {
            next.model = model.clone();
        }
        if let Some(v) = overrides.h_star {
            next.h_star = v;
        }
        if let Some(v) = overrides.n_samples {
            next.n_samples = v;
        }
        if let Some(v) = overrides.m {
            next.m = v;
        }
        if let Some(v) = overrides.skeleton_policy {
            next.skeleton_policy = v;
        }
        if let Some(v) = overrides.temperature {
            next.temperature = v;
        }
        if let Some(v) = overrides.isr_threshold {
            next.isr_threshold = v;
        }
        if let Some(v) = overrides.margin_extra_bits {
            next.margin_extra_bits = v;
        }
        if let Some(v) = overrides.b_clip {
            next.b_clip = v;
        }
        if let Some(v) = overrides.clip_mode {
            next.clip_mode = v;
        }
        if let Some(v) = overrides.generate_answer {
            next.generate_answer = v;
        }
        if let Some(v) = &overrides.verbosity {
            next.verbosity = v.clone();
        }
        if let Some(v) = &overrides.reasoning_effort {
            next.reasoning_effort = v.clone();
        }
        next
    }

    /// Reject settings outside the documented ranges
    pub fn validate(&self) -> GateResult<()> {
        if self.model.trim().is_empty() {
            return Err(GateError::configuration("model must not be empty"));
        }
        check_range("h_star", self.h_star, |v| v > 0.0 && v <= 0.5, "(0, 0.5]")?;
        if self.n_samples < 1 || self.n_samples > MAX_SAMPLES {
            return Err(GateError::configuration(format!(
                "n_samples must be within [1, {MAX_SAMPLES}], got {}",
                self.n_samples
            )));
        }
        if self.m < MIN_SKELETONS || self.m > MAX_SKELETONS {
            return Err(GateError::configuration(format!(
                "m must be within [{MIN_SKELETONS}, {MAX_SKELETONS}], got {}",
                self.m
            )));
        }
        check_range(
            "temperature",
            self.temperature,
            |v| (0.0..=1.0).contains(&v),
            "[0, 1]",
        )?;
        check_range(
            "isr_threshold",
            self.isr_threshold,
            |v| v > 0.0 && v <= MAX_ISR_THRESHOLD,
            "(0, 5]",
        )?;
        check_range(
            "margin_extra_bits",
            self.margin_extra_bits,
            |v| (0.0..=MAX_MARGIN_NATS).contains(&v),
            "[0, 5]",
        )?;
        check_range("B_clip", self.b_clip, |v| v > 0.0 && v <= MAX_B_CLIP, "(0, 50]")?;
        if !VERBOSITY_LEVELS.contains(&self.verbosity.as_str()) {
            return Err(GateError::configuration(format!(
                "verbosity must be one of {VERBOSITY_LEVELS:?}, got '{}'",
                self.verbosity
            )));
        }
        if !REASONING_EFFORTS.contains(&self.reasoning_effort.as_str()) {
            return Err(GateError::configuration(format!(
                "reasoning_effort must be one of {REASONING_EFFORTS:?}, got '{}'",
                self.reasoning_effort
            )));
        }
        Ok(())
    }
}

fn check_range(field: &str, value: f64, ok: impl Fn(f64) -> bool, range: &str) -> GateResult<()> {
    if value.is_finite() && ok(value) {
        Ok(())
    } else {
        Err(GateError::configuration(format!(
            "{field} must be within {range}, got {value}"
        )))
    }
}
