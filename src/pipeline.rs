//! End-to-end evaluation of one prompt.
//!
//! skeletons → sampling → reference answer → prior → metrics → decision →
//! optional answer → certificate. Every step is a pure function of the
//! previous step's output except sampling, which is the only I/O.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::certificate::{self, SlaCertificate};
use crate::config::{Settings, SkeletonPolicy, SUPPORTED_MODELS};
use crate::decision::{decide, Decision, GateDecision};
use crate::errors::{GateError, GateResult};
use crate::metrics::{self, Metrics};
use crate::prior::{self, Grader, NormalizedMatch};
use crate::provider::{CompletionRequest, ModelProvider};
use crate::sampler::{SampleSet, Sampler, SamplerConfig};
use crate::skeleton;

pub const ANSWER_MAX_TOKENS: u32 = 256;
pub const REFUSAL_ANSWER: &str = "Request refused - insufficient information confidence";
pub const EMPTY_ANSWER: &str = "No answer generated";

/// How much evidence actually backed an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub evaluation_id: Uuid,
    pub skeleton_policy: SkeletonPolicy,
    pub reference_answer: String,
    pub original_samples: usize,
    pub original_dropped: usize,
    pub skeleton_samples: Vec<usize>,
    pub excluded_variants: Vec<usize>,
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub decision: Decision,
    pub decision_answer: bool,
    pub rationale: String,
    pub metrics: Metrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub sla_certificate: SlaCertificate,
    pub settings_used: Settings,
    pub diagnostics: Diagnostics,
}

/// Runs evaluations against one provider. Cheap to share behind an `Arc`.
pub struct Evaluator {
    sampler: Sampler,
    grader: Arc<dyn Grader>,
    models: Vec<String>,
}

impl Evaluator {
    pub fn new(provider: Arc<dyn ModelProvider>, config: SamplerConfig) -> Self {
        Self::from_sampler(Sampler::new(provider, config))
    }

    pub fn from_sampler(sampler: Sampler) -> Self {
        Self {
            sampler,
            grader: Arc::new(NormalizedMatch),
            models: SUPPORTED_MODELS.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Replace the answer-equivalence grader
    pub fn with_grader(mut self, grader: Arc<dyn Grader>) -> Self {
        self.grader = grader;
        self
    }

    /// Restrict or extend the accepted model ids
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Evaluate `prompt` under `settings`.
    pub async fn evaluate(&self, prompt: &str, settings: &Settings) -> GateResult<EvaluationResult> {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("evaluation", id = %id);
        self.run(id, prompt, settings).instrument(span).await
    }

    async fn run(&self, id: Uuid, prompt: &str, settings: &Settings) -> GateResult<EvaluationResult> {
        settings.validate()?;
        if prompt.trim().is_empty() {
            return Err(GateError::configuration("prompt must not be empty"));
        }
        if !self.models.iter().any(|m| m == &settings.model) {
            return Err(GateError::configuration(format!(
                "unsupported model '{}'",
                settings.model
            )));
        }

        tracing::info!(
            model = %settings.model,
            n_samples = settings.n_samples,
            m = settings.m,
            policy = %settings.skeleton_policy,
            "evaluation started"
        );

        let skeletons = skeleton::generate(prompt, settings.m, settings.skeleton_policy)?;
        let applied_policy = skeletons
            .first()
            .map(|s| s.policy)
            .unwrap_or(settings.skeleton_policy);

        let mut requests = Vec::with_capacity(skeletons.len() + 1);
        requests.push(CompletionRequest::for_settings(prompt, settings));
        requests.extend(
            skeletons
                .iter()
                .map(|s| CompletionRequest::for_settings(s.text.as_str(), settings)),
        );

        let mut sets = self
            .sampler
            .sample_variants(&requests, settings.n_samples)
            .await?;
        let skeleton_sets: Vec<SampleSet> = sets.split_off(1);
        let original = sets.pop().unwrap_or_default();
        if original.is_empty() {
            return Err(GateError::insufficient_samples(format!(
                "all {} completions of the original prompt failed",
                settings.n_samples
            )));
        }

        let grader = self.grader.as_ref();
        let reference = prior::reference_answer(prompt, &original, grader)?;
        let prior = prior::estimate(prompt, &reference, &skeleton_sets, grader)?;
        if prior.degraded {
            tracing::warn!(
                excluded = ?prior.excluded,
                "evaluation degraded: skeleton variants without completions were excluded"
            );
        }

        let metrics = metrics::compute(prompt, &original, &skeleton_sets, &prior, settings, grader)?;
        let decision = decide(&metrics, settings.isr_threshold, settings.margin_extra_bits);
        tracing::info!(
            decision = %decision.decision,
            delta_bar = metrics.delta_bar,
            b2t = metrics.b2t,
            isr = metrics.isr,
            "evaluation decided"
        );

        let answer = if settings.generate_answer {
            Some(self.answer(prompt, settings, &decision).await)
        } else {
            None
        };

        let sla_certificate = certificate::build(prompt, settings, &metrics, &decision, Utc::now())?;

        Ok(EvaluationResult {
            decision: decision.decision,
            decision_answer: decision.decision_answer,
            rationale: decision.rationale,
            metrics,
            answer,
            sla_certificate,
            settings_used: settings.clone(),
            diagnostics: Diagnostics {
                evaluation_id: id,
                skeleton_policy: applied_policy,
                reference_answer: reference,
                original_samples: original.len(),
                original_dropped: original.dropped,
                skeleton_samples: skeleton_sets.iter().map(SampleSet::len).collect(),
                excluded_variants: prior.excluded,
                degraded: prior.degraded,
            },
        })
    }

    /// Deterministic answer for an ANSWER decision; never changes the decision.
    async fn answer(&self, prompt: &str, settings: &Settings, decision: &GateDecision) -> String {
        if !decision.decision_answer {
            return REFUSAL_ANSWER.to_string();
        }
        let request = CompletionRequest {
            temperature: 0.0,
            max_tokens: Some(ANSWER_MAX_TOKENS),
            ..CompletionRequest::for_settings(prompt, settings)
        };
        match self.sampler.complete(&request).await {
            Ok(completion) if completion.text.trim().is_empty() => EMPTY_ANSWER.to_string(),
            Ok(completion) => completion.text,
            Err(e) => {
                tracing::warn!("answer generation failed: {e}");
                format!("Error generating answer: {e}")
            }
        }
    }
}
