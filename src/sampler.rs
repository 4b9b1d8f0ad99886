//! Repeated sampling of prompt variants.
//!
//! Every `(variant, sample)` pair is an independent completion call. Calls
//! are scattered onto a tokio task set and gathered back by index, so the
//! resulting sample sets do not depend on completion order. A shared
//! semaphore bounds how many calls are in flight; callers beyond the bound
//! queue on the semaphore instead of failing.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::errors::{GateError, GateResult};
use crate::provider::{Completion, CompletionRequest, ModelProvider, ProviderError};

/// Retry, timeout and admission settings for completion calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_jitter")]
    pub jitter_percent: f64,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.20
}

fn default_call_timeout() -> u64 {
    30
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            max_retries: 3,
            backoff_base_ms: 250,
            backoff_max_ms: 4000,
            backoff_factor: default_backoff_factor(),
            jitter_percent: default_jitter(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

impl SamplerConfig {
    /// Backoff before retry number `attempt` (0-based), with ±jitter
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base = (self.backoff_base_ms as f64 * self.backoff_factor.powi(attempt as i32))
            .min(self.backoff_max_ms as f64);
        let jitter_range = base * self.jitter_percent;
        let jitter = if jitter_range > 0.0 {
            rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        Duration::from_millis((base + jitter).max(0.0) as u64)
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }
}

/// Completions collected for one prompt variant, in sample order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    pub completions: Vec<Completion>,
    /// Samples that still failed after the retry budget
    pub dropped: usize,
}

impl SampleSet {
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            completions: texts.into_iter().map(Completion::text).collect(),
            dropped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.completions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completions.is_empty()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.completions.iter().map(|c| c.text.as_str())
    }
}

/// Issues completion calls against a provider under bounded concurrency
#[derive(Clone)]
pub struct Sampler {
    provider: Arc<dyn ModelProvider>,
    limiter: Arc<Semaphore>,
    config: SamplerConfig,
}

impl Sampler {
    pub fn new(provider: Arc<dyn ModelProvider>, config: SamplerConfig) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self::with_limiter(provider, config, limiter)
    }

    /// Share an existing admission limiter (one per provider connection pool)
    pub fn with_limiter(
        provider: Arc<dyn ModelProvider>,
        config: SamplerConfig,
        limiter: Arc<Semaphore>,
    ) -> Self {
        Self {
            provider,
            limiter,
            config,
        }
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// A single completion under the same admission, timeout and retry rules
    pub async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        complete_with_retry(
            Arc::clone(&self.provider),
            Arc::clone(&self.limiter),
            &self.config,
            request,
        )
        .await
    }

    /// Sample one variant `n` times; an empty result is an error.
    pub async fn sample(&self, request: &CompletionRequest, n: usize) -> GateResult<SampleSet> {
        let mut sets = self.sample_variants(std::slice::from_ref(request), n).await?;
        let set = sets.pop().unwrap_or_default();
        if set.is_empty() {
            return Err(GateError::insufficient_samples(format!(
                "all {n} completions failed for the requested prompt"
            )));
        }
        Ok(set)
    }

    /// Sample every request `n` times concurrently and wait for all of them.
    ///
    /// Sets are returned in request order. Dropped samples are counted, not
    /// reported as errors; an invalid model aborts the whole batch.
    pub async fn sample_variants(
        &self,
        requests: &[CompletionRequest],
        n: usize,
    ) -> GateResult<Vec<SampleSet>> {
        let mut slots: Vec<Vec<Option<Completion>>> = vec![vec![None; n]; requests.len()];
        let mut dropped = vec![0usize; requests.len()];
        let mut join_set = JoinSet::new();

        for (variant, request) in requests.iter().enumerate() {
            for sample in 0..n {
                let provider = Arc::clone(&self.provider);
                let limiter = Arc::clone(&self.limiter);
                let config = self.config.clone();
                let request = request.clone();
                join_set.spawn(async move {
                    let outcome = complete_with_retry(provider, limiter, &config, &request).await;
                    (variant, sample, outcome)
                });
            }
        }

        while let Some(joined) = join_set.join_next().await {
            let (variant, sample, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("completion task failed to join: {e}");
                    continue;
                }
            };
            match outcome {
                Ok(completion) => slots[variant][sample] = Some(completion),
                Err(err @ ProviderError::InvalidModel { .. }) => {
                    join_set.abort_all();
                    return Err(GateError::from_provider(err));
                }
                Err(err) => {
                    tracing::warn!(variant, sample, "dropping sample after retries: {err}");
                    dropped[variant] += 1;
                }
            }
        }

        let sets: Vec<SampleSet> = slots
            .into_iter()
            .zip(dropped)
            .map(|(slot, dropped)| {
                let completions: Vec<Completion> = slot.into_iter().flatten().collect();
                // A panicked task leaves an empty slot that was never counted.
                let dropped = dropped.max(n - completions.len());
                SampleSet {
                    completions,
                    dropped,
                }
            })
            .collect();

        for (variant, set) in sets.iter().enumerate() {
            tracing::debug!(variant, ok = set.len(), dropped = set.dropped, "variant sampled");
        }
        Ok(sets)
    }
}

/// One completion with timeout and bounded retries on transient failures.
async fn complete_with_retry(
    provider: Arc<dyn ModelProvider>,
    limiter: Arc<Semaphore>,
    config: &SamplerConfig,
    request: &CompletionRequest,
) -> Result<Completion, ProviderError> {
    let attempts = config.max_retries + 1;
    let mut last_error = ProviderError::Timeout;

    for attempt in 0..attempts {
        let outcome = {
            let _permit = limiter
                .acquire()
                .await
                .map_err(|_| ProviderError::Transport {
                    message: "admission limiter closed".into(),
                })?;
            match tokio::time::timeout(config.call_timeout(), provider.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            }
        };

        match outcome {
            Ok(completion) => return Ok(completion),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => {
                if attempt + 1 < attempts {
                    let backoff = config.calculate_backoff(attempt);
                    tracing::warn!(
                        "transient provider failure (attempt {}/{}): {err}; retrying in {:?}",
                        attempt + 1,
                        attempts,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                last_error = err;
            }
        }
    }

    Err(last_error)
}
