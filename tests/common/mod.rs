// Shared test helpers: scripted model providers and fast sampler settings
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use edfl_gate::skeleton::MASK_TOKEN;
use edfl_gate::{
    Completion, CompletionRequest, Evaluator, ModelProvider, ProviderError, SamplerConfig,
};

pub const NOBEL_PROMPT: &str = "Who won the 2019 Nobel Prize in Physics?";
pub const NOBEL_ANSWER: &str = "James Peebles, Michel Mayor and Didier Queloz";
pub const STOCK_PROMPT: &str = "What will the stock market do tomorrow?";
pub const STOCK_ANSWER: &str = "Nobody can predict the stock market with certainty.";
pub const UNSURE: &str = "I'm not sure.";

type Script = dyn Fn(&CompletionRequest) -> Result<Completion, ProviderError> + Send + Sync;

/// Provider whose every reply comes from a closure; counts calls
pub struct ScriptedProvider {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&CompletionRequest) -> Result<Completion, ProviderError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(request)
    }
}

/// Knows the 2019 physics laureates only when the prompt says exactly that
pub fn knows_nobel(request: &CompletionRequest) -> Result<Completion, ProviderError> {
    let p = &request.prompt;
    if p.contains("2019") && p.contains("Nobel") && p.contains("Physics") {
        Ok(Completion::text(NOBEL_ANSWER))
    } else {
        Ok(Completion::text(UNSURE))
    }
}

pub fn always_stock(_: &CompletionRequest) -> Result<Completion, ProviderError> {
    Ok(Completion::text(STOCK_ANSWER))
}

pub fn mask_count(prompt: &str) -> usize {
    prompt.matches(MASK_TOKEN).count()
}

/// Millisecond backoff so retry paths stay fast
pub fn fast_sampler() -> SamplerConfig {
    SamplerConfig {
        max_concurrency: 4,
        max_retries: 2,
        backoff_base_ms: 1,
        backoff_max_ms: 2,
        jitter_percent: 0.0,
        call_timeout_secs: 5,
        ..SamplerConfig::default()
    }
}

pub fn evaluator(provider: Arc<ScriptedProvider>) -> Evaluator {
    Evaluator::new(provider, fast_sampler())
}
