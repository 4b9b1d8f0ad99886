use std::sync::Arc;

use crate::config::{Settings, RECOMMENDED_MODEL};
use crate::config_loader::ServiceConfig;
use crate::errors::GateResult;
use crate::pipeline::Evaluator;
use crate::provider::{ModelProvider, OpenAiProvider};

/// Shared, read-only state behind every HTTP handler
pub struct AppState {
    pub evaluator: Arc<Evaluator>,
    pub defaults: Settings,
}

impl AppState {
    pub fn new(evaluator: Arc<Evaluator>, defaults: Settings) -> Self {
        Self {
            evaluator,
            defaults,
        }
    }

    /// Wire the configured provider, sampler and defaults together
    pub fn from_config(config: &ServiceConfig) -> GateResult<Self> {
        let provider: Arc<dyn ModelProvider> = Arc::new(OpenAiProvider::from_config(&config.provider)?);
        Self::with_provider(config, provider)
    }

    /// Same as [`AppState::from_config`] with an explicit provider
    pub fn with_provider(config: &ServiceConfig, provider: Arc<dyn ModelProvider>) -> GateResult<Self> {
        let evaluator = Evaluator::new(provider, config.sampler.clone())
            .with_models(config.provider.models.clone());
        Ok(Self::new(Arc::new(evaluator), config.default_settings()?))
    }

    pub fn models(&self) -> &[String] {
        self.evaluator.models()
    }

    pub fn recommended_model(&self) -> &str {
        if self.models().iter().any(|m| m == RECOMMENDED_MODEL) {
            RECOMMENDED_MODEL
        } else {
            self.models().first().map(String::as_str).unwrap_or(RECOMMENDED_MODEL)
        }
    }
}
