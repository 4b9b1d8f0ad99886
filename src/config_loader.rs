use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::config::{Settings, SettingsOverrides, SUPPORTED_MODELS};
use crate::errors::{GateError, GateResult};
use crate::sampler::SamplerConfig;

pub const DEFAULT_CONFIG_FILE: &str = "edfl_gate.toml";
pub const CONFIG_PATH_ENV: &str = "EDFL_CONFIG_PATH";
pub const ENV_PREFIX: &str = "EDFL_";

/// Service-level configuration: bind address, provider and sampler tuning,
/// and the process-wide default evaluation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub defaults: SettingsOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    #[serde(default = "default_models")]
    pub models: Vec<String>,
}

fn default_models() -> Vec<String> {
    SUPPORTED_MODELS.iter().map(|m| m.to_string()).collect()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_secs: 30,
            models: default_models(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            host: "127.0.0.1".to_string(),
            port: 3169,
            provider: ProviderConfig::default(),
            sampler: SamplerConfig::default(),
            defaults: SettingsOverrides::default(),
        }
    }
}

impl ServiceConfig {
    /// Default evaluation settings with the configured overlay applied
    pub fn default_settings(&self) -> GateResult<Settings> {
        let settings = Settings::default().with_overrides(&self.defaults);
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> GateResult<()> {
        if self.host.trim().is_empty() {
            return Err(GateError::configuration("host must be set"));
        }
        if self.provider.base_url.trim().is_empty() {
            return Err(GateError::configuration("provider.base_url must be set"));
        }
        if self.provider.models.is_empty() {
            return Err(GateError::configuration("provider.models must not be empty"));
        }
        if self.sampler.max_concurrency == 0 {
            return Err(GateError::configuration(
                "sampler.max_concurrency must be at least 1",
            ));
        }
        self.default_settings().map(|_| ())
    }
}

/// Load configuration: built-in defaults, then the TOML file, then `EDFL_*`
/// environment variables (`__` separates nested keys).
pub fn load_config(path: Option<&str>) -> GateResult<ServiceConfig> {
    let env_path = std::env::var(CONFIG_PATH_ENV).ok();
    let file = path
        .map(str::to_string)
        .or(env_path)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    let figment = Figment::from(Serialized::defaults(ServiceConfig::default()))
        .merge(Toml::file(&file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: ServiceConfig = figment.extract()?;
    config.validate()?;
    tracing::debug!("configuration loaded from defaults, {file} and {ENV_PREFIX}* environment");
    Ok(config)
}
