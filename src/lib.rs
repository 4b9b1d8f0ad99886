//! Library root for the `edfl_gate` crate
//! Information-sufficiency gate deciding ANSWER or REFUSE for a prompt

// Core error handling
pub mod errors;
pub mod api_errors;

// Configuration & CLI
pub mod cli;
pub mod config;
pub mod config_loader;

// Model access
pub mod provider;
pub mod sampler;

// Evaluation core
pub mod skeleton;
pub mod prior;
pub mod metrics;
pub mod decision;

// JSON Canonicalization Scheme (RFC 8785)
pub mod canonicalize;
pub mod certificate;

pub mod pipeline;

// Web server interface
pub mod app_state;
pub mod server;

pub use certificate::SlaCertificate;
pub use config::{ClipMode, Settings, SettingsOverrides, SkeletonPolicy};
pub use decision::{Decision, GateDecision};
pub use errors::{GateError, GateResult};
pub use metrics::Metrics;
pub use pipeline::{EvaluationResult, Evaluator};
pub use provider::{Completion, CompletionRequest, ModelProvider, ProviderError};
pub use prior::{Grader, NormalizedMatch};
pub use sampler::{SampleSet, Sampler, SamplerConfig};
