//! Error handling for the EDFL gate
//!
//! One error type covers the whole evaluation pipeline. Variants follow the
//! failure classes of an evaluation: bad settings are surfaced immediately,
//! provider failures are classified at the sampler boundary, and running out
//! of data is reported as a failed evaluation rather than a silent REFUSE.

use crate::provider::ProviderError;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for the evaluation pipeline
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Transient provider failure: {source}")]
    ProviderTransient {
        #[source]
        source: ProviderError,
    },

    #[error("Provider failure: {source}")]
    Provider {
        #[source]
        source: ProviderError,
    },

    #[error("Insufficient samples: {message}")]
    InsufficientSamples { message: String },

    #[error("Insufficient evidence: {message}")]
    InsufficientEvidence { message: String },

    #[error("Metric computation failed: {message}")]
    MetricComputation { message: String },

    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Network operation failed: {operation}")]
    Network {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Type alias for Result with GateError
pub type GateResult<T> = Result<T, GateError>;

impl GateError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an insufficient-samples error
    pub fn insufficient_samples(message: impl Into<String>) -> Self {
        Self::InsufficientSamples {
            message: message.into(),
        }
    }

    /// Create an insufficient-evidence error
    pub fn insufficient_evidence(message: impl Into<String>) -> Self {
        Self::InsufficientEvidence {
            message: message.into(),
        }
    }

    /// Create a metric computation error
    pub fn metric(message: impl Into<String>) -> Self {
        Self::MetricComputation {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a network error
    pub fn network(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            operation: operation.into(),
            source,
        }
    }

    /// Classify a provider failure that escaped the sampler's retry loop
    pub fn from_provider(source: ProviderError) -> Self {
        match source {
            ProviderError::InvalidModel { model } => {
                Self::configuration(format!("unknown or unavailable model '{model}'"))
            }
            source if source.is_transient() => Self::ProviderTransient { source },
            source => Self::Provider { source },
        }
    }

    /// Stable name reported as `type` in HTTP error payloads
    pub fn type_name(&self) -> &'static str {
        match self {
            GateError::Configuration { .. } => "ConfigurationError",
            GateError::ProviderTransient { .. } => "ProviderTransient",
            GateError::Provider { .. } => "ProviderError",
            GateError::InsufficientSamples { .. } => "InsufficientSamplesError",
            GateError::InsufficientEvidence { .. } => "InsufficientEvidenceError",
            GateError::MetricComputation { .. } => "MetricComputationError",
            GateError::Serialization { .. } => "SerializationError",
            GateError::Io { .. } => "IoError",
            GateError::Network { .. } => "NetworkError",
        }
    }

    /// Fatal errors are never retried by the sampler
    pub fn is_fatal(&self) -> bool {
        !matches!(self, GateError::ProviderTransient { .. })
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        crate::api_errors::AppError::from(self).into_response()
    }
}

/// Convert from serde_json errors
impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        GateError::serialization("json_operation", err)
    }
}

/// Convert from std::io errors
impl From<std::io::Error> for GateError {
    fn from(err: std::io::Error) -> Self {
        GateError::io("io_operation", err)
    }
}

/// Convert from reqwest errors
impl From<reqwest::Error> for GateError {
    fn from(err: reqwest::Error) -> Self {
        GateError::network("http_request", err)
    }
}

/// Convert from provider errors
impl From<ProviderError> for GateError {
    fn from(err: ProviderError) -> Self {
        GateError::from_provider(err)
    }
}

/// Convert from figment errors
impl From<figment::Error> for GateError {
    fn from(err: figment::Error) -> Self {
        GateError::configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = GateError::configuration("m must be at least 2");
        assert!(config_err.to_string().contains("Configuration error"));
        assert_eq!(config_err.type_name(), "ConfigurationError");

        let evidence_err = GateError::insufficient_evidence("no skeleton survived");
        assert!(evidence_err.to_string().contains("Insufficient evidence"));
        assert!(evidence_err.is_fatal());
    }

    #[test]
    fn test_error_chaining() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let gate_err = GateError::io("reading config", io_err);

        assert!(gate_err.source().is_some());
        assert!(gate_err.to_string().contains("I/O operation failed"));
    }

    #[test]
    fn test_provider_classification() {
        let transient = GateError::from_provider(ProviderError::Timeout);
        assert_eq!(transient.type_name(), "ProviderTransient");
        assert!(!transient.is_fatal());

        let invalid = GateError::from_provider(ProviderError::InvalidModel {
            model: "gpt-0".into(),
        });
        assert_eq!(invalid.type_name(), "ConfigurationError");

        let malformed = GateError::from_provider(ProviderError::Malformed {
            message: "no choices".into(),
        });
        assert_eq!(malformed.type_name(), "ProviderError");
    }
}
