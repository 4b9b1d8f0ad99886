use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::errors::GateError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    BadRequest { message: String, kind: &'static str },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    MethodNotAllowed(String),
    #[error("{message}")]
    BadGateway { message: String, kind: &'static str },
    #[error("{message}")]
    Unavailable { message: String, kind: &'static str },
    #[error("{message}")]
    Internal { message: String, kind: &'static str },
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest {
            message: msg.into(),
            kind: "BadRequest",
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn method_not_allowed(msg: impl Into<String>) -> Self {
        Self::MethodNotAllowed(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            AppError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> Option<&'static str> {
        match self {
            AppError::BadRequest { kind, .. }
            | AppError::BadGateway { kind, .. }
            | AppError::Unavailable { kind, .. }
            | AppError::Internal { kind, .. } => Some(kind),
            AppError::NotFound(_) | AppError::MethodNotAllowed(_) => None,
        }
    }
}

#[derive(Serialize)]
struct ErrBody {
    success: bool,
    error: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrBody {
            success: false,
            error: self.to_string(),
            kind: self.kind(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<GateError> for AppError {
    fn from(err: GateError) -> Self {
        let kind = err.type_name();
        let message = err.to_string();
        match err {
            GateError::Configuration { .. } => AppError::BadRequest { message, kind },
            GateError::ProviderTransient { .. }
            | GateError::Provider { .. }
            | GateError::Network { .. } => AppError::BadGateway { message, kind },
            GateError::InsufficientSamples { .. } | GateError::InsufficientEvidence { .. } => {
                AppError::Unavailable { message, kind }
            }
            GateError::MetricComputation { .. }
            | GateError::Serialization { .. }
            | GateError::Io { .. } => AppError::Internal { message, kind },
        }
    }
}
