use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{cache::CacheError, domain::error::DomainError, infra::error::InfraError};

/// Diagnostic chain attached to error responses for the response logger.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Infra(InfraError::Database { .. })
            | AppError::Infra(InfraError::Cache { .. })
            | AppError::Infra(InfraError::ShuttingDown)
            | AppError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Infra(InfraError::Configuration { .. })
            | AppError::Infra(InfraError::Telemetry(_))
            | AppError::Infra(InfraError::Io(_))
            | AppError::Domain(DomainError::Invariant { .. })
            | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                "Request could not be processed"
            }
            AppError::Infra(InfraError::Database { .. })
            | AppError::Infra(InfraError::Cache { .. })
            | AppError::Cache(_) => "Service temporarily unavailable",
            AppError::Infra(InfraError::ShuttingDown) => "Service is shutting down",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Domain(DomainError::Invariant { .. }) | AppError::Unexpected(_) => {
                "Unexpected error occurred"
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let response = AppError::from(DomainError::validation("bad tenant")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(
            report.messages,
            vec!["domain validation failed: bad tenant".to_string()]
        );
    }

    #[test]
    fn unavailable_backends_map_to_503() {
        for err in [
            AppError::from(InfraError::database("down")),
            AppError::from(InfraError::ShuttingDown),
            AppError::from(CacheError::unavailable("refused")),
        ] {
            assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }
}
