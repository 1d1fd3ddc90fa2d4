// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the form gateway and their HTTP mapping.
//!
//! Every error response is `{error, code, reference}` with a generic message.
//! Internal detail goes to the log under the same reference, never to the
//! caller.

use crate::csrf::CsrfError;
use crate::form::ValidationError;
use crate::recaptcha::RecaptchaError;
use crate::reference::new_reference;
use crate::upstream::UpstreamError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Application error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Validation failed: {}", summarize(.0))]
    Validation(Vec<ValidationError>),

    #[error("Could not determine client IP")]
    UnknownClient,

    #[error("CSRF check failed: {0}")]
    Csrf(#[from] CsrfError),

    #[error("reCAPTCHA rejected: {0}")]
    Recaptcha(#[from] RecaptchaError),

    #[error("Rate limit exceeded, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Carries the reference already sent upstream, so logs, caller and
    /// form API agree on it.
    #[error("Upstream error: {source}")]
    Upstream {
        reference: String,
        #[source]
        source: UpstreamError,
    },
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub code: &'static str,
    pub reference: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(rename = "retryAfterSecs", skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedBody(_) | ApiError::Validation(_) | ApiError::UnknownClient => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Csrf(_) => StatusCode::FORBIDDEN,
            ApiError::Recaptcha(e) if e.is_transport() => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Recaptcha(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code; also the metrics outcome label.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MalformedBody(_) => "MALFORMED_BODY",
            ApiError::Validation(_) => "VALIDATION_FAILED",
            ApiError::UnknownClient => "UNKNOWN_CLIENT",
            ApiError::Csrf(_) => "CSRF_FAILED",
            ApiError::Recaptcha(e) if e.is_transport() => "INTERNAL_ERROR",
            ApiError::Recaptcha(_) => "RECAPTCHA_FAILED",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ApiError::Upstream { .. } => "INTERNAL_ERROR",
        }
    }

    fn public_message(&self) -> &'static str {
        match self.status() {
            StatusCode::BAD_REQUEST => "Invalid form submission",
            StatusCode::FORBIDDEN => "Security verification failed. Please reload the page and try again.",
            StatusCode::TOO_MANY_REQUESTS => "Too many submissions. Please try again later.",
            StatusCode::METHOD_NOT_ALLOWED => "Method not allowed",
            _ => "Something went wrong. Please try again later.",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let reference = match &self {
            ApiError::Upstream { reference, .. } => reference.clone(),
            _ => new_reference(),
        };

        if status.is_server_error() {
            error!(%reference, code = self.code(), error = %self, "Submission failed");
        } else {
            info!(%reference, code = self.code(), error = %self, "Submission rejected");
        }

        let fields = match &self {
            ApiError::Validation(errors) => errors
                .iter()
                .filter_map(|e| e.field().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        let retry_after_secs = match &self {
            // Round up so clients never retry a moment too early
            ApiError::RateLimited { retry_after } => {
                Some(retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0))
            }
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: self.public_message(),
            code: self.code(),
            reference,
            fields,
            retry_after_secs,
        });

        match retry_after_secs {
            Some(secs) => (status, [(header::RETRY_AFTER, secs.to_string())], body).into_response(),
            None => (status, body).into_response(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;
