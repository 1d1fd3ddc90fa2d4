// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the form gateway.
//!
//! A submission passes, in order: client IP resolution, the per-IP rate
//! limit, CSRF verification, body parsing, reCAPTCHA, sanitization and
//! validation, then is forwarded upstream. The first failing step decides
//! the response.

use crate::config::{Config, CorsConfig};
use crate::csrf::{CsrfGuard, CSRF_HEADER};
use crate::error::{ApiError, Result};
use crate::form::{FormSubmission, FormValidator, ValidationResult};
use crate::limiter::{RateLimitResult, RateLimiter};
use crate::metrics::Metrics;
use crate::recaptcha::RecaptchaVerifier;
use crate::reference::new_reference;
use crate::sanitize::{sanitize_fields, sanitize_text};
use crate::upstream::{ForwardPayload, SubmissionMetadata, UpstreamClient};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Path the static site posts forms to.
pub const SUBMIT_PATH: &str = "/.netlify/functions/form-handler";
/// Shorter alias for the same handler.
pub const SUBMIT_ALIAS: &str = "/api/form";
pub const TOKEN_PATH: &str = "/csrf-token";

/// Outcome label for forwarded submissions.
pub const ACCEPTED: &str = "ACCEPTED";

/// Headers consulted for the client address, most trusted first.
const CLIENT_IP_HEADERS: [&str; 3] = ["x-nf-client-connection-ip", "cf-connecting-ip", "x-real-ip"];

/// Shared application state.
pub struct AppState {
    pub limiter: RateLimiter,
    pub validator: FormValidator,
    pub csrf: CsrfGuard,
    pub recaptcha: RecaptchaVerifier,
    pub upstream: UpstreamClient,
    pub metrics: Metrics,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Ok(Self {
            limiter: RateLimiter::new(config.rate_limit.clone()),
            validator: FormValidator::new(config.form.clone()),
            csrf: CsrfGuard::new(&config.csrf)?,
            recaptcha: RecaptchaVerifier::new(&config.recaptcha)?,
            upstream: UpstreamClient::new(&config.upstream)?,
            metrics: Metrics::new()?,
            config,
        })
    }
}

/// Successful submission body.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: &'static str,
    pub reference: String,
}

/// Freshly minted CSRF token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub timestamp: i64,
    pub expires_in: i64,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Build the router with CORS, tracing and body limit layers.
pub fn router(state: Arc<AppState>) -> Router {
    let submit_route = post(submit).fallback(method_not_allowed);

    let mut router = Router::new()
        .route(SUBMIT_PATH, submit_route.clone())
        .route(SUBMIT_ALIAS, submit_route)
        .route(TOKEN_PATH, get(csrf_token))
        .route("/health", get(health))
        .route("/healthz", get(health));

    if state.config.metrics.enabled {
        router = router.route(&state.config.metrics.path, get(metrics));
    }

    router
        .layer(DefaultBodyLimit::max(state.config.form.max_body_bytes))
        .layer(cors_layer(&state.config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<http::HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.trim().parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers([
            http::header::CONTENT_TYPE,
            http::HeaderName::from_static(CSRF_HEADER),
        ])
}

/// Resolve the client address. Proxy headers are consulted only when
/// `trust_proxy` is set; otherwise the socket peer is the client.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> Option<IpAddr> {
    let peer_ip = peer.map(|addr| addr.ip());
    if !trust_proxy {
        return peer_ip;
    }

    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    CLIENT_IP_HEADERS
        .iter()
        .find_map(|name| header_str(name).and_then(|v| v.trim().parse().ok()))
        .or_else(|| {
            header_str("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .and_then(|v| v.trim().parse().ok())
        })
        .or(peer_ip)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "form-gateway",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Mint a CSRF token bound to the caller's address.
pub async fn csrf_token(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let ip = client_ip(&headers, connect.map(|c| c.0), state.config.trust_proxy_headers)
        .ok_or(ApiError::UnknownClient)?;
    let token = state.csrf.issue(ip);
    debug!(%ip, "Issued CSRF token");
    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(TokenResponse {
            token: token.to_string(),
            timestamp: token.timestamp,
            expires_in: state.csrf.max_age_secs(),
        }),
    ))
}

/// Any method other than POST on the submit paths.
pub async fn method_not_allowed(State(state): State<Arc<AppState>>) -> Response {
    let err = ApiError::MethodNotAllowed;
    state.metrics.record_outcome(err.code());
    err.into_response()
}

/// Accept, check and forward a form submission.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match process(&state, connect.map(|c| c.0), &headers, &body).await {
        Ok((status, reference)) => {
            state.metrics.record_outcome(ACCEPTED);
            (
                status,
                Json(SubmitResponse {
                    success: true,
                    message: "Form submitted successfully",
                    reference,
                }),
            )
                .into_response()
        }
        Err(err) => {
            state.metrics.record_outcome(err.code());
            err.into_response()
        }
    }
}

async fn process(
    state: &AppState,
    peer: Option<SocketAddr>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(StatusCode, String)> {
    let ip = client_ip(headers, peer, state.config.trust_proxy_headers)
        .ok_or(ApiError::UnknownClient)?;

    if let RateLimitResult::Limited { reason, retry_after } = state.limiter.check(ip).await {
        info!(%ip, %reason, retry_after_secs = retry_after.as_secs(), "Submission rate limited");
        return Err(ApiError::RateLimited { retry_after });
    }

    let token = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok());
    state.csrf.verify(token, ip)?;

    require_json(headers)?;
    let submission: FormSubmission =
        serde_json::from_slice(body).map_err(|e| ApiError::MalformedBody(e.to_string()))?;

    state
        .recaptcha
        .verify(submission.recaptcha_response.as_deref(), ip)
        .await?;

    // Validate what will actually be forwarded, so markup-only values
    // count as missing.
    let mut clean = FormSubmission {
        fields: sanitize_fields(&submission.fields),
        ..submission
    };
    clean.fields.retain(|_, v| !v.is_null());

    let form_type = match state.validator.validate(&clean) {
        ValidationResult::Valid(form_type) => form_type,
        ValidationResult::Invalid(errors) => return Err(ApiError::Validation(errors)),
    };

    let reference = new_reference();
    let payload = ForwardPayload {
        form_type,
        fields: clean.fields,
        metadata: SubmissionMetadata {
            reference: reference.clone(),
            received_at: Utc::now(),
            client_timestamp: clean.timestamp,
            ip: ip.to_string(),
            user_agent: header_text(headers, header::USER_AGENT),
            referer: header_text(headers, header::REFERER),
        },
    };

    let started = Instant::now();
    let forwarded = state.upstream.forward(&payload).await;
    state
        .metrics
        .observe_upstream(forwarded.is_ok(), started.elapsed().as_secs_f64());
    let upstream_status = forwarded.map_err(|source| ApiError::Upstream {
        reference: reference.clone(),
        source,
    })?;

    info!(%reference, %form_type, %ip, upstream_status, "Submission forwarded");
    Ok((
        StatusCode::from_u16(upstream_status).unwrap_or(StatusCode::OK),
        reference,
    ))
}

fn require_json(headers: &HeaderMap) -> Result<()> {
    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(';').next().unwrap_or(s).trim().to_ascii_lowercase());

    match media_type.as_deref() {
        Some("application/json") => Ok(()),
        other => Err(ApiError::MalformedBody(format!(
            "expected application/json, got {:?}",
            other
        ))),
    }
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| sanitize_text(&v.chars().take(512).collect::<String>()))
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, v.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_client_ip_precedence() {
        let peer: SocketAddr = "10.0.0.9:4000".parse().unwrap();

        let h = headers(&[
            ("x-forwarded-for", "198.51.100.1, 10.0.0.1"),
            ("x-nf-client-connection-ip", "203.0.113.5"),
        ]);
        assert_eq!(client_ip(&h, Some(peer), true), "203.0.113.5".parse().ok());

        let h = headers(&[("x-forwarded-for", "198.51.100.1, 10.0.0.1")]);
        assert_eq!(client_ip(&h, Some(peer), true), "198.51.100.1".parse().ok());

        let h = headers(&[("x-real-ip", "not-an-ip")]);
        assert_eq!(client_ip(&h, Some(peer), true), Some(peer.ip()));
        assert_eq!(client_ip(&h, None, true), None);
    }

    #[test]
    fn test_client_ip_ignores_headers_unless_trusted() {
        let peer: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        let h = headers(&[
            ("x-nf-client-connection-ip", "203.0.113.5"),
            ("cf-connecting-ip", "203.0.113.6"),
            ("x-real-ip", "203.0.113.7"),
            ("x-forwarded-for", "203.0.113.8"),
        ]);
        assert_eq!(client_ip(&h, Some(peer), false), Some(peer.ip()));
        assert_eq!(client_ip(&h, None, false), None);
    }

    #[test]
    fn test_require_json() {
        assert!(require_json(&headers(&[("content-type", "application/json; charset=utf-8")])).is_ok());
        assert!(require_json(&headers(&[("content-type", "text/plain")])).is_err());
        assert!(require_json(&HeaderMap::new()).is_err());
    }

    #[test]
    fn test_header_text_sanitized() {
        let h = headers(&[("user-agent", "<script>x</script>Mozilla/5.0")]);
        assert_eq!(header_text(&h, header::USER_AGENT).as_deref(), Some("Mozilla/5.0"));
        assert_eq!(header_text(&h, header::REFERER), None);
    }
}
