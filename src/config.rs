// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the form gateway.
//!
//! Values are layered: serde defaults, then an optional config file named by
//! `FORM_GATEWAY_CONFIG`, then `FORM_GATEWAY__*` environment variables, then
//! the flat variables the serverless deployment used (`FORM_ENDPOINT`,
//! `API_KEY`, `CSRF_SECRET`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Minimum accepted CSRF secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Configuration for the form gateway service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Take the client IP from proxy headers (default: false). Only enable
    /// behind a proxy that overwrites them, otherwise callers can pick
    /// their own address.
    #[serde(default)]
    pub trust_proxy_headers: bool,

    /// Field validation limits
    #[serde(default)]
    pub form: FormConfig,

    /// Per-IP submission limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// CSRF token settings
    #[serde(default)]
    pub csrf: CsrfConfig,

    /// Upstream form API
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Optional reCAPTCHA verification
    #[serde(default)]
    pub recaptcha: RecaptchaConfig,

    /// Cross-origin settings
    #[serde(default)]
    pub cors: CorsConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// A string that never shows up in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Secret(<unset>)")
        } else {
            f.write_str("Secret(<redacted>)")
        }
    }
}

/// Limits applied to submitted fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormConfig {
    /// Maximum characters per string field (default: 5000)
    #[serde(default = "default_max_field_length")]
    pub max_field_length: usize,

    /// Maximum number of fields per submission (default: 50)
    #[serde(default = "default_max_fields")]
    pub max_fields: usize,

    /// Maximum request body size in bytes (default: 64 KiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Sliding window limits for submissions per client IP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Submissions allowed per IP inside one window (default: 5)
    #[serde(default = "default_max_submissions")]
    pub max_submissions: u32,

    /// Sliding window length in seconds (default: 300)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often idle IPs are pruned, in seconds (default: 60)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

/// CSRF token settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfConfig {
    /// HMAC key, at least 32 bytes
    #[serde(default)]
    pub secret: Secret,

    /// Token lifetime in seconds (default: 3600)
    #[serde(default = "default_token_max_age_secs")]
    pub max_age_secs: u64,

    /// Tolerated client clock lead in seconds (default: 60)
    #[serde(default = "default_max_skew_secs")]
    pub max_skew_secs: u64,
}

/// Upstream form API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Absolute URL submissions are POSTed to
    #[serde(default)]
    pub endpoint: String,

    /// Bearer token sent with every forwarded submission
    #[serde(default)]
    pub api_key: Secret,

    /// Request timeout in milliseconds (default: 10000)
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
}

/// reCAPTCHA settings. Verification is skipped when no secret is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecaptchaConfig {
    #[serde(default)]
    pub secret: Option<Secret>,

    #[serde(default = "default_recaptcha_verify_url")]
    pub verify_url: String,

    /// Minimum v3 score; ignored for v2 responses that carry no score
    #[serde(default = "default_recaptcha_min_score")]
    pub min_score: f64,

    #[serde(default = "default_recaptcha_timeout_ms")]
    pub timeout_ms: u64,
}

/// Cross-origin settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

/// Configuration problems detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("CSRF secret must be at least {MIN_SECRET_LEN} bytes")]
    WeakCsrfSecret,

    #[error("CSRF secret cannot key HMAC-SHA256")]
    InvalidCsrfKey,

    #[error("upstream endpoint is not set")]
    MissingEndpoint,

    #[error("upstream endpoint must be an absolute http(s) URL: {0}")]
    InvalidEndpoint(String),

    #[error("invalid bind address {0}")]
    InvalidBindAddr(String),
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_field_length() -> usize {
    5000
}

fn default_max_fields() -> usize {
    50
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_max_submissions() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    300 // 5 minutes
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_token_max_age_secs() -> u64 {
    3600
}

fn default_max_skew_secs() -> u64 {
    60
}

fn default_upstream_timeout_ms() -> u64 {
    10_000
}

fn default_recaptcha_verify_url() -> String {
    "https://www.google.com/recaptcha/api/siteverify".to_string()
}

fn default_recaptcha_min_score() -> f64 {
    0.5
}

fn default_recaptcha_timeout_ms() -> u64 {
    5_000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["https://localhost".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            trust_proxy_headers: false,
            form: FormConfig::default(),
            rate_limit: RateLimitConfig::default(),
            csrf: CsrfConfig::default(),
            upstream: UpstreamConfig::default(),
            recaptcha: RecaptchaConfig::default(),
            cors: CorsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            max_field_length: default_max_field_length(),
            max_fields: default_max_fields(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_submissions: default_max_submissions(),
            window_secs: default_window_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            secret: Secret::default(),
            max_age_secs: default_token_max_age_secs(),
            max_skew_secs: default_max_skew_secs(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: Secret::default(),
            timeout_ms: default_upstream_timeout_ms(),
        }
    }
}

impl Default for RecaptchaConfig {
    fn default() -> Self {
        Self {
            secret: None,
            verify_url: default_recaptcha_verify_url(),
            min_score: default_recaptcha_min_score(),
            timeout_ms: default_recaptcha_timeout_ms(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    /// Get the sliding window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RecaptchaConfig {
    pub fn enabled(&self) -> bool {
        self.secret.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from the optional file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var("FORM_GATEWAY_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("FORM_GATEWAY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut cfg: Config = builder.build()?.try_deserialize()?;
        cfg.apply_flat_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Apply the flat variable names used by the serverless deployment.
    pub fn apply_flat_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = lookup("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("TRUST_PROXY_HEADERS") {
            self.trust_proxy_headers = matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(v) = lookup("FORM_ENDPOINT") {
            self.upstream.endpoint = v;
        }
        if let Some(v) = lookup("API_KEY") {
            self.upstream.api_key = Secret::new(v);
        }
        if let Some(v) = lookup("CSRF_SECRET") {
            self.csrf.secret = Secret::new(v);
        }
        if let Some(v) = lookup("RECAPTCHA_SECRET") {
            self.recaptcha.secret = Some(Secret::new(v));
        }
        if let Some(v) = lookup("ALLOWED_ORIGINS") {
            self.cors.allowed_origins = v
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
    }

    /// Reject configurations the service cannot run safely with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidBindAddr(self.bind_addr.clone()));
        }
        if self.csrf.secret.expose().len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakCsrfSecret);
        }
        if self.upstream.endpoint.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        match url::Url::parse(&self.upstream.endpoint) {
            Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => Ok(()),
            _ => Err(ConfigError::InvalidEndpoint(self.upstream.endpoint.clone())),
        }
    }
}
