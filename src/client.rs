// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Secure form wrapper for callers of the gateway.
//!
//! [`SecureForm`] owns the field values of one form, keeps a CSRF token
//! fetched from the gateway, enforces a resubmission cooldown and runs the
//! same validation and sanitization as the server before sending anything.
//! Status changes are published on a `watch` channel so any number of
//! field components can follow them:
//!
//! ```text
//! Idle -> Submitting -> Success | Error | ValidationError -> Idle
//! ```
//!
//! Terminal states fall back to `Idle` after `reset_after`.

use crate::config::FormConfig;
use crate::csrf::CSRF_HEADER;
use crate::form::{ClientTimestamp, FormSubmission, FormType, FormValidator, ValidationResult};
use crate::handlers::{SUBMIT_PATH, TOKEN_PATH};
use crate::sanitize::sanitize_fields;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Refresh a stored token this long before it would expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway origin, e.g. `https://www.example.com`
    pub base_url: String,
    pub submit_path: String,
    pub token_path: String,
    /// Minimum gap between two submissions (default: 10s)
    pub cooldown: Duration,
    /// Delay before a terminal status returns to idle (default: 5s)
    pub reset_after: Duration,
    pub timeout: Duration,
    pub form: FormConfig,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            submit_path: SUBMIT_PATH.to_string(),
            token_path: TOKEN_PATH.to_string(),
            cooldown: Duration::from_secs(10),
            reset_after: Duration::from_secs(5),
            timeout: Duration::from_secs(15),
            form: FormConfig::default(),
        }
    }
}

/// A field-level problem to show next to an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Option<String>,
    pub message: String,
}

/// Submission status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FormStatus {
    #[default]
    Idle,
    Submitting,
    Success {
        reference: String,
    },
    Error {
        message: String,
        reference: Option<String>,
    },
    ValidationError {
        errors: Vec<FieldError>,
    },
}

impl FormStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FormStatus::Idle | FormStatus::Submitting)
    }
}

/// What subscribers observe. `epoch` increases on every change.
#[derive(Debug, Clone, Default)]
pub struct FormState {
    pub status: FormStatus,
    pub epoch: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssuedToken {
    token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct StoredToken {
    value: String,
    fetched_at: Instant,
    lifetime: Duration,
}

impl StoredToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) + TOKEN_REFRESH_MARGIN < self.lifetime
    }
}

/// Gateway reply, success or error shaped.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Reply {
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    retry_after_secs: Option<u64>,
}

/// One form's state, token and submission logic.
pub struct SecureForm {
    form_type: FormType,
    config: ClientConfig,
    http: reqwest::Client,
    validator: FormValidator,
    fields: Map<String, Value>,
    token: Option<StoredToken>,
    last_submit: Option<Instant>,
    state: Arc<watch::Sender<FormState>>,
}

impl SecureForm {
    pub fn new(form_type: FormType, config: ClientConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        let (tx, _rx) = watch::channel(FormState::default());
        Ok(Self {
            form_type,
            validator: FormValidator::new(config.form.clone()),
            config,
            http,
            fields: Map::new(),
            token: None,
            last_submit: None,
            state: Arc::new(tx),
        })
    }

    pub fn form_type(&self) -> FormType {
        self.form_type
    }

    /// Follow status changes.
    pub fn subscribe(&self) -> watch::Receiver<FormState> {
        self.state.subscribe()
    }

    pub fn status(&self) -> FormStatus {
        self.state.borrow().status.clone()
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Current token, fetching a new one when none is stored or it is about
    /// to expire.
    pub async fn token(&mut self) -> Result<String, reqwest::Error> {
        let now = Instant::now();
        if let Some(stored) = self.token.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(stored.value.clone());
        }
        self.refresh_token().await
    }

    /// Fetch a new token from the gateway and store it.
    pub async fn refresh_token(&mut self) -> Result<String, reqwest::Error> {
        let url = format!("{}{}", self.config.base_url, self.config.token_path);
        let issued: IssuedToken = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(expires_in = issued.expires_in, "Fetched CSRF token");
        self.token = Some(StoredToken {
            value: issued.token.clone(),
            fetched_at: Instant::now(),
            lifetime: Duration::from_secs(issued.expires_in),
        });
        Ok(issued.token)
    }

    /// Time left before another submission is allowed.
    pub fn cooldown_remaining(&self) -> Duration {
        self.last_submit
            .map(|at| self.config.cooldown.saturating_sub(at.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    /// Validate, sanitize and send the form. Returns the terminal status,
    /// which is also published to subscribers.
    pub async fn submit(&mut self) -> FormStatus {
        let wait = self.cooldown_remaining();
        if !wait.is_zero() {
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            return self.finish(FormStatus::Error {
                message: format!("Please wait {} seconds before submitting again", secs),
                reference: None,
            });
        }

        let mut submission = FormSubmission {
            form_type: self.form_type.as_str().to_string(),
            fields: sanitize_fields(&self.fields),
            ..Default::default()
        };
        submission.fields.retain(|_, v| !v.is_null());

        if let ValidationResult::Invalid(errors) = self.validator.validate(&submission) {
            return self.finish(FormStatus::ValidationError {
                errors: errors
                    .iter()
                    .map(|e| FieldError {
                        field: e.field().map(str::to_string),
                        message: e.to_string(),
                    })
                    .collect(),
            });
        }

        self.publish(FormStatus::Submitting);

        let token = match self.token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Could not obtain CSRF token");
                return self.finish(network_error());
            }
        };

        submission.timestamp = Some(ClientTimestamp::Millis(Utc::now().timestamp_millis()));
        let url = format!("{}{}", self.config.base_url, self.config.submit_path);
        self.last_submit = Some(Instant::now());

        let response = match self
            .http
            .post(&url)
            .header(CSRF_HEADER, token)
            .json(&submission)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Submission request failed");
                return self.finish(network_error());
            }
        };

        let status = response.status();
        let reply: Reply = response.json().await.unwrap_or_default();

        let outcome = if status.is_success() {
            self.fields.clear();
            // Fresh token for the next form on the page
            self.token = None;
            FormStatus::Success {
                reference: reply.reference.unwrap_or_default(),
            }
        } else {
            match status.as_u16() {
                400 if !reply.fields.is_empty() => FormStatus::ValidationError {
                    errors: reply
                        .fields
                        .into_iter()
                        .map(|f| FieldError {
                            message: format!("Please check {}", f),
                            field: Some(f),
                        })
                        .collect(),
                },
                403 => {
                    self.token = None;
                    FormStatus::Error {
                        message: reply.error.unwrap_or_else(|| "Security check failed".into()),
                        reference: reply.reference,
                    }
                }
                429 => FormStatus::Error {
                    message: match reply.retry_after_secs {
                        Some(secs) => format!("Too many submissions. Try again in {} seconds.", secs),
                        None => "Too many submissions. Please try again later.".to_string(),
                    },
                    reference: reply.reference,
                },
                _ => FormStatus::Error {
                    message: reply
                        .error
                        .unwrap_or_else(|| "Submission failed. Please try again.".into()),
                    reference: reply.reference,
                },
            }
        };

        self.finish(outcome)
    }

    /// Publish `status` and return the new epoch.
    fn publish(&self, status: FormStatus) -> u64 {
        let mut epoch = 0;
        self.state.send_modify(|state| {
            state.epoch += 1;
            state.status = status;
            epoch = state.epoch;
        });
        epoch
    }

    /// Publish a terminal status and schedule the return to idle.
    fn finish(&self, status: FormStatus) -> FormStatus {
        let epoch = self.publish(status.clone());
        let state = Arc::clone(&self.state);
        let after = self.config.reset_after;
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // A newer status wins over a pending reset
            state.send_if_modified(|s| {
                if s.epoch != epoch {
                    return false;
                }
                s.status = FormStatus::Idle;
                s.epoch += 1;
                true
            });
        });
        status
    }
}

fn network_error() -> FormStatus {
    FormStatus::Error {
        message: "Network error. Please check your connection and try again.".to_string(),
        reference: None,
    }
}
