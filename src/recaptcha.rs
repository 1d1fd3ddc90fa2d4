// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Optional reCAPTCHA verification against the siteverify endpoint.

use crate::config::{RecaptchaConfig, Secret};
use serde::Deserialize;
use std::net::IpAddr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RecaptchaError {
    #[error("response token missing")]
    Missing,

    #[error("verification failed: {0:?}")]
    Rejected(Vec<String>),

    #[error("score {score} below threshold {min}")]
    LowScore { score: f64, min: f64 },

    #[error("siteverify unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RecaptchaError {
    /// Whether the failure is ours rather than the client's.
    pub fn is_transport(&self) -> bool {
        matches!(self, RecaptchaError::Transport(_))
    }
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

/// Verifies browser reCAPTCHA tokens. A verifier without a secret accepts
/// everything.
pub struct RecaptchaVerifier {
    secret: Option<Secret>,
    verify_url: String,
    min_score: f64,
    client: reqwest::Client,
}

impl RecaptchaVerifier {
    pub fn new(config: &RecaptchaConfig) -> Result<Self, RecaptchaError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            secret: config.secret.clone().filter(|s| !s.is_empty()),
            verify_url: config.verify_url.clone(),
            min_score: config.min_score,
            client,
        })
    }

    pub fn enabled(&self) -> bool {
        self.secret.is_some()
    }

    pub async fn verify(&self, response: Option<&str>, ip: IpAddr) -> Result<(), RecaptchaError> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };
        let token = response
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(RecaptchaError::Missing)?;

        let remote_ip = ip.to_string();
        let outcome: SiteVerifyResponse = self
            .client
            .post(&self.verify_url)
            .form(&[
                ("secret", secret.expose()),
                ("response", token),
                ("remoteip", remote_ip.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !outcome.success {
            debug!(%ip, codes = ?outcome.error_codes, "reCAPTCHA rejected");
            return Err(RecaptchaError::Rejected(outcome.error_codes));
        }
        // v2 responses carry no score
        if let Some(score) = outcome.score {
            if score < self.min_score {
                debug!(%ip, score, "reCAPTCHA score too low");
                return Err(RecaptchaError::LowScore {
                    score,
                    min: self.min_score,
                });
            }
        }
        Ok(())
    }
}
