// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Client for the external form API that receives accepted submissions.

use crate::config::{Secret, UpstreamConfig};
use crate::form::{ClientTimestamp, FormType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream responded with status {0}")]
    Status(u16),
}

/// Metadata attached to every forwarded submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetadata {
    pub reference: String,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_timestamp: Option<ClientTimestamp>,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
}

/// Body POSTed to the form API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardPayload {
    pub form_type: FormType,
    pub fields: Map<String, Value>,
    pub metadata: SubmissionMetadata,
}

/// Form API client.
pub struct UpstreamClient {
    endpoint: String,
    api_key: Secret,
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    /// Forward a sanitized submission. Returns the upstream status on success.
    pub async fn forward(&self, payload: &ForwardPayload) -> Result<u16, UpstreamError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        debug!(
            reference = %payload.metadata.reference,
            status = status.as_u16(),
            "Upstream responded"
        );

        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(UpstreamError::Status(status.as_u16()))
        }
    }
}
