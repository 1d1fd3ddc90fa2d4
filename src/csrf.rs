// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Stateless CSRF tokens bound to the client IP.
//!
//! A token is `"{timestamp_ms}.{hex(HMAC-SHA256(secret, "{ip}:{timestamp_ms}"))}"`.
//! Carrying the mint time inside the token lets the server recompute the
//! digest without keeping per-session state. Tokens are not single-use.

use crate::config::{ConfigError, CsrfConfig};
use chrono::Utc;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Header the client sends the token in.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Reasons a token is rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CsrfError {
    #[error("CSRF token missing")]
    Missing,

    #[error("CSRF token malformed")]
    Malformed,

    #[error("CSRF token expired")]
    Expired,

    #[error("CSRF token issued in the future")]
    FromFuture,

    #[error("CSRF token does not match")]
    Mismatch,
}

/// A minted token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsrfToken {
    /// Milliseconds since the Unix epoch at mint time
    pub timestamp: i64,
    /// Lowercase hex HMAC digest
    pub digest: String,
}

impl CsrfToken {
    /// Parse the `"{timestamp}.{digest}"` wire form.
    pub fn parse(raw: &str) -> Result<Self, CsrfError> {
        let (ts, digest) = raw.trim().split_once('.').ok_or(CsrfError::Malformed)?;
        let timestamp = ts.parse::<i64>().map_err(|_| CsrfError::Malformed)?;
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CsrfError::Malformed);
        }
        Ok(Self {
            timestamp,
            digest: digest.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.timestamp, self.digest)
    }
}

/// Feed `"{ip}:{timestamp_ms}"` into a keyed MAC.
fn bind(mut mac: HmacSha256, ip: IpAddr, timestamp_ms: i64) -> HmacSha256 {
    mac.update(ip.to_string().as_bytes());
    mac.update(b":");
    mac.update(timestamp_ms.to_string().as_bytes());
    mac
}

fn token_from(mac: HmacSha256, ip: IpAddr, timestamp_ms: i64) -> CsrfToken {
    let digest = bind(mac, ip, timestamp_ms).finalize().into_bytes();
    CsrfToken {
        timestamp: timestamp_ms,
        digest: hex::encode(digest),
    }
}

/// Compute the token for `(ip, timestamp_ms)`. Deterministic for identical inputs.
pub fn generate_token(
    secret: &[u8],
    ip: IpAddr,
    timestamp_ms: i64,
) -> Result<CsrfToken, InvalidLength> {
    let mac = HmacSha256::new_from_slice(secret)?;
    Ok(token_from(mac, ip, timestamp_ms))
}

/// Issues and verifies tokens under one server secret.
pub struct CsrfGuard {
    /// Keyed with the server secret; cloned per token
    mac: HmacSha256,
    max_age_ms: i64,
    max_skew_ms: i64,
}

impl CsrfGuard {
    pub fn new(config: &CsrfConfig) -> Result<Self, ConfigError> {
        let mac = HmacSha256::new_from_slice(config.secret.expose().as_bytes())
            .map_err(|_| ConfigError::InvalidCsrfKey)?;
        Ok(Self {
            mac,
            max_age_ms: (config.max_age_secs as i64).saturating_mul(1000),
            max_skew_ms: (config.max_skew_secs as i64).saturating_mul(1000),
        })
    }

    /// Token lifetime in seconds.
    pub fn max_age_secs(&self) -> i64 {
        self.max_age_ms / 1000
    }

    /// Mint a token for `ip` at the current time.
    pub fn issue(&self, ip: IpAddr) -> CsrfToken {
        token_from(self.mac.clone(), ip, Utc::now().timestamp_millis())
    }

    /// Verify a header value for `ip` against the current time.
    pub fn verify(&self, header: Option<&str>, ip: IpAddr) -> Result<(), CsrfError> {
        self.verify_at(header, ip, Utc::now().timestamp_millis())
    }

    /// Verify a header value for `ip` as of `now_ms`.
    ///
    /// Age is checked before the digest, so an expired token is rejected even
    /// when its HMAC is correct.
    pub fn verify_at(&self, header: Option<&str>, ip: IpAddr, now_ms: i64) -> Result<(), CsrfError> {
        let raw = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(CsrfError::Missing)?;
        let token = CsrfToken::parse(raw)?;

        let age = now_ms.saturating_sub(token.timestamp);
        if age > self.max_age_ms {
            debug!(%ip, age_ms = age, "CSRF token expired");
            return Err(CsrfError::Expired);
        }
        if age < -self.max_skew_ms {
            debug!(%ip, age_ms = age, "CSRF token from the future");
            return Err(CsrfError::FromFuture);
        }

        let expected = hex::decode(&token.digest).map_err(|_| CsrfError::Malformed)?;
        bind(self.mac.clone(), ip, token.timestamp)
            .verify_slice(&expected)
            .map_err(|_| {
                debug!(%ip, "CSRF digest mismatch");
                CsrfError::Mismatch
            })
    }
}
