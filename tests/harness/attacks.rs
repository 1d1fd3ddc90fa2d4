// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Attack simulation patterns for security testing.

/// How the attacker fills the CSRF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    /// A correct, fresh token for the sending IP
    Valid,
    /// No header at all
    Missing,
    /// Minted under a different secret
    Forged,
    /// Correct HMAC, minted more than an hour ago
    Expired,
    /// Fresh and valid, but for a different IP
    Replayed,
}

/// What the attacker puts in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode {
    Valid,
    MissingField,
    UnknownFormType,
}

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of requests to send
    pub total_requests: usize,
    /// Number of unique IPs to simulate
    pub unique_ips: usize,
    pub token: TokenMode,
    pub payload: PayloadMode,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 50,
            unique_ips: 1,
            token: TokenMode::Valid,
            payload: PayloadMode::Valid,
        }
    }
}

/// Predefined attack patterns.
impl AttackConfig {
    /// Single IP flood - simulates basic spam from one source.
    pub fn single_ip_flood() -> Self {
        Self {
            total_requests: 100,
            unique_ips: 1,
            ..Default::default()
        }
    }

    /// Distributed attack - many IPs, few requests each.
    pub fn distributed_attack() -> Self {
        Self {
            total_requests: 200,
            unique_ips: 100,
            ..Default::default()
        }
    }

    /// Cross-site posting without a token.
    pub fn missing_token() -> Self {
        Self {
            total_requests: 20,
            unique_ips: 20,
            token: TokenMode::Missing,
            ..Default::default()
        }
    }

    /// Tokens minted with a guessed secret.
    pub fn forged_token() -> Self {
        Self {
            total_requests: 20,
            unique_ips: 20,
            token: TokenMode::Forged,
            ..Default::default()
        }
    }

    /// Tokens harvested long ago.
    pub fn expired_token() -> Self {
        Self {
            total_requests: 20,
            unique_ips: 20,
            token: TokenMode::Expired,
            ..Default::default()
        }
    }

    /// Tokens harvested from one client reused from other addresses.
    pub fn replayed_token() -> Self {
        Self {
            total_requests: 20,
            unique_ips: 20,
            token: TokenMode::Replayed,
            ..Default::default()
        }
    }

    /// Incomplete submissions.
    pub fn missing_fields() -> Self {
        Self {
            total_requests: 20,
            unique_ips: 20,
            payload: PayloadMode::MissingField,
            ..Default::default()
        }
    }

    /// Probing for form types outside the allow-list.
    pub fn form_type_probe() -> Self {
        Self {
            total_requests: 20,
            unique_ips: 20,
            payload: PayloadMode::UnknownFormType,
            ..Default::default()
        }
    }
}
