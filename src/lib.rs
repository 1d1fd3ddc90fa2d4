// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Form Gateway
//!
//! This crate accepts lead-capture form submissions from a public site and
//! forwards the clean ones to an external form API:
//!
//! - Per-IP sliding window rate limiting (5 submissions per 5 minutes)
//! - HMAC-SHA256 CSRF tokens bound to the client IP (1 hour validity)
//! - Optional reCAPTCHA verification
//! - Markup and script stripping on every string field
//! - `formType` allow-list with required fields per type
//!
//! The [`client`] module is the browser-side counterpart: token handling,
//! a resubmission cooldown and an observable submission state.

pub mod client;
pub mod config;
pub mod csrf;
pub mod error;
pub mod form;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod recaptcha;
pub mod reference;
pub mod sanitize;
pub mod upstream;

pub use config::Config;
pub use csrf::{generate_token, CsrfGuard, CsrfToken};
pub use error::ApiError;
pub use form::{ClientTimestamp, FormSubmission, FormType, FormValidator, ValidationResult};
pub use limiter::{RateLimitResult, RateLimiter};
