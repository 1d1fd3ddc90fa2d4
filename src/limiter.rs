// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sliding window rate limiter for form submissions.
//!
//! Each IP keeps the instants of its recent submissions, pruned to the
//! window (5 minutes by default) and capped at the submission limit
//! (5 by default). State lives in process memory only, so the limit is
//! best-effort across restarts and between instances.

use crate::config::RateLimitConfig;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Result of a rate limit check.
#[derive(Debug, Clone)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Remaining submissions in the current window
        remaining: u32,
        /// Time until the oldest recorded submission leaves the window
        reset_in: Duration,
    },
    /// Request is rate limited
    Limited {
        /// Reason for rate limiting
        reason: RateLimitReason,
        /// Time until a slot frees up
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

/// Reason for rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    /// IP used up its submissions for the window
    IpRateExceeded,
}

impl std::fmt::Display for RateLimitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IpRateExceeded => write!(f, "IP rate limit exceeded"),
        }
    }
}

/// Recent submission instants for one IP, oldest first.
#[derive(Debug, Default)]
struct SubmissionWindow {
    hits: VecDeque<Instant>,
}

impl SubmissionWindow {
    /// Drop hits that fell out of the window ending at `now`.
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.hits.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    fn time_until_slot(&self, now: Instant, window: Duration) -> Duration {
        self.hits
            .front()
            .map(|oldest| (*oldest + window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

/// Thread-safe rate limiter.
pub struct RateLimiter {
    /// Configuration
    config: RateLimitConfig,
    /// Per-IP submission windows
    windows: Arc<RwLock<HashMap<IpAddr, SubmissionWindow>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Check and record a submission from `ip`.
    pub async fn check(&self, ip: IpAddr) -> RateLimitResult {
        self.check_at(ip, Instant::now()).await
    }

    /// Check and record a submission from `ip` as of `now`.
    ///
    /// Limited submissions are not recorded, so a client that keeps retrying
    /// is let back in once its oldest allowed submission ages out.
    pub async fn check_at(&self, ip: IpAddr, now: Instant) -> RateLimitResult {
        let window = self.config.window_duration();
        let max = self.config.max_submissions as usize;

        let mut windows = self.windows.write().await;
        let entry = windows.entry(ip).or_default();
        entry.prune(now, window);

        if entry.hits.len() >= max {
            let retry_after = entry.time_until_slot(now, window);
            debug!(%ip, ?retry_after, "IP rate limit exceeded");
            return RateLimitResult::Limited {
                reason: RateLimitReason::IpRateExceeded,
                retry_after,
            };
        }

        entry.hits.push_back(now);
        RateLimitResult::Allowed {
            remaining: (max - entry.hits.len()) as u32,
            reset_in: entry.time_until_slot(now, window),
        }
    }

    /// Number of IPs currently tracked.
    pub async fn tracked_ips(&self) -> usize {
        self.windows.read().await.len()
    }

    /// Clean up expired entries (should be called periodically).
    pub async fn cleanup(&self) {
        self.cleanup_at(Instant::now()).await
    }

    pub async fn cleanup_at(&self, now: Instant) {
        let window = self.config.window_duration();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, w| {
            w.prune(now, window);
            !w.hits.is_empty()
        });
        let removed = before - windows.len();
        if removed > 0 {
            debug!(removed, remaining = windows.len(), "Pruned idle rate limit entries");
        }
    }
}
