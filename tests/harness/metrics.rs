// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Tallies of gateway responses during an attack simulation.

use axum::http::StatusCode;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// How the gateway answered one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Outcome {
    Accepted,
    Invalid,
    Forbidden,
    RateLimited,
    Failed,
}

impl Outcome {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            200..=299 => Outcome::Accepted,
            400 => Outcome::Invalid,
            403 => Outcome::Forbidden,
            429 => Outcome::RateLimited,
            _ => Outcome::Failed,
        }
    }
}

/// Collected during a run; turned into a [`MetricsReport`] at the end.
#[derive(Debug)]
pub struct AttackMetrics {
    started: Instant,
    elapsed: Option<Duration>,
    outcomes: BTreeMap<Outcome, usize>,
    sources: HashSet<IpAddr>,
    slowest: Duration,
}

impl AttackMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            elapsed: None,
            outcomes: BTreeMap::new(),
            sources: HashSet::new(),
            slowest: Duration::ZERO,
        }
    }

    /// Restart the clock.
    pub fn start(&mut self) {
        self.started = Instant::now();
        self.elapsed = None;
    }

    pub fn finish(&mut self) {
        self.elapsed = Some(self.started.elapsed());
    }

    pub fn record(&mut self, outcome: Outcome, ip: IpAddr, latency: Duration) {
        *self.outcomes.entry(outcome).or_default() += 1;
        self.sources.insert(ip);
        self.slowest = self.slowest.max(latency);
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    pub fn report(&self) -> MetricsReport {
        let total_requests = self.outcomes.values().sum();
        let accepted = self.count(Outcome::Accepted);
        MetricsReport {
            total_requests,
            accepted,
            invalid: self.count(Outcome::Invalid),
            forbidden: self.count(Outcome::Forbidden),
            rate_limited: self.count(Outcome::RateLimited),
            failed: self.count(Outcome::Failed),
            unique_ips: self.sources.len(),
            stopped_ratio: if total_requests == 0 {
                0.0
            } else {
                (total_requests - accepted) as f64 / total_requests as f64
            },
            elapsed: self.elapsed.unwrap_or_else(|| self.started.elapsed()),
            slowest: self.slowest,
        }
    }
}

/// Summary of one simulation.
#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub total_requests: usize,
    pub accepted: usize,
    pub invalid: usize,
    pub forbidden: usize,
    pub rate_limited: usize,
    pub failed: usize,
    pub unique_ips: usize,
    /// Share of requests that never reached the form API
    pub stopped_ratio: f64,
    pub elapsed: Duration,
    pub slowest: Duration,
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} requests from {} IPs in {:?} (slowest {:?})",
            self.total_requests, self.unique_ips, self.elapsed, self.slowest
        )?;
        writeln!(
            f,
            "  accepted {} | 400 {} | 403 {} | 429 {} | other {}",
            self.accepted, self.invalid, self.forbidden, self.rate_limited, self.failed
        )?;
        write!(f, "  stopped {:.1}%", self.stopped_ratio * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_ratio() {
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let mut metrics = AttackMetrics::new();
        for _ in 0..3 {
            metrics.record(Outcome::Accepted, ip, Duration::ZERO);
        }
        for _ in 0..7 {
            metrics.record(Outcome::RateLimited, ip, Duration::from_millis(2));
        }

        let report = metrics.report();
        assert!((report.stopped_ratio - 0.7).abs() < 0.01);
        assert_eq!(report.unique_ips, 1);
        assert_eq!(report.slowest, Duration::from_millis(2));
    }

    #[test]
    fn test_outcome_from_status() {
        assert_eq!(Outcome::from_status(StatusCode::CREATED), Outcome::Accepted);
        assert_eq!(Outcome::from_status(StatusCode::TOO_MANY_REQUESTS), Outcome::RateLimited);
        assert_eq!(Outcome::from_status(StatusCode::INTERNAL_SERVER_ERROR), Outcome::Failed);
    }
}
