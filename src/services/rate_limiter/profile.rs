//! Per (host, class) rate limit estimate and the learning rules that move it.
//!
//! Everything here is pure: callers pass the current time in milliseconds, which keeps
//! the estimator deterministic under test.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::headers;

pub const MAX_HISTORY: usize = 100;
pub const MAX_DETECTIONS: usize = 10;
/// History pruning never drops below this many observations
pub const MIN_RETAINED_HISTORY: usize = 10;

pub const MIN_WINDOW_MS: i64 = 100;
pub const MAX_WINDOW_MS: i64 = 60 * 60 * 1000;
pub const MIN_LIMIT: u32 = 1;
pub const MAX_LIMIT: u32 = 1000;

pub const HIGH_CONFIDENCE: f64 = 0.7;
pub const INITIAL_CONFIDENCE: f64 = 0.1;
pub const BACKOFF_FACTOR: f64 = 1.5;

/// Confidence reachable from recovery timing alone
const RECOVERY_CONFIDENCE_CAP: f64 = 0.85;
const RECOVERY_CONFIDENCE_WEIGHT: f64 = 0.25;
const HEADER_CONFIDENCE_BOOST: f64 = 0.3;
const LIMIT_SAFETY: f64 = 0.9;
const SPORADIC_SAMPLE: usize = 20;

/// One recorded upstream response
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp_ms: i64,
    pub rate_limited: bool,
    pub status: u16,
}

/// Snapshot of a profile for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStats {
    pub window_ms: i64,
    pub limit: u32,
    pub total_requests: u64,
    pub rate_limited_requests: u64,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub last_rate_limited_at: Option<i64>,
    pub last_success_at: Option<i64>,
    pub throttle_ms: u64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitProfile {
    window_ms: i64,
    limit: u32,
    /// Oldest first
    history: VecDeque<Observation>,
    /// Timestamps of rate limited responses, oldest first
    detections: VecDeque<i64>,
    consecutive_successes: u32,
    consecutive_failures: u32,
    total_requests: u64,
    rate_limited_requests: u64,
    last_rate_limited_at: Option<i64>,
    last_success_at: Option<i64>,
    confidence: f64,
    /// Completed limit -> recovery cycles
    cycles: u32,
}

impl RateLimitProfile {
    pub fn new(initial_window_ms: i64, initial_limit: u32) -> Self {
        Self {
            window_ms: initial_window_ms.clamp(MIN_WINDOW_MS, MAX_WINDOW_MS),
            limit: initial_limit.clamp(MIN_LIMIT, MAX_LIMIT),
            history: VecDeque::new(),
            detections: VecDeque::new(),
            consecutive_successes: 0,
            consecutive_failures: 0,
            total_requests: 0,
            rate_limited_requests: 0,
            last_rate_limited_at: None,
            last_success_at: None,
            confidence: INITIAL_CONFIDENCE,
            cycles: 0,
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Restore invariants on a profile that came from outside (e.g. a state file)
    pub fn sanitized(mut self) -> Self {
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
        while self.detections.len() > MAX_DETECTIONS {
            self.detections.pop_front();
        }
        if !self.confidence.is_finite() {
            self.confidence = INITIAL_CONFIDENCE;
        }
        self.clamp_estimates();
        self
    }

    /// Learn from one upstream response. Returns whether it was classified as rate limited.
    pub fn record(&mut self, now_ms: i64, status: u16, headers: &HashMap<String, String>) -> bool {
        let rate_limited = headers::is_rate_limited(status, headers);

        self.total_requests += 1;
        self.history.push_back(Observation {
            timestamp_ms: now_ms,
            rate_limited,
            status,
        });
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }

        if rate_limited {
            self.on_rate_limited(now_ms);
        } else {
            self.on_success(now_ms);
        }

        self.refine_estimates();
        self.check_sporadic();

        // Explicit upstream numbers win over anything inferred above
        self.adopt_headers(headers, now_ms);
        self.clamp_estimates();

        rate_limited
    }

    /// Milliseconds to wait before the next request, 0 when there is headroom
    pub fn throttle_delay(&mut self, now_ms: i64) -> u64 {
        self.prune_history(now_ms);

        let window_start = now_ms - self.window_ms;
        let in_window: Vec<i64> = self
            .history
            .iter()
            .filter(|obs| obs.timestamp_ms >= window_start)
            .map(|obs| obs.timestamp_ms)
            .collect();

        let limit = self.limit as usize;
        if in_window.len() < limit {
            return 0;
        }

        // The slot frees up once enough of the oldest in-window requests have aged out
        let gate = in_window[in_window.len() - limit];
        let until_open = (gate + self.window_ms - now_ms).max(0) as f64;
        let safety = 1.0 + (1.0 - self.confidence);
        let mut delay = (until_open * safety).ceil();

        if self.confidence < HIGH_CONFIDENCE && self.consecutive_failures > 0 {
            let backoff = 1000.0 * BACKOFF_FACTOR.powi(self.consecutive_failures.min(64) as i32);
            delay += backoff.min(self.window_ms as f64 / 2.0);
        }

        delay.max(0.0) as u64
    }

    pub fn stats(&mut self, now_ms: i64) -> RateLimitStats {
        let throttle_ms = self.throttle_delay(now_ms);
        RateLimitStats {
            window_ms: self.window_ms,
            limit: self.limit,
            total_requests: self.total_requests,
            rate_limited_requests: self.rate_limited_requests,
            consecutive_successes: self.consecutive_successes,
            consecutive_failures: self.consecutive_failures,
            last_rate_limited_at: self.last_rate_limited_at,
            last_success_at: self.last_success_at,
            throttle_ms,
            confidence: self.confidence,
        }
    }

    fn on_rate_limited(&mut self, now_ms: i64) {
        self.rate_limited_requests += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
        self.last_rate_limited_at = Some(now_ms);

        self.detections.push_back(now_ms);
        while self.detections.len() > MAX_DETECTIONS {
            self.detections.pop_front();
        }

        let window_start = now_ms - self.window_ms;
        let successes = self
            .history
            .iter()
            .filter(|obs| {
                obs.timestamp_ms >= window_start && obs.timestamp_ms <= now_ms && !obs.rate_limited
            })
            .count();

        if successes == 0 {
            return;
        }

        let observed = ((successes as f64 * LIMIT_SAFETY).floor() as u32).max(MIN_LIMIT);
        if observed < self.limit {
            let weight = self.confidence.max(0.3);
            self.limit = blend(self.limit, observed, weight);
            tracing::debug!(
                limit = self.limit,
                observed = observed,
                "Shrunk rate limit after detection"
            );
        }
    }

    fn on_success(&mut self, now_ms: i64) {
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
        self.last_success_at = Some(now_ms);

        if self.consecutive_successes > 5 {
            let factor = (1.0 + self.consecutive_successes as f64 / 100.0).min(1.1);
            self.limit = ((self.limit as f64 * factor).ceil() as u32).min(MAX_LIMIT);
        }

        let Some(limited_at) = self.last_rate_limited_at else {
            return;
        };
        let elapsed = now_ms - limited_at;
        if self.consecutive_successes != 1 || elapsed <= 0 || elapsed >= MAX_WINDOW_MS {
            return;
        }

        // First success after being limited: the gap approximates the window length
        self.window_ms = if self.cycles == 0 {
            elapsed
        } else {
            (self.window_ms as f64 * 0.7 + elapsed as f64 * 0.3).round() as i64
        };
        self.cycles += 1;
        if self.confidence < RECOVERY_CONFIDENCE_CAP {
            self.confidence += (RECOVERY_CONFIDENCE_CAP - self.confidence) * RECOVERY_CONFIDENCE_WEIGHT;
        }

        tracing::debug!(
            window_ms = self.window_ms,
            sample_ms = elapsed,
            cycles = self.cycles,
            "Learned window from recovery"
        );
    }

    fn refine_estimates(&mut self) {
        if self.detections.len() < 2 || self.cycles == 0 {
            return;
        }

        let before_limit = self.average_requests_before_limit();
        if before_limit > 0.0 {
            let observed = ((before_limit * LIMIT_SAFETY).floor() as u32).max(MIN_LIMIT);
            self.limit = blend(self.limit, observed, self.confidence * 0.5);
        }

        let intervals: Vec<i64> = self
            .detections
            .iter()
            .zip(self.detections.iter().skip(1))
            .map(|(earlier, later)| later - earlier)
            .filter(|interval| *interval > MIN_WINDOW_MS && *interval < MAX_WINDOW_MS)
            .collect();
        if intervals.is_empty() {
            return;
        }

        let average = intervals.iter().sum::<i64>() as f64 / intervals.len() as f64;
        let sample_confidence = (0.3 + (intervals.len() as f64 / 10.0) * 0.6).min(0.9);
        let candidate = (self.window_ms as f64 * (1.0 - sample_confidence)
            + average * sample_confidence)
            .round() as i64;

        if ((candidate - self.window_ms).abs() as f64) / (self.window_ms as f64) > 0.1 {
            self.window_ms = candidate;
            if sample_confidence > self.confidence {
                self.confidence += (sample_confidence - self.confidence) * 0.5;
            }
            tracing::debug!(
                window_ms = self.window_ms,
                intervals = intervals.len(),
                confidence = self.confidence,
                "Refined window from detection intervals"
            );
        }
    }

    /// Mean length of success runs that ended in a rate limit
    fn average_requests_before_limit(&self) -> f64 {
        let mut total = 0usize;
        let mut segments = 0usize;
        let mut run = 0usize;

        for obs in &self.history {
            if !obs.rate_limited {
                run += 1;
            } else if run > 0 {
                total += run;
                segments += 1;
                run = 0;
            }
        }

        if segments == 0 {
            0.0
        } else {
            total as f64 / segments as f64
        }
    }

    /// Frequent flips between limited and clean responses mean our estimate is unreliable
    fn check_sporadic(&mut self) {
        if self.history.len() < MIN_RETAINED_HISTORY {
            return;
        }

        let mut limited = 0usize;
        let mut changes = 0usize;
        let mut previous = false;
        let mut sampled = 0usize;

        for obs in self.history.iter().rev().take(SPORADIC_SAMPLE) {
            if obs.rate_limited {
                limited += 1;
            }
            if obs.rate_limited != previous {
                changes += 1;
            }
            previous = obs.rate_limited;
            sampled += 1;
        }

        let share = limited as f64 / sampled as f64;
        if changes > 5 && share > 0.05 && share < 0.5 {
            self.confidence = self.confidence.min(HIGH_CONFIDENCE);
            if self.rate_limited_requests > 3 {
                self.limit = ((self.limit as f64 * 0.85).floor() as u32).max(MIN_LIMIT);
                tracing::debug!(limit = self.limit, "Sporadic rate limiting, tightened limit");
            }
        }
    }

    fn adopt_headers(&mut self, headers: &HashMap<String, String>, now_ms: i64) {
        if let Some(limit) = headers::explicit_limit(headers) {
            self.limit = limit.clamp(MIN_LIMIT, MAX_LIMIT);
            self.confidence = (self.confidence + HEADER_CONFIDENCE_BOOST).min(1.0);
        }

        if let Some(window) = headers::explicit_window_ms(headers, now_ms, MIN_WINDOW_MS, MAX_WINDOW_MS) {
            self.window_ms = window;
            self.confidence = (self.confidence + HEADER_CONFIDENCE_BOOST).min(1.0);
        }
    }

    fn prune_history(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.window_ms * 2;
        let stale = self
            .history
            .iter()
            .take_while(|obs| obs.timestamp_ms < cutoff)
            .count();
        let removable = stale.min(self.history.len().saturating_sub(MIN_RETAINED_HISTORY));
        self.history.drain(..removable);
    }

    fn clamp_estimates(&mut self) {
        self.window_ms = self.window_ms.clamp(MIN_WINDOW_MS, MAX_WINDOW_MS);
        self.limit = self.limit.clamp(MIN_LIMIT, MAX_LIMIT);
        self.confidence = self.confidence.clamp(0.0, 1.0);
    }
}

fn blend(current: u32, observed: u32, weight: f64) -> u32 {
    let mixed = current as f64 * (1.0 - weight) + observed as f64 * weight;
    (mixed.round() as u32).clamp(MIN_LIMIT, MAX_LIMIT)
}
