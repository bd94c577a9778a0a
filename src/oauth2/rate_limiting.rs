// ABOUTME: Per-IP rate limiting for the authorize and token endpoints
// ABOUTME: Fixed-window counters in a sharded concurrent map with lazy cleanup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitConfig;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy)]
pub struct RateLimitStatus {
    pub is_limited: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets, set when limited
    pub retry_after_secs: Option<u64>,
}

/// Per-IP fixed-window rate limiter. `DashMap` gives sharded locking so a
/// hot IP cannot serialize unrelated requests.
pub struct RateLimiter {
    state: DashMap<(&'static str, IpAddr), (u32, Instant)>,
    config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: DashMap::new(),
            config,
        }
    }

    /// Check and count a request against the endpoint's window.
    #[must_use]
    pub fn check(&self, endpoint: &'static str, client_ip: IpAddr) -> RateLimitStatus {
        let limit = match endpoint {
            "authorize" => self.config.authorize_max,
            _ => self.config.token_max,
        };
        let window = Duration::from_secs(self.config.window_secs);
        let now = Instant::now();

        let mut entry = self.state.entry((endpoint, client_ip)).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) >= window {
            *count = 0;
            *window_start = now;
        }

        let is_limited = *count >= limit;
        if !is_limited {
            *count += 1;
        }
        let remaining = limit.saturating_sub(*count);
        let elapsed = now.duration_since(*window_start);
        drop(entry);

        // Lazy cleanup off the hot path once the map grows past threshold
        if self.state.len() > self.config.cleanup_threshold {
            self.cleanup(now, window);
        }

        RateLimitStatus {
            is_limited,
            limit,
            remaining,
            retry_after_secs: is_limited.then(|| window.saturating_sub(elapsed).as_secs().max(1)),
        }
    }

    fn cleanup(&self, now: Instant, window: Duration) {
        self.state
            .retain(|_, (_, start)| now.duration_since(*start) < window * 2);
    }
}
