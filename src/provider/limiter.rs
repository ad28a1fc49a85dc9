//! Request quota enforcement for the provider
//!
//! Two layers guard every request:
//! - a `governor` pacer spacing consecutive requests by `window / limit`
//! - a sliding log of admission instants that never admits more than `limit`
//!   requests within any rolling `window`
//!
//! The pacer smooths bursts; the log is the hard guarantee under concurrent
//! callers.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Shared quota for all requests against one provider account
pub struct RequestLimiter {
    pacer: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    admitted: Mutex<VecDeque<Instant>>,
    limit: usize,
    window: Duration,
}

impl RequestLimiter {
    /// Create a limiter admitting at most `limit` requests per rolling `window`,
    /// spaced by `window / limit`
    pub fn new(limit: u32, window: Duration) -> Self {
        let limit = limit.max(1);
        let pacer = window
            .checked_div(limit)
            .and_then(Quota::with_period)
            .map(RateLimiter::direct);

        Self {
            pacer,
            admitted: Mutex::new(VecDeque::with_capacity(limit as usize)),
            limit: limit as usize,
            window,
        }
    }

    /// Create a limiter that only enforces the rolling window, without spacing
    pub fn unpaced(limit: u32, window: Duration) -> Self {
        Self {
            pacer: None,
            ..Self::new(limit, window)
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a request may be sent and record it
    ///
    /// Returns the instant the request was admitted at.
    pub async fn acquire(&self) -> Instant {
        if let Some(pacer) = &self.pacer {
            pacer.until_ready().await;
        }

        loop {
            let wait_until = {
                let mut admitted = self.admitted.lock().await;
                let now = Instant::now();

                while admitted
                    .front()
                    .is_some_and(|first| now.duration_since(*first) >= self.window)
                {
                    admitted.pop_front();
                }

                if admitted.len() < self.limit {
                    admitted.push_back(now);
                    return now;
                }

                match admitted.front() {
                    Some(first) => *first + self.window,
                    None => now,
                }
            };

            tracing::warn!(
                limit = self.limit,
                window_ms = self.window.as_millis() as u64,
                wait_ms = wait_until
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64,
                "Provider request quota exhausted, waiting for window to reset"
            );
            crate::metrics::record_rate_limit_wait();
            tokio::time::sleep_until(wait_until).await;
        }
    }

    /// Requests admitted within the current rolling window
    pub async fn in_flight_window(&self) -> usize {
        let admitted = self.admitted.lock().await;
        let now = Instant::now();
        admitted
            .iter()
            .filter(|at| now.duration_since(**at) < self.window)
            .count()
    }
}

impl std::fmt::Debug for RequestLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("paced", &self.pacer.is_some())
            .finish()
    }
}

/// Spacing the pacer applies between consecutive requests
pub fn pacing_interval(limit: u32, window: Duration) -> Duration {
    NonZeroU32::new(limit)
        .map(|limit| window / limit.get())
        .unwrap_or(window)
}
