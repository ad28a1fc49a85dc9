//! Retry utilities for provider requests
//!
//! Exponential backoff schedules for the two retry paths of the provider
//! client: "too many requests" responses and transient transport failures.

use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Delay in milliseconds after the first failed attempt
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with custom attempts and base delay
    pub fn with_delays(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            ..Default::default()
        }
    }

    /// Backoff for provider 429 responses without a Retry-After header:
    /// 5s, 10s, 20s
    pub fn rate_limited() -> Self {
        Self::with_delays(3, 5000)
    }

    /// Backoff for timeouts and transient transport errors: 2s, 4s, 8s
    pub fn transient() -> Self {
        Self::with_delays(3, 2000)
    }

    /// Delay to wait after the given failed attempt (0-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (exponential as u64).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Clamp a server-supplied delay to `max_delay_ms`
    pub fn cap(&self, delay: Duration) -> Duration {
        delay.min(Duration::from_millis(self.max_delay_ms))
    }

    /// Whether another attempt is allowed after `attempt` (0-based) failed
    pub fn has_attempts_after(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

/// Parse a `Retry-After` header value given in (possibly fractional) seconds
///
/// HTTP-date values are not used by the provider and yield `None`, as do
/// values too large to represent.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_delays() {
        let config = RetryConfig::rate_limited();

        assert_eq!(config.delay_after(0), Duration::from_secs(5));
        assert_eq!(config.delay_after(1), Duration::from_secs(10));
        assert_eq!(config.delay_after(2), Duration::from_secs(20));
    }

    #[test]
    fn test_transient_delays() {
        let config = RetryConfig::transient();

        assert_eq!(config.delay_after(0), Duration::from_secs(2));
        assert_eq!(config.delay_after(1), Duration::from_secs(4));
        assert_eq!(config.delay_after(2), Duration::from_secs(8));
    }

    #[test]
    fn test_max_delay_cap() {
        let config = RetryConfig {
            max_delay_ms: 5000,
            ..RetryConfig::with_delays(10, 1000)
        };

        assert_eq!(config.delay_after(9), Duration::from_millis(5000));
    }

    #[test]
    fn test_attempt_budget() {
        let config = RetryConfig::with_delays(3, 10);

        assert!(config.has_attempts_after(0));
        assert!(config.has_attempts_after(1));
        assert!(!config.has_attempts_after(2));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_parse_retry_after_out_of_range() {
        assert_eq!(parse_retry_after("1e20"), None);
        assert_eq!(parse_retry_after("inf"), None);
        assert_eq!(parse_retry_after("NaN"), None);
    }

    #[test]
    fn test_cap_server_delay() {
        let config = RetryConfig::rate_limited();

        assert_eq!(config.cap(Duration::from_secs(86_400)), Duration::from_secs(60));
        assert_eq!(config.cap(Duration::from_secs(3)), Duration::from_secs(3));
    }
}
