//! Configuration for the sync client.

use std::time::Duration;
use tamanu_core::DEFAULT_UPLOAD_LIMIT;

/// Page size of the first download of a channel.
pub const INITIAL_DOWNLOAD_LIMIT: usize = 100;
/// Smallest download page.
pub const MIN_DOWNLOAD_LIMIT: usize = 1;
/// Largest download page.
pub const MAX_DOWNLOAD_LIMIT: usize = 500;
/// Download time each page aims for.
pub const OPTIMAL_DOWNLOAD_TIME_PER_PAGE: Duration = Duration::from_millis(2000);

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncClientConfig {
    /// Records per upload page.
    pub upload_limit: usize,
    /// Records per download page, before adapting to download time.
    pub initial_download_limit: usize,
    /// Lower bound of the adaptive download page size.
    pub min_download_limit: usize,
    /// Upper bound of the adaptive download page size.
    pub max_download_limit: usize,
    /// Download time each page aims for.
    pub target_page_time: Duration,
    /// Retry configuration for calls to central.
    pub retry: RetryConfig,
}

impl SyncClientConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upload page size.
    #[must_use]
    pub fn with_upload_limit(mut self, limit: usize) -> Self {
        self.upload_limit = limit;
        self
    }

    /// Sets the first download page size.
    #[must_use]
    pub fn with_initial_download_limit(mut self, limit: usize) -> Self {
        self.initial_download_limit = limit;
        self
    }

    /// Sets the bounds of the adaptive download page size.
    #[must_use]
    pub fn with_download_limits(mut self, min: usize, max: usize) -> Self {
        self.min_download_limit = min;
        self.max_download_limit = max;
        self
    }

    /// Sets the download time each page aims for.
    #[must_use]
    pub fn with_target_page_time(mut self, time: Duration) -> Self {
        self.target_page_time = time;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Size of the next download page, given how long a page of `current`
    /// records took.
    ///
    /// Scales the page so it would have taken the target time, then clamps
    /// it to the configured bounds. The minimum wins if the bounds cross.
    pub fn next_download_limit(&self, current: usize, elapsed: Duration) -> usize {
        let elapsed_secs = elapsed.as_secs_f64();
        let scaled = if elapsed_secs > 0.0 {
            (self.target_page_time.as_secs_f64() * current as f64 / elapsed_secs).floor() as usize
        } else {
            self.max_download_limit
        };
        scaled
            .min(self.max_download_limit)
            .max(self.min_download_limit)
    }
}

impl Default for SyncClientConfig {
    fn default() -> Self {
        Self {
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            initial_download_limit: INITIAL_DOWNLOAD_LIMIT,
            min_download_limit: MIN_DOWNLOAD_LIMIT,
            max_download_limit: MAX_DOWNLOAD_LIMIT,
            target_page_time: OPTIMAL_DOWNLOAD_TIME_PER_PAGE,
            retry: RetryConfig::default(),
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first included.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Turns jitter on or off.
    #[must_use]
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% extra
            let jitter = delay_secs * 0.25 * jitter_fraction();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// A fraction in `[0, 1)` taken from the clock's sub-second nanos.
fn jitter_fraction() -> f64 {
    let nanos = chrono::Utc::now().timestamp_subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_builder() {
        let config = SyncClientConfig::new()
            .with_upload_limit(25)
            .with_initial_download_limit(50)
            .with_download_limits(5, 200)
            .with_target_page_time(Duration::from_secs(1));

        assert_eq!(config.upload_limit, 25);
        assert_eq!(config.initial_download_limit, 50);
        assert_eq!(config.min_download_limit, 5);
        assert_eq!(config.max_download_limit, 200);
        assert_eq!(config.target_page_time, Duration::from_secs(1));
    }

    #[test]
    fn defaults() {
        let config = SyncClientConfig::default();
        assert_eq!(config.upload_limit, 100);
        assert_eq!(config.initial_download_limit, 100);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn download_limit_scales_to_target_time() {
        let config = SyncClientConfig::default();
        // 100 records in 4 s is 40 ms each; 2 s fits 50.
        assert_eq!(config.next_download_limit(100, Duration::from_secs(4)), 50);
        // 100 records in 1 s fits 200 in 2 s.
        assert_eq!(config.next_download_limit(100, Duration::from_secs(1)), 200);
    }

    #[test]
    fn download_limit_is_clamped() {
        let config = SyncClientConfig::default();
        assert_eq!(config.next_download_limit(100, Duration::from_millis(10)), 500);
        assert_eq!(config.next_download_limit(100, Duration::ZERO), 500);
        assert_eq!(config.next_download_limit(1, Duration::from_secs(60)), 1);
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_without_jitter_is_exact() {
        let config = RetryConfig::new(4)
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(false);
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        let delay = config.delay_for_attempt(5);
        assert!(delay <= Duration::from_millis(6250));
    }
}
