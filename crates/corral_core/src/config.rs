//! Core engine configuration.

use std::time::Duration;

/// Configuration for a Corral engine.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Maximum number of recency-cache entries (0 disables the cache).
    pub recency_max_items: usize,

    /// Maximum age of a recency-cache entry (zero disables the cache).
    pub recency_max_age: Duration,

    /// Default timeout applied to lock requests that pass none.
    ///
    /// `None` means such requests block indefinitely, which is only safe
    /// for same-process callers.
    pub default_lock_timeout: Option<Duration>,

    /// Number of events retained for cursor-based polling.
    pub event_history: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            recency_max_items: 4096,
            recency_max_age: Duration::from_secs(30),
            default_lock_timeout: None,
            event_history: 10_000,
        }
    }
}

impl CoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the recency-cache item bound.
    #[must_use]
    pub const fn recency_max_items(mut self, items: usize) -> Self {
        self.recency_max_items = items;
        self
    }

    /// Sets the recency-cache age bound.
    #[must_use]
    pub const fn recency_max_age(mut self, age: Duration) -> Self {
        self.recency_max_age = age;
        self
    }

    /// Sets the default lock timeout.
    #[must_use]
    pub const fn default_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_lock_timeout = timeout;
        self
    }

    /// Returns true if the recency cache is enabled.
    #[must_use]
    pub fn recency_enabled(&self) -> bool {
        self.recency_max_items > 0 && !self.recency_max_age.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CoreConfig::default();
        assert!(config.recency_enabled());
        assert!(config.default_lock_timeout.is_none());
    }

    #[test]
    fn zero_bound_disables_recency() {
        assert!(!CoreConfig::new().recency_max_items(0).recency_enabled());
        assert!(!CoreConfig::new()
            .recency_max_age(Duration::ZERO)
            .recency_enabled());
    }

    #[test]
    fn builder_pattern() {
        let config = CoreConfig::new()
            .recency_max_items(10)
            .default_lock_timeout(Some(Duration::from_millis(250)));
        assert_eq!(config.recency_max_items, 10);
        assert_eq!(
            config.default_lock_timeout,
            Some(Duration::from_millis(250))
        );
    }
}
