use crate::core::{PersistenceError, Result};
use std::time::Duration;

/// Saga persistence configuration
///
/// Concurrency defaults to optimistic (document versioning). Pessimistic
/// locking and migration mode are opt-in.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Serialize access to a saga through a lease lock instead of relying on
    /// document versioning
    pub pessimistic_locking_enabled: bool,

    /// How long a successfully acquired lease remains valid
    pub lease_lock_time: Duration,

    /// Maximum wall-clock time to keep retrying a contended lease
    pub lease_lock_acquisition_timeout: Duration,

    /// Lower bound of the jittered delay between acquisition attempts
    pub lease_lock_acquisition_minimum_refresh_delay: Duration,

    /// Upper bound of the jittered delay between acquisition attempts
    pub lease_lock_acquisition_maximum_refresh_delay: Duration,

    /// Locate records written under a legacy identity scheme via their
    /// migrated-id metadata when a direct lookup misses
    pub migration_mode_enabled: bool,
}

impl PersistenceConfig {
    pub fn new() -> Self {
        Self {
            pessimistic_locking_enabled: false,
            lease_lock_time: Duration::from_secs(60),
            lease_lock_acquisition_timeout: Duration::from_secs(60),
            lease_lock_acquisition_minimum_refresh_delay: Duration::from_millis(500),
            lease_lock_acquisition_maximum_refresh_delay: Duration::from_millis(1000),
            migration_mode_enabled: false,
        }
    }

    /// Enable pessimistic lease locking
    pub fn pessimistic_locking(mut self, enabled: bool) -> Self {
        self.pessimistic_locking_enabled = enabled;
        self
    }

    /// Set the lease duration
    pub fn lease_lock_time(mut self, time: Duration) -> Self {
        self.lease_lock_time = time;
        self
    }

    /// Set the acquisition timeout
    pub fn lease_lock_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.lease_lock_acquisition_timeout = timeout;
        self
    }

    /// Set the minimum jittered refresh delay
    pub fn lease_lock_acquisition_minimum_refresh_delay(mut self, delay: Duration) -> Self {
        self.lease_lock_acquisition_minimum_refresh_delay = delay;
        self
    }

    /// Set the maximum jittered refresh delay
    pub fn lease_lock_acquisition_maximum_refresh_delay(mut self, delay: Duration) -> Self {
        self.lease_lock_acquisition_maximum_refresh_delay = delay;
        self
    }

    /// Enable migration-compatibility lookups
    pub fn migration_mode(mut self, enabled: bool) -> Self {
        self.migration_mode_enabled = enabled;
        self
    }

    /// Validate configuration
    ///
    /// Runs eagerly when the persister is constructed, before any lock is
    /// attempted.
    pub fn validate(&self) -> Result<()> {
        if self.lease_lock_time.is_zero() {
            return Err(PersistenceError::Configuration(
                "lease_lock_time must be greater than zero".to_string(),
            ));
        }

        if self.lease_lock_acquisition_timeout.is_zero() {
            return Err(PersistenceError::Configuration(
                "lease_lock_acquisition_timeout must be greater than zero".to_string(),
            ));
        }

        if self.lease_lock_acquisition_minimum_refresh_delay.is_zero() {
            return Err(PersistenceError::Configuration(
                "lease_lock_acquisition_minimum_refresh_delay must be greater than zero"
                    .to_string(),
            ));
        }

        if self.lease_lock_acquisition_maximum_refresh_delay.is_zero() {
            return Err(PersistenceError::Configuration(
                "lease_lock_acquisition_maximum_refresh_delay must be greater than zero"
                    .to_string(),
            ));
        }

        if self.lease_lock_acquisition_minimum_refresh_delay
            > self.lease_lock_acquisition_maximum_refresh_delay
        {
            return Err(PersistenceError::Configuration(format!(
                "lease_lock_acquisition_minimum_refresh_delay ({:?}) cannot exceed lease_lock_acquisition_maximum_refresh_delay ({:?})",
                self.lease_lock_acquisition_minimum_refresh_delay,
                self.lease_lock_acquisition_maximum_refresh_delay
            )));
        }

        Ok(())
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = PersistenceConfig::default();

        assert!(!config.pessimistic_locking_enabled);
        assert!(!config.migration_mode_enabled);
        assert_eq!(config.lease_lock_time, Duration::from_secs(60));
        assert_eq!(config.lease_lock_acquisition_timeout, Duration::from_secs(60));
        assert_eq!(
            config.lease_lock_acquisition_minimum_refresh_delay,
            Duration::from_millis(500)
        );
        assert_eq!(
            config.lease_lock_acquisition_maximum_refresh_delay,
            Duration::from_millis(1000)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = PersistenceConfig::new()
            .pessimistic_locking(true)
            .lease_lock_time(Duration::from_secs(5))
            .lease_lock_acquisition_timeout(Duration::from_secs(10))
            .migration_mode(true);

        assert!(config.pessimistic_locking_enabled);
        assert!(config.migration_mode_enabled);
        assert_eq!(config.lease_lock_time, Duration::from_secs(5));
        assert_eq!(config.lease_lock_acquisition_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_lease_lock_time_rejected() {
        let config = PersistenceConfig::new().lease_lock_time(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(PersistenceError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_acquisition_timeout_rejected() {
        let config = PersistenceConfig::new().lease_lock_acquisition_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(PersistenceError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_refresh_delays_rejected() {
        let config =
            PersistenceConfig::new().lease_lock_acquisition_minimum_refresh_delay(Duration::ZERO);
        assert!(config.validate().is_err());

        let config =
            PersistenceConfig::new().lease_lock_acquisition_maximum_refresh_delay(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_minimum_delay_above_maximum_rejected() {
        let config = PersistenceConfig::new()
            .lease_lock_acquisition_minimum_refresh_delay(Duration::from_millis(1100));
        assert!(matches!(
            config.validate(),
            Err(PersistenceError::Configuration(_))
        ));
    }

    #[test]
    fn test_maximum_delay_below_minimum_rejected() {
        let config = PersistenceConfig::new()
            .lease_lock_acquisition_maximum_refresh_delay(Duration::from_millis(499));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_equal_delays_accepted() {
        let config = PersistenceConfig::new()
            .lease_lock_acquisition_minimum_refresh_delay(Duration::from_millis(700))
            .lease_lock_acquisition_maximum_refresh_delay(Duration::from_millis(700));
        assert!(config.validate().is_ok());
    }
}
