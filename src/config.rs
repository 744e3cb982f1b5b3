use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    // Per-resource worker pools
    /// Maximum concurrently executing compute monotasks
    pub compute_workers: usize,
    /// Maximum concurrently executing network monotasks
    pub network_workers: usize,
    /// Maximum concurrently executing disk monotasks
    pub disk_workers: usize,

    /// Poll interval of the blocking completion wait. Polling keeps the
    /// completion/failure hot path free of wakeup signalling.
    pub completion_poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let cpu_count = num_cpus::get();

        Self {
            compute_workers: cpu_count,
            network_workers: 8,
            disk_workers: 2,
            completion_poll_interval: Duration::from_millis(10),
        }
    }
}

impl SchedulerConfig {
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.compute_workers == 0 {
            return Err("compute_workers must be greater than 0".to_string());
        }
        if self.network_workers == 0 {
            return Err("network_workers must be greater than 0".to_string());
        }
        if self.disk_workers == 0 {
            return Err("disk_workers must be greater than 0".to_string());
        }
        if self.completion_poll_interval.is_zero() {
            return Err("completion_poll_interval must be non-zero".to_string());
        }
        Ok(())
    }

    /// Small pools and a fast poll, for development and tests
    pub fn development() -> Self {
        Self {
            compute_workers: 2,
            network_workers: 2,
            disk_workers: 1,
            completion_poll_interval: Duration::from_millis(5),
        }
    }
}

/// Builder for SchedulerConfig
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
        }
    }

    pub fn compute_workers(mut self, workers: usize) -> Self {
        self.config.compute_workers = workers;
        self
    }

    pub fn network_workers(mut self, workers: usize) -> Self {
        self.config.network_workers = workers;
        self
    }

    pub fn disk_workers(mut self, workers: usize) -> Self {
        self.config.disk_workers = workers;
        self
    }

    pub fn completion_poll_interval(mut self, interval: Duration) -> Self {
        self.config.completion_poll_interval = interval;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<SchedulerConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_development_config() {
        let config = SchedulerConfig::development();
        assert!(config.validate().is_ok());
        assert_eq!(config.compute_workers, 2);
        assert_eq!(config.disk_workers, 1);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = SchedulerConfig::default();

        config.compute_workers = 0;
        assert!(config.validate().is_err());
        config.compute_workers = 4;

        config.completion_poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = SchedulerConfig::builder()
            .compute_workers(4)
            .network_workers(16)
            .disk_workers(3)
            .completion_poll_interval(Duration::from_millis(2))
            .build()
            .unwrap();

        assert_eq!(config.compute_workers, 4);
        assert_eq!(config.network_workers, 16);
        assert_eq!(config.disk_workers, 3);
        assert_eq!(config.completion_poll_interval, Duration::from_millis(2));
    }
}
