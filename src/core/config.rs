use crate::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub executor: ExecutorConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub disable_images: bool,
    pub args: Vec<String>,
    pub navigation_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Timing knobs for the action executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Pause between consecutive actions of a sequence
    pub settle_delay_ms: u64,
    /// Interval between condition checks while waiting
    pub poll_interval_ms: u64,
    /// Retry backoff grows linearly: base × attempt number
    pub retry_backoff_ms: u64,
    pub default_wait_timeout_ms: u64,
}

/// Per-URL monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub scan_interval_ms: u64,
    /// Carried for callers; change detection reports every textual difference.
    pub change_threshold: f64,
    pub monitor_selectors: Vec<String>,
    pub ignore_selectors: Vec<String>,
    pub alert_on_change: bool,
    /// Carried for callers; a failed tick is reported, not retried.
    pub max_retries: u32,
    pub timeout_ms: u64,
    /// Capacity of the result stream; the producer waits when it is full
    pub channel_capacity: usize,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.monitoring.validate()?;
        if self.executor.poll_interval_ms == 0 {
            return Err(AgentError::ConfigurationError(
                "executor.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl ExecutorConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(attempt as u64))
    }
}

impl MonitoringConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_ms == 0 {
            return Err(AgentError::ConfigurationError(
                "scan_interval_ms must be positive".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(AgentError::ConfigurationError(
                "timeout_ms must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.change_threshold) {
            return Err(AgentError::ConfigurationError(format!(
                "change_threshold {} is outside [0, 1]",
                self.change_threshold
            )));
        }
        Ok(())
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            disable_images: false,
            args: vec![],
            navigation_timeout_ms: 30000,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 100,
            poll_interval_ms: 500,
            retry_backoff_ms: 1000,
            default_wait_timeout_ms: 10000,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: 30000,
            change_threshold: 0.1,
            monitor_selectors: vec![],
            ignore_selectors: vec![],
            alert_on_change: true,
            max_retries: 3,
            timeout_ms: 30000,
            channel_capacity: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timings() {
        let config = Config::default();
        assert_eq!(config.executor.settle_delay(), Duration::from_millis(100));
        assert_eq!(config.executor.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.executor.backoff_for(2), Duration::from_millis(2000));
        assert_eq!(config.monitoring.scan_interval(), Duration::from_secs(30));
        assert!(config.monitoring.alert_on_change);
        assert!(config.browser.headless);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "monitoring": { "scan_interval_ms": 5000 } }"#).unwrap();
        assert_eq!(config.monitoring.scan_interval_ms, 5000);
        assert_eq!(config.monitoring.max_retries, 3);
        assert_eq!(config.executor.retry_backoff_ms, 1000);
    }

    #[test]
    fn rejects_zero_scan_interval() {
        let monitoring = MonitoringConfig {
            scan_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            monitoring.validate(),
            Err(AgentError::ConfigurationError(_))
        ));
    }

    #[test]
    fn rejects_zero_scan_timeout() {
        let monitoring = MonitoringConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        let err = monitoring.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("pagewatch-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "browser": { "headless": false } }"#).unwrap();
        let config = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(!config.browser.headless);
        assert_eq!(config.browser.viewport.width, 1280);
    }
}
