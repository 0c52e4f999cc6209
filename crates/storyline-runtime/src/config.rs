//! Runtime configuration
//!
//! Durations are stored in milliseconds so config files stay plain:
//!
//! ```toml
//! launch_timeout_ms = 30000
//! shell_request_timeout_ms = 1000
//! module_teardown_timeout_ms = 1000
//! shell_teardown_timeout_ms = 1000
//! detach_view_timeout_ms = 1000
//! module_services = ["intelligence", "clipboard"]
//!
//! [storage]
//! write_timeout_ms = 30000
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use storyline_storage::StorageConfig;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML text could not be parsed into a config
    #[error("invalid TOML config: {0}")]
    InvalidToml(#[from] toml::de::Error),
}

/// Story runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Bound on one module launch
    pub launch_timeout_ms: u64,
    /// Bound on one shell request (start, add surface, focus)
    pub shell_request_timeout_ms: u64,
    /// Bound on terminating (and defocusing) one module
    pub module_teardown_timeout_ms: u64,
    /// Bound on shell teardown
    pub shell_teardown_timeout_ms: u64,
    /// Bound on the host detaching the story view
    pub detach_view_timeout_ms: u64,
    /// Service names offered to every launched module
    pub module_services: Vec<String>,
    /// Storage settings
    pub storage: StorageConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            launch_timeout_ms: 30_000,
            shell_request_timeout_ms: 1_000,
            module_teardown_timeout_ms: 1_000,
            shell_teardown_timeout_ms: 1_000,
            detach_view_timeout_ms: 1_000,
            module_services: Vec::new(),
            storage: StorageConfig::default(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl RuntimeConfig {
    /// Parse from TOML; missing fields take defaults
    ///
    /// # Errors
    /// `ConfigError::InvalidToml` if the text is not a valid config.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// With launch bound
    #[inline]
    #[must_use]
    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout_ms = millis(timeout);
        self
    }

    /// With shell request bound
    #[inline]
    #[must_use]
    pub fn with_shell_request_timeout(mut self, timeout: Duration) -> Self {
        self.shell_request_timeout_ms = millis(timeout);
        self
    }

    /// With module teardown bound
    #[inline]
    #[must_use]
    pub fn with_module_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.module_teardown_timeout_ms = millis(timeout);
        self
    }

    /// With shell teardown bound
    #[inline]
    #[must_use]
    pub fn with_shell_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.shell_teardown_timeout_ms = millis(timeout);
        self
    }

    /// With view detach bound
    #[inline]
    #[must_use]
    pub fn with_detach_view_timeout(mut self, timeout: Duration) -> Self {
        self.detach_view_timeout_ms = millis(timeout);
        self
    }

    /// With an extra module service
    #[inline]
    #[must_use]
    pub fn with_module_service(mut self, service: impl Into<String>) -> Self {
        self.module_services.push(service.into());
        self
    }

    /// With storage settings
    #[inline]
    #[must_use]
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Launch bound
    #[inline]
    #[must_use]
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    /// Shell request bound
    #[inline]
    #[must_use]
    pub fn shell_request_timeout(&self) -> Duration {
        Duration::from_millis(self.shell_request_timeout_ms)
    }

    /// Module teardown bound
    #[inline]
    #[must_use]
    pub fn module_teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.module_teardown_timeout_ms)
    }

    /// Shell teardown bound
    #[inline]
    #[must_use]
    pub fn shell_teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.shell_teardown_timeout_ms)
    }

    /// View detach bound
    #[inline]
    #[must_use]
    pub fn detach_view_timeout(&self) -> Duration {
        Duration::from_millis(self.detach_view_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_partial_toml() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            module_teardown_timeout_ms = 250
            module_services = ["clipboard"]

            [storage]
            write_timeout_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.module_teardown_timeout(), Duration::from_millis(250));
        assert_eq!(config.shell_teardown_timeout(), Duration::from_secs(1));
        assert_eq!(config.launch_timeout(), Duration::from_secs(30));
        assert_eq!(config.module_services, vec!["clipboard".to_string()]);
        assert_eq!(config.storage.write_timeout(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(RuntimeConfig::from_toml_str("").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(RuntimeConfig::from_toml_str("module_teardown_timeout_ms = \"soon\"").is_err());
    }

    #[test]
    fn builders_round_trip_through_toml() {
        let config = RuntimeConfig::default()
            .with_detach_view_timeout(Duration::from_millis(40))
            .with_launch_timeout(Duration::from_millis(750))
            .with_module_service("intelligence");
        let text = toml::to_string(&config).unwrap();
        assert_eq!(RuntimeConfig::from_toml_str(&text).unwrap(), config);
    }
}
