//! Configuration for the group-authorization core.
//!
//! All values deserialize with serde, carry schema metadata for config
//! tooling, and validate after deserialization. Defaults match the
//! platform's deployment constants: a 250 ms bounded lock acquire, five
//! optimistic cache write attempts, and a four-attempt dependency-recovery
//! budget.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Configuration validation error.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A value is outside its valid range.
    #[snafu(display("invalid configuration: {message}"))]
    Validation {
        /// What was rejected and why.
        message: String,
    },
}

/// Minimum bounded lock-acquire timeout in milliseconds.
const MIN_LOCK_TIMEOUT_MS: u64 = 1;

/// Default bounded lock-acquire timeout (250 ms).
const fn default_lock_timeout_ms() -> u64 {
    250
}

/// Default optimistic write attempts before giving up.
const fn default_optimistic_attempts() -> u32 {
    5
}

/// Default dependency-recovery attempt budget.
const fn default_recovery_attempts() -> u32 {
    4
}

/// Default cache timer logging (off).
const fn default_log_timers() -> bool {
    false
}

/// Which ID-allocation backend to construct.
///
/// One trait, three implementations, selected here at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorBackend {
    /// In-process counter. Test and single-process deployments only.
    Memory,
    /// Counter and valid flag persisted in the coordination store.
    Coordination,
    /// Counter persisted in the shared cache store, lock and valid flag in
    /// the coordination store.
    Cache,
}

/// ID allocator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AllocatorConfig {
    /// Backend selection.
    pub backend: AllocatorBackend,
    /// Bounded lock-acquire timeout in milliseconds.
    ///
    /// Lock acquisition never blocks indefinitely; exceeding this budget
    /// surfaces as a lock-timeout error the caller must retry or abort.
    /// Must be >= 1. Default: 250.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            backend: AllocatorBackend::Coordination,
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

#[bon::bon]
impl AllocatorConfig {
    /// Creates a validated allocator configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `lock_timeout_ms` < 1.
    #[builder]
    pub fn new(
        backend: AllocatorBackend,
        #[builder(default = default_lock_timeout_ms())] lock_timeout_ms: u64,
    ) -> Result<Self, ConfigError> {
        let config = Self { backend, lock_timeout_ms };
        config.validate()?;
        Ok(config)
    }
}

impl AllocatorConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_timeout_ms < MIN_LOCK_TIMEOUT_MS {
            return Err(ConfigError::Validation {
                message: format!(
                    "lock_timeout_ms must be >= {}, got {}",
                    MIN_LOCK_TIMEOUT_MS, self.lock_timeout_ms
                ),
            });
        }
        Ok(())
    }
}

/// Authorization cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CacheConfig {
    /// Optimistic write attempts per forced update.
    ///
    /// Each aborted conditional commit re-runs the query before retrying.
    /// Exhaustion is logged and the last computed value returned.
    /// Must be >= 1. Default: 5.
    #[serde(default = "default_optimistic_attempts")]
    pub optimistic_attempts: u32,
    /// Log per-operation cache timings at debug level.
    #[serde(default = "default_log_timers")]
    pub log_timers: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            optimistic_attempts: default_optimistic_attempts(),
            log_timers: default_log_timers(),
        }
    }
}

#[bon::bon]
impl CacheConfig {
    /// Creates a validated cache configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `optimistic_attempts` < 1.
    #[builder]
    pub fn new(
        #[builder(default = default_optimistic_attempts())] optimistic_attempts: u32,
        #[builder(default = default_log_timers())] log_timers: bool,
    ) -> Result<Self, ConfigError> {
        let config = Self { optimistic_attempts, log_timers };
        config.validate()?;
        Ok(config)
    }
}

impl CacheConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.optimistic_attempts < 1 {
            return Err(ConfigError::Validation {
                message: format!(
                    "optimistic_attempts must be >= 1, got {}",
                    self.optimistic_attempts
                ),
            });
        }
        Ok(())
    }
}

/// Dependency-recovery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecoveryConfig {
    /// Total attempt budget, counting the recovery round trips.
    ///
    /// Must be >= 1. Default: 4.
    #[serde(default = "default_recovery_attempts")]
    pub max_attempts: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { max_attempts: default_recovery_attempts() }
    }
}

impl RecoveryConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `max_attempts` < 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::Validation {
                message: format!("max_attempts must be >= 1, got {}", self.max_attempts),
            });
        }
        Ok(())
    }
}

/// Top-level configuration for the authorization core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CohortConfig {
    /// ID allocator settings.
    #[serde(default)]
    pub allocator: AllocatorConfig,
    /// Authorization cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Dependency-recovery settings.
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

impl CohortConfig {
    /// Validates all sections.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for the first out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.allocator.validate()?;
        self.cache.validate()?;
        self.recovery.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        CohortConfig::default().validate().expect("defaults should be valid");
    }

    #[test]
    fn default_lock_timeout_is_250ms() {
        assert_eq!(AllocatorConfig::default().lock_timeout_ms, 250);
    }

    #[test]
    fn zero_lock_timeout_is_rejected() {
        let config =
            AllocatorConfig { backend: AllocatorBackend::Memory, lock_timeout_ms: 0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_applies_defaults() {
        let config = AllocatorConfig::builder()
            .backend(AllocatorBackend::Cache)
            .build()
            .expect("should build");
        assert_eq!(config.lock_timeout_ms, 250);
    }

    #[test]
    fn zero_optimistic_attempts_is_rejected() {
        let config = CacheConfig { optimistic_attempts: 0, log_timers: false };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: CohortConfig =
            serde_json::from_str(r#"{"allocator":{"backend":"memory"}}"#)
                .expect("should deserialize");
        assert_eq!(config.allocator.backend, AllocatorBackend::Memory);
        assert_eq!(config.cache.optimistic_attempts, 5);
        assert_eq!(config.recovery.max_attempts, 4);
    }
}
