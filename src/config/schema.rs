//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the governor.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Name of the dependency class for generative-model completions.
pub const MODEL_DEPENDENCY: &str = "model";

/// Name of the dependency class for evidence page fetches.
pub const PAGE_FETCH_DEPENDENCY: &str = "page_fetch";

/// Root configuration for the call governor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GovernorConfig {
    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// End-to-end deadline settings.
    pub deadline: DeadlineConfig,

    /// Governed dependencies by name. A file that lists any dependency
    /// replaces the built-in set.
    pub dependencies: BTreeMap<String, DependencyConfig>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        let mut dependencies = BTreeMap::new();
        dependencies.insert(
            MODEL_DEPENDENCY.to_string(),
            DependencyConfig {
                capacity: 2,
                queue_timeout_ms: 5_000,
                request_timeout_ms: 30_000,
                breaker: BreakerConfig::default(),
                retry: RetryConfig {
                    max_attempts: 2,
                    base_delay_ms: 500,
                    ..RetryConfig::default()
                },
            },
        );
        dependencies.insert(
            PAGE_FETCH_DEPENDENCY.to_string(),
            DependencyConfig {
                capacity: 4,
                queue_timeout_ms: 2_000,
                request_timeout_ms: 8_000,
                ..DependencyConfig::default()
            },
        );

        Self {
            observability: ObservabilityConfig::default(),
            deadline: DeadlineConfig::default(),
            dependencies,
        }
    }
}

/// Settings for one governed dependency class.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DependencyConfig {
    /// Maximum concurrent in-flight calls (bulkhead capacity).
    pub capacity: usize,

    /// How long a caller may wait for a bulkhead slot, in milliseconds.
    pub queue_timeout_ms: u64,

    /// Per-attempt timeout in milliseconds, clamped by the deadline budget.
    pub request_timeout_ms: u64,

    /// Circuit breaker settings.
    pub breaker: BreakerConfig,

    /// Retry settings.
    pub retry: RetryConfig,
}

impl DependencyConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            queue_timeout_ms: 1_000,
            request_timeout_ms: 10_000,
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,

    /// Time the breaker stays open before admitting a trial, in milliseconds.
    pub cooldown_ms: u64,

    /// Cooldown growth after a failed trial. 1.0 keeps it fixed.
    pub cooldown_multiplier: f64,

    /// Upper bound for a grown cooldown, in milliseconds.
    pub max_cooldown_ms: u64,
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Cooldown to use after a failed half-open trial.
    pub fn next_cooldown(&self, current: Duration) -> Duration {
        if self.cooldown_multiplier <= 1.0 {
            return current;
        }
        let grown = current.as_millis() as f64 * self.cooldown_multiplier;
        let capped = grown.min(self.max_cooldown_ms.max(self.cooldown_ms) as f64);
        Duration::from_millis(capped.round() as u64)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
            cooldown_multiplier: 1.0,
            max_cooldown_ms: 300_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter as a fraction of the delay, in [0, 1]. 0 disables jitter.
    pub jitter_ratio: f64,
}

impl RetryConfig {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter_ratio: 0.2,
        }
    }
}

/// End-to-end deadline configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DeadlineConfig {
    /// Default budget for one end-to-end request, in milliseconds.
    pub default_budget_ms: u64,
}

impl DeadlineConfig {
    pub fn default_budget(&self) -> Duration {
        Duration::from_millis(self.default_budget_ms)
    }
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            default_budget_ms: 20_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,
    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
