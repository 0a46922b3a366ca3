//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacity >= 1, timeouts > 0, jitter in [0, 1])
//! - Check that addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GovernorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::{DependencyConfig, GovernorConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &GovernorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("invalid filter '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.deadline.default_budget_ms == 0 {
        errors.push(ValidationError::new("deadline.default_budget_ms", "must be > 0"));
    }

    for (name, dependency) in &config.dependencies {
        validate_dependency(name, dependency, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_dependency(name: &str, dep: &DependencyConfig, errors: &mut Vec<ValidationError>) {
    let field = |suffix: &str| format!("dependencies.{name}.{suffix}");

    if name.trim().is_empty() {
        errors.push(ValidationError::new("dependencies", "dependency name must not be empty"));
    }
    if dep.capacity == 0 {
        errors.push(ValidationError::new(field("capacity"), "must be >= 1"));
    }
    if dep.request_timeout_ms == 0 {
        errors.push(ValidationError::new(field("request_timeout_ms"), "must be > 0"));
    }

    let breaker = &dep.breaker;
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(field("breaker.failure_threshold"), "must be >= 1"));
    }
    if breaker.cooldown_ms == 0 {
        errors.push(ValidationError::new(field("breaker.cooldown_ms"), "must be > 0"));
    }
    if !(breaker.cooldown_multiplier >= 1.0 && breaker.cooldown_multiplier.is_finite()) {
        errors.push(ValidationError::new(
            field("breaker.cooldown_multiplier"),
            "must be a finite number >= 1.0",
        ));
    }
    if breaker.max_cooldown_ms < breaker.cooldown_ms {
        errors.push(ValidationError::new(
            field("breaker.max_cooldown_ms"),
            "must be >= cooldown_ms",
        ));
    }

    let retry = &dep.retry;
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new(field("retry.max_attempts"), "must be >= 1"));
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        errors.push(ValidationError::new(
            field("retry.base_delay_ms"),
            "must be <= max_delay_ms",
        ));
    }
    if !(0.0..=1.0).contains(&retry.jitter_ratio) {
        errors.push(ValidationError::new(
            field("retry.jitter_ratio"),
            "must be within [0, 1]",
        ));
    }
}
