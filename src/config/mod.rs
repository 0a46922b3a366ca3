//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GovernorConfig (validated, immutable)
//!     → DependencyRegistry builds one bulkhead + breaker per dependency
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; limits live for the process lifetime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BreakerConfig, DeadlineConfig, DependencyConfig, GovernorConfig, LogFormat,
    ObservabilityConfig, RetryConfig, MODEL_DEPENDENCY, PAGE_FETCH_DEPENDENCY,
};
pub use validation::{validate_config, ValidationError};
