//! Call governance for outbound dependencies.
//!
//! Bounds concurrency (bulkhead), fails fast on unhealthy dependencies
//! (circuit breaker), retries transient failures with jittered backoff, and
//! enforces per-attempt timeouts clamped to a shared deadline budget, all
//! while honouring caller cancellation.

pub mod config;
pub mod error;
pub mod fetch;
pub mod governor;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::GovernorConfig;
pub use error::{GovernorError, GovernorResult, HttpError, TimeoutError};
pub use fetch::PageFetcher;
pub use governor::{CallOptions, Dependency, DependencyRegistry};
pub use lifecycle::Shutdown;
pub use resilience::{DeadlineBudget, Signal};
