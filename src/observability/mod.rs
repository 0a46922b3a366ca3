//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Resilience primitives and the governor produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (dependency, attempt, delay) on every event
//! - Request ID flows through the governed call span
//! - Metrics are cheap no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
