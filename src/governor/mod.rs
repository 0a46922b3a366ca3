//! Governed calls to named dependencies.
//!
//! # Data Flow
//! ```text
//! Caller (request id, deadline budget, signal)
//!     → registry.rs (look up the dependency by name)
//!     → dependency.rs:
//!         - breaker peek (fail fast without queueing)
//!         - bulkhead slot (wait clamped to the budget)
//!         - breaker admission (may claim the half-open trial)
//!         - retry loop, each attempt under its own timeout
//!         - terminal outcome recorded on the breaker, slot released
//!     → Result or typed rejection back to the caller
//! ```
//!
//! # Design Decisions
//! - One bulkhead and one breaker per dependency, shared by every caller
//! - The breaker sees one outcome per governed call, not one per attempt
//! - Admission rejections are returned, never logged as errors

pub mod dependency;
pub mod registry;

pub use dependency::{CallOptions, Dependency, DependencySnapshot};
pub use registry::DependencyRegistry;
