//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → root signal cancelled → in-flight calls abort
//!               → registry bulkheads closed → queued callers rejected
//!
//! Signals (signals.rs):
//!     SIGINT (Ctrl+C) → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - One root signal per process; every request signal is combined with it
//! - Shutdown is idempotent
//! - Held bulkhead permits stay valid so running calls finish their cleanup

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::listen_for_ctrl_c;
