//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Boot (readiness.rs):
//!     register plugins → pending count → all settled → barrier fires
//!
//! Listen (state.rs):
//!     NotListening → Binding → Listening
//!
//! Close (shutdown.rs):
//!     trigger → stop accepting → drain connections → NotListening
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls close
//! ```
//!
//! # Design Decisions
//! - Routes are frozen when the barrier fires; late registration is an error
//! - A second listen is rejected, never queued
//! - Close is the only release path and is idempotent

pub mod readiness;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use readiness::ReadinessBarrier;
pub use shutdown::{Shutdown, ShutdownSignal};
pub use state::ListenerState;
