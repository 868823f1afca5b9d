//! HTTP application subsystem.
//!
//! # Data Flow
//! ```text
//! App::route / App::register
//!     → readiness barrier fires → routes frozen
//! App::listen
//!     → net layer binds every target interface
//!     → server.rs (accept loop per listener, hyper-util connection)
//!     → frozen axum Router handles the request
//! ```

pub mod app;
pub mod server;

pub use app::App;
