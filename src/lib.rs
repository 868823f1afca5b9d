//! HTTP application server with a callback-or-future listen lifecycle.
//!
//! ```no_run
//! use app_listener::{App, ListenOptions};
//! use axum::routing::get;
//!
//! # async fn run() -> Result<(), app_listener::Error> {
//! let app = App::new();
//! app.route("/", get(|| async { "hello" }))?;
//!
//! let url = app.listen(ListenOptions::from_port_host(0, "localhost")).await?;
//! println!("listening at {url}");
//!
//! app.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ServerConfig;
pub use error::{BoxError, Error};
pub use http::App;
pub use net::{AddressRecord, Family, ListenOptions};
