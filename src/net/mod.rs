//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenOptions (any call shape)
//!     → options.rs (normalize → BindPlan)
//!     → target.rs (TCP host/port | Unix path | named pipe)
//!     → listener.rs (resolve, bind every interface)
//!     → address.rs (AddressRecord per bound interface)
//!     → connection.rs (tracking while serving)
//! ```
//!
//! # Design Decisions
//! - Exactly one bind target per listen call
//! - Arguments are validated before any socket is created
//! - A hostname binds every interface it resolves to

pub mod address;
pub mod connection;
pub mod listener;
pub mod options;
pub mod target;

pub use address::{AddressRecord, Family};
pub use listener::{BoundListeners, Listener};
pub use options::{BindPlan, ListenOptions, SocketFlags};
pub use target::BindTarget;
