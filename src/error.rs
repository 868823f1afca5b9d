//! Error taxonomy for the listen lifecycle.
//!
//! Every failure is reported to the caller; nothing is retried and no error
//! moves the listener state.

use std::io;

use thiserror::Error;

/// Boxed error returned by plugins.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    /// A listen argument was rejected before any socket was created.
    #[error("invalid listen argument: {0}")]
    InvalidArgument(String),

    /// The port or socket path is already bound by someone else.
    #[error("address already in use: {address}")]
    AddressInUse {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The instance is already listening or has a bind in flight.
    #[error("server is already listening")]
    AlreadyListening,

    /// Any other OS-level failure while resolving or binding.
    #[error("failed to bind {target}: {source}")]
    Transport {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Registration attempted after the readiness barrier fired.
    #[error("application has already booted, cannot register {0}")]
    AlreadyBooted(String),

    /// A registered plugin failed or panicked.
    #[error("plugin failed: {0}")]
    Plugin(String),
}

impl Error {
    /// Classify an I/O error raised while binding `target`.
    pub(crate) fn from_bind(target: impl Into<String>, source: io::Error) -> Self {
        let target = target.into();
        if source.kind() == io::ErrorKind::AddrInUse {
            Error::AddressInUse {
                address: target,
                source,
            }
        } else {
            Error::Transport { target, source }
        }
    }

    pub fn is_address_in_use(&self) -> bool {
        matches!(self, Error::AddressInUse { .. })
    }

    pub fn is_already_listening(&self) -> bool {
        matches!(self, Error::AlreadyListening)
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}
