//! Address records reported by a listening application.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// URL scheme used for network bindings.
pub const SCHEME: &str = "http";

/// Address family of a bound interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    IPv4,
    IPv6,
    Unix,
    Pipe,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Family::IPv4 => "IPv4",
            Family::IPv6 => "IPv6",
            Family::Unix => "Unix",
            Family::Pipe => "Pipe",
        };
        f.write_str(name)
    }
}

/// One bound interface.
///
/// For socket and pipe bindings `address` holds the path and `port` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub family: Family,
}

impl AddressRecord {
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self {
            address: addr.ip().to_string(),
            port: Some(addr.port()),
            family: if addr.is_ipv4() { Family::IPv4 } else { Family::IPv6 },
        }
    }

    pub fn from_path(path: impl Into<String>, family: Family) -> Self {
        Self {
            address: path.into(),
            port: None,
            family,
        }
    }

    /// The fully-qualified address callers get back from `listen`.
    pub fn url(&self) -> String {
        match (self.family, self.port) {
            (Family::IPv6, Some(port)) => format!("{}://[{}]:{}", SCHEME, self.address, port),
            (_, Some(port)) => format!("{}://{}:{}", SCHEME, self.address, port),
            (_, None) => self.address.clone(),
        }
    }
}

impl fmt::Display for AddressRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}
