//! Listen options and their normalization into a bind plan.
//!
//! # Responsibilities
//! - One named constructor per supported call shape
//! - Deserialize the options object from configuration files
//! - Validate ranges and reduce everything to a single `BindTarget`
//!
//! # Design Decisions
//! - `port` is held as `i64` so out-of-range input is rejected, not unrepresentable
//! - Unrecognized keys are kept and passed through unvalidated
//! - Normalization is pure: nothing is bound until the plan is executed

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::net::target::BindTarget;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_BACKLOG: u32 = 511;

/// Options accepted by `App::listen`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenOptions {
    /// TCP port; 0 or absent asks the OS for an ephemeral port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,

    /// Host to resolve; defaults to `localhost`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Unix socket or named-pipe path. Excludes `port` and `host`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Pending-connection queue length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlog: Option<u32>,

    pub exclusive: bool,

    #[serde(alias = "readableAll")]
    pub readable_all: bool,

    #[serde(alias = "writableAll")]
    pub writable_all: bool,

    #[serde(alias = "ipv6Only")]
    pub ipv6_only: bool,

    /// Keys this crate does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

/// Platform binding flags carried through to socket creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketFlags {
    pub exclusive: bool,
    pub readable_all: bool,
    pub writable_all: bool,
    pub ipv6_only: bool,
}

/// A validated, ready-to-execute bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindPlan {
    pub target: BindTarget,
    pub backlog: u32,
    pub flags: SocketFlags,
}

impl ListenOptions {
    pub fn from_port(port: i64) -> Self {
        Self {
            port: Some(port),
            ..Self::default()
        }
    }

    pub fn from_port_host(port: i64, host: impl Into<String>) -> Self {
        Self {
            port: Some(port),
            host: Some(host.into()),
            ..Self::default()
        }
    }

    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = Some(backlog);
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn readable_all(mut self, readable_all: bool) -> Self {
        self.readable_all = readable_all;
        self
    }

    pub fn writable_all(mut self, writable_all: bool) -> Self {
        self.writable_all = writable_all;
        self
    }

    pub fn ipv6_only(mut self, ipv6_only: bool) -> Self {
        self.ipv6_only = ipv6_only;
        self
    }

    /// Reduce the options to a single bind target.
    pub fn normalize(&self) -> Result<BindPlan, Error> {
        let target = match &self.path {
            Some(_) if self.port.is_some() || self.host.is_some() => {
                return Err(Error::InvalidArgument(
                    "a socket path cannot be combined with a port or host".into(),
                ));
            }
            Some(path) if path.is_empty() => {
                return Err(Error::InvalidArgument("socket path must not be empty".into()));
            }
            Some(path) => BindTarget::from_path(path),
            None => {
                let port = self.port.unwrap_or(0);
                let port = u16::try_from(port).map_err(|_| {
                    Error::InvalidArgument(format!("port must be in 0..=65535, got {}", port))
                })?;
                let host = match self.host.as_deref() {
                    Some("") => {
                        return Err(Error::InvalidArgument("host must not be empty".into()));
                    }
                    Some(host) => host.to_string(),
                    None => DEFAULT_HOST.to_string(),
                };
                BindTarget::Tcp { host, port }
            }
        };

        let backlog = match self.backlog {
            Some(0) => {
                return Err(Error::InvalidArgument("backlog must be positive".into()));
            }
            Some(backlog) => backlog,
            None => DEFAULT_BACKLOG,
        };

        if !self.extra.is_empty() {
            tracing::debug!(
                keys = ?self.extra.keys().collect::<Vec<_>>(),
                "Passing through unrecognized listen options"
            );
        }

        Ok(BindPlan {
            target,
            backlog,
            flags: SocketFlags {
                exclusive: self.exclusive,
                readable_all: self.readable_all,
                writable_all: self.writable_all,
                ipv6_only: self.ipv6_only,
            },
        })
    }
}

impl From<u16> for ListenOptions {
    fn from(port: u16) -> Self {
        Self::from_port(i64::from(port))
    }
}

impl From<(u16, &str)> for ListenOptions {
    fn from((port, host): (u16, &str)) -> Self {
        Self::from_port_host(i64::from(port), host)
    }
}

impl From<PathBuf> for ListenOptions {
    fn from(path: PathBuf) -> Self {
        Self::from_path(path.to_string_lossy().into_owned())
    }
}

impl From<&std::path::Path> for ListenOptions {
    fn from(path: &std::path::Path) -> Self {
        Self::from_path(path.to_string_lossy().into_owned())
    }
}

/// A bare string is a port when it is an integer, otherwise a socket or pipe path.
impl FromStr for ListenOptions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }
        match s.parse::<i64>() {
            Ok(port) => Ok(Self::from_port(port)),
            Err(_) => Ok(Self::from_path(s)),
        }
    }
}
