//! Socket binding for every supported target.
//!
//! # Responsibilities
//! - Resolve a host to all of its interfaces
//! - Create listening sockets with the requested backlog and flags
//! - Bind Unix domain sockets and named pipes
//! - Expose a uniform accept interface to the HTTP layer
//!
//! # Design Decisions
//! - The first resolved address is canonical; its port is reused for the rest
//! - Secondary interfaces that fail to bind are skipped, not fatal
//! - Sockets are built with socket2 so backlog and v6-only are honored

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use crate::error::Error;
use crate::net::address::{AddressRecord, Family};
use crate::net::options::{BindPlan, SocketFlags};
use crate::net::target::BindTarget;

/// A source of inbound connections.
pub trait Accept: Send + 'static {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next client. Cancel-safe.
    fn next_connection(&mut self) -> impl Future<Output = io::Result<Self::Io>> + Send;
}

impl Accept for TcpListener {
    type Io = TcpStream;

    fn next_connection(&mut self) -> impl Future<Output = io::Result<TcpStream>> + Send {
        async move {
            let (stream, peer) = TcpListener::accept(self).await?;
            tracing::trace!(peer_addr = %peer, "Connection accepted");
            Ok(stream)
        }
    }
}

#[cfg(unix)]
impl Accept for tokio::net::UnixListener {
    type Io = tokio::net::UnixStream;

    fn next_connection(&mut self) -> impl Future<Output = io::Result<Self::Io>> + Send {
        async move {
            let (stream, _) = tokio::net::UnixListener::accept(self).await?;
            Ok(stream)
        }
    }
}

/// Named-pipe server that re-arms a fresh instance after each client.
#[cfg(windows)]
pub struct PipeListener {
    name: String,
    next: tokio::net::windows::named_pipe::NamedPipeServer,
}

#[cfg(windows)]
impl PipeListener {
    pub fn bind(name: &str) -> io::Result<Self> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let next = ServerOptions::new().first_pipe_instance(true).create(name)?;
        Ok(Self {
            name: name.to_string(),
            next,
        })
    }
}

#[cfg(windows)]
impl Accept for PipeListener {
    type Io = tokio::net::windows::named_pipe::NamedPipeServer;

    fn next_connection(&mut self) -> impl Future<Output = io::Result<Self::Io>> + Send {
        use tokio::net::windows::named_pipe::ServerOptions;

        async move {
            self.next.connect().await?;
            let fresh = ServerOptions::new().create(&self.name)?;
            Ok(std::mem::replace(&mut self.next, fresh))
        }
    }
}

/// One bound listening primitive.
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
    #[cfg(windows)]
    Pipe(PipeListener),
}

/// Everything produced by a successful bind.
pub struct BoundListeners {
    pub listeners: Vec<Listener>,
    /// One record per listener, canonical entry first.
    pub addresses: Vec<AddressRecord>,
    /// Socket file to unlink on close.
    pub socket_path: Option<PathBuf>,
}

impl BoundListeners {
    /// URL of the canonical (first) binding.
    pub fn url(&self) -> String {
        self.addresses
            .first()
            .map(AddressRecord::url)
            .unwrap_or_default()
    }
}

/// Execute a bind plan.
pub async fn bind(plan: &BindPlan) -> Result<BoundListeners, Error> {
    match &plan.target {
        BindTarget::Tcp { host, port } => bind_host(host, *port, plan).await,
        BindTarget::Unix(path) => bind_path(path, Family::Unix, plan),
        BindTarget::Pipe(name) => bind_pipe(name, plan),
    }
}

/// Resolve `host` to its distinct socket addresses, in resolver order.
pub async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, Error> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let target = BindTarget::Tcp {
        host: host.to_string(),
        port,
    }
    .to_string();

    let resolved = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| Error::Transport {
            target: target.clone(),
            source,
        })?;

    let mut addrs: Vec<SocketAddr> = Vec::new();
    for addr in resolved {
        if !addrs.contains(&addr) {
            addrs.push(addr);
        }
    }

    if addrs.is_empty() {
        return Err(Error::Transport {
            target,
            source: io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses"),
        });
    }
    Ok(addrs)
}

async fn bind_host(host: &str, port: u16, plan: &BindPlan) -> Result<BoundListeners, Error> {
    let addrs = resolve(host, port).await?;
    let Some((first, rest)) = addrs.split_first() else {
        return Err(Error::InvalidArgument(format!("host {} has no addresses", host)));
    };

    let primary = bind_tcp(*first, plan.backlog, plan.flags)
        .map_err(|e| Error::from_bind(first.to_string(), e))?;
    let assigned = primary
        .local_addr()
        .map_err(|e| Error::from_bind(first.to_string(), e))?;

    let mut listeners = vec![Listener::Tcp(primary)];
    let mut addresses = vec![AddressRecord::from_socket_addr(assigned)];

    for addr in rest {
        let mut addr = *addr;
        if port == 0 {
            addr.set_port(assigned.port());
        }
        match bind_tcp(addr, plan.backlog, plan.flags).and_then(|l| Ok((l.local_addr()?, l))) {
            Ok((local, listener)) => {
                listeners.push(Listener::Tcp(listener));
                addresses.push(AddressRecord::from_socket_addr(local));
            }
            Err(e) => {
                tracing::warn!(
                    address = %addr,
                    error = %e,
                    "Skipping secondary address"
                );
            }
        }
    }

    Ok(BoundListeners {
        listeners,
        addresses,
        socket_path: None,
    })
}

/// Create one listening TCP socket.
pub fn bind_tcp(addr: SocketAddr, backlog: u32, flags: SocketFlags) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    // On Windows SO_REUSEADDR allows stealing a bound port.
    #[cfg(not(windows))]
    if !flags.exclusive {
        socket.set_reuse_address(true)?;
    }

    if addr.is_ipv6() {
        socket.set_only_v6(flags.ipv6_only)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog_len(backlog))?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

fn backlog_len(backlog: u32) -> i32 {
    i32::try_from(backlog).unwrap_or(i32::MAX)
}

#[cfg(unix)]
fn bind_path(path: &Path, family: Family, plan: &BindPlan) -> Result<BoundListeners, Error> {
    let target = path.display().to_string();
    let listener = bind_unix(path, plan.backlog).map_err(|e| Error::from_bind(&target, e))?;

    if let Err(e) = apply_permissions(path, plan.flags) {
        let _ = std::fs::remove_file(path);
        return Err(Error::from_bind(target, e));
    }

    Ok(BoundListeners {
        listeners: vec![Listener::Unix(listener)],
        addresses: vec![AddressRecord::from_path(target, family)],
        socket_path: Some(path.to_path_buf()),
    })
}

#[cfg(not(unix))]
fn bind_path(path: &Path, _family: Family, _plan: &BindPlan) -> Result<BoundListeners, Error> {
    Err(Error::Transport {
        target: path.display().to_string(),
        source: io::Error::new(
            io::ErrorKind::Unsupported,
            "unix domain sockets are not supported on this platform",
        ),
    })
}

#[cfg(unix)]
fn bind_pipe(name: &str, plan: &BindPlan) -> Result<BoundListeners, Error> {
    // Outside Windows a pipe name is just a socket path.
    bind_path(Path::new(name), Family::Pipe, plan)
}

#[cfg(windows)]
fn bind_pipe(name: &str, _plan: &BindPlan) -> Result<BoundListeners, Error> {
    let listener = PipeListener::bind(name).map_err(|e| Error::from_bind(name, e))?;
    Ok(BoundListeners {
        listeners: vec![Listener::Pipe(listener)],
        addresses: vec![AddressRecord::from_path(name, Family::Pipe)],
        socket_path: None,
    })
}

#[cfg(unix)]
fn bind_unix(path: &Path, backlog: u32) -> io::Result<tokio::net::UnixListener> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    socket.bind(&socket2::SockAddr::unix(path)?)?;
    socket.listen(backlog_len(backlog))?;
    socket.set_nonblocking(true)?;

    let std_listener: std::os::unix::net::UnixListener = socket.into();
    tokio::net::UnixListener::from_std(std_listener)
}

#[cfg(unix)]
fn apply_permissions(path: &Path, flags: SocketFlags) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut extra = 0;
    if flags.readable_all {
        extra |= 0o444;
    }
    if flags.writable_all {
        extra |= 0o222;
    }
    if extra == 0 {
        return Ok(());
    }

    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode((permissions.mode() & 0o7777) | extra);
    std::fs::set_permissions(path, permissions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::options::ListenOptions;

    #[tokio::test]
    async fn resolve_ip_literal() {
        let addrs = resolve("127.0.0.1", 8080).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:8080".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn resolve_strips_brackets() {
        // Resolution succeeds even if the host has no IPv6 route.
        let addrs = resolve("[::1]", 1).await.unwrap();
        assert_eq!(addrs, vec!["[::1]:1".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn tcp_bind_assigns_ephemeral_port() {
        let plan = ListenOptions::from_port_host(0, "127.0.0.1").normalize().unwrap();
        let bound = bind(&plan).await.unwrap();

        assert_eq!(bound.listeners.len(), 1);
        assert_eq!(bound.addresses.len(), 1);
        let port = bound.addresses[0].port.unwrap();
        assert_ne!(port, 0);
        assert_eq!(bound.url(), format!("http://127.0.0.1:{}", port));
    }

    #[tokio::test]
    async fn second_bind_reports_address_in_use() {
        let plan = ListenOptions::from_port_host(0, "127.0.0.1").normalize().unwrap();
        let first = bind(&plan).await.unwrap();
        let port = first.addresses[0].port.unwrap();

        let plan = ListenOptions::from_port_host(i64::from(port), "127.0.0.1")
            .normalize()
            .unwrap();
        let err = bind(&plan).await.err().unwrap();
        assert!(err.is_address_in_use(), "unexpected error: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_bind_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perm.sock");
        let plan = ListenOptions::from(path.clone())
            .readable_all(true)
            .writable_all(true)
            .normalize()
            .unwrap();

        let bound = bind(&plan).await.unwrap();
        assert_eq!(bound.socket_path.as_deref(), Some(path.as_path()));
        assert_eq!(bound.addresses[0].family, Family::Unix);

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o666, 0o666);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_bind_over_existing_file_is_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken.sock");
        std::fs::write(&path, b"").unwrap();

        let plan = ListenOptions::from(path).normalize().unwrap();
        let err = bind(&plan).await.err().unwrap();
        assert!(err.is_address_in_use(), "unexpected error: {err}");
    }
}
