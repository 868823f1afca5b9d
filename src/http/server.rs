//! Connection serving for bound listeners.
//!
//! # Responsibilities
//! - Run one accept loop per bound listener
//! - Serve HTTP/1.1 and HTTP/2 on each connection via hyper-util
//! - Dispatch requests to the frozen application router
//! - Stop accepting and gracefully finish connections on shutdown

use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::ShutdownSignal;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::{Accept, Listener};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Spawn the accept loop for `listener`.
pub fn spawn_listener(
    listener: Listener,
    router: Router,
    shutdown: ShutdownSignal,
    connections: ConnectionTracker,
) -> JoinHandle<()> {
    match listener {
        Listener::Tcp(inner) => spawn_accept_loop(inner, router, shutdown, connections),
        #[cfg(unix)]
        Listener::Unix(inner) => spawn_accept_loop(inner, router, shutdown, connections),
        #[cfg(windows)]
        Listener::Pipe(inner) => spawn_accept_loop(inner, router, shutdown, connections),
    }
}

fn spawn_accept_loop<L: Accept>(
    mut listener: L,
    router: Router,
    mut shutdown: ShutdownSignal,
    connections: ConnectionTracker,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.next_connection() => match accepted {
                    Ok(io) => {
                        let guard = connections.track();
                        tracing::debug!(connection_id = %guard.id(), "Connection opened");
                        tokio::spawn(serve_connection(io, router.clone(), shutdown.clone(), guard));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        // Avoid spinning when out of file descriptors.
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }
        tracing::debug!("Accept loop stopped");
        // `listener` drops here, releasing the socket.
    })
}

async fn serve_connection<I>(
    io: I,
    router: Router,
    mut shutdown: ShutdownSignal,
    guard: ConnectionGuard,
) where
    I: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let builder = auto::Builder::new(TokioExecutor::new());
    let service = TowerToHyperService::new(router);
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(connection_id = %guard.id(), error = %e, "Connection error");
    }
    drop(guard);
}
