//! The application instance and its listen lifecycle.
//!
//! # Responsibilities
//! - Collect routes and plugins until the readiness barrier fires
//! - Normalize listen options and guard against duplicate binds
//! - Bind every resolved interface and spawn their accept loops
//! - Report the bound address(es) and tear everything down on close
//!
//! # Design Decisions
//! - One core async `listen`; `listen_with` adapts it to a completion callback
//! - The state mutex is never held across an await
//! - A failed or cancelled listen leaves the state exactly as it was
//! - A rejected route leaves the route table untouched

use std::collections::BTreeSet;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use axum::routing::MethodRouter;
use axum::Router;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{BoxError, Error};
use crate::http::server;
use crate::lifecycle::readiness::ReadinessBarrier;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::state::{ActiveListener, ListenerState};
use crate::net::connection::ConnectionTracker;
use crate::net::{listener, AddressRecord, BindPlan, ListenOptions};
use crate::observability::metrics::{self, ListenOutcome};

/// Handle to an application instance. Clones share the same instance.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

struct AppInner {
    routes: Mutex<Option<RouteTable>>,
    frozen: OnceLock<Router>,
    barrier: ReadinessBarrier,
    state: Mutex<ListenerState>,
    drain_timeout: Duration,
}

/// Routes collected before boot.
#[derive(Default)]
struct RouteTable {
    router: Router,
    paths: BTreeSet<String>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("booted", &self.is_booted())
            .field("addresses", &self.addresses())
            .finish()
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self::with_config(&ServerConfig::default())
    }

    pub fn with_config(config: &ServerConfig) -> Self {
        Self {
            inner: Arc::new(AppInner {
                routes: Mutex::new(Some(RouteTable::default())),
                frozen: OnceLock::new(),
                barrier: ReadinessBarrier::new(),
                state: Mutex::new(ListenerState::default()),
                drain_timeout: Duration::from_secs(config.shutdown.drain_timeout_secs),
            }),
        }
    }

    /// Mount `handler` at `path`. Fails once the application has booted.
    ///
    /// Each path is mounted once; chain every method for it on one
    /// `MethodRouter`. Paths axum refuses (legacy `:param` captures,
    /// conflicting wildcards) are reported as `InvalidArgument`.
    pub fn route(&self, path: &str, handler: MethodRouter) -> Result<(), Error> {
        if !path.starts_with('/') {
            return Err(Error::InvalidArgument(format!("route path must start with '/': {}", path)));
        }
        let mut routes = lock(&self.inner.routes);
        let Some(table) = routes.as_mut() else {
            return Err(Error::AlreadyBooted(format!("route {}", path)));
        };
        if table.paths.contains(path) {
            return Err(Error::InvalidArgument(format!("route {} is already mounted", path)));
        }

        // axum rejects bad paths by panicking; build on a clone so the
        // table is only replaced once the route is accepted.
        let candidate = table.router.clone();
        let router = panic::catch_unwind(AssertUnwindSafe(|| candidate.route(path, handler)))
            .map_err(|payload| {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "rejected by router".to_string());
                Error::InvalidArgument(format!("route {}: {}", path, reason))
            })?;

        table.router = router;
        table.paths.insert(path.to_string());
        tracing::debug!(path, "Route registered");
        Ok(())
    }

    /// Register an asynchronous plugin.
    ///
    /// The plugin runs on its own task and holds the readiness barrier open
    /// until it returns, so routes it adds are mounted before any bind.
    /// Must be called from within a Tokio runtime.
    pub fn register<F, Fut>(&self, plugin: F) -> Result<(), Error>
    where
        F: FnOnce(App) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let pending = self
            .inner
            .barrier
            .enter()
            .ok_or_else(|| Error::AlreadyBooted("plugin".to_string()))?;

        let app = self.clone();
        tokio::spawn(async move {
            let result = plugin(app).await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "Plugin failed");
            }
            pending.complete(result);
        });
        Ok(())
    }

    /// Wait for every registered plugin, then freeze the routes.
    pub async fn ready(&self) -> Result<(), Error> {
        self.inner.barrier.wait().await?;
        self.freeze();
        Ok(())
    }

    pub fn is_booted(&self) -> bool {
        self.inner.frozen.get().is_some()
    }

    fn freeze(&self) -> &Router {
        self.inner.frozen.get_or_init(|| {
            let table = lock(&self.inner.routes).take().unwrap_or_default();
            tracing::debug!(routes = table.paths.len(), "Routes frozen");
            table.router.layer(TraceLayer::new_for_http())
        })
    }

    /// Bind and start serving. Resolves to the canonical address.
    ///
    /// TCP bindings report `http://host:port` (IPv6 in brackets); socket and
    /// pipe bindings report the path unchanged.
    pub async fn listen(&self, options: impl Into<ListenOptions>) -> Result<String, Error> {
        let options = options.into();
        let plan = options.normalize().inspect_err(|_| {
            metrics::record_listen(ListenOutcome::Rejected);
        })?;

        {
            let mut state = lock(&self.inner.state);
            if state.is_busy() {
                metrics::record_listen(ListenOutcome::Rejected);
                return Err(Error::AlreadyListening);
            }
            *state = ListenerState::Binding;
        }
        // Resets `Binding` if this future is dropped before the bind settles.
        let transition = Transition::new(&self.inner.state);

        match self.bind_and_serve(&plan).await {
            Ok(active) => {
                let url = active.url.clone();
                tracing::info!(
                    address = %url,
                    interfaces = active.addresses.len(),
                    "Server listening at {}",
                    url
                );
                transition.finish(ListenerState::Listening(active));
                metrics::record_listen(ListenOutcome::Bound);
                Ok(url)
            }
            Err(e) => {
                transition.finish(ListenerState::NotListening);
                metrics::record_listen(ListenOutcome::Failed);
                tracing::debug!(bind_target = %plan.target, error = %e, "Listen failed");
                Err(e)
            }
        }
    }

    async fn bind_and_serve(&self, plan: &BindPlan) -> Result<ActiveListener, Error> {
        self.ready().await?;

        let bound = listener::bind(plan).await?;
        let url = bound.url();
        let router = self.freeze().clone();
        let shutdown = Shutdown::new();
        let connections = ConnectionTracker::new();

        let accept_loops = bound
            .listeners
            .into_iter()
            .map(|l| {
                server::spawn_listener(l, router.clone(), shutdown.subscribe(), connections.clone())
            })
            .collect();

        Ok(ActiveListener {
            url,
            addresses: bound.addresses,
            shutdown,
            accept_loops,
            connections,
            socket_path: bound.socket_path,
        })
    }

    /// Callback-style listen: spawns the bind and hands the outcome to `callback`.
    pub fn listen_with<F>(&self, options: impl Into<ListenOptions>, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<String, Error>) + Send + 'static,
    {
        let app = self.clone();
        let options = options.into();
        tokio::spawn(async move {
            let result = app.listen(options).await;
            callback(result);
        })
    }

    /// One record per bound interface; empty unless listening.
    pub fn addresses(&self) -> Vec<AddressRecord> {
        lock(&self.inner.state).addresses()
    }

    pub fn is_listening(&self) -> bool {
        matches!(*lock(&self.inner.state), ListenerState::Listening(_))
    }

    /// Release every bound socket. A no-op unless listening.
    ///
    /// The instance stays busy until the sockets are gone, so a listen
    /// racing this call cannot collide with its own listeners.
    pub async fn close(&self) {
        let Some(active) = lock(&self.inner.state).begin_close() else {
            return;
        };
        let transition = Transition::new(&self.inner.state);

        active.shutdown.trigger();
        tracing::debug!(tasks = active.shutdown.receiver_count(), "Shutdown triggered");
        for result in futures_util::future::join_all(active.accept_loops).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Accept loop ended abnormally");
            }
        }

        let open = active.connections.active_count();
        if open > 0 {
            tracing::debug!(connections = open, "Draining connections");
        }
        if tokio::time::timeout(self.inner.drain_timeout, active.connections.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                connections = active.connections.active_count(),
                timeout_secs = self.inner.drain_timeout.as_secs(),
                "Connections still open after drain timeout"
            );
        }

        if let Some(path) = &active.socket_path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove socket file");
                }
            }
        }

        transition.finish(ListenerState::NotListening);
        tracing::info!(address = %active.url, "Server closed");
    }
}

/// Returns a transitional state to `NotListening` when dropped unfinished.
struct Transition<'a> {
    state: &'a Mutex<ListenerState>,
    armed: bool,
}

impl<'a> Transition<'a> {
    fn new(state: &'a Mutex<ListenerState>) -> Self {
        Self { state, armed: true }
    }

    fn finish(mut self, next: ListenerState) {
        self.armed = false;
        *lock(self.state) = next;
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = lock(self.state);
        if state.is_transitional() {
            *state = ListenerState::NotListening;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[tokio::test]
    async fn routes_are_frozen_after_ready() {
        let app = App::new();
        app.route("/", get(|| async { "hello" })).unwrap();
        assert!(!app.is_booted());

        app.ready().await.unwrap();
        assert!(app.is_booted());

        let err = app.route("/late", get(|| async { "late" })).unwrap_err();
        assert!(matches!(err, Error::AlreadyBooted(_)));
    }

    #[test]
    fn rejected_routes_leave_the_table_intact() {
        let app = App::new();
        app.route("/", get(|| async { "hello" })).unwrap();

        let err = app.route("/", get(|| async { "again" })).unwrap_err();
        assert!(err.is_invalid_argument(), "unexpected error: {err}");

        let err = app.route("/users/:id", get(|| async { "legacy" })).unwrap_err();
        assert!(err.is_invalid_argument(), "unexpected error: {err}");

        let err = app.route("relative", get(|| async { "relative" })).unwrap_err();
        assert!(err.is_invalid_argument(), "unexpected error: {err}");

        app.route("/users/{id}", get(|| async { "user" })).unwrap();
        let routes = lock(&app.inner.routes);
        let table = routes.as_ref().expect("route table taken");
        assert_eq!(table.paths.len(), 2);
    }

    #[tokio::test]
    async fn register_after_ready_fails() {
        let app = App::new();
        app.ready().await.unwrap();
        let err = app.register(|_| async { Ok::<(), BoxError>(()) }).unwrap_err();
        assert!(matches!(err, Error::AlreadyBooted(_)));
    }

    #[tokio::test]
    async fn ready_is_idempotent() {
        let app = App::new();
        app.ready().await.unwrap();
        app.ready().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_port_is_rejected_before_binding() {
        let app = App::new();
        let err = app.listen(ListenOptions::from_port(-1)).await.unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(!app.is_listening());
        // Normalization fails before the barrier is awaited.
        assert!(!app.is_booted());
    }

    #[tokio::test]
    async fn close_without_listen_is_noop() {
        let app = App::new();
        app.close().await;
        app.close().await;
        assert!(app.addresses().is_empty());
    }
}
