//! app-listener
//!
//! Serves a minimal application (`GET /health`) on whatever target the
//! configuration and command line describe, then closes cleanly on
//! SIGINT/SIGTERM.
//!
//! ```text
//! app-listener --config server.toml
//! app-listener --port 8080 --host ::
//! app-listener --path /run/app.sock
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::routing::get;
use clap::Parser;

use app_listener::config::{load_config, validate_config, ServerConfig};
use app_listener::lifecycle::signals::shutdown_signal;
use app_listener::observability::{init_logging, init_metrics};
use app_listener::App;

#[derive(Parser, Debug)]
#[command(name = "app-listener")]
#[command(about = "Bind an HTTP application to a port, socket or pipe", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP port (0 picks an ephemeral port)
    #[arg(short, long, allow_negative_numbers = true)]
    port: Option<i64>,

    /// Host to bind; every resolved interface is bound
    #[arg(long)]
    host: Option<String>,

    /// Unix socket or named-pipe path instead of a TCP port
    #[arg(long, conflicts_with_all = ["port", "host"])]
    path: Option<String>,

    /// Pending-connection queue length
    #[arg(long)]
    backlog: Option<u32>,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(path) = &self.path {
            config.listen.path = Some(path.clone());
            config.listen.port = None;
            config.listen.host = None;
        }
        if let Some(port) = self.port {
            config.listen.port = Some(port);
            config.listen.path = None;
        }
        if let Some(host) = &self.host {
            config.listen.host = Some(host.clone());
            config.listen.path = None;
        }
        if let Some(backlog) = self.backlog {
            config.listen.backlog = Some(backlog);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    cli.apply(&mut config);
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("invalid configuration: {}", error);
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    init_logging(&config.logging);
    tracing::info!("app-listener v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        init_metrics(addr)?;
    }

    let app = App::with_config(&config);
    app.route("/health", get(|| async { "ok" }))?;

    app.listen(config.listen.clone()).await?;
    for record in app.addresses() {
        let record = serde_json::to_string(&record)?;
        tracing::info!(%record, "Bound interface");
    }

    shutdown_signal().await;
    app.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
