//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use app_listener::App;
use axum::routing::get;

pub const HELLO: &str = "hello localhost";

/// An application answering `GET /` with a fixed body.
pub fn hello_app() -> App {
    let app = App::new();
    app.route("/", get(|| async { HELLO })).unwrap();
    app
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// GET `url` and return status and body.
pub async fn get_text(url: &str) -> (u16, String) {
    let res = client().get(url).send().await.expect("server unreachable");
    let status = res.status().as_u16();
    (status, res.text().await.unwrap())
}

/// Every address `localhost` resolves to.
pub async fn localhost_addrs() -> Vec<SocketAddr> {
    let mut addrs: Vec<SocketAddr> = Vec::new();
    for addr in tokio::net::lookup_host(("localhost", 0)).await.unwrap() {
        if !addrs.contains(&addr) {
            addrs.push(addr);
        }
    }
    addrs
}

/// Whether this host lets a socket bind `ip` at all.
pub fn can_bind(ip: IpAddr) -> bool {
    std::net::TcpListener::bind((ip, 0)).is_ok()
}

pub fn ipv6_loopback_available() -> bool {
    can_bind(IpAddr::V6(Ipv6Addr::LOCALHOST))
}

/// Port of the canonical binding.
pub fn port_of(app: &App) -> u16 {
    app.addresses()[0].port.expect("not a tcp binding")
}

/// Raw HTTP/1.1 GET over a Unix domain socket.
#[cfg(unix)]
pub async fn unix_get(path: &std::path::Path, uri: &str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::UnixStream::connect(path).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        uri
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

/// In-memory log sink for asserting on emitted events.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route INFO-and-above events on the current thread into memory.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}
