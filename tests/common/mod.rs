//! Shared utilities for integration and load testing.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use oneshot_server::lifecycle::{ServerHandle, ShutdownStats};
use oneshot_server::{Handler, Server, ServerConfig};

pub const GET: &[u8] = b"GET / HTTP/1.1\r\n\r\n";

/// Default config bound to an ephemeral loopback port.
pub fn local_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config
}

/// Bind and run a server in the background.
pub async fn start_server<H: Handler>(
    config: ServerConfig,
    handler: H,
) -> (ServerHandle, JoinHandle<ShutdownStats>) {
    let server = Server::bind(&config, handler).await.unwrap();
    let handle = server.handle();
    let running = tokio::spawn(server.run());
    (handle, running)
}

/// Send `request`, then read until the server closes the connection.
///
/// A reset is reported as whatever was read before it.
pub async fn send_request(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    // The server may reset before the write lands.
    let _ = stream.write_all(request).await;
    read_all(stream).await
}

pub async fn read_all(mut stream: TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    buf
}

/// Status code of a raw HTTP/1.1 response, if it has one.
#[allow(dead_code)]
pub fn status_of(response: &[u8]) -> Option<u16> {
    let line = response.split(|b| *b == b'\r').next()?;
    let code = line.split(|b| *b == b' ').nth(1)?;
    std::str::from_utf8(code).ok()?.parse().ok()
}

/// Poll `condition` until it holds or `timeout` passes.
#[allow(dead_code)]
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
