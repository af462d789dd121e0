//! End-to-end behaviour over real sockets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use oneshot_server::config::Framing;
use oneshot_server::lifecycle::Phase;
use oneshot_server::{handler_fn, FixedResponse, Request, Response};

mod common;

#[tokio::test]
async fn test_hello_world_round_trip() {
    let handler = FixedResponse::default();
    let expected = handler.response().clone();
    let (handle, running) = common::start_server(common::local_config(), handler).await;

    let response = common::send_request(handle.local_addr(), common::GET).await;
    assert_eq!(response, expected.as_bytes());
    assert_eq!(
        response,
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 13\r\nConnection: close\r\n\r\nHello, World!"
    );

    handle.shutdown();
    let stats = running.await.unwrap();
    assert_eq!(stats.force_closed, 0);
}

#[tokio::test]
async fn test_configured_response_is_served() {
    let mut config = common::local_config();
    config.response.status = 418;
    config.response.body = "short and stout".into();
    let handler = FixedResponse::from_config(&config.response).unwrap();
    let (handle, running) = common::start_server(config, handler).await;

    let response = common::send_request(handle.local_addr(), common::GET).await;
    assert_eq!(common::status_of(&response), Some(418));
    assert!(response.ends_with(b"short and stout"));

    handle.shutdown();
    running.await.unwrap();
}

#[tokio::test]
async fn test_handler_receives_parsed_request() {
    let handler = handler_fn(|req: Request| async move {
        let body = format!(
            "{} {} from {}",
            req.method().unwrap_or("-"),
            req.path().unwrap_or("-"),
            String::from_utf8_lossy(req.header("x-client").unwrap_or(b"?"))
        );
        Response::text(StatusCode::OK, "text/plain", &body)
    });
    let (handle, running) = common::start_server(common::local_config(), handler).await;

    let response = common::send_request(
        handle.local_addr(),
        b"DELETE /items/7 HTTP/1.1\r\nX-Client: tests\r\n\r\n",
    )
    .await;
    assert!(response.ends_with(b"DELETE /items/7 from tests"));

    handle.shutdown();
    running.await.unwrap();
}

#[tokio::test]
async fn test_end_of_stream_framing_needs_half_close() {
    let mut config = common::local_config();
    config.limits.framing = Framing::EndOfStream;
    let (handle, running) = common::start_server(config, FixedResponse::default()).await;

    let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
    stream.write_all(common::GET).await.unwrap();
    stream.shutdown().await.unwrap();
    let response = common::read_all(stream).await;
    assert_eq!(common::status_of(&response), Some(200));

    handle.shutdown();
    running.await.unwrap();
}

#[tokio::test]
async fn test_peer_closing_without_data_never_reaches_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = {
        let calls = calls.clone();
        handler_fn(move |_req: Request| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Response::text(StatusCode::OK, "text/plain", "ok") }
        })
    };
    let (handle, running) = common::start_server(common::local_config(), handler).await;
    let monitor = handle.monitor().clone();

    for _ in 0..10 {
        let stream = TcpStream::connect(handle.local_addr()).await.unwrap();
        drop(stream);
    }

    assert!(
        common::eventually(Duration::from_secs(2), || monitor.in_flight() == 0).await,
        "slots were not released"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // The server keeps serving afterwards.
    let response = common::send_request(handle.local_addr(), common::GET).await;
    assert!(response.ends_with(b"ok"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(handle.phase(), Phase::Running);

    handle.shutdown();
    running.await.unwrap();
}

#[tokio::test]
async fn test_oversized_request_gets_413() {
    let mut config = common::local_config();
    config.limits.max_request_bytes = 64;
    let (handle, running) = common::start_server(config, FixedResponse::default()).await;

    let response = common::send_request(handle.local_addr(), &[b'x'; 256]).await;
    assert_eq!(common::status_of(&response), Some(413));

    handle.shutdown();
    running.await.unwrap();
}

#[tokio::test]
async fn test_slow_client_gets_408() {
    let mut config = common::local_config();
    config.timeouts.read_ms = 100;
    let (handle, running) = common::start_server(config, FixedResponse::default()).await;

    // No head terminator and no half-close: the request never completes.
    let response = common::send_request(handle.local_addr(), b"GET / HTTP/1.1\r\n").await;
    assert_eq!(common::status_of(&response), Some(408));

    handle.shutdown();
    running.await.unwrap();
}

#[tokio::test]
async fn test_listener_is_released_after_stop() {
    let (handle, running) = common::start_server(common::local_config(), FixedResponse::default()).await;
    let addr = handle.local_addr();

    handle.shutdown();
    let stats = running.await.unwrap();
    assert_eq!(stats.drained, 0);
    assert_eq!(handle.phase(), Phase::Stopped);
    assert!(TcpStream::connect(addr).await.is_err());
}
