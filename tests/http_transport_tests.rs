mod common;

use std::time::Duration;

use playpulse::delivery::{DeliveryError, Transport, WireSession};
use playpulse::services::collector::HttpTransport;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serves one request with a canned status and returns the raw request.
async fn one_shot_server(status: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/api/game-result", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\n\
             content-type: application/json\r\n\
             content-length: 2\r\n\
             connection: close\r\n\r\n{{}}"
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });

    (url, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&raw);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let body_len = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if raw.len() >= head_end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}

fn wire() -> WireSession {
    WireSession::from(&common::session_with_scene("Ayla", "MathGame", 3))
}

#[tokio::test]
async fn test_delivers_json_post() {
    let (url, server) = one_shot_server("200 OK").await;
    let transport = HttpTransport::new(url, Duration::from_secs(5));

    transport.deliver(&wire()).await.unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/game-result"));
    assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
    assert!(request.contains("\"playerName\":\"Ayla\""));
    assert!(request.contains("\"sceneName\":\"MathGame\""));
}

#[tokio::test]
async fn test_non_success_status_is_rejection() {
    let (url, server) = one_shot_server("503 Service Unavailable").await;
    let transport = HttpTransport::new(url, Duration::from_secs(5));

    let err = transport.deliver(&wire()).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Rejected { status: 503 }));
    assert!(err.is_rejection());
    server.await.unwrap();
}

#[tokio::test]
async fn test_probe_accepts_client_errors() {
    let (url, server) = one_shot_server("405 Method Not Allowed").await;
    let transport = HttpTransport::new(url, Duration::from_secs(5));

    transport.probe().await.unwrap();
    assert!(server.await.unwrap().starts_with("GET /api/game-result"));
}

#[tokio::test]
async fn test_probe_fails_on_server_error() {
    let (url, server) = one_shot_server("500 Internal Server Error").await;
    let transport = HttpTransport::new(url, Duration::from_secs(5));

    assert!(transport.probe().await.is_err());
    server.await.unwrap();
}

#[tokio::test]
async fn test_closed_port_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/api/game-result", listener.local_addr().unwrap());
    drop(listener);

    let transport = HttpTransport::new(url, Duration::from_secs(2));
    let err = transport.deliver(&wire()).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Unreachable(_)));
    assert!(!err.hints().is_empty());
}
