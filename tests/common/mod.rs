//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use call_governor::config::{BreakerConfig, DependencyConfig, RetryConfig};

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` decides the status and body of every response.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        // Requests are small GETs; one read holds the head
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// A client that never reuses connections or consults proxy settings.
#[allow(dead_code)]
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Dependency limits small enough to exercise in a test.
#[allow(dead_code)]
pub fn small_dependency(capacity: usize) -> DependencyConfig {
    DependencyConfig {
        capacity,
        queue_timeout_ms: 500,
        request_timeout_ms: 1_000,
        breaker: BreakerConfig {
            failure_threshold: 2,
            cooldown_ms: 60_000,
            ..BreakerConfig::default()
        },
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 20,
            max_delay_ms: 100,
            jitter_ratio: 0.0,
        },
    }
}
