// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Endpoint HTTP Server
//!
//! A deliberately small HTTP server exposing `/metrics` in Prometheus
//! exposition format and `/health` for load balancers. One task accepts,
//! one task per connection answers, and the whole thing dies with the
//! cancellation token.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use adaptive_runner_bootstrap::shutdown::CancellationToken;
use adaptive_runner_domain::error::RunnerError;

use super::service::MetricsService;

/// Minimal HTTP server for metrics scraping and health checks
pub struct MetricsEndpoint {
    metrics: MetricsService,
    port: u16,
}

impl MetricsEndpoint {
    /// Creates an endpoint serving the given metrics on `port`
    pub fn new(metrics: MetricsService, port: u16) -> Self {
        Self { metrics, port }
    }

    /// Binds and serves until the token cancels
    pub async fn run(self, token: CancellationToken) -> Result<(), RunnerError> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            RunnerError::metrics_error(format!("could not bind metrics endpoint {}: {}", addr, e))
        })?;
        info!(addr = %addr, "metrics endpoint listening");

        let metrics = Arc::new(self.metrics);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("stopping metrics endpoint");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _peer)) => {
                            let metrics = Arc::clone(&metrics);
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, &metrics).await {
                                    debug!(error = %e, "metrics connection failed");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "metrics accept failed");
                        }
                    }
                }
            }
        }
    }
}

async fn serve_connection(
    mut stream: tokio::net::TcpStream,
    metrics: &MetricsService,
) -> Result<(), std::io::Error> {
    let mut buffer = [0u8; 1024];
    let read = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..read]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let response = match path {
        "/metrics" => match metrics.render() {
            Ok(body) => http_response(
                "200 OK",
                "text/plain; version=0.0.4; charset=utf-8",
                &body,
            ),
            Err(e) => http_response("500 Internal Server Error", "text/plain", &e.to_string()),
        },
        "/health" => http_response("200 OK", "text/plain", "OK"),
        _ => http_response("404 Not Found", "text/plain", "not found"),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt as _;

    async fn request(port: u16, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        stream
            .write_all(format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path).as_bytes())
            .await
            .unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn test_endpoint_serves_metrics_and_health() {
        let metrics = MetricsService::new().unwrap();
        metrics.inc_queue_ignored("node", "rabbitMQ", "rmq_q");

        // Port 0 is not knowable from outside; pick an ephemeral port by
        // binding first and reusing it for the endpoint.
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let token = CancellationToken::new();
        let endpoint = MetricsEndpoint::new(metrics, port);
        let handle = tokio::spawn(endpoint.run(token.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let health = request(port, "/health").await;
        assert!(health.contains("200 OK"));
        assert!(health.ends_with("OK"));

        let body = request(port, "/metrics").await;
        assert!(body.contains("queue_ignored"));

        let missing = request(port, "/nope").await;
        assert!(missing.contains("404"));

        token.cancel();
        handle.await.unwrap().unwrap();
    }
}
