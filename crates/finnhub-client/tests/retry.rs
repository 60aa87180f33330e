//! Retry-sequence behavior against a scripted raw HTTP fixture (mockito
//! cannot serve different responses to successive identical requests).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use finnhub_client::FinnhubClient;
use market_core::MarketDataError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serves `responses` in order, one per connection; the last one repeats.
/// Returns the base URL and a hit counter.
async fn serve_sequence(responses: Vec<(u16, String)>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let idx = counter.fetch_add(1, Ordering::SeqCst);
            let (status, body) = responses
                .get(idx)
                .or_else(|| responses.last())
                .cloned()
                .unwrap();

            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}", addr), hits)
}

#[tokio::test]
async fn two_server_errors_then_success_returns_payload() {
    let (base_url, hits) = serve_sequence(vec![
        (500, "{}".to_string()),
        (502, "{}".to_string()),
        (200, r#"{"c":101.5,"d":0.5,"dp":0.49}"#.to_string()),
    ])
    .await;

    let client = FinnhubClient::new("test-token").with_base_url(base_url);
    let started = Instant::now();
    let quote = client.quote("AAPL").await.unwrap();

    assert_eq!(quote.current, Some(101.5));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    // Backoff before attempts 2 and 3: 1s + 2s.
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test]
async fn persistent_server_error_exhausts_three_attempts() {
    let (base_url, hits) = serve_sequence(vec![(503, "{}".to_string())]).await;

    let client = FinnhubClient::new("test-token").with_base_url(base_url);
    let err = client.quote("AAPL").await.unwrap_err();

    assert!(matches!(err, MarketDataError::HttpStatus(503)));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn connection_refused_surfaces_as_unreachable() {
    // Bind to grab a free port, then drop the listener before the client
    // connects.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = FinnhubClient::new("test-token").with_base_url(format!("http://{}", addr));
    let err = client.quote("AAPL").await.unwrap_err();

    assert!(matches!(err, MarketDataError::Unreachable));
}
