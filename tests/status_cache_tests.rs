/// Integration tests for the REST client and status cache against an
/// in-process HTTP server.
#[path = "../src/models.rs"]
mod models;

#[path = "../src/error.rs"]
mod error;

#[path = "../src/credentials.rs"]
mod credentials;

#[path = "../src/api.rs"]
mod api;

#[path = "../src/status.rs"]
mod status;

use api::BotApiClient;
use credentials::CredentialProvider;
use error::ApiError;
use status::StatusCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const STATUS_JSON: &str = r#"{"running":true,"balance":512.5,"holdings":0.01,
    "lastPrice":42000.0,"totalValue":932.5,"marketCycle":"MARKUP",
    "strategyName":"sma-crossover"}"#;

fn http_response(status_line: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Serve one scripted response per accepted connection; the last response
/// repeats once the script runs out. Returns the base URL.
async fn spawn_scripted_server(responses: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut served = 0usize;
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let resp = responses[served.min(responses.len() - 1)].clone();
            served += 1;
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

fn client(base_url: &str, token: Option<&str>) -> Arc<BotApiClient> {
    let creds = Arc::new(CredentialProvider::new(token.map(str::to_string)));
    Arc::new(BotApiClient::new(base_url, Duration::from_secs(5), creds).unwrap())
}

// ---------------------------------------------------------------------------
// REST client
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_status_decodes_snapshot() {
    let base = spawn_scripted_server(vec![http_response("200 OK", STATUS_JSON)]).await;
    let status = client(&base, None).fetch_status().await.unwrap();
    assert!(status.running);
    assert_eq!(status.balance, 512.5);
    assert_eq!(status.market_cycle, models::MarketCycle::Markup);
}

#[tokio::test]
async fn unauthorized_maps_to_auth_error() {
    let base = spawn_scripted_server(vec![http_response("401 Unauthorized", "{}")]).await;
    let err = client(&base, Some("stale-token"))
        .fetch_status()
        .await
        .unwrap_err();
    assert!(err.is_auth(), "expected auth error, got: {err}");
}

#[tokio::test]
async fn malformed_body_maps_to_decode_error() {
    let base = spawn_scripted_server(vec![http_response("200 OK", "{not json")]).await;
    let err = client(&base, None).fetch_status().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)), "got: {err}");
}

#[tokio::test]
async fn server_error_maps_to_transport_error() {
    let base =
        spawn_scripted_server(vec![http_response("500 Internal Server Error", "")]).await;
    let err = client(&base, None).fetch_status().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)), "got: {err}");
}

#[tokio::test]
async fn trade_history_decodes_list() {
    let body = r#"[
        {"id":1,"timestamp":"2025-01-15T10:00:00","type":"BUY","price":100.0,"quantity":1.0},
        {"id":2,"timestamp":"2025-01-15T10:01:00","type":"SELL","price":101.0,"quantity":1.0}
    ]"#;
    let base = spawn_scripted_server(vec![http_response("200 OK", body)]).await;
    let trades = client(&base, None).fetch_trade_history().await.unwrap();
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[1].side, models::TradeSide::SELL);
}

// ---------------------------------------------------------------------------
// Status cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_populates_cache_and_notifies_observers() {
    let base = spawn_scripted_server(vec![http_response("200 OK", STATUS_JSON)]).await;
    let cache = StatusCache::new(client(&base, None));

    let mut observer = cache.observe();
    assert!(observer.borrow().is_none());
    assert!(cache.latest().is_none());

    cache.refresh().await.unwrap();

    observer.changed().await.unwrap();
    let seen = observer.borrow_and_update().clone().unwrap();
    assert_eq!(seen.balance, 512.5);
    assert_eq!(cache.latest().unwrap(), seen);
}

#[tokio::test]
async fn failed_refresh_keeps_last_good_value() {
    let base = spawn_scripted_server(vec![
        http_response("200 OK", STATUS_JSON),
        http_response("500 Internal Server Error", ""),
    ])
    .await;
    let cache = StatusCache::new(client(&base, None));

    cache.refresh().await.unwrap();
    let err = cache.refresh().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));

    // The stale snapshot stays visible to observers
    assert_eq!(cache.latest().unwrap().balance, 512.5);
}

#[tokio::test]
async fn late_observer_sees_current_value_immediately() {
    let base = spawn_scripted_server(vec![http_response("200 OK", STATUS_JSON)]).await;
    let cache = StatusCache::new(client(&base, None));
    cache.refresh().await.unwrap();

    // Subscribing after the refresh still yields the cached snapshot
    let observer = cache.observe();
    assert!(observer.borrow().is_some());
}
