//! Integration tests for the snapshot fetcher and the on-demand view path,
//! against mocked depth endpoints.

use std::time::Duration;

use bookdepth::{
    request_view, BookConfig, BookError, Market, SnapshotFetcher, Symbol, USAGE_HINT,
};
use rust_decimal_macros::dec;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SPOT_PATH: &str = "/api/v3/depth";
const FUTURES_PATH: &str = "/fapi/v1/depth";

const BOOK: &str = r#"{
    "lastUpdateId": 1027024,
    "bids": [["100.00", "1.0"], ["99.00", "2.0"], ["95.00", "7.5"]],
    "asks": [["101.00", "1.0"], ["102.00", "3.0"], ["105.00", "0.5"]]
}"#;

fn fetcher_for(server: &MockServer) -> SnapshotFetcher {
    let config = BookConfig {
        spot_rest_url: format!("{}{SPOT_PATH}", server.uri()),
        futures_rest_url: format!("{}{FUTURES_PATH}", server.uri()),
        request_timeout: Duration::from_millis(500),
        ..Default::default()
    };
    SnapshotFetcher::new(config).unwrap()
}

fn btc() -> Symbol {
    Symbol::parse("BTCUSDT").unwrap()
}

// ---------------------------------------------------------------------------
// fetch_snapshot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fetch_sends_symbol_and_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPOT_PATH))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("limit", "5000"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BOOK))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = fetcher_for(&server)
        .fetch_snapshot(&btc(), Market::Spot)
        .await
        .unwrap();
    assert_eq!(snapshot.market, Market::Spot);
    assert_eq!(snapshot.last_update_id, Some(1027024));
    assert_eq!(snapshot.bids.best(), Some(dec!(100)));
    assert_eq!(snapshot.asks.best(), Some(dec!(101)));
    assert_eq!(snapshot.current_price(), Some(dec!(100.5)));
}

#[tokio::test]
async fn test_fetch_reports_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPOT_PATH))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string(r#"{"code":-1121,"msg":"Invalid symbol."}"#),
        )
        .mount(&server)
        .await;

    let err = fetcher_for(&server)
        .fetch_snapshot(&btc(), Market::Spot)
        .await
        .unwrap_err();
    match err {
        BookError::Http { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("Invalid symbol"));
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPOT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(BOOK)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = fetcher_for(&server)
        .fetch_snapshot(&btc(), Market::Spot)
        .await
        .unwrap_err();
    assert!(matches!(err, BookError::Request(ref e) if e.is_timeout()), "{err:?}");
}

// ---------------------------------------------------------------------------
// fetch_with_fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_spot_failure_falls_back_to_futures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPOT_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(FUTURES_PATH))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BOOK))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = fetcher_for(&server)
        .fetch_with_fallback(&btc(), Market::Spot)
        .await
        .unwrap();
    assert_eq!(snapshot.market, Market::Futures);
    assert_eq!(snapshot.bids.len(), 3);
}

#[tokio::test]
async fn test_preferred_futures_is_tried_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FUTURES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(BOOK))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SPOT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(BOOK))
        .expect(0)
        .mount(&server)
        .await;

    let snapshot = fetcher_for(&server)
        .fetch_with_fallback(&btc(), Market::Futures)
        .await
        .unwrap();
    assert_eq!(snapshot.market, Market::Futures);
}

#[tokio::test]
async fn test_both_markets_failing_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPOT_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(FUTURES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher_for(&server)
        .fetch_with_fallback(&btc(), Market::Spot)
        .await
        .unwrap_err();
    assert!(matches!(err, BookError::Unavailable(ref s) if s == "BTCUSDT"));
}

#[tokio::test]
async fn test_empty_book_counts_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPOT_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"lastUpdateId":1,"bids":[],"asks":[]}"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(FUTURES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(BOOK))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = fetcher_for(&server)
        .fetch_with_fallback(&btc(), Market::Spot)
        .await
        .unwrap();
    assert_eq!(snapshot.market, Market::Futures);
}

// ---------------------------------------------------------------------------
// request_view
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_request_view_compiles_fetched_book() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPOT_PATH))
        .and(query_param("symbol", "ETHUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BOOK))
        .mount(&server)
        .await;

    let view = request_view(&fetcher_for(&server), Some(" ethusdt "), Market::Spot)
        .await
        .unwrap();
    assert_eq!(view.symbol.as_str(), "ETHUSDT");
    assert_eq!(view.current_price, dec!(100.5));
    assert_eq!(view.window.min, dec!(95));
    assert_eq!(view.window.max, dec!(105));
    assert_eq!(view.dominant_bid.map(|l| l.price), Some(dec!(95)));
    assert_eq!(view.dominant_ask.map(|l| l.price), Some(dec!(102)));
}

#[tokio::test]
async fn test_request_view_rejects_missing_symbol_without_fetching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BOOK))
        .expect(0)
        .mount(&server)
        .await;
    let fetcher = fetcher_for(&server);

    for arg in [None, Some(""), Some("   "), Some("BTC/USDT")] {
        let err = request_view(&fetcher, arg, Market::Spot).await.unwrap_err();
        let BookError::MalformedInput(hint) = &err else {
            panic!("{arg:?}: {err:?}");
        };
        assert!(hint.starts_with(USAGE_HINT), "{arg:?}: {hint}");
        assert!(err.is_request_scoped());
    }
}

#[tokio::test]
async fn test_request_view_invalid_symbol_echoes_argument() {
    let server = MockServer::start().await;
    let err = request_view(&fetcher_for(&server), Some("BTC/USDT"), Market::Spot)
        .await
        .unwrap_err();
    let BookError::MalformedInput(hint) = err else {
        panic!("expected malformed input, got {err:?}");
    };
    assert_eq!(hint, format!("{USAGE_HINT} (got \"BTC/USDT\")"));
}

#[tokio::test]
async fn test_request_view_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = request_view(&fetcher_for(&server), Some("NOPECOIN"), Market::Spot)
        .await
        .unwrap_err();
    assert!(matches!(err, BookError::Unavailable(ref s) if s == "NOPECOIN"));
}
