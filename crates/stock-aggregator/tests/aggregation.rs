use std::sync::Arc;

use finnhub_client::FinnhubClient;
use market_core::MarketDataError;
use stock_aggregator::StockAggregator;

fn aggregator_for(server: &mockito::ServerGuard) -> StockAggregator {
    StockAggregator::new(Arc::new(
        FinnhubClient::new("test-token").with_base_url(server.url()),
    ))
}

#[tokio::test]
async fn joins_quote_profile_and_metrics_into_one_view() {
    let mut server = mockito::Server::new_async().await;
    let _quote = server
        .mock("GET", "/quote")
        .match_query(mockito::Matcher::Any)
        .with_body(r#"{"c":175.3,"d":2.5,"dp":1.45}"#)
        .create_async()
        .await;
    let _profile = server
        .mock("GET", "/stock/profile2")
        .match_query(mockito::Matcher::Any)
        .with_body(r#"{"name":"Apple Inc","exchange":"NASDAQ","finnhubIndustry":"Technology","marketCapitalization":2800000}"#)
        .create_async()
        .await;
    let _metric = server
        .mock("GET", "/stock/metric")
        .match_query(mockito::Matcher::Any)
        .with_body(r#"{"metric":{"peNormalizedAnnual":28.5,"marketCapitalization":2800000}}"#)
        .create_async()
        .await;

    let view = aggregator_for(&server).get_stock_details("AAPL").await.unwrap();

    assert_eq!(view.symbol, "AAPL");
    assert_eq!(view.company, "Apple Inc");
    assert_eq!(view.current_price, 175.3);
    assert_eq!(view.price_formatted, "$175.30");
    assert_eq!(view.change_formatted, "+2.50 (1.45%)");
    assert_eq!(view.change_percent, 1.45);
    assert_eq!(view.market_cap_formatted, "$2.80M");
    assert_eq!(view.pe_ratio, "28.50");
}

#[tokio::test]
async fn any_sub_call_failure_fails_the_whole_join() {
    let mut server = mockito::Server::new_async().await;
    let _quote = server
        .mock("GET", "/quote")
        .match_query(mockito::Matcher::Any)
        .with_body(r#"{"c":175.3,"d":2.5,"dp":1.45}"#)
        .create_async()
        .await;
    let _profile = server
        .mock("GET", "/stock/profile2")
        .match_query(mockito::Matcher::Any)
        .with_body(r#"{"name":"Apple Inc"}"#)
        .create_async()
        .await;
    let _metric = server
        .mock("GET", "/stock/metric")
        .match_query(mockito::Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let err = aggregator_for(&server)
        .get_stock_details("AAPL")
        .await
        .unwrap_err();
    assert!(matches!(err, MarketDataError::HttpStatus(404)));
}

#[tokio::test]
async fn malformed_upstream_fields_yield_canonical_fallbacks() {
    let mut server = mockito::Server::new_async().await;
    let _quote = server
        .mock("GET", "/quote")
        .match_query(mockito::Matcher::Any)
        .with_body("{}")
        .create_async()
        .await;
    let _profile = server
        .mock("GET", "/stock/profile2")
        .match_query(mockito::Matcher::Any)
        .with_body("{}")
        .create_async()
        .await;
    let _metric = server
        .mock("GET", "/stock/metric")
        .match_query(mockito::Matcher::Any)
        .with_body("{}")
        .create_async()
        .await;

    let view = aggregator_for(&server).get_stock_details("MSFT").await.unwrap();

    assert_eq!(view.company, "MSFT");
    assert_eq!(view.price_formatted, "N/A");
    assert_eq!(view.change_formatted, "N/A");
    assert_eq!(view.market_cap_formatted, "N/A");
    assert_eq!(view.pe_ratio, "N/A");
}
