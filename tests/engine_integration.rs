use std::fs;

use quotewatch::core::config::{AppConfig, BinanceConfig, ProviderEndpoint, ProvidersConfig};
use quotewatch::core::config::{EngineConfig, HoldingConfig};
use quotewatch::core::model::{AssetType, PriceSource};
use quotewatch::engine::PriceEngine;

mod test_utils {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn mount_binance_ticker(server: &MockServer, pair: &str, price: f64) {
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/price"))
            .and(query_param("symbol", pair))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"symbol":"{pair}","price":"{price}"}}"#
            )))
            .mount(server)
            .await;
    }

    pub async fn mount_binance_failure(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/price"))
            .respond_with(ResponseTemplate::new(500))
            .mount(server)
            .await;
    }

    pub async fn mount_coingecko(server: &MockServer, coin_id: &str, price: f64) {
        Mock::given(method("GET"))
            .and(path("/api/v3/simple/price"))
            .and(query_param("ids", coin_id))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"{coin_id}":{{"usd":{price}}}}}"#
            )))
            .mount(server)
            .await;
    }

    pub async fn mount_yahoo_failure(server: &MockServer) {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(server)
            .await;
    }

    pub async fn mount_stooq_quote(server: &MockServer, symbol: &str, close: f64) {
        Mock::given(method("GET"))
            .and(path("/q/l/"))
            .and(query_param("s", symbol))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "Symbol,Date,Time,Open,High,Low,Close,Volume\n{symbol},2024-05-01,17:30:00,0,0,0,{close},1000\n"
            )))
            .mount(server)
            .await;
    }

    pub async fn mount_frankfurter_rate(server: &MockServer, from: &str, to: &str, rate: f64) {
        Mock::given(method("GET"))
            .and(path("/v1/latest"))
            .and(query_param("base", from))
            .and(query_param("symbols", to))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"base": "{from}", "rates": {{"{to}": {rate}}}}}"#
            )))
            .mount(server)
            .await;
    }
}

/// Config with every provider pointed at the mock server. Symbols that no
/// mock matches get a 404 instead of a real upstream call.
fn mock_config(uri: &str) -> AppConfig {
    AppConfig {
        holdings: vec![],
        providers: ProvidersConfig {
            yahoo: Some(ProviderEndpoint {
                base_url: uri.to_string(),
            }),
            stooq: Some(ProviderEndpoint {
                base_url: uri.to_string(),
            }),
            binance: Some(BinanceConfig {
                base_url: uri.to_string(),
                stream_url: "ws://127.0.0.1:1/ws".to_string(),
            }),
            coingecko: Some(ProviderEndpoint {
                base_url: uri.to_string(),
            }),
            frankfurter: Some(ProviderEndpoint {
                base_url: uri.to_string(),
            }),
        },
        engine: EngineConfig {
            fetch_timeout_secs: 2,
            ..EngineConfig::default()
        },
        currency: "USD".to_string(),
    }
}

#[test_log::test(tokio::test)]
async fn test_crypto_fetch_updates_table_and_broadcasts() {
    let server = wiremock::MockServer::start().await;
    test_utils::mount_binance_ticker(&server, "BTCUSDT", 65000.0).await;

    let engine = PriceEngine::new(&mock_config(&server.uri())).unwrap();
    let mut updates = engine.subscribe_price_updates();

    let holdings = vec![("BTC".to_string(), AssetType::Crypto)];
    let outcome = engine.fetch_multiple_prices(&holdings).await;

    assert!(!outcome.offline);
    assert_eq!(outcome.prices["BTC"], 65000.0);
    assert_eq!(engine.get_price("BTC").await, Some(65000.0));

    let update = updates.recv().await.unwrap();
    assert_eq!(update.symbol, "BTC");
    assert_eq!(update.price, 65000.0);
    assert_eq!(update.source, PriceSource::Poll);

    engine.dispose().await;
}

#[test_log::test(tokio::test)]
async fn test_crypto_falls_back_when_primary_errors() {
    let server = wiremock::MockServer::start().await;
    test_utils::mount_binance_failure(&server).await;
    test_utils::mount_coingecko(&server, "bitcoin", 64950.0).await;

    let engine = PriceEngine::new(&mock_config(&server.uri())).unwrap();

    let holdings = vec![("BTC".to_string(), AssetType::Crypto)];
    let outcome = engine.fetch_multiple_prices(&holdings).await;

    assert_eq!(outcome.prices["BTC"], 64950.0);
    let record = engine.snapshot().await.remove("BTC").unwrap();
    assert_eq!(record.source, PriceSource::Fallback);

    engine.dispose().await;
}

#[test_log::test(tokio::test)]
async fn test_foreign_listing_on_fallback_is_converted_to_base() {
    let server = wiremock::MockServer::start().await;
    // Specific mocks first: the catch-all 500 below knocks out yahoo (both
    // the chart primary and the rate primary) without shadowing these
    test_utils::mount_stooq_quote(&server, "sap.de", 182.40).await;
    test_utils::mount_frankfurter_rate(&server, "EUR", "USD", 1.08).await;
    test_utils::mount_yahoo_failure(&server).await;

    let engine = PriceEngine::new(&mock_config(&server.uri())).unwrap();

    let holdings = vec![("SAP.DE".to_string(), AssetType::Stock)];
    let outcome = engine.fetch_multiple_prices(&holdings).await;

    // The EUR close is converted into the USD base, not taken as-is
    let price = outcome.prices["SAP.DE"];
    assert!((price - 182.40 * 1.08).abs() < 1e-9, "got {price}");
    let record = engine.snapshot().await.remove("SAP.DE").unwrap();
    assert_eq!(record.source, PriceSource::Fallback);

    engine.dispose().await;
}

#[test_log::test(tokio::test)]
async fn test_failed_symbol_is_omitted_others_survive() {
    let server = wiremock::MockServer::start().await;
    test_utils::mount_binance_ticker(&server, "BTCUSDT", 65000.0).await;
    // Every yahoo/stooq path 500s, so the stock chain is exhausted
    test_utils::mount_yahoo_failure(&server).await;

    let engine = PriceEngine::new(&mock_config(&server.uri())).unwrap();

    let holdings = vec![
        ("BTC".to_string(), AssetType::Crypto),
        ("THYAO.IS".to_string(), AssetType::Stock),
    ];
    let outcome = engine.fetch_multiple_prices(&holdings).await;

    assert!(!outcome.offline);
    assert!(outcome.prices.contains_key("BTC"));
    assert!(!outcome.prices.contains_key("THYAO.IS"));
    assert!(engine.get_price("THYAO.IS").await.is_none());

    engine.dispose().await;
}

#[test_log::test(tokio::test)]
async fn test_every_symbol_failing_reports_offline() {
    let server = wiremock::MockServer::start().await;
    test_utils::mount_yahoo_failure(&server).await;

    let engine = PriceEngine::new(&mock_config(&server.uri())).unwrap();

    let holdings = vec![("THYAO.IS".to_string(), AssetType::Stock)];
    let outcome = engine.fetch_multiple_prices(&holdings).await;

    assert!(outcome.offline);
    assert!(outcome.prices.is_empty());
    assert!(engine.get_all_prices().await.is_empty());

    engine.dispose().await;
}

#[test_log::test(tokio::test)]
async fn test_repeat_fetch_within_ttl_hits_cache() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path("/api/v3/ticker/price"))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_body_string(r#"{"symbol":"BTCUSDT","price":"65000.00"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = PriceEngine::new(&mock_config(&server.uri())).unwrap();
    let holdings = vec![("BTC".to_string(), AssetType::Crypto)];

    let first = engine.fetch_multiple_prices(&holdings).await;
    let second = engine.fetch_multiple_prices(&holdings).await;

    assert_eq!(first.prices["BTC"], 65000.0);
    assert_eq!(second.prices["BTC"], 65000.0);
    let record = engine.snapshot().await.remove("BTC").unwrap();
    assert_eq!(record.source, PriceSource::Cache);

    engine.dispose().await;
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let server = wiremock::MockServer::start().await;
    test_utils::mount_binance_ticker(&server, "ETHUSDT", 3200.5).await;

    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    let config_path = config_file.path();
    let config_content = format!(
        r#"
        holdings:
          - symbol: "ETH"
            asset_type: crypto
            quantity: 2.0
            purchase_price: 1800.0
        providers:
          binance:
            base_url: {uri}
            stream_url: "ws://127.0.0.1:1/ws"
          coingecko:
            base_url: {uri}
        currency: "USD"
    "#,
        uri = server.uri()
    );

    fs::write(config_path, &config_content).expect("Failed to write config file");

    let result = quotewatch::run_command(
        quotewatch::AppCommand::Prices,
        Some(config_path.to_str().unwrap()),
    )
    .await;
    assert!(
        result.is_ok(),
        "Main function failed with: {:?}",
        result.err()
    );
}

#[test_log::test(tokio::test)]
async fn test_sync_holdings_pushes_prices_to_store() {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use quotewatch::core::model::{Holding, HoldingsStore};
    use std::sync::Mutex;

    struct MemoryStore {
        holdings: Vec<Holding>,
        updates: Mutex<Vec<(String, f64)>>,
    }

    #[async_trait]
    impl HoldingsStore for MemoryStore {
        async fn list_holdings(&self) -> anyhow::Result<Vec<Holding>> {
            Ok(self.holdings.clone())
        }

        async fn update_holding_price(
            &self,
            id: &str,
            price: f64,
            _updated_at: DateTime<Utc>,
        ) -> anyhow::Result<()> {
            self.updates.lock().unwrap().push((id.to_string(), price));
            Ok(())
        }
    }

    let server = wiremock::MockServer::start().await;
    test_utils::mount_binance_ticker(&server, "BTCUSDT", 65000.0).await;
    test_utils::mount_yahoo_failure(&server).await;

    let engine = PriceEngine::new(&mock_config(&server.uri())).unwrap();

    let store = MemoryStore {
        holdings: vec![
            HoldingConfig {
                symbol: "BTC".to_string(),
                asset_type: AssetType::Crypto,
                quantity: 0.5,
                purchase_price: 30000.0,
            }
            .to_holding(),
            HoldingConfig {
                symbol: "THYAO.IS".to_string(),
                asset_type: AssetType::Stock,
                quantity: 100.0,
                purchase_price: 250.0,
            }
            .to_holding(),
        ],
        updates: Mutex::new(Vec::new()),
    };

    let outcome = engine.sync_holdings(&store).await.unwrap();
    assert_eq!(outcome.prices.len(), 1);

    // Only the successfully priced holding is written back
    let updates = store.updates.lock().unwrap();
    assert_eq!(updates.as_slice(), &[("crypto-btc".to_string(), 65000.0)]);

    engine.dispose().await;
}
