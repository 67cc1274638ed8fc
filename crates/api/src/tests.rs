use std::sync::Arc;
use std::time::Duration;

use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use hackwatch_domain::model::{
    Chain, CycleStatus, TransferEvent, WatchedAddress, UNKNOWN_LABEL,
};
use hackwatch_domain::services::{
    init_telemetry, RateLimiter, TelemetryConfig, TelemetryGuard,
};
use hackwatch_domain::{TransferStore, WatchlistStore};
use hackwatch_monitor::{
    ChainRegistry, FlaggedAddressFeed, Monitor, MonitorError, MonitorService, MonitorStatus,
};
use hackwatch_storage::SeaOrmStorage;
use serde_json::Value;

use crate::application::configure_public;
use crate::handlers::data::DataResponse;
use crate::handlers::monitor::StartRequest;
use crate::state::AppState;

struct EmptyFeed;

#[async_trait]
impl FlaggedAddressFeed for EmptyFeed {
    async fn fetch(&self) -> Result<Vec<String>, MonitorError> {
        Ok(Vec::new())
    }
}

async fn storage() -> SeaOrmStorage {
    SeaOrmStorage::connect("sqlite::memory:")
        .await
        .expect("storage inits")
}

fn telemetry() -> TelemetryGuard {
    let config = TelemetryConfig::from_env("API_TEST").expect("telemetry config");
    init_telemetry(&config).expect("telemetry inits")
}

fn build_state(storage: SeaOrmStorage, rate_limit: u32) -> AppState {
    let monitor = Monitor::new(
        Arc::new(storage.clone()),
        ChainRegistry::new(),
        Arc::new(EmptyFeed),
    );
    let service = MonitorService::new(Arc::new(monitor), Duration::from_secs(3600));
    AppState::new(
        storage,
        Arc::new(service),
        telemetry(),
        RateLimiter::per_minute(rate_limit),
    )
}

fn transfer(tx_hash: &str, block_height: u64) -> TransferEvent {
    TransferEvent {
        chain: Chain::Ethereum,
        from_address: "0x00000000000000000000000000000000000000aa".into(),
        to_addresses: vec!["0x00000000000000000000000000000000000000bb".into()],
        amount: "1.5".into(),
        asset_symbol: "ETH".into(),
        tx_hash: tx_hash.into(),
        block_height,
        destination_label: UNKNOWN_LABEL.into(),
    }
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(|cfg| configure_public(cfg, true)),
        )
        .await
    };
}

#[actix_web::test]
async fn data_lists_addresses_and_newest_transfers() {
    let storage = storage().await;
    storage
        .upsert_watched_address(WatchedAddress {
            address: "0x00000000000000000000000000000000000000aa".into(),
            chain: Chain::Ethereum,
            checkpoint: 0,
        })
        .await
        .unwrap();
    for (hash, height) in [("0x01", 10), ("0x02", 30), ("0x03", 20)] {
        storage.insert_transfer(&transfer(hash, height)).await.unwrap();
    }
    let app = app!(build_state(storage, 50));

    let req = test::TestRequest::get()
        .uri("/api/v1/data?limit=2")
        .to_request();
    let body: DataResponse = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body.addresses.len(), 1);
    let hashes: Vec<_> = body
        .transactions
        .iter()
        .map(|record| record.event.tx_hash.as_str())
        .collect();
    assert_eq!(hashes, vec!["0x02", "0x03"]);
}

#[actix_web::test]
async fn data_rejects_zero_limit() {
    let app = app!(build_state(storage().await, 50));
    let req = test::TestRequest::get()
        .uri("/api/v1/data?limit=0")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn refresh_returns_cycle_report() {
    let storage = storage().await;
    storage
        .upsert_watched_address(WatchedAddress {
            address: "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq".into(),
            chain: Chain::Bitcoin,
            checkpoint: 0,
        })
        .await
        .unwrap();
    let app = app!(build_state(storage, 50));

    let req = test::TestRequest::post()
        .uri("/api/v1/monitor/refresh")
        .to_request();
    let report: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(report["feed_ok"], true);
    // No adapters are registered, so the stored address is skipped.
    assert_eq!(report["addresses_skipped"], 1);

    let req = test::TestRequest::get()
        .uri("/api/v1/monitor/status")
        .to_request();
    let status: MonitorStatus = test::call_and_read_body_json(&app, req).await;
    assert!(!status.running);
    let last = status.last_cycle.expect("cycle state persisted");
    assert_eq!(last.status, CycleStatus::Completed);
    assert_eq!(last.last_report.map(|r| r.addresses_skipped), Some(1));
}

#[actix_web::test]
async fn start_and_stop_report_transitions() {
    let app = app!(build_state(storage().await, 50));

    let start = || {
        test::TestRequest::post()
            .uri("/api/v1/monitor/start")
            .set_json(StartRequest {
                interval_minutes: Some(5),
            })
            .to_request()
    };
    let first: Value = test::call_and_read_body_json(&app, start()).await;
    assert_eq!(first["status"], "started");
    assert_eq!(first["interval_secs"], 300);
    let second: Value = test::call_and_read_body_json(&app, start()).await;
    assert_eq!(second["status"], "already_running");

    let stop = || {
        test::TestRequest::post()
            .uri("/api/v1/monitor/stop")
            .to_request()
    };
    let stopped: Value = test::call_and_read_body_json(&app, stop()).await;
    assert_eq!(stopped["status"], "stopped");
    let again: Value = test::call_and_read_body_json(&app, stop()).await;
    assert_eq!(again["status"], "not_running");
}

#[actix_web::test]
async fn start_without_body_uses_default_interval() {
    let app = app!(build_state(storage().await, 50));
    let req = test::TestRequest::post()
        .uri("/api/v1/monitor/start")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["interval_secs"], 3600);

    let req = test::TestRequest::post()
        .uri("/api/v1/monitor/stop")
        .to_request();
    test::call_service(&app, req).await;
}

#[actix_web::test]
async fn start_rejects_zero_interval() {
    let app = app!(build_state(storage().await, 50));
    let req = test::TestRequest::post()
        .uri("/api/v1/monitor/start")
        .set_json(StartRequest {
            interval_minutes: Some(0),
        })
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn requests_beyond_limit_are_rejected() {
    let app = app!(build_state(storage().await, 2));
    for _ in 0..2 {
        let req = test::TestRequest::get()
            .uri("/api/v1/monitor/status")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
    let req = test::TestRequest::get()
        .uri("/api/v1/monitor/status")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[actix_web::test]
async fn metrics_are_exposed() {
    let app = app!(build_state(storage().await, 50));
    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
