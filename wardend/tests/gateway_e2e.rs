//! HTTP gateway round-trip tests over a real listener.

mod common;

use std::sync::Arc;

use common::long_percent_request;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use warden_broker::{BrokerError, ScriptedBroker};
use warden_domain::ManagedPosition;
use warden_store::{MemoryStore, PositionStore};
use wardend::api::{create_router, ApiState};
use wardend::{Config, Planner, Supervisor};

struct Gateway {
    broker: Arc<ScriptedBroker>,
    store: Arc<MemoryStore>,
    supervisor: Arc<Supervisor<ScriptedBroker, MemoryStore>>,
    base: String,
    client: reqwest::Client,
}

async fn serve() -> Gateway {
    let config = Config::test();
    let broker = Arc::new(ScriptedBroker::new());
    let store = Arc::new(MemoryStore::new());
    let planner = Arc::new(Planner::new(Arc::clone(&broker), Arc::clone(&store)));
    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&broker),
        Arc::clone(&store),
        config.supervisor.clone(),
    ));

    let state = Arc::new(ApiState {
        planner,
        supervisor: Arc::clone(&supervisor),
        store: Arc::clone(&store),
        stale_window: config.supervisor.stale_window(),
    });
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Gateway {
        broker,
        store,
        supervisor,
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
    }
}

fn open_body() -> Value {
    json!({
        "symbol": "SPY",
        "side": "long",
        "allocation": "1000",
        "stop_percent": "5",
        "take_profit_percent": "10"
    })
}

#[tokio::test]
async fn test_health() {
    let gw = serve().await;

    let response = gw.client.get(format!("{}/health", gw.base)).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_open_get_and_activate() {
    let gw = serve().await;
    gw.broker.set_quote("SPY", dec!(99.9), dec!(100));

    let response = gw
        .client
        .post(format!("{}/positions", gw.base))
        .json(&open_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let created: Value = response.json().await.unwrap();
    assert_eq!(created["status"], "PENDING");
    assert_eq!(created["quantity"], "10");
    let id = created["id"].as_str().unwrap().to_string();

    // The record is readable back through the gateway.
    let response =
        gw.client.get(format!("{}/positions/{id}", gw.base)).send().await.unwrap();
    assert_eq!(response.status(), 200);

    // Broker fills the entry; the next pass activates the position.
    let entry_id = created["entry_order_id"].as_str().unwrap().to_string();
    gw.broker.fill_at(&entry_id, dec!(100));
    gw.supervisor.pass().await;

    let body: Value = gw
        .client
        .get(format!("{}/positions/{id}", gw.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ACTIVE");
    assert_eq!(body["stop_price"], "95.00");
    assert_eq!(body["take_profit_price"], "110.00");
}

#[tokio::test]
async fn test_get_unknown_is_404() {
    let gw = serve().await;
    let response = gw
        .client
        .get(format!("{}/positions/{}", gw.base, uuid::Uuid::now_v7()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_list_hides_stale_pending_by_default() {
    let gw = serve().await;
    gw.broker.set_quote("SPY", dec!(99.9), dec!(100));

    // Fresh position through the front door.
    gw.client
        .post(format!("{}/positions", gw.base))
        .json(&open_body())
        .send()
        .await
        .unwrap();

    // A stale Pending record, as recovery might resurrect.
    let mut stale = {
        let request = long_percent_request();
        let planner = Planner::new(Arc::clone(&gw.broker), Arc::new(MemoryStore::new()));
        planner.open(request).await.unwrap()
    };
    stale.created_at = chrono::Utc::now() - chrono::Duration::hours(25);
    gw.store.upsert(&stale).await.unwrap();

    let body: Value = gw
        .client
        .get(format!("{}/positions", gw.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 1, "stale pending must be hidden by default");

    let body: Value = gw
        .client
        .get(format!("{}/positions?status=all", gw.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 2, "status=all includes everything");

    let body: Value = gw
        .client
        .get(format!("{}/positions?status=PENDING", gw.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 1, "a concrete status filter still hides stale records");

    let response = gw
        .client
        .get(format!("{}/positions?status=bogus", gw.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_open_error_mapping() {
    let gw = serve().await;

    // Shape violation: 400.
    let mut bad = open_body();
    bad["allocation"] = json!("0");
    let response = gw
        .client
        .post(format!("{}/positions", gw.base))
        .json(&bad)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Sizing to zero shares: 422.
    gw.broker.set_quote("SPY", dec!(1999), dec!(2000));
    let response = gw
        .client
        .post(format!("{}/positions", gw.base))
        .json(&open_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    // Broker rejection: 502.
    gw.broker.set_quote("SPY", dec!(99.9), dec!(100));
    gw.broker
        .fail_next_place(BrokerError::Rejected { reason: "account restricted".to_string() });
    let response = gw
        .client
        .post(format!("{}/positions", gw.base))
        .json(&open_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);

    // Transient broker failure: 503.
    gw.broker.fail_next_place(BrokerError::Transient("link down".to_string()));
    let response = gw
        .client
        .post(format!("{}/positions", gw.base))
        .json(&open_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn test_delete_closes_position() {
    let gw = serve().await;
    gw.broker.set_quote("SPY", dec!(99.9), dec!(100));

    let created: Value = gw
        .client
        .post(format!("{}/positions", gw.base))
        .json(&open_body())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let response = gw
        .client
        .delete(format!("{}/positions/{id}", gw.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let record: ManagedPosition = serde_json::from_value(
        gw.client
            .get(format!("{}/positions/{id}", gw.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(record.status, warden_domain::PositionStatus::Closed);

    // Unknown id: 404.
    let response = gw
        .client
        .delete(format!("{}/positions/{}", gw.base, uuid::Uuid::now_v7()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
