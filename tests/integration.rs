//! End-to-end tests for the engine proxy.
//!
//! Every test runs a real proxy on an ephemeral port and talks to it over
//! HTTP, with an echo backend standing in for the engine.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use engine_proxy::config::ProxyConfig;

mod common;

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn status_starts_down_and_unlicensed() {
    let proxy = common::start_proxy(ProxyConfig::default()).await;
    let client = client();

    let resp = client.get(proxy.url("/get_status")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["engine"]["status"], "down");
    assert_eq!(body["engine"]["address"], Value::Null);
    assert_eq!(body["engine"]["lastError"], Value::Null);
    assert_eq!(body["licensing"], Value::Null);
    assert!(body["loadUrl"].as_str().unwrap().starts_with("http://"));
}

#[tokio::test]
async fn env_config_is_served() {
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let resp = client()
        .get(proxy.url("/get_env_config"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["engineCommand"].is_string());
}

#[tokio::test]
async fn root_path_is_not_found() {
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let resp = client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn network_license_round_trip() {
    let proxy = common::start_proxy(ProxyConfig::default()).await;
    let client = client();

    let resp = client
        .put(proxy.url("/set_licensing_info"))
        .json(&json!({"type": "nlm", "connectionString": "nlm@localhost.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["licensing"],
        json!({"type": "nlm", "connectionString": "nlm@localhost.com"})
    );
}

#[tokio::test]
async fn invalid_licensing_type_is_rejected_and_state_kept() {
    let proxy = common::start_proxy(ProxyConfig::default()).await;
    let client = client();

    client
        .put(proxy.url("/set_licensing_info"))
        .json(&json!({"type": "nlm", "connectionString": "nlm@localhost.com"}))
        .send()
        .await
        .unwrap();

    let resp = client
        .put(proxy.url("/set_licensing_info"))
        .json(&json!({
            "type": "INVALID_TYPE",
            "connectionString": "abc@nlm",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let envelope: Value = resp.json().await.unwrap();
    assert_eq!(envelope["type"], "InvalidLicensingType");
    assert_eq!(envelope["logs"], Value::Null);
    assert!(envelope["message"].is_string());

    // Prior licensing survives the rejection.
    let status: Value = client
        .get(proxy.url("/get_status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["licensing"]["type"], "nlm");
    assert_eq!(status["licensing"]["connectionString"], "nlm@localhost.com");
}

#[tokio::test]
async fn hosted_license_exchange_flow() {
    let exchange_addr = common::start_exchange_service(json!([
        {"id": "ent-1", "label": "Compute Engine", "licenseNumber": "123456"}
    ]))
    .await;

    let mut config = ProxyConfig::default();
    config.licensing.exchange_url = format!("http://{exchange_addr}/token/exchange");
    let proxy = common::start_proxy(config).await;
    let client = client();

    let resp = client
        .put(proxy.url("/set_licensing_info"))
        .json(&json!({
            "type": "mhlm",
            "token": "abc",
            "emailAddress": "abc@example.com",
            "sourceId": "desktop",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["licensing"]["type"], "mhlm");
    assert_eq!(body["licensing"]["emailAddress"], "abc@example.com");
    assert_eq!(body["licensing"]["entitlements"][0]["id"], "ent-1");
    // No entitlement selected until asked for explicitly.
    assert_eq!(body["licensing"]["entitlementId"], Value::Null);

    let resp = client
        .put(proxy.url("/set_licensing_info"))
        .json(&json!({
            "type": "mhlm",
            "token": "abc",
            "emailAddress": "abc@example.com",
            "sourceId": "desktop",
            "entitlementId": "ent-1",
        }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["licensing"]["entitlementId"], "ent-1");
}

#[tokio::test]
async fn clearing_licensing_returns_null() {
    let proxy = common::start_proxy(ProxyConfig::default()).await;
    let client = client();

    client
        .put(proxy.url("/set_licensing_info"))
        .json(&json!({"type": "existing_license"}))
        .send()
        .await
        .unwrap();

    let resp = client
        .delete(proxy.url("/set_licensing_info"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["licensing"], Value::Null);
}

#[tokio::test]
async fn forward_fast_fails_while_engine_is_down() {
    let proxy = common::start_proxy(ProxyConfig::default()).await;
    let client = client();

    // Bounded time: the proxy must answer immediately, not queue the request.
    let resp = tokio::time::timeout(
        Duration::from_secs(5),
        client
            .post(proxy.url("/messageservice/json/secure"))
            .json(&json!({"messages": {}}))
            .send(),
    )
    .await
    .expect("fast-fail must not hang")
    .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn forward_round_trips_bodies_unchanged() {
    let backend = common::start_echo_backend().await;
    let mut config = ProxyConfig::default();
    config.engine = common::sleepy_engine(backend);
    let proxy = common::start_proxy(config).await;
    let client = client();

    client
        .put(proxy.url("/set_licensing_info"))
        .json(&json!({"type": "existing_license"}))
        .send()
        .await
        .unwrap();
    let resp = client.put(proxy.url("/start_matlab")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    common::wait_for_engine(&client, &proxy, "up").await;

    let payload = json!({"messages": {"ClientType": [{"properties": {"TYPE": "jsd"}}]}});
    let sent = serde_json::to_vec(&payload).unwrap();

    for method in [reqwest::Method::POST, reqwest::Method::PUT, reqwest::Method::DELETE] {
        let resp = client
            .request(method.clone(), proxy.url("/http_request.html"))
            .header("content-type", "application/json")
            .body(sent.clone())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let echoed = resp.bytes().await.unwrap();
        assert_eq!(echoed.as_ref(), sent.as_slice(), "{method} body was mutated in transit");
    }
}

#[tokio::test]
async fn websocket_sessions_are_bridged() {
    let backend = common::start_echo_backend().await;
    let mut config = ProxyConfig::default();
    config.engine = common::sleepy_engine(backend);
    let proxy = common::start_proxy(config).await;
    let client = client();

    client
        .put(proxy.url("/set_licensing_info"))
        .json(&json!({"type": "existing_license"}))
        .send()
        .await
        .unwrap();
    client.put(proxy.url("/start_matlab")).send().await.unwrap();
    common::wait_for_engine(&client, &proxy, "up").await;

    let (mut socket, _) = connect_async(format!("ws://{}/http_ws_request.html", proxy.addr))
        .await
        .expect("websocket upgrade through the proxy");

    socket.send(Message::Text("ping".into())).await.unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("bridge must deliver the echo")
        .unwrap()
        .unwrap();
    assert_eq!(echoed.into_text().unwrap(), "ping");

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn stop_reports_engine_down() {
    let backend = common::start_echo_backend().await;
    let mut config = ProxyConfig::default();
    config.engine = common::sleepy_engine(backend);
    let proxy = common::start_proxy(config).await;
    let client = client();

    client
        .put(proxy.url("/set_licensing_info"))
        .json(&json!({"type": "existing_license"}))
        .send()
        .await
        .unwrap();
    client.put(proxy.url("/start_matlab")).send().await.unwrap();
    common::wait_for_engine(&client, &proxy, "up").await;

    let resp = client.delete(proxy.url("/stop_matlab")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["engine"]["status"], "down");
    assert_eq!(body["engine"]["address"], Value::Null);

    // Forwarding fast-fails again after the stop.
    let resp = client.get(proxy.url("/anything.html")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn terminate_integration_shuts_everything_down() {
    let backend = common::start_echo_backend().await;
    let mut config = ProxyConfig::default();
    config.engine = common::sleepy_engine(backend);
    let proxy = common::start_proxy(config).await;
    let client = client();

    client
        .put(proxy.url("/set_licensing_info"))
        .json(&json!({"type": "existing_license"}))
        .send()
        .await
        .unwrap();
    client.put(proxy.url("/start_matlab")).send().await.unwrap();
    common::wait_for_engine(&client, &proxy, "up").await;

    let resp = client
        .delete(proxy.url("/terminate_integration"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"loadUrl": "../"}));

    // Engine stopped and licensing cleared behind the response.
    let state = proxy.supervisor.snapshot().await;
    assert_eq!(
        serde_json::to_value(&state.status).unwrap(),
        json!("down")
    );
    assert!(proxy.licensing.current().await.is_unset());
}
