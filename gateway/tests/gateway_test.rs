use fleet_gateway::config::GatewayConfig;
use fleet_gateway::hub::TelemetryHub;
use fleet_gateway::metrics::init_metrics;
use fleet_gateway::model::OutboundMessage;
use fleet_gateway::poller::{CycleOutcome, Poller};
use fleet_gateway::rest::{create_router, AppState};
use fleet_gateway::upstream::UpstreamClient;
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(upstream: &str) -> GatewayConfig {
    config_with_frontend(upstream, "/nonexistent/frontend")
}

fn config_with_frontend(upstream: &str, frontend_dir: &str) -> GatewayConfig {
    let mut secrets = Map::new();
    secrets.insert(
        "STREAM_URL_BY_SN".to_string(),
        json!({ "A1": "https://video.local/A1/index.m3u8" }),
    );
    let env = [
        ("DJI_BASE_URL", upstream.to_string()),
        ("DJI_ORG_KEY", "org-key".to_string()),
        ("DJI_PROJECT_UUID", "proj-1".to_string()),
        ("POLL_SECONDS", "0.2".to_string()),
        ("FETCH_TIMEOUT_SECONDS", "0.1".to_string()),
        ("HTTP_ADDR", "127.0.0.1:0".to_string()),
        ("FRONTEND_DIR", frontend_dir.to_string()),
    ];
    GatewayConfig::from_lookup(
        |key| env.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone()),
        &secrets,
    )
    .unwrap()
}

async fn serve(hub: Arc<TelemetryHub>, config: GatewayConfig) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(AppState {
        hub,
        config: Arc::new(config),
    });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn mock_upstream(nodes: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manage/api/v1.0/projects/proj-1/topologies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "list": nodes } })))
        .mount(&server)
        .await;
    server
}

fn a1_node() -> Value {
    json!({
        "host": {
            "device_sn": "A1",
            "device_online_status": true,
            "device_state": { "latitude": 1.0, "longitude": 2.0 }
        }
    })
}

async fn next_ws_message<S>(ws: &mut S) -> OutboundMessage
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_poll_cycle_end_to_end() {
    let upstream = mock_upstream(json!([a1_node(), { "host": {} }])).await;
    let config = test_config(&upstream.uri());
    let hub = Arc::new(TelemetryHub::new(config.subscriber_buffer));
    let addr = serve(hub.clone(), config.clone()).await;

    let (mut early, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/telemetry", addr))
        .await
        .unwrap();
    assert_eq!(
        next_ws_message(&mut early).await,
        OutboundMessage::Snapshot { devices: vec![] }
    );

    let poller = Poller::new(
        hub.clone(),
        UpstreamClient::new(&config.upstream()).unwrap(),
        config.poll_interval,
    );
    assert_eq!(
        poller.run_cycle().await.unwrap(),
        CycleOutcome::Updated { devices: 1 }
    );

    let update = match next_ws_message(&mut early).await {
        OutboundMessage::TelemetryUpdate { devices } => devices,
        other => panic!("expected telemetry_update, got {:?}", other),
    };
    assert_eq!(update.len(), 1);
    assert_eq!(update[0].id, "A1");
    assert!(update[0].online);
    assert_eq!(update[0].latitude, Some(1.0));
    assert_eq!(update[0].longitude, Some(2.0));

    let (mut late, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/telemetry", addr))
        .await
        .unwrap();
    assert_eq!(
        next_ws_message(&mut late).await,
        OutboundMessage::Snapshot { devices: update.clone() }
    );

    let state: Value = reqwest::get(format!("http://{}/api/state", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["type"], "snapshot");
    assert_eq!(state["devices"].as_array().unwrap().len(), 1);
    assert_eq!(state["devices"][0]["id"], "A1");
}

#[tokio::test]
async fn test_closed_client_is_unregistered() {
    let upstream = mock_upstream(json!([])).await;
    let config = test_config(&upstream.uri());
    let hub = Arc::new(TelemetryHub::new(config.subscriber_buffer));
    let addr = serve(hub.clone(), config).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/telemetry", addr))
        .await
        .unwrap();
    next_ws_message(&mut ws).await;
    assert_eq!(hub.subscribers.len().await, 1);

    ws.close(None).await.unwrap();

    for _ in 0..50 {
        if hub.subscribers.len().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("subscriber was not removed after close");
}

#[tokio::test]
async fn test_health_config_and_stream() {
    let config = test_config("http://127.0.0.1:9");
    let hub = Arc::new(TelemetryHub::new(config.subscriber_buffer));
    let addr = serve(hub, config).await;

    let health: Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["ok"], true);
    assert!(health["time"].is_string());

    let settings: Value = reqwest::get(format!("http://{}/api/config", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(settings["app_settings"]["projectUuid"], "proj-1");
    assert_eq!(settings["app_settings"]["userToken"], "org-key");

    let stream: Value = reqwest::get(format!("http://{}/api/stream?sn=A1", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stream["url"], "https://video.local/A1/index.m3u8");

    let unknown: Value = reqwest::get(format!("http://{}/api/stream?sn=ZZ", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unknown, json!({ "sn": "ZZ", "url": null }));

    let missing = reqwest::get(format!("http://{}/api/stream", addr)).await.unwrap();
    assert_eq!(missing.status().as_u16(), 400);
}

#[tokio::test]
async fn test_metrics_endpoint_reports_poll_cycles() {
    let upstream = mock_upstream(json!([a1_node()])).await;
    let config = test_config(&upstream.uri());
    let hub = Arc::new(TelemetryHub::new(config.subscriber_buffer));
    let addr = serve(hub.clone(), config.clone()).await;

    // The registry is process-wide; this is the only test that registers it
    init_metrics().unwrap();

    let poller = Poller::new(
        hub,
        UpstreamClient::new(&config.upstream()).unwrap(),
        config.poll_interval,
    );
    poller.run_cycle().await.unwrap();

    let response = reqwest::get(format!("http://{}/metrics", addr)).await.unwrap();
    assert!(response.status().is_success());
    let body = response.text().await.unwrap();
    assert!(body.contains("gateway_poll_cycles_total"), "{}", body);
    assert!(body.contains("gateway_tracked_devices"), "{}", body);
}

#[tokio::test]
async fn test_frontend_fallback_serves_index() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.html"), "<html>fleet map</html>").unwrap();
    std::fs::write(dir.path().join("app.js"), "console.log('map');").unwrap();

    let config = config_with_frontend("http://127.0.0.1:9", dir.path().to_str().unwrap());
    let hub = Arc::new(TelemetryHub::new(config.subscriber_buffer));
    let addr = serve(hub, config).await;

    let route = reqwest::get(format!("http://{}/some/route", addr)).await.unwrap();
    assert!(route.status().is_success());
    assert_eq!(route.text().await.unwrap(), "<html>fleet map</html>");

    let asset = reqwest::get(format!("http://{}/app.js", addr)).await.unwrap();
    assert_eq!(asset.text().await.unwrap(), "console.log('map');");

    let state: Value = reqwest::get(format!("http://{}/api/state", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["type"], "snapshot");
}
