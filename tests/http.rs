use std::{net::SocketAddr, sync::Arc};

use grace_train_back::{
    config::AppConfig,
    dao::record_store::MemoryStore,
    engine::depot::DepotClient,
    routes,
    services::chat_service::ChatMessage,
    state::AppState,
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::mpsc};

async fn serve() -> (String, MemoryStore, mpsc::UnboundedReceiver<ChatMessage>) {
    let store = MemoryStore::default();
    let config = AppConfig {
        easter_egg_chance: 0.0,
        ..AppConfig::default()
    };
    let (state, chat_rx) = AppState::build(config, Arc::new(store.clone()), DepotClient::offline());

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, routes::router(state).into_make_service())
            .await
            .unwrap();
    });

    (format!("http://{addr}"), store, chat_rx)
}

fn grace_body(index: usize) -> Value {
    json!({
        "user": {
            "id": format!("u{index}"),
            "display_name": format!("User{index}"),
            "color": format!("#00000{index}"),
        },
        "kind": "normal",
    })
}

#[tokio::test]
async fn grace_events_start_and_break_a_train() {
    let (base, store, mut chat_rx) = serve().await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{base}/train")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    for index in 0..5 {
        let response = client
            .post(format!("{base}/events/grace"))
            .json(&grace_body(index))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let snapshot: Value = client
        .get(format!("{base}/train"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["comboCount"], 5);
    assert_eq!(
        snapshot["participantColors"],
        json!(["#000000", "#000001", "#000002", "#000003", "#000004"])
    );

    let response = client
        .post(format!("{base}/events/break"))
        .json(&json!({ "display_name": "Spoiler", "message_id": "abc" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = client.get(format!("{base}/train")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let records: Value = client
        .get(format!("{base}/records"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(records["grace_records"].as_array().unwrap().len(), 1);
    assert_eq!(store.snapshot().grace_records[0].length, 5);

    let start = chat_rx.recv().await.unwrap();
    assert!(start.text.contains("leaving the station"));
    let end = chat_rx.recv().await.unwrap();
    assert_eq!(end.reply_to.as_deref(), Some("abc"));
    assert!(end.text.starts_with("Spoiler broke the grace train!"));
}

#[tokio::test]
async fn invalid_payloads_are_rejected() {
    let (base, _, _) = serve().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/events/grace"))
        .json(&json!({
            "user": { "id": "u1", "display_name": "User1", "color": "red" },
            "kind": "normal",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{base}/events/break"))
        .json(&json!({ "display_name": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_and_overlay_position_respond() {
    let (base, _, _) = serve().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/healthcheck"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({ "status": "ok", "overlays": 0 }));

    let response = client
        .put(format!("{base}/overlay/position"))
        .json(&json!({ "position": "top" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .get(format!("{base}/depot/users/someone/cars"))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "userId": "someone", "cars": [] }));
}
