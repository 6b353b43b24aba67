mod common;

use asanatabs::channel::protocol::{decode_engine_message, encode};
use asanatabs::channel::{EngineMessage, TabMessage};
use asanatabs::store::MemoryStore;
use asanatabs::sync::{EngineConfig, SyncEngine, SyncHandle};
use asanatabs::OriginPolicy;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use common::FakeService;
use futures::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tower::util::ServiceExt;

async fn start_engine() -> SyncHandle {
    let service = FakeService::new()
        .with_workspace("ws-1", "Work")
        .with_task("ws-1", "t1", "Write report");
    let config = EngineConfig {
        pull_interval: Duration::from_secs(3600),
        ..Default::default()
    };
    SyncEngine::start(Arc::new(service), Arc::new(MemoryStore::new()), config).await
}

const EXTENSION_ORIGIN: &str = "chrome-extension://abcdef";

fn app(sync: SyncHandle) -> Router {
    asanatabs::create_router(sync, OriginPolicy::new([EXTENSION_ORIGIN]))
}

// Helper to get response body as string
async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = app(start_engine().await);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_get_snapshot() {
    let sync = start_engine().await;
    sync.engine().pull().await;
    let app = app(sync);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/snapshot")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "online");
    assert_eq!(json["snapshot"]["tasks"][0]["id"], "t1");
    assert_eq!(json["snapshot"]["tasks"][0]["workspaceName"], "Work");
    assert!(json["snapshot"]["workspaceColors"]["ws-1"].is_string());
}

#[tokio::test]
async fn test_request_pull() {
    let app = app(start_engine().await);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/pull")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_unknown_channel_is_not_found() {
    let app = app(start_engine().await);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/channels/other")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_channel_requires_upgrade() {
    let app = app(start_engine().await);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/channels/asanatabs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
}

#[tokio::test]
async fn test_websocket_tab_round_trip() {
    let app = app(start_engine().await);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let url = format!("ws://{}/channels/asanatabs", addr);
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    socket
        .send(Message::Text(encode(&TabMessage::RequestPull).unwrap()))
        .await
        .unwrap();

    // A cached greeting, then at least one fresh snapshot
    let (mut saw_cached, mut fresh) = (false, None);
    tokio::time::timeout(Duration::from_secs(5), async {
        while !saw_cached || fresh.is_none() {
            let Message::Text(text) = socket.next().await.unwrap().unwrap() else {
                continue;
            };
            if let EngineMessage::SnapshotUpdate {
                snapshot,
                is_from_local_cache,
                ..
            } = decode_engine_message(&text).unwrap()
            {
                if is_from_local_cache {
                    saw_cached = true;
                } else {
                    fresh = Some(snapshot);
                }
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(fresh.unwrap().tasks.len(), 1);
}

#[tokio::test]
async fn test_snapshot_cors_only_for_allowed_origin() {
    let sync = start_engine().await;

    let response = app(sync.clone())
        .oneshot(
            Request::builder()
                .uri("/snapshot")
                .header(header::ORIGIN, EXTENSION_ORIGIN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        EXTENSION_ORIGIN
    );

    let response = app(sync)
        .oneshot(
            Request::builder()
                .uri("/snapshot")
                .header(header::ORIGIN, "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn test_channel_rejects_foreign_origin() {
    let app = app(start_engine().await);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let url = format!("ws://{}/channels/asanatabs", addr);

    let mut request = url.clone().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("origin", "https://evil.example".parse().unwrap());
    match tokio_tungstenite::connect_async(request).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 403);
        }
        other => panic!("foreign origin was not rejected: {:?}", other.map(|_| ())),
    }

    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert("origin", EXTENSION_ORIGIN.parse().unwrap());
    assert!(tokio_tungstenite::connect_async(request).await.is_ok());
}
