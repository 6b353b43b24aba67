use crate::channel::ws::channel_handler;
use crate::model::Snapshot;
use crate::sync::{SyncHandle, SyncStatus};
use axum::{
    extract::State,
    http::{header::ORIGIN, HeaderMap, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Browser origins allowed to talk to the daemon.
///
/// A request without an `Origin` header did not come from a web page (the
/// terminal tab, curl) and is always allowed. A request with one must match
/// an entry exactly.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: Arc<Vec<HeaderValue>>,
}

impl OriginPolicy {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed = Vec::new();
        for origin in origins {
            let origin = origin.as_ref().trim_end_matches('/');
            if origin == "*" {
                warn!("[server] Ignoring wildcard origin, list origins explicitly");
                continue;
            }
            match HeaderValue::from_str(origin) {
                Ok(value) => allowed.push(value),
                Err(_) => warn!("[server] Ignoring invalid origin {:?}", origin),
            }
        }
        Self {
            allowed: Arc::new(allowed),
        }
    }

    pub fn allows(&self, headers: &HeaderMap) -> bool {
        match headers.get(ORIGIN) {
            None => true,
            Some(origin) => self.allowed.contains(origin),
        }
    }

    fn cors_layer(&self) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(self.allowed.iter().cloned()))
            .allow_methods([Method::GET, Method::POST])
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sync: SyncHandle,
    pub origins: OriginPolicy,
}

pub fn create_router(sync: SyncHandle, origins: OriginPolicy) -> Router {
    let cors = origins.cors_layer();
    let state = AppState { sync, origins };

    Router::new()
        .route("/health", get(health))
        .route("/snapshot", get(get_snapshot))
        .route("/pull", post(request_pull))
        .route("/channels/:name", get(channel_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Serialize)]
struct SnapshotResponse {
    snapshot: Snapshot,
    status: SyncStatus,
}

async fn get_snapshot(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SnapshotResponse>, StatusCode> {
    if !state.origins.allows(&headers) {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(Json(SnapshotResponse {
        snapshot: state.sync.snapshot().await,
        status: state.sync.status().await,
    }))
}

async fn request_pull(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if !state.origins.allows(&headers) {
        return StatusCode::FORBIDDEN;
    }
    if state.sync.request_pull().await {
        StatusCode::ACCEPTED
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
