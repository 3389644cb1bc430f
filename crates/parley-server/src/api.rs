use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::Method,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_shared::constants::PROTOCOL_VERSION;
use parley_shared::protocol::MessageEvent;
use parley_shared::{ConversationId, RetentionPolicy, UserId};
use parley_store::{Conversation, Database, Message};

use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::registry::Registry;
use crate::relay::Relay;
use crate::session::SessionOptions;
use crate::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub relay: Relay,
    pub broadcaster: Broadcaster,
    pub db: Arc<Mutex<Database>>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig, db: Arc<Mutex<Database>>) -> Self {
        let registry = Registry::new();
        Self {
            relay: Relay::new(registry.clone()),
            broadcaster: Broadcaster::new(registry.clone()),
            registry,
            db,
            config: Arc::new(config),
        }
    }

    /// Run a store call on the blocking pool, holding the database lock
    /// for its duration.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T, ServerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> Result<T, ServerError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = db.blocking_lock();
            f(&mut *guard)
        })
        .await?
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            max_frame_bytes: self.config.max_frame_bytes,
            notify_unreachable: self.config.notify_unreachable,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route("/ws", get(ws_handler))
        .route("/conversations", post(open_conversation))
        .route(
            "/conversations/:id/messages",
            post(store_message).get(list_messages),
        )
        .route("/conversations/:id/retention", put(set_retention))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    protocol: &'static str,
}

#[derive(Serialize)]
struct StatsResponse {
    connected: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenConversationRequest {
    user_a: UserId,
    user_b: UserId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreMessageRequest {
    sender_id: UserId,
    content: String,
}

#[derive(Serialize)]
struct StoreMessageResponse {
    message: MessageEvent,
    /// Connections the new-message event reached.
    notified: usize,
}

#[derive(Deserialize)]
struct RetentionRequest {
    policy: String,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

fn default_limit() -> u32 {
    50
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        protocol: PROTOCOL_VERSION,
    })
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        connected: state.registry.len().await,
    })
}

async fn open_conversation(
    State(state): State<AppState>,
    Json(req): Json<OpenConversationRequest>,
) -> Result<Json<Conversation>, ServerError> {
    let conversation = state
        .with_db(move |db| Ok(db.find_or_create_conversation(&req.user_a, &req.user_b)?))
        .await?;
    Ok(Json(conversation))
}

/// Store a message, then push it to every connected client.
async fn store_message(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    Json(req): Json<StoreMessageRequest>,
) -> Result<Json<StoreMessageResponse>, ServerError> {
    if req.content.is_empty() {
        return Err(ServerError::BadRequest("Message content is empty".into()));
    }

    let sender = req.sender_id.clone();
    let stored = state
        .with_db(move |db| Ok(db.store_message(id, &req.sender_id, &req.content)?))
        .await?;

    let event = MessageEvent::from(stored);
    let report = state.broadcaster.broadcast(id, event.clone()).await;

    info!(
        conversation = %id,
        sender = %sender.short(),
        notified = report.delivered,
        "Message stored"
    );

    Ok(Json(StoreMessageResponse {
        message: event,
        notified: report.delivered,
    }))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let (limit, offset) = (page.limit.min(500), page.offset);
    let messages = state
        .with_db(move |db| {
            db.get_conversation(id)?;
            Ok(db.get_messages(id, limit, offset)?)
        })
        .await?;
    Ok(Json(messages))
}

async fn set_retention(
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    Json(req): Json<RetentionRequest>,
) -> Result<Json<Conversation>, ServerError> {
    let policy: RetentionPolicy = req
        .policy
        .parse()
        .map_err(|e: parley_shared::ProtocolError| ServerError::BadRequest(e.to_string()))?;

    let conversation = state
        .with_db(move |db| {
            db.set_retention_policy(id, policy)?;
            Ok(db.get_conversation(id)?)
        })
        .await?;
    info!(conversation = %id, policy = %policy, "Retention policy updated");
    Ok(Json(conversation))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionHandle;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use parley_shared::protocol::{Notice, ServerMessage};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn state() -> AppState {
        let db = Database::open_in_memory().unwrap();
        AppState::new(ServerConfig::default(), Arc::new(Mutex::new(db)))
    }

    async fn call(state: &AppState, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn open(state: &AppState, a: &str, b: &str) -> String {
        let (status, body) = call(state, "POST", "/conversations", json!({"userA": a, "userB": b})).await;
        assert_eq!(status, StatusCode::OK);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = build_router(state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_open_conversation_is_order_independent() {
        let state = state();
        let first = open(&state, "u1", "u2").await;
        let second = open(&state, "u2", "u1").await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_stored_message_is_broadcast_to_everyone() {
        let state = state();
        let id = open(&state, "u1", "u2").await;

        let (bystander, mut rx) = ConnectionHandle::new(4);
        state.registry.register(UserId::new("u7"), bystander).await;

        let (status, body) = call(
            &state,
            "POST",
            &format!("/conversations/{id}/messages"),
            json!({"senderId": "u1", "content": "hello"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notified"], 1);

        match rx.try_recv().unwrap() {
            ServerMessage::Notice(Notice::NewMessage {
                conversation_id,
                message,
            }) => {
                assert_eq!(conversation_id.to_string(), id);
                assert_eq!(message.content, "hello");
            }
            other => panic!("unexpected {other:?}"),
        }

        let (status, body) = call(&state, "GET", &format!("/conversations/{id}/messages"), Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["senderId"], "u1");
        assert_eq!(body[0]["conversationId"], id.as_str());
    }

    #[tokio::test]
    async fn test_outsider_cannot_store_message() {
        let state = state();
        let id = open(&state, "u1", "u2").await;
        let (status, _) = call(
            &state,
            "POST",
            &format!("/conversations/{id}/messages"),
            json!({"senderId": "u3", "content": "hi"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_retention_policy_validation() {
        let state = state();
        let id = open(&state, "u1", "u2").await;
        let uri = format!("/conversations/{id}/retention");

        let (status, body) = call(&state, "PUT", &uri, json!({"policy": "1week"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["retentionPolicy"], "1week");
        assert!(body["lastActivity"].is_string());
        assert!(body["lastClearedAt"].is_null());

        let (status, _) = call(&state, "PUT", &uri, json!({"policy": "fortnight"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing = format!("/conversations/{}/retention", ConversationId::new());
        let (status, _) = call(&state, "PUT", &missing, json!({"policy": "24h"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
