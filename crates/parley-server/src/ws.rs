//! WebSocket transport for the relay.
//!
//! Each socket gets a reader loop feeding a [`Session`] and a writer task
//! draining the connection's outbound queue. When the reader stops, the
//! session is closed before anything else happens, so the identity stops
//! being a forwarding target right away.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, trace, warn};

use crate::api::AppState;
use crate::connection::ConnectionHandle;
use crate::session::{FrameOutcome, Session};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| run_connection(socket, state))
}

async fn run_connection(socket: WebSocket, state: AppState) {
    let (handle, mut outbound) = ConnectionHandle::new(state.config.outbound_buffer);
    let conn_id = handle.id();
    let mut session = Session::new(
        handle,
        state.registry.clone(),
        state.relay.clone(),
        state.session_options(),
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match message.to_text() {
                Ok(text) => text,
                Err(e) => {
                    warn!(conn = %conn_id, error = %e, "Failed to encode outbound frame");
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                break; // client disconnected
            }
        }
    });

    debug!(conn = %conn_id, "WebSocket connected");

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match session.handle_text(&text).await {
                FrameOutcome::Authenticated(user) => {
                    trace!(conn = %conn_id, user = %user.short(), "Auth frame handled");
                }
                FrameOutcome::Forwarded(outcome) => {
                    trace!(
                        conn = %conn_id,
                        user = ?session.identity().map(|u| u.short()),
                        ?outcome,
                        "Signal frame handled"
                    );
                }
                FrameOutcome::Dropped(err) => {
                    trace!(conn = %conn_id, error = %err, "Frame dropped");
                }
            },
            Ok(WsMessage::Binary(_)) => {
                debug!(conn = %conn_id, "Dropping binary frame");
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {} // ping/pong
            Err(e) => {
                debug!(conn = %conn_id, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    session.close().await;
    writer.abort();
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::Mutex;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use parley_store::Database;

    use crate::api::{build_router, AppState};
    use crate::config::ServerConfig;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn spawn_server() -> (SocketAddr, AppState) {
        let db = Database::open_in_memory().unwrap();
        let state = AppState::new(ServerConfig::default(), Arc::new(Mutex::new(db)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, state)
    }

    async fn send(client: &mut Client, value: Value) {
        client.send(Message::Text(value.to_string().into())).await.unwrap();
    }

    async fn recv(client: &mut Client) -> Option<Value> {
        loop {
            let next = tokio::time::timeout(Duration::from_millis(500), client.next())
                .await
                .ok()??;
            if let Message::Text(text) = next.unwrap() {
                return Some(serde_json::from_str(&text).unwrap());
            }
        }
    }

    async fn connect(addr: SocketAddr, user: &str) -> Client {
        let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        send(&mut client, json!({"type": "auth", "userId": user})).await;
        let ack = recv(&mut client).await.unwrap();
        assert_eq!(ack, json!({"type": "auth-ok", "userId": user}));
        client
    }

    #[tokio::test]
    async fn test_offer_relayed_over_websocket() {
        let (addr, _state) = spawn_server().await;
        let mut u1 = connect(addr, "u1").await;
        let mut u2 = connect(addr, "u2").await;

        send(
            &mut u2,
            json!({"type": "offer", "target": "u1", "from": "spoofed", "data": {"sdp": "v=0"}}),
        )
        .await;

        let delivered = recv(&mut u1).await.unwrap();
        assert_eq!(
            delivered,
            json!({"type": "offer", "from": "u2", "data": {"sdp": "v=0"}})
        );
        assert!(recv(&mut u1).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_target_keeps_connection_open() {
        let (addr, _state) = spawn_server().await;
        let mut u3 = connect(addr, "u3").await;

        send(&mut u3, json!({"type": "call-start", "target": "u9", "data": {}})).await;
        send(&mut u3, json!({"garbage": true})).await;
        assert!(recv(&mut u3).await.is_none());

        // Still open and still serviced.
        send(&mut u3, json!({"type": "auth", "userId": "u3"})).await;
        assert_eq!(
            recv(&mut u3).await.unwrap(),
            json!({"type": "auth-ok", "userId": "u3"})
        );
    }

    #[tokio::test]
    async fn test_disconnect_unregisters() {
        let (addr, state) = spawn_server().await;
        let mut u1 = connect(addr, "u1").await;
        assert_eq!(state.registry.len().await, 1);

        u1.close(None).await.unwrap();
        drop(u1);

        let mut gone = false;
        for _ in 0..50 {
            if state.registry.is_empty().await {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone);
    }
}
