//! Pushes stored-message events to every registered connection.
//!
//! Recipients are not filtered by conversation membership; clients decide
//! relevance from the `conversationId` tag.

use tracing::{debug, warn};

use parley_shared::protocol::{MessageEvent, Notice, ServerMessage};
use parley_shared::ConversationId;

use crate::registry::Registry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Broadcaster {
    registry: Registry,
}

impl Broadcaster {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Deliver `event` to all registered connections. A failed send to one
    /// connection is counted and skipped.
    pub async fn broadcast(
        &self,
        conversation_id: ConversationId,
        event: MessageEvent,
    ) -> BroadcastReport {
        let message: ServerMessage = Notice::NewMessage {
            conversation_id,
            message: event,
        }
        .into();

        let mut report = BroadcastReport::default();
        for (user, conn) in self.registry.snapshot().await {
            match conn.deliver(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    debug!(user = %user.short(), error = %e, "Notification not delivered");
                }
            }
        }

        if report.failed > 0 {
            warn!(
                conversation = %conversation_id,
                delivered = report.delivered,
                failed = report.failed,
                "Broadcast partially failed"
            );
        } else {
            debug!(
                conversation = %conversation_id,
                delivered = report.delivered,
                "Broadcast new message"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionHandle;
    use chrono::Utc;
    use parley_shared::UserId;

    fn event(conversation_id: ConversationId) -> MessageEvent {
        MessageEvent {
            id: uuid::Uuid::new_v4(),
            conversation_id,
            sender_id: UserId::new("u1"),
            content: "hello".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_reaches_uninvolved_connections() {
        let registry = Registry::new();
        let broadcaster = Broadcaster::new(registry.clone());
        let (u1, mut rx1) = ConnectionHandle::new(4);
        let (u7, mut rx7) = ConnectionHandle::new(4);
        registry.register(UserId::new("u1"), u1).await;
        registry.register(UserId::new("u7"), u7).await;

        let conversation = ConversationId::new();
        let report = broadcaster.broadcast(conversation, event(conversation)).await;
        assert_eq!(report, BroadcastReport { delivered: 2, failed: 0 });

        for rx in [&mut rx1, &mut rx7] {
            match rx.try_recv().unwrap() {
                ServerMessage::Notice(Notice::NewMessage {
                    conversation_id, ..
                }) => assert_eq!(conversation_id, conversation),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let registry = Registry::new();
        let broadcaster = Broadcaster::new(registry.clone());
        let (closed, _rc) = ConnectionHandle::new(4);
        let (full, _rf) = ConnectionHandle::new(1);
        let (ok, mut rx_ok) = ConnectionHandle::new(4);
        closed.mark_closed();
        full.deliver(Notice::Error { reason: "filler".into() }.into())
            .unwrap();
        registry.register(UserId::new("closed"), closed).await;
        registry.register(UserId::new("full"), full).await;
        registry.register(UserId::new("ok"), ok).await;

        let conversation = ConversationId::new();
        let report = broadcaster.broadcast(conversation, event(conversation)).await;
        assert_eq!(report, BroadcastReport { delivered: 1, failed: 2 });
        assert!(rx_ok.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let broadcaster = Broadcaster::new(Registry::new());
        let conversation = ConversationId::new();
        assert_eq!(
            broadcaster.broadcast(conversation, event(conversation)).await,
            BroadcastReport::default()
        );
    }
}
