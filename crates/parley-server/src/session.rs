//! Per-connection protocol state, independent of the socket.
//!
//! A [`Session`] decodes each inbound text frame once, binds the
//! connection's identity on `auth`, and hands signals to the relay. On
//! close it leaves the registry, unless a newer connection has already
//! taken its identity over.

use tracing::{debug, info};

use parley_shared::protocol::{ClientMessage, Notice, ServerMessage};
use parley_shared::{ProtocolError, UserId};

use crate::connection::ConnectionHandle;
use crate::registry::Registry;
use crate::relay::{ForwardOutcome, Relay};

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub max_frame_bytes: usize,
    pub notify_unreachable: bool,
}

/// What became of one inbound frame.
#[derive(Debug)]
pub enum FrameOutcome {
    Authenticated(UserId),
    Forwarded(ForwardOutcome),
    Dropped(ProtocolError),
}

pub struct Session {
    connection: ConnectionHandle,
    identity: Option<UserId>,
    registry: Registry,
    relay: Relay,
    options: SessionOptions,
}

impl Session {
    pub fn new(
        connection: ConnectionHandle,
        registry: Registry,
        relay: Relay,
        options: SessionOptions,
    ) -> Self {
        Self {
            connection,
            identity: None,
            registry,
            relay,
            options,
        }
    }

    pub fn identity(&self) -> Option<&UserId> {
        self.identity.as_ref()
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub async fn handle_text(&mut self, text: &str) -> FrameOutcome {
        if text.len() > self.options.max_frame_bytes {
            let err = ProtocolError::TooLarge {
                size: text.len(),
                max: self.options.max_frame_bytes,
            };
            debug!(conn = %self.connection.id(), error = %err, "Dropping frame");
            return FrameOutcome::Dropped(err);
        }

        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(err) => {
                debug!(conn = %self.connection.id(), error = %err, "Dropping frame");
                return FrameOutcome::Dropped(err);
            }
        };

        match message {
            ClientMessage::Auth { user_id } => {
                self.bind(user_id.clone()).await;
                FrameOutcome::Authenticated(user_id)
            }
            ClientMessage::Signal(signal) => {
                let kind = signal.kind;
                let target = signal.target.clone();
                let outcome = self.relay.forward(self.identity.as_ref(), signal).await;

                match outcome {
                    ForwardOutcome::Rejected => self.reply(Notice::Error {
                        reason: "unauthenticated".to_string(),
                    }),
                    ForwardOutcome::Unreachable(reason) if self.options.notify_unreachable => {
                        debug!(conn = %self.connection.id(), ?reason, "Notifying sender");
                        self.reply(Notice::Unreachable { target, kind })
                    }
                    _ => {}
                }
                FrameOutcome::Forwarded(outcome)
            }
        }
    }

    /// Transition the connection to `Closed` and drop its registry entry.
    pub async fn close(&mut self) {
        if !self.connection.mark_closed() {
            return;
        }
        if let Some(identity) = self.identity.take() {
            self.registry
                .remove_if_current(&identity, self.connection.id())
                .await;
            info!(user = %identity.short(), conn = %self.connection.id(), "Connection closed");
        } else {
            debug!(conn = %self.connection.id(), "Unauthenticated connection closed");
        }
    }

    async fn bind(&mut self, user_id: UserId) {
        if let Some(previous) = self.identity.take() {
            if previous != user_id {
                self.registry
                    .remove_if_current(&previous, self.connection.id())
                    .await;
            }
        }

        self.registry
            .register(user_id.clone(), self.connection.clone())
            .await;
        info!(user = %user_id.short(), conn = %self.connection.id(), "Connection authenticated");

        self.identity = Some(user_id.clone());
        self.reply(Notice::AuthOk { user_id });
    }

    fn reply(&self, notice: Notice) {
        let message: ServerMessage = notice.into();
        if let Err(e) = self.connection.deliver(message) {
            debug!(conn = %self.connection.id(), error = %e, "Reply not delivered");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.connection.mark_closed() {
            return;
        }
        // Dropped without `close`, e.g. the connection task was cancelled.
        let Some(identity) = self.identity.take() else {
            return;
        };
        let registry = self.registry.clone();
        let conn_id = self.connection.id();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                registry.remove_if_current(&identity, conn_id).await;
            });
        }
    }
}
