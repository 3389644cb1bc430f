//! Signaling relay.
//!
//! Forwards call-signaling messages to exactly one target connection,
//! tagging them with the sender's verified identity. The payload is never
//! inspected. An unreachable target is an ordinary outcome: nothing is
//! queued or retried.

use tracing::debug;

use parley_shared::protocol::{SignalKind, SignalMessage};
use parley_shared::UserId;

use crate::connection::DeliveryError;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unreachable {
    /// No connection is registered for the target.
    NotRegistered,
    /// The registered connection has already closed.
    Closed,
    /// The target's outbound buffer is full.
    Congested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Delivered,
    Unreachable(Unreachable),
    /// The originating connection has not authenticated.
    Rejected,
}

#[derive(Clone)]
pub struct Relay {
    registry: Registry,
}

impl Relay {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Forward `message` to its target on behalf of `sender`.
    ///
    /// `sender` is the identity bound to the originating connection, or
    /// `None` if it never authenticated. Frames from one sender to one
    /// target are delivered in call order.
    pub async fn forward(&self, sender: Option<&UserId>, message: SignalMessage) -> ForwardOutcome {
        let Some(sender) = sender else {
            debug!(kind = %message.kind, "Rejected signal from unauthenticated connection");
            return ForwardOutcome::Rejected;
        };

        let kind = message.kind;
        let target = message.target.clone();

        let Some(conn) = self.registry.lookup(&target).await else {
            log_unreachable(sender, &target, kind, Unreachable::NotRegistered);
            return ForwardOutcome::Unreachable(Unreachable::NotRegistered);
        };

        match conn.deliver(message.relay(sender.clone()).into()) {
            Ok(()) => {
                debug!(
                    from = %sender.short(),
                    target = %target.short(),
                    kind = %kind,
                    "Signal forwarded"
                );
                ForwardOutcome::Delivered
            }
            Err(e) => {
                let reason = match e {
                    DeliveryError::Closed => Unreachable::Closed,
                    DeliveryError::BufferFull => Unreachable::Congested,
                };
                log_unreachable(sender, &target, kind, reason);
                ForwardOutcome::Unreachable(reason)
            }
        }
    }
}

fn log_unreachable(sender: &UserId, target: &UserId, kind: SignalKind, reason: Unreachable) {
    debug!(
        from = %sender.short(),
        target = %target.short(),
        kind = %kind,
        reason = ?reason,
        "Signal target unreachable, dropping"
    );
}
