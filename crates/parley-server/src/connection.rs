//! Server-side handle to one client connection.
//!
//! The transport owns the socket; everything else talks to the client
//! through a [`ConnectionHandle`], which pushes frames into a bounded
//! outbound queue drained by the socket writer. A full queue drops the
//! frame instead of waiting, so a slow client never stalls its senders.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use parley_shared::protocol::ServerMessage;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection is closed")]
    Closed,

    #[error("outbound buffer full")]
    BufferFull,
}

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
    open: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// Create an open connection with an outbound queue of `buffer` frames.
    /// The receiver half belongs to the socket writer.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            tx,
            open: Arc::new(AtomicBool::new(true)),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        if self.open.load(Ordering::Acquire) && !self.tx.is_closed() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Queue a frame for the client without waiting.
    pub fn deliver(&self, message: ServerMessage) -> Result<(), DeliveryError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed);
        }
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::BufferFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Move to `Closed`. Returns `true` only for the call that performed
    /// the transition.
    pub fn mark_closed(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::protocol::Notice;

    fn notice(reason: &str) -> ServerMessage {
        Notice::Error {
            reason: reason.to_string(),
        }
        .into()
    }

    #[tokio::test]
    async fn test_deliver_in_order() {
        let (conn, mut rx) = ConnectionHandle::new(8);
        conn.deliver(notice("a")).unwrap();
        conn.deliver(notice("b")).unwrap();

        assert_eq!(rx.recv().await.unwrap(), notice("a"));
        assert_eq!(rx.recv().await.unwrap(), notice("b"));
    }

    #[test]
    fn test_full_buffer_drops_instead_of_blocking() {
        let (conn, _rx) = ConnectionHandle::new(1);
        conn.deliver(notice("a")).unwrap();
        assert_eq!(conn.deliver(notice("b")), Err(DeliveryError::BufferFull));
    }

    #[test]
    fn test_close_transition_happens_once() {
        let (conn, _rx) = ConnectionHandle::new(1);
        assert_eq!(conn.state(), ConnectionState::Open);

        assert!(conn.mark_closed());
        assert!(!conn.mark_closed());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.deliver(notice("late")), Err(DeliveryError::Closed));
    }

    #[test]
    fn test_dropped_writer_reads_as_closed() {
        let (conn, rx) = ConnectionHandle::new(1);
        drop(rx);
        assert!(!conn.is_open());
        assert_eq!(conn.deliver(notice("x")), Err(DeliveryError::Closed));
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _ra) = ConnectionHandle::new(1);
        let (b, _rb) = ConnectionHandle::new(1);
        assert_ne!(a.id(), b.id());
    }
}
