//! # Thread Transport
//!
//! In-process transport backed by per-peer `tokio::mpsc` queues. Unlike MPI
//! or TCP, the thread transport bypasses wire framing entirely and passes
//! the `Message` object directly (§4.2) — there's no serialization boundary
//! to cross within one process.
//!
//! Peers register their inbox with a shared `ThreadBroker`; the broker is
//! explicit state owned by whichever code wires up client(s) and server(s)
//! in-process (a test harness, or the `thread` CLI mode of `multio-hammer`).
//! It is deliberately not a global/static registry — see Design Notes §9 on
//! avoiding incidental process-wide mutable state.

use super::{SendError, Transport};
use crate::error::{MultioError, Result};
use crate::message::{Message, Peer};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const INBOX_CAPACITY: usize = 1024;

/// Shared registry of in-process peer inboxes.
#[derive(Clone, Default)]
pub struct ThreadBroker {
    inboxes: Arc<Mutex<HashMap<Peer, mpsc::Sender<Message>>>>,
}

impl ThreadBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer`'s inbox, returning the receiving half the transport
    /// will poll in `receive()`.
    fn register(&self, peer: Peer) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        self.inboxes.lock().unwrap().insert(peer, tx);
        rx
    }

    fn sender_for(&self, peer: &Peer) -> Option<mpsc::Sender<Message>> {
        self.inboxes.lock().unwrap().get(peer).cloned()
    }
}

pub struct ThreadTransport {
    broker: ThreadBroker,
    local_peer: Peer,
    inbox: mpsc::Receiver<Message>,
}

impl ThreadTransport {
    /// Join `broker` as `local_peer`, registering an inbox for it.
    pub fn new(broker: ThreadBroker, local_peer: Peer) -> Self {
        let inbox = broker.register(local_peer.clone());
        ThreadTransport {
            broker,
            local_peer,
            inbox,
        }
    }
}

#[async_trait]
impl Transport for ThreadTransport {
    async fn send(&mut self, msg: Message) -> std::result::Result<(), SendError> {
        let Some(sender) = self.broker.sender_for(msg.destination()) else {
            return Err(SendError {
                error: MultioError::TransportFailure(format!(
                    "no registered peer {:?}",
                    msg.destination()
                )),
                message: msg,
            });
        };
        if let Err(tokio::sync::mpsc::error::SendError(msg)) = sender.send(msg).await {
            return Err(SendError {
                error: MultioError::TransportFailure("peer inbox closed".into()),
                message: msg,
            });
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Message> {
        self.inbox
            .recv()
            .await
            .ok_or_else(|| MultioError::TransportFailure("inbox closed".into()))
    }

    fn local_peer(&self) -> &Peer {
        &self.local_peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Tag;
    use crate::metadata::Metadata;
    use crate::message::Payload;

    #[tokio::test]
    async fn delivers_in_send_order_per_source() {
        let broker = ThreadBroker::new();
        let client = Peer::new("client", 0);
        let server = Peer::new("server", 0);

        let mut client_transport = ThreadTransport::new(broker.clone(), client.clone());
        let mut server_transport = ThreadTransport::new(broker.clone(), server.clone());

        for i in 0..3 {
            let msg = Message::new(
                Tag::Notification,
                client.clone(),
                server.clone(),
                Metadata::new(),
                Payload::new(vec![i]),
            );
            client_transport.send(msg).await.unwrap();
        }

        for i in 0..3 {
            let received = server_transport.receive().await.unwrap();
            assert_eq!(received.payload().data(), &[i]);
        }
    }

    #[tokio::test]
    async fn send_to_unregistered_peer_returns_message() {
        let broker = ThreadBroker::new();
        let mut transport = ThreadTransport::new(broker, Peer::new("client", 0));
        let msg = Message::new(
            Tag::Flush,
            Peer::new("client", 0),
            Peer::new("ghost", 9),
            Metadata::new(),
            Payload::empty(),
        );
        let err = transport.send(msg).await.unwrap_err();
        assert_eq!(err.message.destination(), &Peer::new("ghost", 9));
    }
}
