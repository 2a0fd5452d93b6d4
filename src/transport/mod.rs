//! # Transport (polymorphic)
//!
//! Three variants — MPI, TCP, in-process thread — behind a single
//! `Transport` trait (§4.2). All are async: `receive` blocks until the next
//! message addressed to `local_peer()` arrives, `send` may block behind the
//! transport's local buffering, and a failed `send` leaves the message
//! uncoonsumed (the caller still owns it and may retry or escalate).

pub mod mpi;
pub mod thread;
pub mod tcp;
pub mod wire;

use crate::error::{MultioError, Result};
use crate::message::{Message, Peer};
use async_trait::async_trait;

/// Configuration shared across transport variants; which fields apply
/// depends on the variant (mirrors the teacher's single flat
/// `TransportConfig`, since most benchmark/runtime parameters don't vary
/// enough per-transport to justify a fully disjoint config type per kind).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// TCP: address to bind (server) or connect to (client).
    pub host: String,
    pub port: u16,
    /// MPI: named communicator to operate within.
    pub communicator_name: String,
    /// Local peer identity reported by `local_peer()`.
    pub local_peer: Peer,
    /// Buffer size for internal queues/sockets.
    pub buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            kind: TransportKind::Thread,
            host: "127.0.0.1".to_string(),
            port: 0,
            communicator_name: "multio".to_string(),
            local_peer: Peer::new("client", 0),
            buffer_size: 8192,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Mpi,
    Tcp,
    Thread,
}

impl TransportKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "mpi" => Ok(TransportKind::Mpi),
            "tcp" => Ok(TransportKind::Tcp),
            "thread" => Ok(TransportKind::Thread),
            other => Err(MultioError::Configuration(format!(
                "unknown transport kind '{other}'"
            ))),
        }
    }
}

/// Common interface implemented by every transport variant.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `msg` to its `destination`. Synchronous w.r.t. local
    /// buffering, asynchronous w.r.t. remote processing. A failed send does
    /// not consume the message — implementations return it back in the
    /// error so the caller can retry or escalate.
    async fn send(&mut self, msg: Message) -> std::result::Result<(), SendError>;

    /// Block until the next message addressed to `local_peer()` arrives.
    /// Messages from a single source arrive in send order; across sources,
    /// order is unspecified.
    async fn receive(&mut self) -> Result<Message>;

    /// This transport's local peer identity.
    fn local_peer(&self) -> &Peer;
}

/// A `send` failure; carries the message back so it is not silently lost.
#[derive(Debug)]
pub struct SendError {
    pub error: MultioError,
    pub message: Message,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for SendError {}
