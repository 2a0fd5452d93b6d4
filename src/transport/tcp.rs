//! # TCP Socket Transport
//!
//! Connection-per-peer TCP transport (§2). The server side accepts one
//! connection per client and fans inbound frames into a single receive
//! queue; outbound sends look up the connection matching the message's
//! `destination` peer. The client side holds exactly one connection to the
//! server.
//!
//! Framing follows `transport::wire`: a `u32` length prefix, then
//! `[header][metadata][payload]`, mirroring the teacher's
//! `tcp_socket::read_message`/`write_message` length-prefixed protocol.

use super::wire;
use super::{SendError, Transport, TransportConfig};
use crate::error::{MultioError, Result};
use crate::message::{Message, Peer};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;
const INBOUND_QUEUE_CAPACITY: usize = 1024;

async fn read_frame(stream: &mut (impl tokio::io::AsyncRead + Unpin)) -> Result<Message> {
    let mut len_bytes = [0u8; 4];
    stream
        .read_exact(&mut len_bytes)
        .await
        .map_err(|e| MultioError::TransportFailure(format!("read length prefix: {e}")))?;
    let body_len = wire::frame_len_prefix(len_bytes) as usize;
    if body_len > MAX_FRAME_BYTES {
        return Err(MultioError::TransportFailure(format!(
            "frame too large: {body_len} bytes"
        )));
    }
    let mut body = vec![0u8; body_len];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| MultioError::TransportFailure(format!("read frame body: {e}")))?;
    wire::decode_body(&body)
}

async fn write_frame(stream: &mut (impl tokio::io::AsyncWrite + Unpin), msg: &Message) -> Result<()> {
    let framed = wire::encode_frame(msg);
    stream
        .write_all(&framed)
        .await
        .map_err(|e| MultioError::TransportFailure(format!("write frame: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| MultioError::TransportFailure(format!("flush frame: {e}")))
}

fn set_nodelay(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
}

enum Role {
    Server {
        connections: Arc<Mutex<HashMap<Peer, OwnedWriteHalf>>>,
        inbound: mpsc::Receiver<Message>,
    },
    Client {
        write_half: tokio::net::tcp::OwnedWriteHalf,
        inbound: mpsc::Receiver<Message>,
    },
}

/// TCP socket transport, connection-per-peer.
pub struct TcpTransport {
    local_peer: Peer,
    role: Role,
}

impl TcpTransport {
    /// Bind as a server and spawn an accept loop. Each accepted connection's
    /// first frame establishes which `Peer` it speaks for (its `source`);
    /// subsequent frames from that socket are routed to the shared inbound
    /// queue, and outbound sends to that peer are written back on the same
    /// socket.
    pub async fn bind_server(config: &TransportConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| MultioError::TransportFailure(format!("bind {addr}: {e}")))?;
        debug!("TCP transport listening on {}", listener.local_addr().unwrap());

        let connections: Arc<Mutex<HashMap<Peer, OwnedWriteHalf>>> = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);

        let accept_connections = connections.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("TCP accept failed: {e}");
                        break;
                    }
                };
                set_nodelay(&stream);
                let (mut read_half, write_half) = stream.into_split();
                let tx = tx.clone();
                let connections = accept_connections.clone();
                tokio::spawn(async move {
                    // The connection's peer identity isn't known until its
                    // first frame arrives (each frame carries its own
                    // `source`), so the write half is registered against
                    // `connections` only once that first frame is read.
                    let mut write_half = Some(write_half);
                    let mut registered_peer: Option<Peer> = None;
                    loop {
                        match read_frame(&mut read_half).await {
                            Ok(msg) => {
                                if let Some(half) = write_half.take() {
                                    let peer = msg.source().clone();
                                    connections.lock().await.insert(peer.clone(), half);
                                    registered_peer = Some(peer);
                                }
                                if tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                debug!("TCP connection closed: {e}");
                                break;
                            }
                        }
                    }
                    if let Some(peer) = registered_peer {
                        connections.lock().await.remove(&peer);
                    }
                });
            }
        });

        Ok(TcpTransport {
            local_peer: config.local_peer.clone(),
            role: Role::Server {
                connections,
                inbound: rx,
            },
        })
    }

    /// Connect as a client to a running server.
    pub async fn connect_client(config: &TransportConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| MultioError::TransportFailure(format!("connect {addr}: {e}")))?;
        set_nodelay(&stream);
        let (mut read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half).await {
                    Ok(msg) => {
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("TCP client connection closed: {e}");
                        break;
                    }
                }
            }
        });

        Ok(TcpTransport {
            local_peer: config.local_peer.clone(),
            role: Role::Client {
                write_half,
                inbound: rx,
            },
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, msg: Message) -> std::result::Result<(), SendError> {
        match &mut self.role {
            Role::Client { write_half, .. } => {
                if let Err(e) = write_frame(write_half, &msg).await {
                    return Err(SendError { error: e, message: msg });
                }
                Ok(())
            }
            Role::Server { connections, .. } => {
                let mut guard = connections.lock().await;
                match guard.get_mut(msg.destination()) {
                    Some(stream) => {
                        if let Err(e) = write_frame(stream, &msg).await {
                            return Err(SendError { error: e, message: msg });
                        }
                        Ok(())
                    }
                    None => Err(SendError {
                        error: MultioError::TransportFailure(format!(
                            "no open connection to peer {:?}",
                            msg.destination()
                        )),
                        message: msg,
                    }),
                }
            }
        }
    }

    async fn receive(&mut self) -> Result<Message> {
        let inbound = match &mut self.role {
            Role::Server { inbound, .. } => inbound,
            Role::Client { inbound, .. } => inbound,
        };
        inbound
            .recv()
            .await
            .ok_or_else(|| MultioError::TransportFailure("connection closed".into()))
    }

    fn local_peer(&self) -> &Peer {
        &self.local_peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Payload, Tag};
    use crate::metadata::Metadata;

    #[tokio::test]
    async fn client_server_round_trip() {
        let server_config = TransportConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            local_peer: Peer::new("server", 0),
            ..Default::default()
        };
        // Bind on an ephemeral port, then discover it for the client.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let server_config = TransportConfig {
            port,
            ..server_config
        };

        let mut server = TcpTransport::bind_server(&server_config).await.unwrap();
        // Give the accept loop a moment to start listening.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let client_config = TransportConfig {
            host: "127.0.0.1".to_string(),
            port,
            local_peer: Peer::new("client", 0),
            ..Default::default()
        };
        let mut client = TcpTransport::connect_client(&client_config).await.unwrap();

        let msg = Message::new(
            Tag::Notification,
            Peer::new("client", 0),
            Peer::new("server", 0),
            Metadata::new(),
            Payload::new(vec![42]),
        );
        client.send(msg).await.unwrap();

        let received = server.receive().await.unwrap();
        assert_eq!(received.payload().data(), &[42]);

        // Server can now reply along the same connection.
        let reply = Message::new(
            Tag::Notification,
            Peer::new("server", 0),
            Peer::new("client", 0),
            Metadata::new(),
            Payload::new(vec![7]),
        );
        server.send(reply).await.unwrap();
        let received_reply = client.receive().await.unwrap();
        assert_eq!(received_reply.payload().data(), &[7]);
    }
}
