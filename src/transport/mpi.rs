//! # MPI Transport
//!
//! Uses ranks within a named communicator as peer identities. The real MPI
//! bindings (the `mpi` crate, a.k.a. rsmpi) link against a system MPI
//! installation, so this module is feature-gated behind `mpi-transport`
//! (off by default) rather than a hard dependency — the MPI primitives
//! themselves are explicitly out of core scope per §1; only the transport
//! contract shape is specified here.
//!
//! With the feature disabled, `MpiTransport` still exists so callers can
//! reference the type and configuration plumbing can still name `"mpi"` as
//! a transport kind; attempting to actually start one without the feature
//! fails with `MultioError::Configuration`.

use super::{SendError, Transport, TransportConfig};
use crate::error::{MultioError, Result};
use crate::message::{Message, Peer};
use async_trait::async_trait;

#[cfg(feature = "mpi-transport")]
mod imp {
    use super::*;
    use crate::transport::wire;
    use mpi::environment::Universe;
    use mpi::topology::Communicator;
    use mpi::point_to_point::{Destination, Source};
    use std::sync::Mutex;

    pub struct MpiTransport {
        // `Universe` must outlive the communicator/world it produced.
        _universe: Universe,
        world: mpi::topology::SimpleCommunicator,
        local_peer: Peer,
        // rsmpi's point-to-point calls take `&self`; callers of our trait
        // need `&mut self`, so the send/receive buffers are behind a lock
        // rather than duplicated state.
        scratch: Mutex<Vec<u8>>,
    }

    impl MpiTransport {
        pub fn connect(config: &TransportConfig) -> Result<Self> {
            let (universe, _threading) = mpi::initialize_with_threading(mpi::Threading::Serialized)
                .ok_or_else(|| MultioError::TransportFailure("MPI_Init failed".into()))?;
            let world = universe.world();
            Ok(MpiTransport {
                _universe: universe,
                world,
                local_peer: Peer::new(&config.communicator_name, world.rank() as i64),
                scratch: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Transport for MpiTransport {
        async fn send(&mut self, msg: Message) -> std::result::Result<(), SendError> {
            let rank = msg.destination().id as i32;
            let body = wire::encode_body(&msg);
            let process = self.world.process_at_rank(rank);
            // MPI sends are blocking from rsmpi's synchronous API; run on a
            // blocking thread so we don't stall the async runtime.
            let result = tokio::task::block_in_place(|| {
                process.send(&body[..]);
            });
            let _ = result;
            Ok(())
        }

        async fn receive(&mut self) -> Result<Message> {
            let world = &self.world;
            let (body, _status) = tokio::task::block_in_place(|| world.any_process().receive_vec::<u8>());
            wire::decode_body(&body)
        }

        fn local_peer(&self) -> &Peer {
            &self.local_peer
        }
    }
}

#[cfg(feature = "mpi-transport")]
pub use imp::MpiTransport;

/// Stub present when the `mpi-transport` feature is disabled, so transport
/// factories and configuration parsing can still name `"mpi"` without a
/// `cfg`-gated hole in the match.
#[cfg(not(feature = "mpi-transport"))]
pub struct MpiTransport {
    local_peer: Peer,
}

#[cfg(not(feature = "mpi-transport"))]
impl MpiTransport {
    pub fn connect(config: &TransportConfig) -> Result<Self> {
        let _ = config;
        Err(MultioError::Configuration(
            "MPI transport requested but the crate was built without the `mpi-transport` feature"
                .into(),
        ))
    }
}

#[cfg(not(feature = "mpi-transport"))]
#[async_trait]
impl Transport for MpiTransport {
    async fn send(&mut self, msg: Message) -> std::result::Result<(), SendError> {
        Err(SendError {
            error: MultioError::Configuration("mpi-transport feature disabled".into()),
            message: msg,
        })
    }

    async fn receive(&mut self) -> Result<Message> {
        Err(MultioError::Configuration(
            "mpi-transport feature disabled".into(),
        ))
    }

    fn local_peer(&self) -> &Peer {
        &self.local_peer
    }
}
