//! # Message
//!
//! The unit of work flowing through transports, the listener, and the
//! action pipeline. Carries a tag, source/destination peers, a metadata map,
//! and an owning byte buffer whose ownership discipline is governed by
//! `acquire()` (see module docs on `Payload`).

use crate::error::{MultioError, Result};
use crate::metadata::{Metadata, Precision};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// `(domain, id)` identity of a client or server endpoint. Equality by both
/// fields; stable across a run and used for routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub domain: String,
    pub id: i64,
}

impl Peer {
    pub fn new(domain: impl Into<String>, id: i64) -> Self {
        Peer {
            domain: domain.into(),
            id,
        }
    }
}

/// Message tags. Order here fixes the wire tag-byte values (§6): never
/// reorder these variants across a wire-format version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Tag {
    Open = 0,
    Close = 1,
    Mapping = 2,
    Domain = 3,
    Mask = 4,
    Field = 5,
    Flush = 6,
    Notification = 7,
    StepComplete = 8,
    GribTemplate = 9,
}

impl Tag {
    pub fn from_byte(b: u8) -> Result<Self> {
        Ok(match b {
            0 => Tag::Open,
            1 => Tag::Close,
            2 => Tag::Mapping,
            3 => Tag::Domain,
            4 => Tag::Mask,
            5 => Tag::Field,
            6 => Tag::Flush,
            7 => Tag::Notification,
            8 => Tag::StepComplete,
            9 => Tag::GribTemplate,
            other => {
                return Err(MultioError::TransportFailure(format!(
                    "unknown wire tag byte {other}"
                )))
            }
        })
    }
}

/// A message payload buffer.
///
/// Before `acquire()`, the payload may be a view shared with other owners
/// (e.g. a message cached for later correlation and also referenced by the
/// caller that cached it). `acquire()` guarantees unique ownership, cloning
/// the underlying bytes only if another owner is still live — the same
/// "shared view vs. owned, unify via explicit handshake" contract the
/// source's `SharableBuffer` expresses, backed here by `Arc`'s
/// copy-on-write `make_mut`.
#[derive(Debug, Clone)]
pub struct Payload {
    data: Arc<Vec<u8>>,
}

impl Payload {
    pub fn new(data: Vec<u8>) -> Self {
        Payload {
            data: Arc::new(data),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Force unique ownership of the buffer. Idempotent: if this payload is
    /// already the sole owner, this is a no-op; otherwise the data is
    /// cloned. Callers that intend to mutate in place must call this first.
    pub fn acquire(&mut self) -> &mut Vec<u8> {
        Arc::make_mut(&mut self.data)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::new(data)
    }
}

/// The unit of work. See module docs.
#[derive(Debug, Clone)]
pub struct Message {
    tag: Tag,
    source: Peer,
    destination: Peer,
    metadata: Metadata,
    payload: Payload,
}

impl Message {
    pub fn new(tag: Tag, source: Peer, destination: Peer, metadata: Metadata, payload: Payload) -> Self {
        Message {
            tag,
            source,
            destination,
            metadata,
            payload,
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn source(&self) -> &Peer {
        &self.source
    }

    pub fn destination(&self) -> &Peer {
        &self.destination
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn modify_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Force unique ownership of the payload buffer; see `Payload::acquire`.
    pub fn acquire(&mut self) -> &mut Vec<u8> {
        self.payload.acquire()
    }

    /// The field's declared precision, per the `Field` invariant in §3.
    pub fn precision(&self) -> Result<Precision> {
        Precision::from_metadata(&self.metadata)
    }

    /// Validates the §3 `Field` invariant: `precision` is set and the
    /// payload size is a whole multiple of the precision's element size.
    pub fn validate_field(&self) -> Result<()> {
        if self.tag != Tag::Field {
            return Ok(());
        }
        let precision = self.precision()?;
        let elem = precision.size_of();
        if self.payload.size() % elem != 0 {
            return Err(MultioError::FieldError(format!(
                "payload size {} is not a multiple of precision element size {}",
                self.payload.size(),
                elem
            )));
        }
        Ok(())
    }
}
