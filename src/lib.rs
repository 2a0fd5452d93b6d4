//! # multio
//!
//! An I/O multiplexer for NWP model output: clients stream field data over a
//! pluggable transport (MPI / TCP / in-process thread), a server-side
//! listener dispatches each message through a configurable action pipeline
//! (selection, numeric transforms, aggregation, temporal statistics,
//! encoding), and a terminal sink writes the result — optionally journaled
//! for replay.
//!
//! The crate is organized around the components from the design: `message`
//! and `metadata` are the data model everything else operates on;
//! `transport` carries messages between peers; `listener` drives the
//! server-side receive loop; `action` is the pipeline stage catalogue;
//! `sink` and `journal` are the write path; `iostats` instruments it;
//! `config` turns a `serde_json::Value` tree into typed pipeline
//! definitions; `capi` is the C ABI surface for embedding in the original
//! C++ host application.

pub mod action;
pub mod capi;
pub mod config;
pub mod error;
pub mod iostats;
pub mod journal;
pub mod listener;
pub mod logging;
pub mod message;
pub mod metadata;
pub mod numeric;
pub mod sink;
pub mod transport;

pub use error::{FailurePolicy, MultioError, Result};
pub use listener::Listener;
pub use message::{Message, Payload, Peer, Tag};
pub use metadata::{Metadata, Precision};

/// The current version of the multio core, as built.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
