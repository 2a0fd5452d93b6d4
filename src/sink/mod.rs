//! # Sink registry & DataSink
//!
//! The terminal write surface for the action pipeline, grounded on
//! `multio::server::Sink`/`multio::DataSink`
//! (`examples/original_source/src/multio/server/Sink.h`): a polymorphic
//! `DataSink` is wrapped by the `Action::Sink` stage, which forwards
//! `write`/`flush` calls and does not itself forward messages downstream.

pub mod fdb;
pub mod file;
pub mod journaled;

use crate::config::SinkConfig;
use crate::error::{MultioError, Result};
use crate::message::Message;
use async_trait::async_trait;

/// A terminal destination for field data: a plain file, FDB, or a
/// journaling wrapper around either. `write` consumes one message's
/// payload; `flush` is triggered by the pipeline's `Flush` tag.
#[async_trait]
pub trait DataSink: Send {
    async fn write(&mut self, msg: &Message) -> Result<()>;
    async fn flush(&mut self) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Construct a `DataSink` from a `SinkConfig` (§9's registration-by-name
/// factory, applied to sinks). FDB is a stub: the real backend is an
/// external collaborator out of core scope (§1); a host application
/// substitutes its own `FdbClient` impl that wraps the genuine client.
///
/// When `config.journaled` is set, the constructed sink is wrapped in a
/// `JournaledSink` backed by a file alongside the sink's own
/// (`<path>.journal`), so every write staged into the sink is also
/// recorded to the journal, with the record closed on `Flush` (§4.5).
pub fn build(config: &SinkConfig) -> Result<Box<dyn DataSink>> {
    let inner: Box<dyn DataSink> = match config.kind.as_str() {
        "file" => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| MultioError::Configuration("file sink requires a path".into()))?;
            Box::new(file::FileSink::create(path)?)
        }
        other => {
            return Err(MultioError::Configuration(format!("unknown sink kind '{other}'")));
        }
    };

    if !config.journaled {
        return Ok(inner);
    }

    let path = config.path.as_deref().ok_or_else(|| {
        MultioError::Configuration("journaled sink requires a path to derive the journal file from".into())
    })?;
    let journal_path = format!("{path}.journal");
    let journal_handle = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&journal_path)?;
    Ok(Box::new(journaled::JournaledSink::new(inner, journal_handle, 0)))
}
