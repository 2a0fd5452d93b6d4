//! Plain file-backed sink: appends each field's payload to a file handle,
//! the simplest concrete `DataSink` and the one the CLI binaries default to
//! when no journaling or FDB backend is configured.

use super::DataSink;
use crate::error::Result;
use crate::iostats::IoStats;
use crate::message::Message;
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

pub struct FileSink {
    handle: File,
    stats: IoStats,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let handle = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(FileSink { handle, stats: IoStats::new() })
    }

    pub fn stats(&self) -> &IoStats {
        &self.stats
    }
}

#[async_trait]
impl DataSink for FileSink {
    async fn write(&mut self, msg: &Message) -> Result<()> {
        let bytes = msg.payload().data();
        self.handle.write_all(bytes)?;
        self.stats.record_write(bytes.len() as u64);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.handle.flush()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Payload, Peer, Tag};
    use crate::metadata::Metadata;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn writes_payload_bytes_to_the_file() {
        let tmp = NamedTempFile::new().unwrap();
        let mut sink = FileSink::create(tmp.path()).unwrap();
        let msg = Message::new(Tag::Field, Peer::new("sim", 0), Peer::new("io", 0), Metadata::new(), Payload::new(vec![1, 2, 3]));
        sink.write(&msg).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(sink.stats().bytes_written(), 3);
        let contents = std::fs::read(tmp.path()).unwrap();
        assert_eq!(contents, vec![1, 2, 3]);
    }
}
