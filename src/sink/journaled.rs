//! `JournaledSink{inner, sink_id}` — wraps an inner `DataSink`, recording
//! every write into a `JournalWriter` before delegating to it. `Flush`
//! closes the in-progress journal record in addition to flushing the inner
//! sink, so the journal always contains a complete record of exactly the
//! writes that reached the underlying handle up to that point.

use super::DataSink;
use crate::error::Result;
use crate::journal::writer::JournalWriter;
use crate::message::Message;
use async_trait::async_trait;
use std::io::Write;
use std::sync::Mutex;

pub struct JournaledSink<W: Write + Send> {
    inner: Box<dyn DataSink>,
    journal: Mutex<JournalWriter<W>>,
    sink_id: u32,
}

impl<W: Write + Send> JournaledSink<W> {
    pub fn new(inner: Box<dyn DataSink>, journal_handle: W, sink_id: u32) -> Self {
        JournaledSink {
            inner,
            journal: Mutex::new(JournalWriter::new(journal_handle)),
            sink_id,
        }
    }
}

#[async_trait]
impl<W: Write + Send> DataSink for JournaledSink<W> {
    async fn write(&mut self, msg: &Message) -> Result<()> {
        self.journal.lock().unwrap().append_write(msg, self.sink_id)?;
        self.inner.write(msg).await
    }

    async fn flush(&mut self) -> Result<()> {
        self.journal.lock().unwrap().close_record()?;
        self.inner.flush().await
    }

    fn name(&self) -> &'static str {
        "journaled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Payload, Peer, Tag};
    use crate::metadata::Metadata;
    use crate::sink::file::FileSink;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn write_stages_a_journal_entry_and_delegates_to_inner() {
        let tmp = NamedTempFile::new().unwrap();
        let inner = FileSink::create(tmp.path()).unwrap();
        let mut sink = JournaledSink::new(Box::new(inner), Vec::new(), 7);

        let msg = Message::new(Tag::Field, Peer::new("sim", 0), Peer::new("io", 0), Metadata::new(), Payload::new(vec![1, 2, 3, 4]));
        sink.write(&msg).await.unwrap();
        assert!(sink.journal.lock().unwrap().has_pending_record());

        sink.flush().await.unwrap();
        assert!(!sink.journal.lock().unwrap().has_pending_record());

        let contents = std::fs::read(tmp.path()).unwrap();
        assert_eq!(contents, vec![1, 2, 3, 4]);
    }
}
