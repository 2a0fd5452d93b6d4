//! `Sink{data_sink}` — the terminal pipeline stage. Grounded on
//! `multio::server::Sink` (`examples/original_source/src/multio/server/Sink.h`):
//! writes every message via the wrapped `DataSink` and never calls
//! `execute_next`, since nothing can meaningfully follow a write. `Flush`
//! triggers `DataSink::flush()` instead of a write.

use super::Action;
use crate::error::Result;
use crate::message::{Message, Tag};
use crate::sink::DataSink;
use async_trait::async_trait;

pub struct Sink {
    data_sink: Box<dyn DataSink>,
}

impl Sink {
    pub fn new(data_sink: Box<dyn DataSink>) -> Self {
        Sink { data_sink }
    }
}

#[async_trait]
impl Action for Sink {
    async fn execute(&mut self, msg: Message, _rest: &mut [Box<dyn Action>]) -> Result<()> {
        if msg.tag() == Tag::Flush {
            self.data_sink.flush().await
        } else {
            self.data_sink.write(&msg).await
        }
    }

    fn name(&self) -> &'static str {
        "sink"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Payload, Peer};
    use crate::metadata::Metadata;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        writes: Arc<AtomicU64>,
        flushes: Arc<AtomicU64>,
    }

    #[async_trait]
    impl DataSink for CountingSink {
        async fn write(&mut self, _msg: &Message) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn flush(&mut self) -> Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "counting(test)"
        }
    }

    #[tokio::test]
    async fn field_messages_are_written_not_flushed() {
        let writes = Arc::new(AtomicU64::new(0));
        let flushes = Arc::new(AtomicU64::new(0));
        let mut sink = Sink::new(Box::new(CountingSink { writes: writes.clone(), flushes: flushes.clone() }));
        let msg = Message::new(Tag::Field, Peer::new("sim", 0), Peer::new("io", 0), Metadata::new(), Payload::new(vec![1]));
        sink.execute(msg, &mut []).await.unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(flushes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn flush_messages_trigger_flush_not_write() {
        let writes = Arc::new(AtomicU64::new(0));
        let flushes = Arc::new(AtomicU64::new(0));
        let mut sink = Sink::new(Box::new(CountingSink { writes: writes.clone(), flushes: flushes.clone() }));
        let msg = Message::new(Tag::Flush, Peer::new("sim", 0), Peer::new("io", 0), Metadata::new(), Payload::empty());
        sink.execute(msg, &mut []).await.unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 0);
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
    }
}
