//! FDB-backed sink. The real FDB client is an external collaborator out of
//! core scope (§1); this module specifies the retry/backoff contract around
//! it (§7: "retry-then-escalate if the underlying sink is FDB") against a
//! pluggable `FdbClient` trait, the same inject-the-external-dependency
//! pattern as `action::encode::FieldEncoder`.

use super::DataSink;
use crate::error::{MultioError, Result};
use crate::iostats::IoStats;
use crate::message::Message;
use async_trait::async_trait;
use std::time::Duration;

/// The narrow surface this sink needs from a real FDB client.
#[async_trait]
pub trait FdbClient: Send {
    async fn archive(&mut self, key: &str, payload: &[u8]) -> Result<()>;
    async fn flush(&mut self) -> Result<()>;
}

pub struct FdbSink {
    client: Box<dyn FdbClient>,
    max_attempts: u32,
    base_backoff: Duration,
    stats: IoStats,
}

impl FdbSink {
    pub fn new(client: Box<dyn FdbClient>, max_attempts: u32, base_backoff: Duration) -> Self {
        FdbSink {
            client,
            max_attempts: max_attempts.max(1),
            base_backoff,
            stats: IoStats::new(),
        }
    }

    fn key_for(msg: &Message) -> String {
        msg.metadata().to_canonical_string()
    }
}

#[async_trait]
impl DataSink for FdbSink {
    async fn write(&mut self, msg: &Message) -> Result<()> {
        let key = Self::key_for(msg);
        let payload = msg.payload().data().to_vec();

        let mut backoff = self.base_backoff;
        let mut last_err = None;
        for attempt_no in 0..self.max_attempts {
            match self.client.archive(&key, &payload).await {
                Ok(()) => {
                    self.stats.record_write(payload.len() as u64);
                    return Ok(());
                }
                Err(e) => {
                    last_err = Some(e);
                    if attempt_no + 1 < self.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        Err(MultioError::SinkFailure(Box::new(last_err.unwrap())))
    }

    async fn flush(&mut self) -> Result<()> {
        self.client.flush().await
    }

    fn name(&self) -> &'static str {
        "fdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Payload, Peer, Tag};
    use crate::metadata::Metadata;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyClient {
        fail_times: u32,
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl FdbClient for FlakyClient {
        async fn archive(&mut self, _key: &str, _payload: &[u8]) -> Result<()> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(MultioError::TransportFailure("simulated FDB outage".into()))
            } else {
                Ok(())
            }
        }

        async fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn sample_message() -> Message {
        Message::new(Tag::Field, Peer::new("sim", 0), Peer::new("io", 0), Metadata::new(), Payload::new(vec![1, 2, 3]))
    }

    #[tokio::test]
    async fn retries_until_success_within_bound() {
        let attempts = Arc::new(AtomicU32::new(0));
        let client = FlakyClient { fail_times: 2, attempts: attempts.clone() };
        let mut sink = FdbSink::new(Box::new(client), 5, Duration::from_millis(1));
        sink.write(&sample_message()).await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn escalates_after_exhausting_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let client = FlakyClient { fail_times: 100, attempts: attempts.clone() };
        let mut sink = FdbSink::new(Box::new(client), 3, Duration::from_millis(1));
        let result = sink.write(&sample_message()).await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
