//! # Listener
//!
//! Server-side receive loop (§4.3). Owns the open-client lifecycle and
//! dispatches each inbound message into the pipeline matching its
//! destination category, under a per-pipeline mutex so a single pipeline
//! instance only ever sees one message at a time — the invariant the
//! stateful stages (Windspeed, Aggregate, Statistics) depend on (§5).

use crate::action::Pipeline;
use crate::error::{FailurePolicy, MultioError, Result};
use crate::message::{Message, Peer, Tag};
use crate::transport::Transport;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{error, warn};

/// One named pipeline, reachable by the category carried in a message's
/// metadata (`Select`'s own filtering happens inside the pipeline; this
/// lookup just routes to the right pipeline instance in the first place).
struct RoutedPipeline {
    pipeline: Mutex<Pipeline>,
    failure_policy: FailurePolicy,
}

pub struct Listener<T: Transport> {
    transport: T,
    pipelines: HashMap<String, RoutedPipeline>,
    open_clients: HashSet<Peer>,
    ever_opened: bool,
}

impl<T: Transport> Listener<T> {
    pub fn new(transport: T) -> Self {
        Listener {
            transport,
            pipelines: HashMap::new(),
            open_clients: HashSet::new(),
            ever_opened: false,
        }
    }

    /// Register a pipeline under `category`, the key messages are routed by
    /// (matched against `metadata["category"]`, per §4.3 "keyed by category").
    pub fn register_pipeline(&mut self, category: impl Into<String>, pipeline: Pipeline, failure_policy: FailurePolicy) {
        self.pipelines.insert(
            category.into(),
            RoutedPipeline {
                pipeline: Mutex::new(pipeline),
                failure_policy,
            },
        );
    }

    fn category_of(msg: &Message) -> Option<String> {
        msg.metadata().get::<String>("category").ok()
    }

    /// Run the receive loop until the open-client set empties out after at
    /// least one `Open`, or a fatal error/abort terminates it.
    pub async fn listen(&mut self) -> Result<()> {
        loop {
            let msg = self.transport.receive().await?;

            match msg.tag() {
                Tag::Open => {
                    self.open_clients.insert(msg.source().clone());
                    self.ever_opened = true;
                }
                Tag::Close => {
                    self.open_clients.remove(msg.source());
                }
                _ => {}
            }

            if let Err(err) = self.dispatch(msg).await {
                error!("pipeline dispatch failed: {}", err.error);
                if matches!(err.policy, FailurePolicy::Abort) {
                    return Err(err.error);
                }
            }

            if self.ever_opened && self.open_clients.is_empty() {
                return Ok(());
            }
        }
    }

    /// Dispatch into the matching pipeline. Errors carry the failing
    /// pipeline's configured failure policy (§4.4 "per configuration —
    /// either continues ... or aborts"), defaulting to `Continue` when no
    /// pipeline matched at all (there is nothing to abort on behalf of).
    async fn dispatch(&self, msg: Message) -> std::result::Result<(), DispatchError> {
        let category = Self::category_of(&msg);
        let routed = match category.as_deref().and_then(|c| self.pipelines.get(c)) {
            Some(routed) => routed,
            None => {
                warn!(
                    "no pipeline registered for category {:?}; dropping message",
                    category
                );
                return Ok(());
            }
        };
        let mut pipeline = routed.pipeline.lock().await;
        pipeline
            .dispatch(msg)
            .await
            .map_err(|error| DispatchError { error, policy: routed.failure_policy })
    }
}

struct DispatchError {
    error: MultioError,
    policy: FailurePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::test_support::{boxed, Recorder};
    use crate::message::Payload;
    use crate::metadata::Metadata;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    struct ScriptedTransport {
        local: Peer,
        inbox: VecDeque<Message>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, msg: Message) -> std::result::Result<(), crate::transport::SendError> {
            Ok(())
        }

        async fn receive(&mut self) -> Result<Message> {
            self.inbox
                .pop_front()
                .ok_or_else(|| MultioError::TransportFailure("no more scripted messages".into()))
        }

        fn local_peer(&self) -> &Peer {
            &self.local
        }
    }

    fn categorized(tag: Tag, source: Peer, category: &str) -> Message {
        let mut meta = Metadata::new();
        meta.set("category", category);
        Message::new(tag, source, Peer::new("server", 0), meta, Payload::empty())
    }

    #[tokio::test]
    async fn open_then_close_from_both_clients_terminates_the_loop() {
        let a = Peer::new("client", 0);
        let b = Peer::new("client", 1);
        let inbox = VecDeque::from(vec![
            categorized(Tag::Open, a.clone(), "ocean"),
            categorized(Tag::Open, b.clone(), "ocean"),
            categorized(Tag::Close, a.clone(), "ocean"),
            categorized(Tag::Close, b.clone(), "ocean"),
        ]);
        let transport = ScriptedTransport { local: Peer::new("server", 0), inbox };
        let mut listener = Listener::new(transport);
        listener.register_pipeline("ocean", Pipeline::new(vec![boxed(Recorder::new())]), FailurePolicy::Continue);

        listener.listen().await.unwrap();
        assert!(listener.open_clients.is_empty());
    }

    #[tokio::test]
    async fn unmatched_close_keeps_the_loop_alive_until_transport_errors() {
        let a = Peer::new("client", 0);
        let b = Peer::new("client", 1);
        let inbox = VecDeque::from(vec![
            categorized(Tag::Open, a.clone(), "ocean"),
            categorized(Tag::Open, b.clone(), "ocean"),
            categorized(Tag::Close, a.clone(), "ocean"),
        ]);
        let transport = ScriptedTransport { local: Peer::new("server", 0), inbox };
        let mut listener = Listener::new(transport);
        listener.register_pipeline("ocean", Pipeline::new(vec![boxed(Recorder::new())]), FailurePolicy::Continue);

        let result = listener.listen().await;
        assert!(result.is_err());
        assert_eq!(listener.open_clients.len(), 1);
    }

    #[tokio::test]
    async fn messages_with_no_matching_pipeline_are_dropped_not_fatal() {
        let a = Peer::new("client", 0);
        let inbox = VecDeque::from(vec![
            categorized(Tag::Open, a.clone(), "unregistered"),
            categorized(Tag::Close, a.clone(), "unregistered"),
        ]);
        let transport = ScriptedTransport { local: Peer::new("server", 0), inbox };
        let mut listener = Listener::new(transport);

        listener.listen().await.unwrap();
    }
}
