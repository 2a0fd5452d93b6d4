//! Test-only helper stage that records every message it receives, so unit
//! tests can assert whether a stage under test forwarded, dropped, or
//! transformed a message without needing a full `Sink`/`DataSink`.
#![cfg(test)]

use super::{execute_next, Action};
use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct Recorder {
    pub received: Arc<Mutex<Vec<Message>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Action for Recorder {
    async fn execute(&mut self, msg: Message, rest: &mut [Box<dyn Action>]) -> Result<()> {
        self.received.lock().unwrap().push(msg.clone());
        execute_next(rest, msg).await
    }

    fn name(&self) -> &'static str {
        "recorder(test)"
    }
}

pub fn boxed(recorder: Recorder) -> Box<dyn Action> {
    Box::new(recorder)
}
