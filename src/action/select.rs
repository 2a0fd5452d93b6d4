//! `Select{categories}` — forwards a message iff its `category` metadata is
//! in the configured set. `StepComplete` always forwards regardless of
//! category, since it's a synchronization primitive rather than payload
//! data (§4.4).

use super::{execute_next, Action};
use crate::error::Result;
use crate::message::{Message, Tag};
use async_trait::async_trait;

pub struct Select {
    categories: Vec<String>,
}

impl Select {
    pub fn new(categories: Vec<String>) -> Self {
        Select { categories }
    }

    fn matches(&self, msg: &Message) -> bool {
        match msg.metadata().get::<String>("category") {
            Ok(category) => self.categories.iter().any(|c| c == &category),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl Action for Select {
    async fn execute(&mut self, msg: Message, rest: &mut [Box<dyn Action>]) -> Result<()> {
        if msg.tag() == Tag::StepComplete || self.matches(&msg) {
            execute_next(rest, msg).await
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        "select"
    }
}
