//! `Encode{format}` — transforms a field into an encoded wire format (GRIB,
//! in production) via a pluggable codec and forwards with `format` set in
//! metadata. The real GRIB codec is an external library out of core scope
//! (§1); this stage depends only on a `FieldEncoder` trait object, so a host
//! application supplies the real encoder while the crate's own default is an
//! identity pass-through that just stamps the format tag.

use super::{execute_next, Action};
use crate::error::Result;
use crate::message::{Message, Tag};
use async_trait::async_trait;

/// A pluggable field encoder. The default `IdentityEncoder` leaves payload
/// bytes untouched; a real GRIB encoder would implement this against the
/// external codec library.
pub trait FieldEncoder: Send {
    fn encode(&mut self, msg: &mut Message) -> Result<()>;
}

pub struct IdentityEncoder;

impl FieldEncoder for IdentityEncoder {
    fn encode(&mut self, _msg: &mut Message) -> Result<()> {
        Ok(())
    }
}

pub struct Encode {
    format: String,
    encoder: Box<dyn FieldEncoder>,
}

impl Encode {
    pub fn new(format: impl Into<String>, encoder: Box<dyn FieldEncoder>) -> Self {
        Encode {
            format: format.into(),
            encoder,
        }
    }

    pub fn identity(format: impl Into<String>) -> Self {
        Encode::new(format, Box::new(IdentityEncoder))
    }
}

#[async_trait]
impl Action for Encode {
    async fn execute(&mut self, mut msg: Message, rest: &mut [Box<dyn Action>]) -> Result<()> {
        if msg.tag() != Tag::Field {
            return execute_next(rest, msg).await;
        }
        self.encoder.encode(&mut msg)?;
        msg.modify_metadata().set("format", self.format.clone());
        execute_next(rest, msg).await
    }

    fn name(&self) -> &'static str {
        "encode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::test_support::{boxed, Recorder};
    use crate::message::{Payload, Peer};
    use crate::metadata::Metadata;

    #[tokio::test]
    async fn stamps_format_on_field_messages() {
        let mut encode = Encode::identity("grib");
        let recorder = Recorder::new();
        let mut rest = vec![boxed(recorder.clone())];

        let mut meta = Metadata::new();
        meta.set("precision", "single");
        let msg = Message::new(Tag::Field, Peer::new("sim", 0), Peer::new("io", 0), meta, Payload::new(vec![0u8; 4]));
        encode.execute(msg, &mut rest).await.unwrap();

        let out = recorder.messages().pop().unwrap();
        assert_eq!(out.metadata().get::<String>("format").unwrap(), "grib");
    }

    #[tokio::test]
    async fn non_field_messages_pass_through_untouched() {
        let mut encode = Encode::identity("grib");
        let recorder = Recorder::new();
        let mut rest = vec![boxed(recorder.clone())];

        let msg = Message::new(Tag::Flush, Peer::new("sim", 0), Peer::new("io", 0), Metadata::new(), Payload::empty());
        encode.execute(msg, &mut rest).await.unwrap();

        let out = recorder.messages().pop().unwrap();
        assert!(!out.metadata().contains("format"));
    }
}
