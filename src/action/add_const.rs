//! `AddConst{constant, param_is, map_to_param}` — adds a constant to every
//! element of fields matching `param_is`, then remaps the field's param
//! identity to `map_to_param` (e.g. converting a Kelvin temperature field
//! into a differently-identified Celsius one). Non-`Field` messages and
//! fields with a different param pass through unchanged.

use super::{execute_next, extract_param, Action};
use crate::error::{MultioError, Result};
use crate::message::{Message, Tag};
use crate::numeric;
use async_trait::async_trait;

pub struct AddConst {
    constant: f64,
    param_is: String,
    map_to_param: String,
}

impl AddConst {
    pub fn new(constant: f64, param_is: impl Into<String>, map_to_param: impl Into<String>) -> Self {
        AddConst {
            constant,
            param_is: param_is.into(),
            map_to_param: map_to_param.into(),
        }
    }

    fn apply(&self, msg: &mut Message) -> Result<()> {
        let precision = msg.precision()?;
        let missing = msg
            .metadata()
            .get_opt::<bool>("bitmapPresent")
            .unwrap_or(false)
            .then(|| msg.metadata().get::<f64>("missingValue"))
            .transpose()?;

        let constant = self.constant;
        numeric::transform_unary(precision, msg.acquire(), missing, |v| v + constant)?;

        let map_to_param = self.map_to_param.clone();
        let param_id: i64 = map_to_param.parse().map_err(|_| {
            MultioError::Configuration(format!(
                "add-const: map-to-param '{map_to_param}' is not a valid paramId"
            ))
        })?;
        let meta = msg.modify_metadata();
        meta.set("paramId", param_id);
        meta.set("param", map_to_param);
        Ok(())
    }
}

#[async_trait]
impl Action for AddConst {
    async fn execute(&mut self, mut msg: Message, rest: &mut [Box<dyn Action>]) -> Result<()> {
        if msg.tag() != Tag::Field || extract_param(msg.metadata()).ok().as_deref() != Some(&self.param_is[..]) {
            return execute_next(rest, msg).await;
        }
        self.apply(&mut msg)?;
        execute_next(rest, msg).await
    }

    fn name(&self) -> &'static str {
        "add-const"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::test_support::{boxed, Recorder};
    use crate::message::{Payload, Peer};
    use crate::metadata::Metadata;

    fn field(param: &str, values: &[f32]) -> Message {
        let mut meta = Metadata::new();
        meta.set("param", param);
        meta.set("precision", "single");
        let mut bytes = Vec::new();
        for v in values {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }
        Message::new(
            Tag::Field,
            Peer::new("sim", 0),
            Peer::new("io", 0),
            meta,
            Payload::new(bytes),
        )
    }

    fn values_of(msg: &Message) -> Vec<f32> {
        msg.payload()
            .data()
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[tokio::test]
    async fn adds_constant_and_remaps_param_on_match() {
        let mut action = AddConst::new(273.15, "130", "131");
        let recorder = Recorder::new();
        let mut rest = vec![boxed(recorder.clone())];
        action.execute(field("130", &[0.0, 10.0]), &mut rest).await.unwrap();
        let out = recorder.messages().pop().unwrap();
        assert_eq!(values_of(&out), vec![273.15, 283.15]);
        assert_eq!(out.metadata().get::<String>("param").unwrap(), "131");
        assert_eq!(out.metadata().get::<i64>("paramId").unwrap(), 131);
    }

    #[tokio::test]
    async fn passes_through_non_matching_param_unchanged() {
        let mut action = AddConst::new(273.15, "130", "131");
        let recorder = Recorder::new();
        let mut rest = vec![boxed(recorder.clone())];
        action.execute(field("999", &[5.0]), &mut rest).await.unwrap();
        let out = recorder.messages().pop().unwrap();
        assert_eq!(values_of(&out), vec![5.0]);
        assert_eq!(out.metadata().get::<String>("param").unwrap(), "999");
    }
}
