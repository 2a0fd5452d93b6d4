//! `Windspeed{u, v, w, missing_value}` — joins a u-component and v-component
//! field sharing a step into a single wind-speed field (`sqrt(u^2 + v^2)`),
//! emitted under the `w` param identity. Caches whichever of the pair
//! arrives first, keyed by `"ws:" + paramId + ":" + step`, and releases both
//! once the second arrives — the calculation is commutative, so it doesn't
//! matter which of u/v shows up first. `Flush` clears the cache, since a
//! half-joined pair spanning a flush boundary would otherwise linger
//! forever.

use super::{execute_next, extract_param, Action};
use crate::error::{MultioError, Result};
use crate::message::{Message, Tag};
use crate::numeric;
use async_trait::async_trait;
use std::collections::HashMap;

pub struct Windspeed {
    u_param: String,
    v_param: String,
    w_param: String,
    missing_value: f64,
    cache: HashMap<String, Message>,
}

impl Windspeed {
    pub fn new(u_param: impl Into<String>, v_param: impl Into<String>, w_param: impl Into<String>, missing_value: f64) -> Self {
        Windspeed {
            u_param: u_param.into(),
            v_param: v_param.into(),
            w_param: w_param.into(),
            missing_value,
            cache: HashMap::new(),
        }
    }

    fn ident(&self, param: &str, step: i64) -> String {
        format!("ws:{param}:{step}")
    }

    fn other_ident(&self, param: &str, step: i64) -> String {
        let other = if param == self.u_param { &self.v_param } else { &self.u_param };
        self.ident(other, step)
    }

    fn combine(&self, mut u_msg: Message, v_msg: Message) -> Result<Message> {
        let precision = u_msg.precision()?;
        if precision != v_msg.precision()? {
            return Err(MultioError::FieldError(
                "windspeed: u and v fields have different precisions".into(),
            ));
        }

        let u_bitmap = u_msg.metadata().get_opt::<bool>("bitmapPresent").unwrap_or(false);
        let v_bitmap = v_msg.metadata().get_opt::<bool>("bitmapPresent").unwrap_or(false);
        let u_missing = u_bitmap.then(|| u_msg.metadata().get::<f64>("missingValue")).transpose()?;
        let v_missing = v_bitmap.then(|| v_msg.metadata().get::<f64>("missingValue")).transpose()?;

        u_msg.acquire();
        let v_bytes = v_msg.payload().data().to_vec();
        numeric::transform_binary(
            precision,
            u_msg.acquire(),
            &v_bytes,
            u_missing,
            v_missing,
            |a, b| a.hypot(b),
            self.missing_value,
        )?;

        let w_param_id: i64 = self.w_param.parse().map_err(|_| {
            MultioError::Configuration(format!(
                "windspeed: w param '{}' is not a valid paramId",
                self.w_param
            ))
        })?;
        let meta = u_msg.modify_metadata();
        meta.set("paramId", w_param_id);
        meta.set("param", self.w_param.clone());
        meta.erase("name");
        meta.erase("shortName");
        if u_bitmap || v_bitmap {
            meta.set("missingValue", self.missing_value);
            meta.set("bitmapPresent", true);
        }

        Ok(u_msg)
    }
}

#[async_trait]
impl Action for Windspeed {
    async fn execute(&mut self, msg: Message, rest: &mut [Box<dyn Action>]) -> Result<()> {
        if msg.tag() == Tag::Flush {
            self.cache.clear();
            return execute_next(rest, msg).await;
        }
        if msg.tag() != Tag::Field {
            return execute_next(rest, msg).await;
        }

        let param = match extract_param(msg.metadata()) {
            Ok(p) => p,
            Err(_) => return execute_next(rest, msg).await,
        };
        if param != self.u_param && param != self.v_param {
            return execute_next(rest, msg).await;
        }
        let step: i64 = msg.metadata().get("step")?;

        let other_key = self.other_ident(&param, step);
        match self.cache.remove(&other_key) {
            None => {
                self.cache.insert(self.ident(&param, step), msg);
                Ok(())
            }
            Some(other) => {
                let combined = self.combine(msg, other)?;
                execute_next(rest, combined).await
            }
        }
    }

    fn name(&self) -> &'static str {
        "windspeed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::test_support::{boxed, Recorder};
    use crate::message::{Payload, Peer};
    use crate::metadata::Metadata;

    fn field(param: &str, step: i64, values: &[f32]) -> Message {
        let mut meta = Metadata::new();
        meta.set("param", param);
        meta.set("precision", "single");
        meta.set("step", step);
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
    async fn caches_first_arrival_and_emits_on_second() {
        let mut ws = Windspeed::new("131", "132", "10", -1.0);
        let recorder = Recorder::new();
        let mut rest = vec![boxed(recorder.clone())];

        ws.execute(field("131", 0, &[3.0]), &mut rest).await.unwrap();
        assert!(recorder.messages().is_empty());

        ws.execute(field("132", 0, &[4.0]), &mut rest).await.unwrap();
        let out = recorder.messages().pop().unwrap();
        assert_eq!(values_of(&out), vec![5.0]);
        assert_eq!(out.metadata().get::<String>("param").unwrap(), "10");
    }

    #[tokio::test]
    async fn order_of_u_v_does_not_affect_result() {
        let mut ws_a = Windspeed::new("131", "132", "10", -1.0);
        let recorder_a = Recorder::new();
        let mut rest_a = vec![boxed(recorder_a.clone())];
        ws_a.execute(field("131", 1, &[3.0]), &mut rest_a).await.unwrap();
        ws_a.execute(field("132", 1, &[4.0]), &mut rest_a).await.unwrap();

        let mut ws_b = Windspeed::new("131", "132", "10", -1.0);
        let recorder_b = Recorder::new();
        let mut rest_b = vec![boxed(recorder_b.clone())];
        ws_b.execute(field("132", 1, &[4.0]), &mut rest_b).await.unwrap();
        ws_b.execute(field("131", 1, &[3.0]), &mut rest_b).await.unwrap();

        assert_eq!(
            values_of(&recorder_a.messages().pop().unwrap()),
            values_of(&recorder_b.messages().pop().unwrap())
        );
    }

    #[tokio::test]
    async fn flush_clears_pending_cache() {
        let mut ws = Windspeed::new("131", "132", "10", -1.0);
        let recorder = Recorder::new();
        let mut rest = vec![boxed(recorder.clone())];

        ws.execute(field("131", 0, &[3.0]), &mut rest).await.unwrap();
        let flush = Message::new(
            Tag::Flush,
            Peer::new("sim", 0),
            Peer::new("io", 0),
            Metadata::new(),
            Payload::empty(),
        );
        ws.execute(flush, &mut rest).await.unwrap();
        assert!(ws.cache.is_empty());

        ws.execute(field("132", 0, &[4.0]), &mut rest).await.unwrap();
        assert!(recorder.messages().iter().all(|m| m.tag() != Tag::Field));
    }
}
