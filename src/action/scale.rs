//! `Scale{factor, param_is, map_to_param}` — multiplies every element of
//! fields matching `param_is` by `factor`, then remaps the field's param
//! identity to `map_to_param`. Mirrors `AddConst`'s structure with a
//! multiplicative transform in place of the additive one; both stages share
//! the same `param-is`/`map-to-param` configuration shape from the source's
//! `multio::action::scale` namespace.

use super::{execute_next, extract_param, Action};
use crate::error::{MultioError, Result};
use crate::message::{Message, Tag};
use crate::numeric;
use async_trait::async_trait;

pub struct Scale {
    factor: f64,
    param_is: String,
    map_to_param: String,
}

impl Scale {
    pub fn new(factor: f64, param_is: impl Into<String>, map_to_param: impl Into<String>) -> Self {
        Scale {
            factor,
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

        let factor = self.factor;
        numeric::transform_unary(precision, msg.acquire(), missing, |v| v * factor)?;

        let map_to_param = self.map_to_param.clone();
        let param_id: i64 = map_to_param.parse().map_err(|_| {
            MultioError::Configuration(format!(
                "scale: map-to-param '{map_to_param}' is not a valid paramId"
            ))
        })?;
        let meta = msg.modify_metadata();
        meta.set("paramId", param_id);
        meta.set("param", map_to_param);
        Ok(())
    }
}

#[async_trait]
impl Action for Scale {
    async fn execute(&mut self, mut msg: Message, rest: &mut [Box<dyn Action>]) -> Result<()> {
        if msg.tag() != Tag::Field || extract_param(msg.metadata()).ok().as_deref() != Some(&self.param_is[..]) {
            return execute_next(rest, msg).await;
        }
        self.apply(&mut msg)?;
        execute_next(rest, msg).await
    }

    fn name(&self) -> &'static str {
        "scale"
    }
}
