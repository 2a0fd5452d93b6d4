//! # Action Pipeline
//!
//! A pipeline is an ordered chain of stages (§4.4). Each stage either drops
//! a message, forwards it (possibly transformed) by calling `execute_next`,
//! or buffers it internally pending correlation (Windspeed, Aggregate,
//! Statistics). There is no branching or retry within a pipeline — a stage
//! that buffers a message "absorbs" it until a later event releases it.
//!
//! Modeled as a slice of trait objects rather than a linked list: the
//! "remaining stages" a stage may forward into is just the tail of the
//! slice, so `execute_next` is a plain recursive call with no shared
//! mutable pipeline state beyond each stage's own fields.
//!
//! `Pipeline::from_config`/`build_stage` are the registration-by-name
//! factory §9 calls for: each `ActionConfig.kind` string maps to one of the
//! stage constructors below, with its parameters read out of
//! `ActionConfig.params`.

pub mod add_const;
pub mod aggregate;
pub mod encode;
pub mod scale;
pub mod select;
pub mod sink;
pub mod statistics;
#[cfg(test)]
pub mod test_support;
pub mod windspeed;

use crate::config::{ActionConfig, PipelineConfig};
use crate::error::{MultioError, Result};
use crate::message::Message;
use crate::sink::DataSink;
use async_trait::async_trait;
use serde_json::Value;

/// A single pipeline stage.
#[async_trait]
pub trait Action: Send {
    /// Consume `msg`. Implementations call `execute_next(rest, msg)` exactly
    /// once to forward (possibly transformed), return `Ok(())` without
    /// calling it to drop or buffer, or return `Err` to fail the message.
    async fn execute(&mut self, msg: Message, rest: &mut [Box<dyn Action>]) -> Result<()>;

    /// Human-readable name for logging/configuration error messages.
    fn name(&self) -> &'static str;
}

/// Forward `msg` into the next stage in `rest`, or do nothing if `rest` is
/// empty (the message reached the end of the pipeline without a terminal
/// `Sink` — a configuration warning in practice, but not itself an error).
pub async fn execute_next(rest: &mut [Box<dyn Action>], msg: Message) -> Result<()> {
    match rest.split_first_mut() {
        Some((first, tail)) => first.execute(msg, tail).await,
        None => Ok(()),
    }
}

/// An ordered chain of stages, owned for the process lifetime by one
/// listener thread. The mutex is the "single-threaded cooperative within a
/// pipeline instance" guarantee from §5, made explicit even though a single
/// listener's receive loop is already sequential — it lets a `Pipeline` be
/// shared (e.g. across test helpers) without re-deriving that invariant.
pub struct Pipeline {
    stages: Vec<Box<dyn Action>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Action>>) -> Self {
        Pipeline { stages }
    }

    /// Build a pipeline from its configuration (§4.4 "constructed once from
    /// configuration"; §9 "registration-by-name is a factory keyed on
    /// string IDs drawn from configuration"): one stage per `ActionConfig`
    /// entry via `build_stage`, with the pipeline's own `DataSink` (built
    /// from `config.sink`) handed to whichever entry names `kind: "sink"`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let mut sink_slot = Some(crate::sink::build(&config.sink)?);
        let mut stages = Vec::with_capacity(config.actions.len());
        for action_cfg in &config.actions {
            stages.push(build_stage(action_cfg, &mut sink_slot)?);
        }
        Ok(Pipeline::new(stages))
    }

    pub async fn dispatch(&mut self, msg: Message) -> Result<()> {
        let (first, rest) = match self.stages.split_first_mut() {
            Some(pair) => pair,
            None => return Ok(()),
        };
        first.execute(msg, rest).await
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

fn param_str(params: &Value, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MultioError::Configuration(format!("missing or non-string parameter '{key}'")))
}

fn param_f64(params: &Value, key: &str) -> Result<f64> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| MultioError::Configuration(format!("missing or non-numeric parameter '{key}'")))
}

fn param_f64_or(params: &Value, key: &str, default: f64) -> f64 {
    params.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn param_usize(params: &Value, key: &str) -> Result<usize> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .ok_or_else(|| MultioError::Configuration(format!("missing or non-numeric parameter '{key}'")))
}

fn param_strings(params: &Value, key: &str) -> Result<Vec<String>> {
    let array = params
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| MultioError::Configuration(format!("missing or non-array parameter '{key}'")))?;
    array
        .iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                MultioError::Configuration(format!("parameter '{key}' must be an array of strings"))
            })
        })
        .collect()
}

/// Construct one pipeline stage by its registered `kind` name, reading its
/// parameters out of `ActionConfig.params` (§9's registration-by-name
/// factory). `kind == "sink"` takes the pipeline's `DataSink` out of
/// `sink_slot`, which `Pipeline::from_config` seeds once from the
/// pipeline's own `SinkConfig`.
fn build_stage(action_cfg: &ActionConfig, sink_slot: &mut Option<Box<dyn DataSink>>) -> Result<Box<dyn Action>> {
    let params = &action_cfg.params;
    match action_cfg.kind.as_str() {
        "select" => Ok(Box::new(select::Select::new(param_strings(params, "categories")?))),
        "add-const" => Ok(Box::new(add_const::AddConst::new(
            param_f64_or(params, "constant", 273.15),
            param_str(params, "paramIs")?,
            param_str(params, "mapToParam")?,
        ))),
        "scale" => Ok(Box::new(scale::Scale::new(
            param_f64(params, "factor")?,
            param_str(params, "paramIs")?,
            param_str(params, "mapToParam")?,
        ))),
        "windspeed" => Ok(Box::new(windspeed::Windspeed::new(
            param_str(params, "uParamId")?,
            param_str(params, "vParamId")?,
            param_str(params, "wParamId")?,
            param_f64_or(params, "missingValue", 9999.0),
        ))),
        "aggregate" => Ok(Box::new(aggregate::Aggregate::new(param_usize(params, "expectedClients")?))),
        "statistics" => {
            let span = params.get("span").and_then(Value::as_i64).unwrap_or(1);
            let period = match param_str(params, "period")?.as_str() {
                "hour" => statistics::Period::Hour(span),
                "day" => statistics::Period::Day(span),
                "month" => statistics::Period::Month(span),
                "step" => statistics::Period::Step(span),
                other => {
                    return Err(MultioError::Configuration(format!(
                        "statistics: unknown period kind '{other}'"
                    )))
                }
            };
            let operation = param_str(params, "operation")?;
            Ok(Box::new(statistics::Statistics::new(period, &operation)?))
        }
        "encode" => {
            let format = params.get("format").and_then(Value::as_str).unwrap_or("grib").to_string();
            Ok(Box::new(encode::Encode::new(format, Box::new(encode::IdentityEncoder))))
        }
        "sink" => {
            let data_sink = sink_slot.take().ok_or_else(|| {
                MultioError::Configuration("pipeline configuration names more than one 'sink' stage".into())
            })?;
            Ok(Box::new(sink::Sink::new(data_sink)))
        }
        other => Err(MultioError::Configuration(format!("unknown action kind '{other}'"))),
    }
}

/// Extract the `param`/`paramId` a numeric transform should match against.
/// Several actions (`AddConst`, `Scale`, `Windspeed`) key off this, so it's
/// shared here rather than duplicated per stage — mirrors
/// `multio::action::scale::MetadataUtils::extractParam` in the original.
pub fn extract_param(metadata: &crate::metadata::Metadata) -> Result<String> {
    metadata
        .get::<String>("param")
        .or_else(|_| metadata.get::<i64>("paramId").map(|v| v.to_string()))
}

#[cfg(test)]
mod factory_tests {
    use super::*;
    use crate::config::PipelineConfig;
    use serde_json::json;
    use tempfile::NamedTempFile;

    #[test]
    fn builds_every_registered_stage_kind_by_name() {
        let mut sink_slot = Some(crate::sink::build(&crate::config::SinkConfig {
            kind: "file".to_string(),
            path: Some(NamedTempFile::new().unwrap().path().to_str().unwrap().to_string()),
            journaled: false,
        })
        .unwrap());

        let select = ActionConfig {
            kind: "select".to_string(),
            params: json!({"categories": ["ocean"]}),
        };
        assert_eq!(build_stage(&select, &mut sink_slot).unwrap().name(), "select");

        let add_const = ActionConfig {
            kind: "add-const".to_string(),
            params: json!({"paramIs": "167", "mapToParam": "168"}),
        };
        assert_eq!(build_stage(&add_const, &mut sink_slot).unwrap().name(), "add-const");

        let scale = ActionConfig {
            kind: "scale".to_string(),
            params: json!({"factor": 2.0, "paramIs": "130", "mapToParam": "131"}),
        };
        assert_eq!(build_stage(&scale, &mut sink_slot).unwrap().name(), "scale");

        let windspeed = ActionConfig {
            kind: "windspeed".to_string(),
            params: json!({"uParamId": "131", "vParamId": "132", "wParamId": "10"}),
        };
        assert_eq!(build_stage(&windspeed, &mut sink_slot).unwrap().name(), "windspeed");

        let aggregate = ActionConfig {
            kind: "aggregate".to_string(),
            params: json!({"expectedClients": 2}),
        };
        assert_eq!(build_stage(&aggregate, &mut sink_slot).unwrap().name(), "aggregate");

        let statistics = ActionConfig {
            kind: "statistics".to_string(),
            params: json!({"period": "step", "span": 2, "operation": "mean"}),
        };
        assert_eq!(
            build_stage(&statistics, &mut sink_slot).unwrap().name(),
            "statistics(step)"
        );

        let encode = ActionConfig {
            kind: "encode".to_string(),
            params: json!({}),
        };
        assert_eq!(build_stage(&encode, &mut sink_slot).unwrap().name(), "encode");

        let sink = ActionConfig {
            kind: "sink".to_string(),
            params: json!({}),
        };
        assert_eq!(build_stage(&sink, &mut sink_slot).unwrap().name(), "sink");
    }

    #[test]
    fn a_second_sink_stage_is_rejected() {
        let mut sink_slot = Some(crate::sink::build(&crate::config::SinkConfig {
            kind: "file".to_string(),
            path: Some(NamedTempFile::new().unwrap().path().to_str().unwrap().to_string()),
            journaled: false,
        })
        .unwrap());
        let sink = ActionConfig {
            kind: "sink".to_string(),
            params: json!({}),
        };
        build_stage(&sink, &mut sink_slot).unwrap();
        assert!(build_stage(&sink, &mut sink_slot).is_err());
    }

    #[test]
    fn unknown_action_kind_is_rejected() {
        let mut sink_slot = None;
        let bogus = ActionConfig {
            kind: "teleport".to_string(),
            params: json!({}),
        };
        assert!(build_stage(&bogus, &mut sink_slot).is_err());
    }

    #[test]
    fn pipeline_from_config_builds_a_runnable_pipeline() {
        let tmp = NamedTempFile::new().unwrap();
        let value = json!({
            "name": "ocean",
            "actions": [
                {"kind": "select", "params": {"categories": ["ocean"]}},
                {"kind": "sink"}
            ],
            "sink": {"kind": "file", "path": tmp.path().to_str().unwrap()}
        });
        let config = PipelineConfig::try_from_value(value).unwrap();
        let pipeline = Pipeline::from_config(&config).unwrap();
        assert_eq!(pipeline.len(), 2);
    }
}
