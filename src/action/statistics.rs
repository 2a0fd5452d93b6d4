//! `Statistics{period, operation}` — a temporal reduction (mean, min, max,
//! accumulation) over windows defined by a `PeriodUpdater` (Day, Month,
//! Hour, Step), grounded on the source's
//! `multio::action::statistics::period-updaters` family (see
//! `DayPeriodUpdater`): each updater knows how to compute the start of the
//! window containing a given instant and how to advance to the next
//! window's end.
//!
//! Every incoming `Field` either extends the current window's accumulator
//! or, if its timestamp has crossed the window end, triggers emission of
//! the completed window's reduction (tagged with `startWindow`/`endWindow`
//! metadata) before opening a fresh window with the new field as its first
//! contribution.

use super::{execute_next, Action};
use crate::error::{MultioError, Result};
use crate::message::{Message, Payload, Tag};
use crate::metadata::{FieldIdentity, Precision};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use std::collections::HashMap;

/// How window boundaries are computed from a field's timestamp.
#[derive(Debug, Clone, Copy)]
pub enum Period {
    Hour(i64),
    Day(i64),
    Month(i64),
    /// Buckets directly on the `step` metadata rather than wall-clock time;
    /// a window covers `span` consecutive steps.
    Step(i64),
}

impl Period {
    fn window_start_time(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Period::Hour(_) => instant.date_naive().and_hms_opt(instant.hour(), 0, 0).unwrap().and_utc(),
            Period::Day(_) => instant.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc(),
            Period::Month(_) => instant
                .date_naive()
                .with_day(1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc(),
            Period::Step(_) => instant,
        }
    }

    fn window_end_time(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Period::Hour(span) => start + Duration::hours(*span),
            Period::Day(span) => start + Duration::days(*span),
            Period::Month(span) => {
                let naive = start.date_naive();
                let total_months = naive.year() as i64 * 12 + (naive.month() as i64 - 1) + span;
                let year = (total_months.div_euclid(12)) as i32;
                let month = (total_months.rem_euclid(12)) as u32 + 1;
                chrono::NaiveDate::from_ymd_opt(year, month, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    .and_utc()
            }
            Period::Step(_) => start,
        }
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Mean,
    Min,
    Max,
    Accumulation,
}

impl Operation {
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(Operation::Mean),
            "min" => Ok(Operation::Min),
            "max" => Ok(Operation::Max),
            "accumulation" => Ok(Operation::Accumulation),
            other => Err(MultioError::Configuration(format!(
                "statistics: unknown operation '{other}'"
            ))),
        }
    }
}

struct Window {
    start_step: i64,
    end_step: i64,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    precision: Precision,
    accum: Vec<f64>,
    count: u64,
    template: Message,
}

pub struct Statistics {
    period: Period,
    operation: Operation,
    windows: HashMap<FieldIdentity, Window>,
}

impl Statistics {
    pub fn new(period: Period, operation: &str) -> Result<Self> {
        Ok(Statistics {
            period,
            operation: Operation::from_str(operation)?,
            windows: HashMap::new(),
        })
    }

    fn fold(&self, accum: &mut [f64], values: &[f64], count_before: u64) {
        match self.operation {
            Operation::Mean | Operation::Accumulation => {
                for (a, v) in accum.iter_mut().zip(values) {
                    *a += v;
                }
            }
            Operation::Min => {
                for (a, v) in accum.iter_mut().zip(values) {
                    if count_before == 0 || v < a {
                        *a = *v;
                    }
                }
            }
            Operation::Max => {
                for (a, v) in accum.iter_mut().zip(values) {
                    if count_before == 0 || v > a {
                        *a = *v;
                    }
                }
            }
        }
    }

    fn finalize(&self, window: &Window) -> Vec<f64> {
        match self.operation {
            Operation::Mean => window
                .accum
                .iter()
                .map(|v| v / window.count.max(1) as f64)
                .collect(),
            Operation::Min | Operation::Max | Operation::Accumulation => window.accum.clone(),
        }
    }

    fn read_values(precision: Precision, bytes: &[u8]) -> Vec<f64> {
        let elem = precision.size_of();
        bytes
            .chunks_exact(elem)
            .map(|c| match precision {
                Precision::Single => f32::from_ne_bytes(c.try_into().unwrap()) as f64,
                Precision::Double => f64::from_ne_bytes(c.try_into().unwrap()),
            })
            .collect()
    }

    fn write_values(precision: Precision, values: &[f64]) -> Vec<u8> {
        let mut out = Vec::with_capacity(values.len() * precision.size_of());
        for &v in values {
            match precision {
                Precision::Single => out.extend_from_slice(&(v as f32).to_ne_bytes()),
                Precision::Double => out.extend_from_slice(&v.to_ne_bytes()),
            }
        }
        out
    }

    fn emit(&self, window: Window) -> Message {
        let mut out = window.template;
        let values = self.finalize(&window);
        *out.payload_mut() = Payload::new(Self::write_values(window.precision, &values));
        let meta = out.modify_metadata();
        match (window.start_time, window.end_time) {
            (Some(s), Some(e)) => {
                meta.set("startWindow", s.timestamp());
                meta.set("endWindow", e.timestamp());
            }
            _ => {
                meta.set("startWindow", window.start_step);
                meta.set("endWindow", window.end_step);
            }
        }
        out
    }

    fn in_window(&self, window: &Window, step: i64, time: Option<DateTime<Utc>>) -> bool {
        match self.period {
            Period::Step(_) => step < window.end_step,
            _ => time.map(|t| t < window.end_time.unwrap()).unwrap_or(true),
        }
    }

    fn new_window(&self, msg: &Message, step: i64, time: Option<DateTime<Utc>>, precision: Precision, values_len: usize) -> Window {
        match self.period {
            Period::Step(span) => {
                let bucket_start = (step / span) * span;
                Window {
                    start_step: bucket_start,
                    end_step: bucket_start + span,
                    start_time: None,
                    end_time: None,
                    precision,
                    accum: vec![0.0; values_len],
                    count: 0,
                    template: msg.clone(),
                }
            }
            _ => {
                let t = time.expect("non-step periods require a timestamp");
                let start = self.period.window_start_time(t);
                let end = self.period.window_end_time(start);
                Window {
                    start_step: step,
                    end_step: step,
                    start_time: Some(start),
                    end_time: Some(end),
                    precision,
                    accum: vec![0.0; values_len],
                    count: 0,
                    template: msg.clone(),
                }
            }
        }
    }
}

#[async_trait]
impl Action for Statistics {
    async fn execute(&mut self, msg: Message, rest: &mut [Box<dyn Action>]) -> Result<()> {
        if msg.tag() != Tag::Field {
            return execute_next(rest, msg).await;
        }
        let identity = FieldIdentity::from_metadata(msg.metadata())?;
        let precision = msg.precision()?;
        let step: i64 = msg.metadata().get("step")?;
        let time = msg
            .metadata()
            .get_opt::<i64>("timestamp")
            .map(|secs| Utc.timestamp_opt(secs, 0).single().unwrap());

        let values = Self::read_values(precision, msg.payload().data());

        let mut emitted = None;
        let needs_new = match self.windows.get(&identity) {
            Some(w) => !self.in_window(w, step, time),
            None => true,
        };
        if needs_new {
            if let Some(old) = self.windows.remove(&identity) {
                emitted = Some(self.emit(old));
            }
            let window = self.new_window(&msg, step, time, precision, values.len());
            self.windows.insert(identity.clone(), window);
        }

        let window = self.windows.get_mut(&identity).unwrap();
        if window.accum.len() != values.len() {
            return Err(MultioError::FieldError(
                "statistics: field size changed within an open window".into(),
            ));
        }
        self.fold(&mut window.accum, &values, window.count);
        window.count += 1;

        if let Some(to_emit) = emitted {
            execute_next(rest, to_emit).await
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        match self.period {
            Period::Hour(_) => "statistics(hour)",
            Period::Day(_) => "statistics(day)",
            Period::Month(_) => "statistics(month)",
            Period::Step(_) => "statistics(step)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::test_support::{boxed, Recorder};
    use crate::message::Peer;
    use crate::metadata::Metadata;

    fn field(step: i64, values: &[f32]) -> Message {
        let mut meta = Metadata::new();
        meta.set("param", "130");
        meta.set("precision", "single");
        meta.set("step", step);
        let mut bytes = Vec::new();
        for v in values {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }
        Message::new(Tag::Field, Peer::new("sim", 0), Peer::new("io", 0), meta, Payload::new(bytes))
    }

    fn values_of(msg: &Message) -> Vec<f32> {
        msg.payload()
            .data()
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[tokio::test]
    async fn mean_over_step_window_emits_on_crossing() {
        let mut stats = Statistics::new(Period::Step(2), "mean").unwrap();
        let recorder = Recorder::new();
        let mut rest = vec![boxed(recorder.clone())];

        stats.execute(field(0, &[2.0]), &mut rest).await.unwrap();
        stats.execute(field(1, &[4.0]), &mut rest).await.unwrap();
        assert!(recorder.messages().is_empty());

        stats.execute(field(2, &[10.0]), &mut rest).await.unwrap();
        let out = recorder.messages().pop().unwrap();
        assert_eq!(values_of(&out), vec![3.0]);
    }

    #[tokio::test]
    async fn max_over_step_window() {
        let mut stats = Statistics::new(Period::Step(2), "max").unwrap();
        let recorder = Recorder::new();
        let mut rest = vec![boxed(recorder.clone())];

        stats.execute(field(0, &[2.0]), &mut rest).await.unwrap();
        stats.execute(field(1, &[9.0]), &mut rest).await.unwrap();
        stats.execute(field(2, &[1.0]), &mut rest).await.unwrap();
        let out = recorder.messages().pop().unwrap();
        assert_eq!(values_of(&out), vec![9.0]);
    }
}
