//! `Aggregate{expected_clients}` — reconstructs a global field from the
//! partial fields contributed by each client under a `DomainMap` (§9
//! "Multi-message correlation ... keyed by FieldIdentity").
//!
//! Each client first announces its local-to-global index mapping under the
//! `Mapping` tag; subsequent `Field` messages for that domain carry only the
//! client's local slice. The stage accumulates partials by `FieldIdentity`
//! until `expected_clients` contributions are present, at which point it
//! emits the reconstructed global field and evicts the entry. An entry still
//! incomplete when `StepComplete` arrives is a fatal configuration/data
//! mismatch, per the "Aggregate completeness" testable property.

use super::{execute_next, Action};
use crate::error::{MultioError, Result};
use crate::message::{Message, Payload, Peer, Tag};
use crate::metadata::{FieldIdentity, Precision};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// A single client's local-to-global index map for one domain, announced
/// once under the `Mapping` tag before any `Field` referencing it.
#[derive(Debug, Clone)]
pub struct DomainMap {
    /// `local_to_global[local_pos] == global_pos`.
    pub local_to_global: Vec<i64>,
    pub global_size: usize,
}

impl DomainMap {
    fn from_message(msg: &Message) -> Result<Self> {
        let global_size: i64 = msg.metadata().get("globalSize")?;
        let local_to_global: Vec<i64> = msg
            .payload()
            .data()
            .chunks_exact(8)
            .map(|c| i64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        Ok(DomainMap {
            local_to_global,
            global_size: global_size as usize,
        })
    }
}

struct PartialEntry {
    precision: Precision,
    buffer: Vec<u8>,
    template: Message,
    contributed: HashSet<Peer>,
}

pub struct Aggregate {
    expected_clients: usize,
    domain_maps: HashMap<(String, Peer), DomainMap>,
    partials: HashMap<(String, FieldIdentity), PartialEntry>,
}

impl Aggregate {
    pub fn new(expected_clients: usize) -> Self {
        Aggregate {
            expected_clients,
            domain_maps: HashMap::new(),
            partials: HashMap::new(),
        }
    }

    fn record_mapping(&mut self, msg: &Message) -> Result<()> {
        let domain: String = msg.metadata().get("domain")?;
        let map = DomainMap::from_message(msg)?;
        self.domain_maps.insert((domain, msg.source().clone()), map);
        Ok(())
    }

    fn accumulate_field(&mut self, msg: Message) -> Result<Option<Message>> {
        let domain: String = msg.metadata().get("domain")?;
        let identity = FieldIdentity::from_metadata(msg.metadata())?;
        let precision = msg.precision()?;
        let elem = precision.size_of();

        let map = self
            .domain_maps
            .get(&(domain.clone(), msg.source().clone()))
            .ok_or_else(|| {
                MultioError::MetadataMissing(format!(
                    "aggregate: no DomainMap registered for domain '{domain}' from {:?}",
                    msg.source()
                ))
            })?
            .clone();

        let key = (domain, identity);
        let entry = self.partials.entry(key.clone()).or_insert_with(|| PartialEntry {
            precision,
            buffer: vec![0u8; map.global_size * elem],
            template: msg.clone(),
            contributed: HashSet::new(),
        });

        if entry.precision != precision {
            return Err(MultioError::FieldError(
                "aggregate: partial field precision mismatch within one FieldIdentity".into(),
            ));
        }

        let local_bytes = msg.payload().data();
        if local_bytes.len() != map.local_to_global.len() * elem {
            return Err(MultioError::FieldError(format!(
                "aggregate: partial payload size {} does not match domain map size {}",
                local_bytes.len(),
                map.local_to_global.len() * elem
            )));
        }
        for (local_pos, &global_pos) in map.local_to_global.iter().enumerate() {
            let src = &local_bytes[local_pos * elem..(local_pos + 1) * elem];
            let dst_start = global_pos as usize * elem;
            entry.buffer[dst_start..dst_start + elem].copy_from_slice(src);
        }
        entry.contributed.insert(msg.source().clone());

        if entry.contributed.len() >= self.expected_clients {
            let entry = self.partials.remove(&key).unwrap();
            let mut out = entry.template;
            *out.payload_mut() = Payload::new(entry.buffer);
            Ok(Some(out))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl Action for Aggregate {
    async fn execute(&mut self, msg: Message, rest: &mut [Box<dyn Action>]) -> Result<()> {
        match msg.tag() {
            Tag::Mapping => {
                self.record_mapping(&msg)?;
                execute_next(rest, msg).await
            }
            Tag::Field => match self.accumulate_field(msg)? {
                Some(reconstructed) => execute_next(rest, reconstructed).await,
                None => Ok(()),
            },
            Tag::StepComplete => {
                if !self.partials.is_empty() {
                    return Err(MultioError::FieldError(format!(
                        "aggregate: {} field(s) still incomplete at StepComplete",
                        self.partials.len()
                    )));
                }
                execute_next(rest, msg).await
            }
            _ => execute_next(rest, msg).await,
        }
    }

    fn name(&self) -> &'static str {
        "aggregate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::test_support::{boxed, Recorder};
    use crate::message::Peer;
    use crate::metadata::Metadata;

    fn mapping(peer: Peer, domain: &str, global_size: i64, local_to_global: &[i64]) -> Message {
        let mut meta = Metadata::new();
        meta.set("domain", domain);
        meta.set("globalSize", global_size);
        let mut bytes = Vec::new();
        for &g in local_to_global {
            bytes.extend_from_slice(&g.to_ne_bytes());
        }
        Message::new(Tag::Mapping, peer.clone(), Peer::new("io", 0), meta, Payload::new(bytes))
    }

    fn field(peer: Peer, domain: &str, step: i64, values: &[f32]) -> Message {
        let mut meta = Metadata::new();
        meta.set("domain", domain);
        meta.set("precision", "single");
        meta.set("param", "130");
        meta.set("step", step);
        let mut bytes = Vec::new();
        for v in values {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }
        Message::new(Tag::Field, peer, Peer::new("io", 0), meta, Payload::new(bytes))
    }

    #[tokio::test]
    async fn emits_once_all_partials_present() {
        let mut agg = Aggregate::new(2);
        let recorder = Recorder::new();
        let mut rest = vec![boxed(recorder.clone())];

        let client0 = Peer::new("sim", 0);
        let client1 = Peer::new("sim", 1);

        agg.execute(mapping(client0.clone(), "dom", 4, &[0, 1]), &mut rest).await.unwrap();
        agg.execute(mapping(client1.clone(), "dom", 4, &[2, 3]), &mut rest).await.unwrap();

        agg.execute(field(client0, "dom", 0, &[1.0, 2.0]), &mut rest).await.unwrap();
        assert!(recorder.messages().is_empty());

        agg.execute(field(client1, "dom", 0, &[3.0, 4.0]), &mut rest).await.unwrap();
        let out = recorder.messages().pop().unwrap();
        let values: Vec<f32> = out
            .payload()
            .data()
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn step_complete_is_fatal_when_incomplete() {
        let mut agg = Aggregate::new(2);
        let recorder = Recorder::new();
        let mut rest = vec![boxed(recorder.clone())];

        let client0 = Peer::new("sim", 0);
        agg.execute(mapping(client0.clone(), "dom", 4, &[0, 1]), &mut rest).await.unwrap();
        agg.execute(field(client0, "dom", 0, &[1.0, 2.0]), &mut rest).await.unwrap();

        let step_complete = Message::new(
            Tag::StepComplete,
            Peer::new("sim", 0),
            Peer::new("io", 0),
            Metadata::new(),
            Payload::empty(),
        );
        assert!(agg.execute(step_complete, &mut rest).await.is_err());
    }
}
