//! # Metadata
//!
//! A string-keyed, dynamically typed, insertion-ordered map. Typed getters
//! fail with `MultioError::InvalidField` on a missing key or type mismatch;
//! `get_opt` returns `None` instead. The canonical serialized form (sorted
//! keys, stable JSON) is used both as a human-readable debug form and to
//! derive content hashes (`FieldIdentity` shard routing, Windspeed/Aggregate
//! correlation keys indirectly derive from it).

use crate::error::{MultioError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The dynamically-typed value held in a `Metadata` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    I64(i64),
    F64(f64),
    Bool(bool),
    String(String),
    ListI64(Vec<i64>),
    ListF64(Vec<f64>),
    ListString(Vec<String>),
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::I64(v)
    }
}
impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::F64(v)
    }
}
impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}
impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::String(v)
    }
}
impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}
impl From<Vec<i64>> for MetadataValue {
    fn from(v: Vec<i64>) -> Self {
        MetadataValue::ListI64(v)
    }
}
impl From<Vec<f64>> for MetadataValue {
    fn from(v: Vec<f64>) -> Self {
        MetadataValue::ListF64(v)
    }
}
impl From<Vec<String>> for MetadataValue {
    fn from(v: Vec<String>) -> Self {
        MetadataValue::ListString(v)
    }
}

/// Conversion back out of a `MetadataValue`, implemented for every type a
/// caller may ask `Metadata::get::<T>` for.
pub trait FromMetadataValue: Sized {
    fn from_metadata_value(value: &MetadataValue) -> Option<Self>;
    const TYPE_NAME: &'static str;
}

macro_rules! impl_from_metadata_value {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl FromMetadataValue for $ty {
            fn from_metadata_value(value: &MetadataValue) -> Option<Self> {
                match value {
                    MetadataValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
            const TYPE_NAME: &'static str = $name;
        }
    };
}

impl_from_metadata_value!(i64, I64, "i64");
impl_from_metadata_value!(f64, F64, "f64");
impl_from_metadata_value!(bool, Bool, "bool");
impl_from_metadata_value!(String, String, "string");
impl_from_metadata_value!(Vec<i64>, ListI64, "list<i64>");
impl_from_metadata_value!(Vec<f64>, ListF64, "list<f64>");
impl_from_metadata_value!(Vec<String>, ListString, "list<string>");

/// An ordered string-keyed map of dynamically-typed values.
///
/// Insertion order is preserved for iteration and debug display; the
/// canonical form used for hashing always sorts keys, independent of
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: Vec<(String, MetadataValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Set a value, overwriting any existing entry for the key in place
    /// (preserving its original position) or appending a new one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        let key = key.into();
        let value = value.into();
        if let Some(idx) = self.position(&key) {
            self.entries[idx].1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn erase(&mut self, key: &str) {
        if let Some(idx) = self.position(key) {
            self.entries.remove(idx);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Typed accessor. Fails with `InvalidField` if the key is absent or the
    /// stored value has a different shape than `T`.
    pub fn get<T: FromMetadataValue>(&self, key: &str) -> Result<T> {
        let raw = self
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or_else(|| MultioError::InvalidField(format!("missing metadata key '{key}'")))?;
        T::from_metadata_value(raw).ok_or_else(|| {
            MultioError::InvalidField(format!(
                "metadata key '{key}' is not of type {}",
                T::TYPE_NAME
            ))
        })
    }

    /// Like `get`, but returns `None` instead of failing on a missing key or
    /// type mismatch.
    pub fn get_opt<T: FromMetadataValue>(&self, key: &str) -> Option<T> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| T::from_metadata_value(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The canonical string form: stable JSON with sorted keys. Used as a
    /// cache key and as the basis for content hashes.
    pub fn to_canonical_string(&self) -> String {
        let sorted: BTreeMap<&str, &MetadataValue> =
            self.entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
        serde_json::to_string(&sorted).unwrap_or_default()
    }

    /// Serialize the whole map (insertion order preserved) for wire framing.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let ordered: Vec<(&str, &MetadataValue)> =
            self.entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
        serde_json::to_vec(&ordered).unwrap_or_default()
    }

    pub fn from_wire_bytes(bytes: &[u8]) -> Result<Self> {
        let ordered: Vec<(String, MetadataValue)> = serde_json::from_slice(bytes)
            .map_err(|e| MultioError::CorruptJournal(format!("bad metadata frame: {e}")))?;
        Ok(Self { entries: ordered })
    }
}

/// Field precision: single (32-bit) or double (64-bit) floats.
///
/// The source's template-based precision dispatch becomes this runtime tag;
/// callers select a monomorphic numeric body per call via `dispatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Single,
    Double,
}

impl Precision {
    pub fn size_of(self) -> usize {
        match self {
            Precision::Single => std::mem::size_of::<f32>(),
            Precision::Double => std::mem::size_of::<f64>(),
        }
    }

    pub fn from_metadata(metadata: &Metadata) -> Result<Self> {
        let tag: String = metadata.get("precision")?;
        match tag.as_str() {
            "single" => Ok(Precision::Single),
            "double" => Ok(Precision::Double),
            other => Err(MultioError::FieldError(format!(
                "unknown precision tag '{other}'"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Single => "single",
            Precision::Double => "double",
        }
    }
}

/// `(param, level, step, ensemble)` — the correlation key across messages
/// that must be joined, and the shard key for client-to-server routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldIdentity {
    pub param: String,
    pub level: i64,
    pub step: i64,
    pub ensemble: i64,
}

impl FieldIdentity {
    pub fn from_metadata(metadata: &Metadata) -> Result<Self> {
        let param: String = metadata
            .get::<String>("param")
            .or_else(|_| metadata.get::<i64>("paramId").map(|v| v.to_string()))?;
        Ok(FieldIdentity {
            param,
            level: metadata.get_opt("level").unwrap_or(0),
            step: metadata.get("step")?,
            ensemble: metadata.get_opt("ensemble").unwrap_or(0),
        })
    }

    /// Stable (non-randomized) hash used for `hash(identity) mod nServers`
    /// shard routing. `std::collections::hash_map`'s default hasher is
    /// randomized per-process and unsuitable here — FNV is deterministic
    /// across runs and processes.
    pub fn stable_hash(&self) -> u64 {
        use fnv::FnvHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = FnvHasher::default();
        self.param.hash(&mut hasher);
        self.level.hash(&mut hasher);
        self.step.hash(&mut hasher);
        self.ensemble.hash(&mut hasher);
        hasher.finish()
    }

    pub fn shard(&self, n_servers: usize) -> usize {
        if n_servers == 0 {
            return 0;
        }
        (self.stable_hash() % n_servers as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_in_place() {
        let mut meta = Metadata::new();
        meta.set("a", 1i64);
        meta.set("b", 2i64);
        meta.set("a", 3i64);
        let keys: Vec<&str> = meta.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(meta.get::<i64>("a").unwrap(), 3);
    }

    #[test]
    fn missing_key_is_invalid_field() {
        let meta = Metadata::new();
        assert!(meta.get::<i64>("missing").is_err());
        assert_eq!(meta.get_opt::<i64>("missing"), None);
    }

    #[test]
    fn type_mismatch_is_invalid_field() {
        let mut meta = Metadata::new();
        meta.set("a", "not a number");
        assert!(meta.get::<i64>("a").is_err());
        assert_eq!(meta.get_opt::<i64>("a"), None);
    }

    #[test]
    fn canonical_string_sorts_keys() {
        let mut meta = Metadata::new();
        meta.set("z", 1i64);
        meta.set("a", 2i64);
        let canonical = meta.to_canonical_string();
        assert!(canonical.find("\"a\"").unwrap() < canonical.find("\"z\"").unwrap());
    }

    #[test]
    fn shard_routing_is_stable_for_identical_identity() {
        let id = FieldIdentity {
            param: "130".to_string(),
            level: 1,
            step: 1,
            ensemble: 0,
        };
        let a = id.shard(4);
        let b = id.shard(4);
        assert_eq!(a, b);
        assert!(a < 4);
    }
}
