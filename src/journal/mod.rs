//! # Journal
//!
//! An append-only binary record of every sink write, grounded on
//! `multio::JournalRecord` (`examples/original_source/src/multio/JournalRecord.cc`):
//! a record is a header, an ordered list of entries (the first of which,
//! for a `JournalEntry` record, is always the `Data` entry the rest
//! reference), and a fixed 4-byte `"END!"` terminator.
//!
//! This module defines the on-disk layout and the in-memory `Record`
//! builder; [`writer`] and [`reader`] provide the write and replay sides.

pub mod reader;
pub mod writer;

use crate::error::{MultioError, Result};

pub const TERMINATION_MARKER: [u8; 4] = *b"END!";
pub const CURRENT_TAG_VERSION: u8 = 1;

/// Record-level tag (§6): what kind of record this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordTag {
    Uninitialised = 0,
    EndOfJournal = 1,
    JournalEntry = 2,
    Configuration = 3,
}

impl RecordTag {
    pub fn from_byte(b: u8) -> Result<Self> {
        Ok(match b {
            0 => RecordTag::Uninitialised,
            1 => RecordTag::EndOfJournal,
            2 => RecordTag::JournalEntry,
            3 => RecordTag::Configuration,
            other => {
                return Err(MultioError::CorruptJournal(format!(
                    "unknown record tag byte {other}"
                )))
            }
        })
    }
}

/// Entry-level tag: `Data` carries the payload; `Write`/`End` reference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryTag {
    Data = 0,
    Write = 1,
    End = 2,
}

impl EntryTag {
    pub fn from_byte(b: u8) -> Result<Self> {
        Ok(match b {
            0 => EntryTag::Data,
            1 => EntryTag::Write,
            2 => EntryTag::End,
            other => {
                return Err(MultioError::CorruptJournal(format!(
                    "unknown entry tag byte {other}"
                )))
            }
        })
    }
}

/// `{secs, usecs}` wall-clock stamp, one per record header and per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub secs: i64,
    pub usecs: i64,
}

impl Timestamp {
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp {
            secs: now.as_secs() as i64,
            usecs: now.subsec_micros() as i64,
        }
    }
}

/// One journal entry: a tag, an id (the sink id for `Write` entries), a
/// timestamp, and — for the first (`Data`) entry only — the payload bytes.
#[derive(Debug, Clone)]
pub struct Entry {
    pub tag: EntryTag,
    pub id: u32,
    pub timestamp: Timestamp,
    pub payload: Vec<u8>,
}

/// The 48-byte fixed header preceding a record's entries (§6).
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub tag: RecordTag,
    pub tag_version: u8,
    pub num_entries: u16,
    pub timestamp: Timestamp,
}

/// An in-memory record under construction. Distinct from `JournalWriter`,
/// which owns the file handle: a `Record` is the staged, not-yet-flushed
/// unit the writer builds up one `append_write` call at a time before
/// handing it to the handle atomically.
#[derive(Debug, Clone)]
pub struct Record {
    pub tag: RecordTag,
    pub entries: Vec<Entry>,
}

/// Fixed 48-byte record header layout (§6): `u8 tag, u8 tagVersion, u16
/// numEntries, pad[4], i64 tv_sec, i64 tv_usec, u8[24] reserved`.
pub const RECORD_HEADER_SIZE: usize = 48;
/// Fixed 48-byte entry header layout: `u8 tag, pad[3], u32 id, u64
/// payload_length, i64 tv_sec, i64 tv_usec, pad[16]`.
pub const ENTRY_HEADER_SIZE: usize = 48;

pub fn encode_record_header(header: &RecordHeader) -> [u8; RECORD_HEADER_SIZE] {
    let mut buf = [0u8; RECORD_HEADER_SIZE];
    buf[0] = header.tag as u8;
    buf[1] = header.tag_version;
    buf[2..4].copy_from_slice(&header.num_entries.to_le_bytes());
    buf[8..16].copy_from_slice(&header.timestamp.secs.to_le_bytes());
    buf[16..24].copy_from_slice(&header.timestamp.usecs.to_le_bytes());
    buf
}

pub fn decode_record_header(bytes: &[u8]) -> Result<RecordHeader> {
    if bytes.len() < RECORD_HEADER_SIZE {
        return Err(MultioError::CorruptJournal("record header truncated".into()));
    }
    let tag = RecordTag::from_byte(bytes[0])?;
    let tag_version = bytes[1];
    let num_entries = u16::from_le_bytes(bytes[2..4].try_into().unwrap());
    let secs = i64::from_le_bytes(bytes[8..16].try_into().unwrap());
    let usecs = i64::from_le_bytes(bytes[16..24].try_into().unwrap());
    Ok(RecordHeader {
        tag,
        tag_version,
        num_entries,
        timestamp: Timestamp { secs, usecs },
    })
}

pub fn encode_entry_header(entry: &Entry) -> [u8; ENTRY_HEADER_SIZE] {
    let mut buf = [0u8; ENTRY_HEADER_SIZE];
    buf[0] = entry.tag as u8;
    buf[4..8].copy_from_slice(&entry.id.to_le_bytes());
    buf[8..16].copy_from_slice(&(entry.payload.len() as u64).to_le_bytes());
    buf[16..24].copy_from_slice(&entry.timestamp.secs.to_le_bytes());
    buf[24..32].copy_from_slice(&entry.timestamp.usecs.to_le_bytes());
    buf
}

pub struct DecodedEntryHeader {
    pub tag: EntryTag,
    pub id: u32,
    pub payload_length: u64,
    pub timestamp: Timestamp,
}

pub fn decode_entry_header(bytes: &[u8]) -> Result<DecodedEntryHeader> {
    if bytes.len() < ENTRY_HEADER_SIZE {
        return Err(MultioError::CorruptJournal("entry header truncated".into()));
    }
    let tag = EntryTag::from_byte(bytes[0])?;
    let id = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let payload_length = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    let secs = i64::from_le_bytes(bytes[16..24].try_into().unwrap());
    let usecs = i64::from_le_bytes(bytes[24..32].try_into().unwrap());
    Ok(DecodedEntryHeader {
        tag,
        id,
        payload_length,
        timestamp: Timestamp { secs, usecs },
    })
}

impl Record {
    pub fn new(tag: RecordTag) -> Self {
        Record {
            tag,
            entries: Vec::new(),
        }
    }

    fn has_data_entry(&self) -> bool {
        matches!(self.entries.first(), Some(e) if e.tag == EntryTag::Data)
    }

    /// Add the record's `Data` entry if one isn't already present; a no-op
    /// (matching the source's `addData`) if another sink already staged the
    /// same payload into this record.
    pub fn add_data(&mut self, payload: Vec<u8>) {
        if self.has_data_entry() {
            return;
        }
        self.entries.insert(
            0,
            Entry {
                tag: EntryTag::Data,
                id: 0,
                timestamp: Timestamp::now(),
                payload,
            },
        );
    }

    /// Add a reference entry (`Write` or `End`). The `Data` entry must
    /// already be present.
    pub fn add_entry(&mut self, tag: EntryTag, id: u32) -> Result<()> {
        if !self.has_data_entry() {
            return Err(MultioError::Configuration(
                "journal record: entry added before the Data entry".into(),
            ));
        }
        self.entries.push(Entry {
            tag,
            id,
            timestamp: Timestamp::now(),
            payload: Vec::new(),
        });
        Ok(())
    }

    pub fn header(&self) -> RecordHeader {
        RecordHeader {
            tag: self.tag,
            tag_version: CURRENT_TAG_VERSION,
            num_entries: self.entries.len() as u16,
            timestamp: self.entries.first().map(|e| e.timestamp).unwrap_or_else(Timestamp::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_header_round_trips() {
        let header = RecordHeader {
            tag: RecordTag::JournalEntry,
            tag_version: CURRENT_TAG_VERSION,
            num_entries: 2,
            timestamp: Timestamp { secs: 1700000000, usecs: 123456 },
        };
        let bytes = encode_record_header(&header);
        assert_eq!(bytes.len(), RECORD_HEADER_SIZE);
        let decoded = decode_record_header(&bytes).unwrap();
        assert_eq!(decoded.tag, header.tag);
        assert_eq!(decoded.num_entries, header.num_entries);
        assert_eq!(decoded.timestamp, header.timestamp);
    }

    #[test]
    fn entry_header_round_trips() {
        let entry = Entry {
            tag: EntryTag::Write,
            id: 3,
            timestamp: Timestamp { secs: 42, usecs: 7 },
            payload: Vec::new(),
        };
        let bytes = encode_entry_header(&entry);
        assert_eq!(bytes.len(), ENTRY_HEADER_SIZE);
        let decoded = decode_entry_header(&bytes).unwrap();
        assert_eq!(decoded.tag, EntryTag::Write);
        assert_eq!(decoded.id, 3);
        assert_eq!(decoded.payload_length, 0);
    }

    #[test]
    fn add_entry_before_data_fails() {
        let mut record = Record::new(RecordTag::JournalEntry);
        assert!(record.add_entry(EntryTag::Write, 0).is_err());
    }

    #[test]
    fn add_data_is_idempotent() {
        let mut record = Record::new(RecordTag::JournalEntry);
        record.add_data(vec![1, 2, 3]);
        record.add_data(vec![9, 9, 9]);
        assert_eq!(record.entries.len(), 1);
        assert_eq!(record.entries[0].payload, vec![1, 2, 3]);
    }
}
