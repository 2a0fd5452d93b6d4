//! `JournalReader` — the replay side of the journal.
//!
//! The source's own reader (`examples/original_source/src/apps/readjournal.cc`)
//! reads the header and walks entries but never fully validates the
//! terminator or per-entry invariants (see SPEC_FULL.md's Open Questions
//! resolution). This reader validates fully: the terminator must equal
//! `"END!"` exactly, the first entry of a `JournalEntry` record must be
//! `Data`, and every subsequent entry must carry `payload_length == 0` —
//! any violation is `CorruptJournal` rather than a best-effort partial
//! record.

use super::{
    decode_entry_header, decode_record_header, Entry, EntryTag, Record, RecordTag, ENTRY_HEADER_SIZE,
    RECORD_HEADER_SIZE, TERMINATION_MARKER,
};
use crate::error::{MultioError, Result};
use std::io::Read;

pub struct JournalReader<R: Read> {
    handle: R,
}

impl<R: Read> JournalReader<R> {
    pub fn new(handle: R) -> Self {
        JournalReader { handle }
    }

    fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut total = 0;
        while total < buf.len() {
            let n = self.handle.read(&mut buf[total..])?;
            if n == 0 {
                if total == 0 {
                    return Ok(false);
                }
                return Err(MultioError::CorruptJournal(
                    "truncated read: handle closed mid-record".into(),
                ));
            }
            total += n;
        }
        Ok(true)
    }

    /// Read the next record, or `None` at a clean end-of-file (no bytes
    /// remaining before the next record would have started).
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        let mut header_bytes = [0u8; RECORD_HEADER_SIZE];
        if !self.read_exact_or_eof(&mut header_bytes)? {
            return Ok(None);
        }
        let header = decode_record_header(&header_bytes)?;

        let mut entries = Vec::with_capacity(header.num_entries as usize);
        for idx in 0..header.num_entries {
            let mut entry_header_bytes = [0u8; ENTRY_HEADER_SIZE];
            if !self.read_exact_or_eof(&mut entry_header_bytes)? {
                return Err(MultioError::CorruptJournal(format!(
                    "record declared {} entries but handle ended after {idx}",
                    header.num_entries
                )));
            }
            let decoded = decode_entry_header(&entry_header_bytes)?;

            if idx == 0 && header.tag == RecordTag::JournalEntry && decoded.tag != EntryTag::Data {
                return Err(MultioError::CorruptJournal(
                    "first entry of a JournalEntry record must be Data".into(),
                ));
            }
            if idx != 0 && decoded.payload_length != 0 {
                return Err(MultioError::CorruptJournal(format!(
                    "entry {idx} is not the Data entry but has payload_length {}",
                    decoded.payload_length
                )));
            }

            let mut payload = vec![0u8; decoded.payload_length as usize];
            if !payload.is_empty() && !self.read_exact_or_eof(&mut payload)? {
                return Err(MultioError::CorruptJournal(
                    "truncated payload: handle ended mid-payload".into(),
                ));
            }

            entries.push(Entry {
                tag: decoded.tag,
                id: decoded.id,
                timestamp: decoded.timestamp,
                payload,
            });
        }

        let mut marker = [0u8; 4];
        if !self.read_exact_or_eof(&mut marker)? {
            return Err(MultioError::CorruptJournal(
                "missing termination marker at end of record".into(),
            ));
        }
        if marker != TERMINATION_MARKER {
            return Err(MultioError::CorruptJournal(format!(
                "termination marker mismatch: expected \"END!\", got {marker:?}"
            )));
        }

        Ok(Some(Record {
            tag: header.tag,
            entries,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::writer::JournalWriter;
    use crate::message::{Message, Payload, Peer, Tag};
    use crate::metadata::Metadata;

    fn sample_message(payload: Vec<u8>) -> Message {
        Message::new(
            Tag::Field,
            Peer::new("sim", 0),
            Peer::new("io", 0),
            Metadata::new(),
            Payload::new(payload),
        )
    }

    #[test]
    fn round_trips_a_written_record() {
        let mut writer = JournalWriter::new(Vec::new());
        let msg = sample_message(vec![1, 2, 3, 4, 5, 6, 7, 8]);
        writer.append_write(&msg, 3).unwrap();
        writer.close_record().unwrap();
        let bytes = writer.handle().clone();

        let mut reader = JournalReader::new(&bytes[..]);
        let record = reader.read_record().unwrap().unwrap();
        assert_eq!(record.tag, RecordTag::JournalEntry);
        assert_eq!(record.entries.len(), 2);
        assert_eq!(record.entries[0].tag, EntryTag::Data);
        assert_eq!(record.entries[0].payload, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(record.entries[1].tag, EntryTag::Write);
        assert_eq!(record.entries[1].id, 3);
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn corrupt_terminator_is_rejected() {
        let mut writer = JournalWriter::new(Vec::new());
        let msg = sample_message(vec![1, 2, 3, 4]);
        writer.append_write(&msg, 1).unwrap();
        writer.close_record().unwrap();
        let mut bytes = writer.handle().clone();
        let len = bytes.len();
        bytes[len - 1] = b'X';

        let mut reader = JournalReader::new(&bytes[..]);
        assert!(reader.read_record().is_err());
    }
}
