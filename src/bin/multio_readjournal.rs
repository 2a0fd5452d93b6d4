//! # multio-readjournal
//!
//! Replays a journal file written by a `JournaledSink` and prints its
//! records (§6 CLI: `readjournal <path>`). A thin CLI wrapper over
//! `multio::journal::reader::JournalReader` — out of core scope per §1, but
//! specified here as the external contract shape the core must support.

use anyhow::{Context, Result};
use clap::Parser;
use multio::journal::reader::JournalReader;
use multio::journal::{EntryTag, Record, RecordTag};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

/// Dump the records of a multio journal file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the journal file to replay.
    path: PathBuf,

    /// Emit one JSON object per record instead of human-readable text.
    #[arg(long)]
    json: bool,

    /// Stop after this many records (default: read the whole file).
    #[arg(long)]
    limit: Option<usize>,
}

fn record_tag_name(tag: RecordTag) -> &'static str {
    match tag {
        RecordTag::Uninitialised => "Uninitialised",
        RecordTag::EndOfJournal => "EndOfJournal",
        RecordTag::JournalEntry => "JournalEntry",
        RecordTag::Configuration => "Configuration",
    }
}

fn entry_tag_name(tag: EntryTag) -> &'static str {
    match tag {
        EntryTag::Data => "Data",
        EntryTag::Write => "Write",
        EntryTag::End => "End",
    }
}

fn print_human(index: usize, record: &Record) {
    println!(
        "record[{index}]: tag={} entries={}",
        record_tag_name(record.tag),
        record.entries.len()
    );
    for (entry_idx, entry) in record.entries.iter().enumerate() {
        match entry.tag {
            EntryTag::Data => println!(
                "  entry[{entry_idx}]: tag=Data bytes={} ts={}.{:06}",
                entry.payload.len(),
                entry.timestamp.secs,
                entry.timestamp.usecs
            ),
            other => println!(
                "  entry[{entry_idx}]: tag={} id={} ts={}.{:06}",
                entry_tag_name(other),
                entry.id,
                entry.timestamp.secs,
                entry.timestamp.usecs
            ),
        }
    }
}

fn print_json(index: usize, record: &Record) {
    let entries: Vec<String> = record
        .entries
        .iter()
        .map(|e| {
            format!(
                "{{\"tag\":\"{}\",\"id\":{},\"payload_length\":{},\"secs\":{},\"usecs\":{}}}",
                entry_tag_name(e.tag),
                e.id,
                e.payload.len(),
                e.timestamp.secs,
                e.timestamp.usecs
            )
        })
        .collect();
    println!(
        "{{\"index\":{},\"tag\":\"{}\",\"entries\":[{}]}}",
        index,
        record_tag_name(record.tag),
        entries.join(",")
    );
}

fn main() -> Result<()> {
    let args = Args::parse();

    let file = File::open(&args.path).with_context(|| format!("opening journal file {:?}", args.path))?;
    let mut reader = JournalReader::new(BufReader::new(file));

    let mut count = 0usize;
    let mut total_data_bytes = 0u64;
    loop {
        if let Some(limit) = args.limit {
            if count >= limit {
                break;
            }
        }
        let record = reader
            .read_record()
            .with_context(|| format!("reading record {count} from {:?}", args.path))?;
        let Some(record) = record else { break };

        if let Some(data_entry) = record.entries.first().filter(|e| e.tag == EntryTag::Data) {
            total_data_bytes += data_entry.payload.len() as u64;
        }

        if args.json {
            print_json(count, &record);
        } else {
            print_human(count, &record);
        }
        count += 1;
    }

    if !args.json {
        println!("--");
        println!("{count} record(s), {total_data_bytes} total data byte(s)");
    }
    Ok(())
}
