//! # IOStats
//!
//! Running counters kept by a sink: read/write counts, byte totals, and the
//! sums needed to report a standard deviation without retaining every
//! sample (§4.6). Not thread-safe by itself — the sink layer that owns an
//! `IOStats` is responsible for serializing access to it, the same way it
//! already serializes access to the underlying writer.

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct Counter {
    count: u64,
    total: u64,
    sum_sq: f64,
}

impl Counter {
    fn record(&mut self, amount: u64) {
        self.count += 1;
        self.total += amount;
        self.sum_sq += (amount as f64) * (amount as f64);
    }

    /// `sqrt(n*Σx² - (Σx)²) / n`; zero when `count == 0`.
    fn std_dev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        let mean_sq_term = n * self.sum_sq - (self.total as f64) * (self.total as f64);
        if mean_sq_term <= 0.0 {
            0.0
        } else {
            mean_sq_term.sqrt() / n
        }
    }
}

/// Per-named-operation timing, so a sink can report e.g. `"write"` and
/// `"flush"` latencies separately rather than one blended figure.
#[derive(Debug, Clone, Default)]
struct TimingCounter {
    count: u64,
    sum_micros: f64,
    sum_micros_sq: f64,
}

impl TimingCounter {
    fn record(&mut self, elapsed: Duration) {
        let micros = elapsed.as_secs_f64() * 1_000_000.0;
        self.count += 1;
        self.sum_micros += micros;
        self.sum_micros_sq += micros * micros;
    }

    fn std_dev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        let term = n * self.sum_micros_sq - self.sum_micros * self.sum_micros;
        if term <= 0.0 {
            0.0
        } else {
            term.sqrt() / n
        }
    }
}

/// Counters for one sink: reads, writes, byte totals with variance, and
/// arbitrary named operation timings (write, flush, retry...).
#[derive(Debug, Clone, Default)]
pub struct IoStats {
    reads: Counter,
    writes: Counter,
    timings: std::collections::HashMap<String, TimingCounter>,
}

impl IoStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&mut self, bytes: u64) {
        self.reads.record(bytes);
    }

    pub fn record_write(&mut self, bytes: u64) {
        self.writes.record(bytes);
    }

    pub fn record_timing(&mut self, operation: &str, elapsed: Duration) {
        self.timings.entry(operation.to_string()).or_default().record(elapsed);
    }

    pub fn num_reads(&self) -> u64 {
        self.reads.count
    }

    pub fn num_writes(&self) -> u64 {
        self.writes.count
    }

    pub fn bytes_read(&self) -> u64 {
        self.reads.total
    }

    pub fn bytes_written(&self) -> u64 {
        self.writes.total
    }

    pub fn report(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "reads={} bytesRead={} (stddev={:.2}) writes={} bytesWritten={} (stddev={:.2})",
            self.reads.count,
            self.reads.total,
            self.reads.std_dev(),
            self.writes.count,
            self.writes.total,
            self.writes.std_dev()
        )?;
        let mut names: Vec<&String> = self.timings.keys().collect();
        names.sort();
        for name in names {
            let t = &self.timings[name];
            writeln!(
                out,
                "  {name}: count={} meanUs={:.2} stddevUs={:.2}",
                t.count,
                if t.count == 0 { 0.0 } else { t.sum_micros / t.count as f64 },
                t.std_dev()
            )?;
        }
        Ok(())
    }
}
