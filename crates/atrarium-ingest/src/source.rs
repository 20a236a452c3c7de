//! JSONL event source adapter.
//!
//! Reads relay events from JSONL files (one JSON event per line), applies
//! the lightweight filter before paying for a full JSON parse, and hands
//! surviving events to the caller. Malformed lines are counted and
//! skipped, never fatal.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use crate::event::RelayEvent;
use crate::filter::passes_lightweight;
use crate::IngestError;

/// Counters describing one read pass over a source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SourceStats {
    /// Lines seen, including blank and malformed ones.
    pub total_lines: usize,
    /// Lines rejected by the lightweight substring filter.
    pub prefiltered: usize,
    /// Lines that failed to deserialize as a relay event.
    pub invalid: usize,
    /// Events handed to the caller.
    pub emitted: usize,
}

/// JSONL file event source.
#[derive(Debug, Clone)]
pub struct JsonlSource {
    input: PathBuf,
}

impl JsonlSource {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// Reads every event in the file, invoking `handler` for each one that
    /// survives the lightweight filter and deserializes cleanly.
    ///
    /// # Errors
    ///
    /// Only I/O failures are errors. Malformed lines are logged, counted
    /// in [`SourceStats::invalid`], and skipped.
    pub fn read_events<F>(&self, mut handler: F) -> Result<SourceStats, IngestError>
    where
        F: FnMut(RelayEvent),
    {
        let file = File::open(&self.input)?;
        let reader = BufReader::new(file);
        let mut stats = SourceStats::default();

        for (line_num, line_result) in reader.lines().enumerate() {
            stats.total_lines += 1;

            let line = match line_result {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!(line = line_num + 1, error = %e, "i/o error reading line, skipping");
                    stats.invalid += 1;
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            // Cheap substring check before the JSON parse. Never a
            // correctness gate: anything it passes still goes through the
            // structural parser.
            if !passes_lightweight(&line) {
                stats.prefiltered += 1;
                continue;
            }

            match serde_json::from_str::<RelayEvent>(&line) {
                Ok(event) => {
                    stats.emitted += 1;
                    handler(event);
                }
                Err(e) => {
                    tracing::debug!(line = line_num + 1, error = %e, "malformed relay event, skipping");
                    stats.invalid += 1;
                }
            }
        }

        tracing::info!(
            total = stats.total_lines,
            prefiltered = stats.prefiltered,
            invalid = stats.invalid,
            emitted = stats.emitted,
            "finished reading jsonl source"
        );

        Ok(stats)
    }
}
