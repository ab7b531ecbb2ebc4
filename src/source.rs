//! Reading source abstraction for the replay/stream CLI.
//!
//! Provides a unified trait for pulling reading events from different inputs:
//! CSV files (replay) and stdin (JSON lines, e.g. piped from `simulation`).
//! Sources only parse; validation happens in [`ReadingEvent::into_reading`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::types::ReadingEvent;

/// Events produced by a reading source.
pub enum SourceEvent {
    Reading(ReadingEvent),
    /// A complete line that is not a valid reading event
    Malformed(String),
    /// Source reached end of data
    Eof,
}

/// Where reading events come from.
///
/// The CLI calls [`next_event`](ReadingSource::next_event) inside a
/// `select!` with cancellation.
#[async_trait]
pub trait ReadingSource: Send + 'static {
    async fn next_event(&mut self) -> Result<SourceEvent>;

    /// Human-readable name for logging
    fn source_name(&self) -> &str;
}

// ============================================================================
// CSV Source (file replay)
// ============================================================================

/// Load reading events from a CSV file with columns
/// `timestamp,sensorType,value,sourceId`. A leading header row is skipped;
/// malformed lines are logged and skipped.
pub fn read_csv_events(path: &Path) -> Result<Vec<ReadingEvent>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();

    for (idx, line_result) in reader.lines().enumerate() {
        let line_num = idx + 1;
        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(line = line_num, error = %e, "Error reading CSV line");
                continue;
            }
        };

        if line.trim().is_empty() || (line_num == 1 && line.starts_with("timestamp")) {
            continue;
        }

        match parse_csv_line(&line) {
            Ok(event) => events.push(event),
            Err(e) => tracing::warn!(line = line_num, error = %e, "Error parsing CSV line"),
        }
    }

    tracing::info!(count = events.len(), path = %path.display(), "Loaded reading events from CSV");
    Ok(events)
}

fn parse_csv_line(line: &str) -> Result<ReadingEvent, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(format!("expected 4 fields, got {}", fields.len()));
    }
    let value = fields[2]
        .parse::<f64>()
        .map_err(|e| format!("bad value '{}': {e}", fields[2]))?;
    Ok(ReadingEvent {
        timestamp: fields[0].to_string(),
        sensor_type: fields[1].to_string(),
        value,
        source_id: fields[3].to_string(),
    })
}

/// Replays pre-loaded events with an optional delay between them.
pub struct CsvSource {
    events: std::vec::IntoIter<ReadingEvent>,
    delay_ms: u64,
    yielded_first: bool,
}

impl CsvSource {
    pub fn new(events: Vec<ReadingEvent>, delay_ms: u64) -> Self {
        Self {
            events: events.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl ReadingSource for CsvSource {
    async fn next_event(&mut self) -> Result<SourceEvent> {
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.events.next() {
            Some(e) => {
                self.yielded_first = true;
                Ok(SourceEvent::Reading(e))
            }
            None => Ok(SourceEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "CSV"
    }
}

// ============================================================================
// JSON Lines Source (stdin or any async reader)
// ============================================================================

/// Lines buffered between the reader task and the consumer.
const LINE_CHANNEL_CAPACITY: usize = 1024;

/// Reads JSON reading events, one per line, from an async reader.
///
/// A dedicated task owns the reader and forwards complete lines over a
/// channel, so `next_event` only awaits `recv()` and can lose a `select!`
/// race without dropping a partially read line.
///
/// `simulation --hours 24 | myco-telemetry --stdin`
pub struct JsonLinesSource {
    name: &'static str,
    lines: mpsc::Receiver<std::io::Result<String>>,
    reader_task: JoinHandle<()>,
}

impl JsonLinesSource {
    pub fn new<R>(reader: R, name: &'static str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let reader_task = tokio::spawn(async move {
            let mut lines = tokio::io::BufReader::new(reader).lines();
            loop {
                let Some(line) = lines.next_line().await.transpose() else {
                    break;
                };
                let failed = line.is_err();
                if tx.send(line).await.is_err() || failed {
                    break;
                }
            }
        });
        Self {
            name,
            lines: rx,
            reader_task,
        }
    }

    /// JSON lines from the process's standard input.
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin(), "stdin")
    }
}

impl Drop for JsonLinesSource {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[async_trait]
impl ReadingSource for JsonLinesSource {
    async fn next_event(&mut self) -> Result<SourceEvent> {
        loop {
            let Some(line) = self.lines.recv().await else {
                return Ok(SourceEvent::Eof);
            };
            let line = line.with_context(|| format!("Failed to read from {}", self.name))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return Ok(match serde_json::from_str::<ReadingEvent>(line) {
                Ok(event) => SourceEvent::Reading(event),
                Err(e) => {
                    tracing::warn!(source = self.name, error = %e, "Failed to parse reading event");
                    SourceEvent::Malformed(e.to_string())
                }
            });
        }
    }

    fn source_name(&self) -> &str {
        self.name
    }
}
