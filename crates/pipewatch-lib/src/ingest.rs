//! JSON-lines batch loader for execution events
//!
//! One JSON object per non-empty line. Bad lines are reported and skipped;
//! they never abort the batch or touch other pipelines.

use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::aggregator::ApplyOutcome;
use crate::models::{ExecutionEvent, RawExecutionEvent};
use crate::monitor::PipelineMonitor;
use crate::observability::StructuredLogger;

/// A line that could not be applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedLine {
    /// 1-based line number
    pub line: usize,
    pub reason: String,
}

/// Summary of a batch load
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub applied: usize,
    pub duplicates: usize,
    pub rejected: Vec<RejectedLine>,
}

impl IngestReport {
    pub fn lines_read(&self) -> usize {
        self.applied + self.duplicates + self.rejected.len()
    }
}

/// Parse and apply a single raw line, recording the outcome in `report`
fn ingest_line(monitor: &PipelineMonitor, report: &mut IngestReport, line_no: usize, bytes: &[u8]) {
    let line = match std::str::from_utf8(bytes) {
        Ok(line) => line.trim(),
        Err(e) => {
            report.rejected.push(RejectedLine {
                line: line_no,
                reason: format!("invalid UTF-8: {}", e),
            });
            return;
        }
    };
    if line.is_empty() {
        return;
    }

    let applied = serde_json::from_str::<RawExecutionEvent>(line)
        .map_err(|e| format!("malformed JSON: {}", e))
        .and_then(|raw| ExecutionEvent::try_from(raw).map_err(|e| e.to_string()))
        .and_then(|event| monitor.ingest(&event).map_err(|e| e.to_string()));

    match applied {
        Ok(ApplyOutcome::Applied) => report.applied += 1,
        Ok(ApplyOutcome::Duplicate) => report.duplicates += 1,
        Err(reason) => report.rejected.push(RejectedLine {
            line: line_no,
            reason,
        }),
    }
}

fn log_report(source: &str, report: &IngestReport) {
    let logger = StructuredLogger::new("ingest");
    for rejected in &report.rejected {
        logger.log_event_rejected(Some(rejected.line), &rejected.reason);
    }
    logger.log_ingest_complete(
        source,
        report.applied,
        report.duplicates,
        report.rejected.len(),
    );
}

/// Apply every line of a synchronous reader
///
/// Lines are split on raw bytes, so a line that is not valid UTF-8 is
/// rejected on its own instead of failing the batch.
pub fn ingest_reader<R: BufRead>(mut reader: R, monitor: &PipelineMonitor) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    let mut buf = Vec::new();
    let mut line_no = 0;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("Failed to read line {}", line_no + 1))?;
        if read == 0 {
            break;
        }
        line_no += 1;
        ingest_line(monitor, &mut report, line_no, &buf);
    }

    log_report("reader", &report);
    Ok(report)
}

/// Load a JSONL file of execution events into `monitor`
pub async fn load_jsonl(path: &Path, monitor: &PipelineMonitor) -> Result<IngestReport> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open events file {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut report = IngestReport::default();
    let mut buf = Vec::new();
    let mut line_no = 0;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        line_no += 1;
        ingest_line(monitor, &mut report, line_no, &buf);
    }

    log_report(&path.display().to_string(), &report);
    Ok(report)
}
