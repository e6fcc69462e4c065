// src/progress.rs

use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use crate::cnpj::Cnpj;
use crate::fetch::{LookupResult, RetryNotice};

/// Completion snapshot after a row. `row` fields elsewhere are 1-based data
/// row numbers (the header is not counted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl Progress {
    /// Whole percent, rounded down; an empty batch is complete.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed.min(self.total) * 100) / self.total) as u8
    }

    /// Average time per processed row so far × rows still to go.
    pub fn eta(&self) -> Option<Duration> {
        if self.processed == 0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.processed);
        Some(
            self.elapsed
                .mul_f64(remaining as f64 / self.processed as f64),
        )
    }
}

/// "4m 7s"
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ColumnDetected { column: String, total: usize },
    InvalidIdentifier { row: usize, raw: String },
    Querying { row: usize, cnpj: Cnpj, display: String },
    Retrying { cnpj: Cnpj, notice: RetryNotice },
    Resolved { row: usize, result: LookupResult },
    LookupFailed { row: usize, cnpj: Cnpj, error: String },
    Progress(Progress),
    Finished { records: usize, skipped: usize },
}

impl ProgressEvent {
    /// Log-pane line for this event, if it warrants one.
    pub fn message(&self) -> Option<String> {
        match self {
            ProgressEvent::ColumnDetected { column, total } => Some(format!(
                "CNPJ column detected: '{}' ({} rows)",
                column, total
            )),
            ProgressEvent::InvalidIdentifier { row, raw } => {
                Some(format!("row {}: invalid CNPJ {:?}, skipped", row, raw))
            }
            ProgressEvent::Querying { row, cnpj, display } if display != cnpj.as_str() => {
                Some(format!("row {}: querying {} ({})", row, display, cnpj))
            }
            ProgressEvent::Querying { row, cnpj, .. } => {
                Some(format!("row {}: querying {}", row, cnpj))
            }
            ProgressEvent::Retrying { cnpj, notice } => Some(format!(
                "{}: {}, waiting {}s (attempt {})",
                cnpj,
                notice.reason,
                notice.delay.as_secs(),
                notice.attempt
            )),
            ProgressEvent::Resolved { .. } => None,
            ProgressEvent::LookupFailed { row, cnpj, error } => {
                Some(format!("row {}: lookup of {} failed: {}", row, cnpj, error))
            }
            ProgressEvent::Progress(_) => None,
            ProgressEvent::Finished { records, skipped } => Some(format!(
                "done: {} records, {} rows skipped",
                records, skipped
            )),
        }
    }
}

/// Receives batch events. Sinks are advisory: they cannot influence the run.
pub trait ProgressSink {
    fn emit(&mut self, event: ProgressEvent);
}

impl ProgressSink for () {
    fn emit(&mut self, _event: ProgressEvent) {}
}

impl<T: ProgressSink + ?Sized> ProgressSink for &mut T {
    fn emit(&mut self, event: ProgressEvent) {
        (**self).emit(event)
    }
}

/// Collects everything; handy for inspecting a run afterwards.
impl ProgressSink for Vec<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) {
        self.push(event);
    }
}

/// Forwards to a render task. A dropped receiver only means nobody is watching.
impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

/// Console sink: every event becomes a tracing line.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&mut self, event: ProgressEvent) {
        match &event {
            ProgressEvent::Progress(p) => {
                let eta = p.eta().map(format_eta).unwrap_or_else(|| "--".into());
                info!(
                    processed = p.processed,
                    total = p.total,
                    "{}% done, {} remaining",
                    p.percent(),
                    eta
                );
            }
            ProgressEvent::InvalidIdentifier { .. } | ProgressEvent::Retrying { .. } => {
                if let Some(msg) = event.message() {
                    warn!("{}", msg);
                }
            }
            ProgressEvent::LookupFailed { .. } => {
                if let Some(msg) = event.message() {
                    error!("{}", msg);
                }
            }
            _ => {
                if let Some(msg) = event.message() {
                    info!("{}", msg);
                }
            }
        }
    }
}
