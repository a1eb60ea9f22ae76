//! Stage progress reporting.
//!
//! The pipeline emits one event per stage transition plus one event per
//! degraded-path warning. Sinks are synchronous; a caller that wants an
//! asynchronous stream wraps an `mpsc::Sender` in `ChannelProgress` and drains the receiver.

use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, warn};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Load,
    MatrixBuild,
    OdTransform,
    Unmix,
    Thb,
    Segment,
    Stats,
    Save,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Load,
        Stage::MatrixBuild,
        Stage::OdTransform,
        Stage::Unmix,
        Stage::Thb,
        Stage::Segment,
        Stage::Stats,
        Stage::Save,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::MatrixBuild => "matrix-build",
            Stage::OdTransform => "od-transform",
            Stage::Unmix => "unmix",
            Stage::Thb => "thb",
            Stage::Segment => "segment",
            Stage::Stats => "stats",
            Stage::Save => "save",
        }
    }

    /// One-based position, used for "n/8" style messages.
    pub fn ordinal(&self) -> usize {
        Stage::ALL.iter().position(|s| s == self).map_or(0, |i| i + 1)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub level: ProgressLevel,
    pub message: String,
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = Stage::ALL.len();
        match self.level {
            ProgressLevel::Info => {
                write!(f, "{}/{} {}: {}", self.stage.ordinal(), total, self.stage, self.message)
            }
            ProgressLevel::Warning => write!(f, "warning ({}): {}", self.stage, self.message),
        }
    }
}

pub trait ProgressSink {
    fn report(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent),
{
    fn report(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Forwards events into a channel the caller drains.
pub struct ChannelProgress(pub Sender<ProgressEvent>);

impl ProgressSink for ChannelProgress {
    fn report(&self, event: &ProgressEvent) {
        // A dropped receiver means nobody is listening any more; the run
        // itself carries on.
        let _ = self.0.send(event.clone());
    }
}

/// Sink that discards every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Wraps a sink, mirrors every event into the log and keeps the warnings so
/// they can be attached to the final result.
pub struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    warnings: Mutex<Vec<String>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn stage(&self, stage: Stage, message: impl Into<String>) {
        let event = ProgressEvent {
            stage,
            level: ProgressLevel::Info,
            message: message.into(),
        };
        info!(stage = %stage, "{}", event.message);
        self.sink.report(&event);
    }

    pub fn warn(&self, stage: Stage, message: impl Into<String>) {
        let event = ProgressEvent {
            stage,
            level: ProgressLevel::Warning,
            message: message.into(),
        };
        warn!(stage = %stage, "{}", event.message);
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(event.message.clone());
        }
        self.sink.report(&event);
    }

    pub fn take_warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default()
    }
}
