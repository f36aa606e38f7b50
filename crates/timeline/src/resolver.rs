//! Mark-to-timestamp conversion and `measure` argument resolution.

use serde_json::Value;

use crate::buffer::TimelineBuffer;
use crate::error::{TimelineError, TimelineResult};

/// A point on the timeline given either by mark name or by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkRef {
    /// The most recent mark with this name
    Name(String),
    /// A timestamp in milliseconds since the timeline origin
    Timestamp(f64),
}

impl From<&str> for MarkRef {
    fn from(name: &str) -> Self {
        MarkRef::Name(name.to_string())
    }
}

impl From<String> for MarkRef {
    fn from(name: String) -> Self {
        MarkRef::Name(name)
    }
}

impl From<f64> for MarkRef {
    fn from(timestamp: f64) -> Self {
        MarkRef::Timestamp(timestamp)
    }
}

/// Options bag form of `measure`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasureOptions {
    /// Start of the interval
    pub start: Option<MarkRef>,
    /// End of the interval
    pub end: Option<MarkRef>,
    /// Length of the interval, combined with one of `start` or `end`
    pub duration: Option<f64>,
    /// Opaque value attached to the measure
    pub detail: Option<Value>,
}

impl MeasureOptions {
    /// Create an empty options bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the start reference.
    pub fn with_start(mut self, start: impl Into<MarkRef>) -> Self {
        self.start = Some(start.into());
        self
    }

    /// Set the end reference.
    pub fn with_end(mut self, end: impl Into<MarkRef>) -> Self {
        self.end = Some(end.into());
        self
    }

    /// Set the duration in milliseconds.
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Attach a detail value.
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    fn validate(&self) -> TimelineResult<()> {
        if self.start.is_none() && self.end.is_none() {
            return Err(TimelineError::InvalidArguments(
                "options.start or options.end must be specified".to_string(),
            ));
        }
        if self.start.is_some() && self.end.is_some() && self.duration.is_some() {
            return Err(TimelineError::InvalidArguments(
                "options.start, options.end and options.duration cannot all be specified"
                    .to_string(),
            ));
        }
        if let Some(duration) = self.duration {
            if !duration.is_finite() {
                return Err(TimelineError::InvalidArguments(format!(
                    "options.duration must be finite, got {}",
                    duration
                )));
            }
        }
        Ok(())
    }
}

/// Arguments accepted by `measure`.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasureArgs {
    /// `measure(name, start?, end?)`
    Positional {
        start: Option<MarkRef>,
        end: Option<MarkRef>,
    },
    /// `measure(name, { start?, end?, duration?, detail? })`
    Options(MeasureOptions),
}

impl MeasureArgs {
    /// From the timeline origin until now.
    pub fn none() -> Self {
        MeasureArgs::Positional {
            start: None,
            end: None,
        }
    }

    /// From `start` until now.
    pub fn from_start(start: impl Into<MarkRef>) -> Self {
        MeasureArgs::Positional {
            start: Some(start.into()),
            end: None,
        }
    }

    /// From `start` until `end`.
    pub fn between(start: impl Into<MarkRef>, end: impl Into<MarkRef>) -> Self {
        MeasureArgs::Positional {
            start: Some(start.into()),
            end: Some(end.into()),
        }
    }
}

impl Default for MeasureArgs {
    fn default() -> Self {
        Self::none()
    }
}

impl From<MeasureOptions> for MeasureArgs {
    fn from(options: MeasureOptions) -> Self {
        MeasureArgs::Options(options)
    }
}

/// Start time, duration and detail computed for a new measure.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMeasure {
    pub start_time: f64,
    pub duration: f64,
    pub detail: Option<Value>,
}

/// Convert a mark reference to a timeline-relative timestamp.
///
/// Names resolve to the most recently inserted mark with that name, so mark
/// names may be reused.
pub fn resolve(buffer: &TimelineBuffer, mark: &MarkRef) -> TimelineResult<f64> {
    match mark {
        MarkRef::Timestamp(timestamp) => Ok(*timestamp),
        MarkRef::Name(name) => buffer
            .last_mark(name)
            .map(|entry| entry.start_time())
            .ok_or_else(|| TimelineError::ReferenceNotFound(name.clone())),
    }
}

/// Resolve `measure` arguments against the buffer.
///
/// `now` is the clock reading used when no end point is given.
pub fn resolve_measure(
    buffer: &TimelineBuffer,
    args: MeasureArgs,
    now: f64,
) -> TimelineResult<ResolvedMeasure> {
    let (start, end, duration, detail) = match args {
        MeasureArgs::Positional { start, end } => (start, end, None, None),
        MeasureArgs::Options(options) => {
            options.validate()?;
            (options.start, options.end, options.duration, options.detail)
        }
    };

    let end_time = match (&start, &end, duration) {
        (_, Some(end), _) => resolve(buffer, end)?,
        (Some(start), None, Some(duration)) => resolve(buffer, start)? + duration,
        _ => now,
    };

    let start_time = match (&start, &end, duration) {
        (Some(start), _, _) => resolve(buffer, start)?,
        (None, Some(end), Some(duration)) => resolve(buffer, end)? - duration,
        _ => 0.0,
    };

    Ok(ResolvedMeasure {
        start_time,
        duration: end_time - start_time,
        detail,
    })
}
