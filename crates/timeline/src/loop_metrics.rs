//! Event-loop statistics passed through from the host runtime.

use serde::{Deserialize, Serialize};

/// Counters reported by the event loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopMetrics {
    /// Number of completed loop iterations
    pub loop_count: u64,
    /// Number of events processed
    pub events: u64,
    /// Number of events waiting when the loop last polled
    pub events_waiting: u64,
}

/// Snapshot combining idle time and loop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopTiming {
    /// Milliseconds the loop spent idle in its poll phase
    pub idle_time: f64,
    /// Loop counters at the same instant
    pub loop_metrics: LoopMetrics,
}

/// Host runtime facility exposing event-loop statistics.
pub trait LoopMetricsSource: Send + Sync {
    /// Milliseconds the loop has spent idle.
    fn idle_time(&self) -> f64;

    /// Current loop counters.
    fn metrics_info(&self) -> LoopMetrics;
}

/// Source for hosts without an instrumented loop. Reports zeros.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLoopMetrics;

impl LoopMetricsSource for NoLoopMetrics {
    fn idle_time(&self) -> f64 {
        0.0
    }

    fn metrics_info(&self) -> LoopMetrics {
        LoopMetrics::default()
    }
}
