//! Per-operation timing for profiling.
//!
//! This module collects timings when the `profiling` feature is enabled.
//! Without the feature, the timer and collector compile to no-ops.

use std::collections::BTreeMap;
#[cfg(feature = "profiling")]
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Operations tracked by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    FarthestPointSample,
    BallQuery,
    Gather,
    GatherBackward,
    Chamfer,
    ChamferBackward,
}

/// Execution path an operation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Cpu,
    KdTree,
    Gpu,
}

/// Accumulated timing for one operation kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpTiming {
    pub calls: usize,
    pub gpu_calls: usize,
    pub kd_tree_calls: usize,
    pub total_ms: f64,
    pub max_ms: f64,
}

/// Timing of every operation since the collector was created or reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub ops: BTreeMap<OpKind, OpTiming>,
}

impl TimingSummary {
    pub fn get(&self, op: OpKind) -> Option<&OpTiming> {
        self.ops.get(&op)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Timer that can be enabled/disabled at compile time.
#[cfg(feature = "profiling")]
pub struct Timer {
    start: Instant,
}

#[cfg(feature = "profiling")]
impl Timer {
    #[inline]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

/// No-op timer when profiling is disabled.
#[cfg(not(feature = "profiling"))]
pub struct Timer;

#[cfg(not(feature = "profiling"))]
impl Timer {
    #[inline(always)]
    pub fn start() -> Self {
        Self
    }

    #[inline(always)]
    pub fn elapsed_ms(&self) -> f64 {
        0.0
    }
}

/// Collector for per-operation timing.
#[cfg(feature = "profiling")]
#[derive(Debug, Default)]
pub struct TimingCollector {
    summary: TimingSummary,
}

#[cfg(feature = "profiling")]
impl TimingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, op: OpKind, backend: Backend, duration_ms: f64) {
        let entry = self.summary.ops.entry(op).or_default();
        entry.calls += 1;
        match backend {
            Backend::Gpu => entry.gpu_calls += 1,
            Backend::KdTree => entry.kd_tree_calls += 1,
            Backend::Cpu => {}
        }
        entry.total_ms += duration_ms;
        entry.max_ms = entry.max_ms.max(duration_ms);
    }

    pub fn summary(&self) -> TimingSummary {
        self.summary.clone()
    }

    pub fn reset(&mut self) {
        self.summary = TimingSummary::default();
    }
}

/// No-op collector when profiling is disabled.
#[cfg(not(feature = "profiling"))]
#[derive(Debug, Default)]
pub struct TimingCollector;

#[cfg(not(feature = "profiling"))]
impl TimingCollector {
    #[inline(always)]
    pub fn new() -> Self {
        Self
    }

    #[inline(always)]
    pub fn record(&mut self, _op: OpKind, _backend: Backend, _duration_ms: f64) {}

    #[inline(always)]
    pub fn summary(&self) -> TimingSummary {
        TimingSummary::default()
    }

    #[inline(always)]
    pub fn reset(&mut self) {}
}
