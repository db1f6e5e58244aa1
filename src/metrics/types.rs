use serde::Serialize;

/// Throughput figures for one direction. `total_bytes` comes from connection
/// totals reported at close; the per-message figures come from deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrafficSummary {
    pub total_bytes: u64,
    pub messages: u64,
    pub avg_bytes: u64,
    pub min_bytes: u64,
    pub max_bytes: u64,
    pub p50_bytes: u64,
    pub p99_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorCount {
    pub message: String,
    pub count: u64,
}

/// Final snapshot of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSummary {
    /// Connections the run planned to open (amount × URLs).
    pub scheduled: u64,
    pub duration_ms: u64,
    /// Time until every ramp finished admitting and saw its opens settle.
    pub established_ms: Option<u64>,
    pub connected: u64,
    pub disconnected: u64,
    pub errors: u64,
    pub tx: TrafficSummary,
    pub rx: TrafficSummary,
    /// Most frequent first.
    pub error_counts: Vec<ErrorCount>,
}

impl MetricsSummary {
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.errors > 0 || self.disconnected > 0
    }
}
