use std::sync::Arc;
use std::time::Duration;

use crate::summary::RunState;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMetrics {
    pub requests_total: u64,
    /// Requests/sec over the last progress interval.
    pub rps_now: f64,

    /// Requests whose status was not acceptable, transport and auth failures included.
    pub failed_requests_total: u64,
    /// Failed / total requests over the last progress interval (0..=1).
    pub error_rate_now: f64,

    pub iterations_total: u64,
    pub iterations_per_sec_now: f64,
    pub dropped_iterations_total: u64,

    pub active_vus: u64,

    /// Cumulative `http_req_duration` percentiles in milliseconds.
    pub latency_p50_ms: Option<f64>,
    pub latency_p99_ms: Option<f64>,

    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioProgress {
    Fixed {
        vus: u64,
        duration: Duration,
    },
    Staged {
        total_duration: Duration,
        stage: Option<StageProgress>,
    },
    ArrivalRate {
        rate: u64,
        time_unit: Duration,
        duration: Duration,
        active_vus: u64,
        max_vus: u64,
        dropped_iterations_total: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based).
    pub tick: u64,
    pub elapsed: Duration,
    pub scenario: String,
    pub executor: String,
    pub metrics: LiveMetrics,
    pub progress: ScenarioProgress,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The run entered a new state.
    State { state: RunState, elapsed: Duration },
    /// Periodic sample while the scenario runs.
    Tick(ProgressUpdate),
}

pub type ProgressFn = Arc<dyn Fn(ProgressEvent) + Send + Sync + 'static>;
