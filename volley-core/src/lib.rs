pub mod config;
mod error;
pub mod planner;
pub mod request_metrics;
mod run;
pub mod runner;
mod summary;
pub mod thresholds;
pub mod thresholds_eval;
pub mod token;

pub use config::{
    ConfigOptions, Executor, ExecutorKind, RunOverrides, ScenarioConfig, ScenarioOptions,
    resolve_scenario,
};
pub use error::{DroppedIterationError, Error, Result};
pub use planner::{RequestPlanner, ResolvedRequest, select_weighted};
pub use request_metrics::{RequestOutcome, RunMetrics};
pub use run::{RunOptions, run_scenario};
pub use runner::{ProgressEvent, ProgressFn, ProgressUpdate, ScenarioProgress};
pub use summary::{CheckSummary, RunState, RunSummary};
pub use thresholds::{ThresholdSet, default_thresholds};
pub use thresholds_eval::{ThresholdResult, ThresholdViolation};
pub use token::{AuthError, Token, TokenEndpoint, TokenManager};
