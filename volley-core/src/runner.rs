mod gate;
mod pacer;
mod progress;
mod run;
mod schedule;
mod vu;

pub use gate::IterationGate;
pub use pacer::ArrivalPacer;
pub use progress::{
    LiveMetrics, ProgressEvent, ProgressFn, ProgressUpdate, ScenarioProgress, StageProgress,
};
pub use run::{ExecutorReport, run_executor};
pub use schedule::{RampSchedule, StageSnapshot};
pub use vu::{StartSignal, VuContext, VuWork, run_vu};
