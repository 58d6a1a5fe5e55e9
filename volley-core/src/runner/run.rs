use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::Barrier;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::gate::IterationGate;
use super::pacer::ArrivalPacer;
use super::progress::{
    LiveMetrics, ProgressEvent, ProgressFn, ProgressUpdate, ScenarioProgress, StageProgress,
};
use super::schedule::RampSchedule;
use super::vu::{StartSignal, VuContext, VuWork, run_vu};
use crate::config::{Executor, ScenarioConfig};
use crate::error::{DroppedIterationError, Result};
use crate::request_metrics::RunMetrics;
use crate::summary::RunState;

const PACER_TICK: Duration = Duration::from_millis(10);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
const DROP_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// What the executor observed; metric data lives in [`RunMetrics`].
#[derive(Debug, Clone, Copy)]
pub struct ExecutorReport {
    pub elapsed: Duration,
    /// `true` when the drain timeout expired and in-flight iterations were aborted.
    pub drain_timed_out: bool,
}

#[derive(Clone)]
enum ProgressInfo {
    Fixed {
        vus: u64,
        duration: Duration,
    },
    Staged {
        schedule: Arc<RampSchedule>,
    },
    ArrivalRate {
        rate: u64,
        time_unit: Duration,
        duration: Duration,
        pacer: Arc<ArrivalPacer>,
    },
}

impl ProgressInfo {
    fn snapshot(&self, elapsed: Duration) -> ScenarioProgress {
        match self {
            Self::Fixed { vus, duration } => ScenarioProgress::Fixed {
                vus: *vus,
                duration: *duration,
            },
            Self::Staged { schedule } => ScenarioProgress::Staged {
                total_duration: schedule.total_duration(),
                stage: schedule.stage_snapshot_at(elapsed).map(|st| StageProgress {
                    stage: st.index + 1,
                    stages: st.count,
                    stage_elapsed: st.stage_elapsed,
                    stage_remaining: st.stage_remaining,
                    start_target: st.start_target,
                    end_target: st.end_target,
                    current_target: st.current_target,
                }),
            },
            Self::ArrivalRate {
                rate,
                time_unit,
                duration,
                pacer,
            } => ScenarioProgress::ArrivalRate {
                rate: *rate,
                time_unit: *time_unit,
                duration: *duration,
                active_vus: pacer.active_vus(),
                max_vus: pacer.max_vus(),
                dropped_iterations_total: pacer.dropped_total(),
            },
        }
    }
}

fn per_sec(delta: u64, dt: Duration) -> f64 {
    delta as f64 / dt.as_secs_f64().max(1e-9)
}

fn spawn_progress(
    progress: ProgressFn,
    info: ProgressInfo,
    scenario: &ScenarioConfig,
    metrics: Arc<RunMetrics>,
    started: Instant,
) -> JoinHandle<()> {
    let scenario_name = scenario.name.clone();
    let executor = scenario.executor.kind().to_string();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(
            tokio::time::Instant::from_std(started) + PROGRESS_INTERVAL,
            PROGRESS_INTERVAL,
        );
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tick: u64 = 0;
        let mut last_at = started;
        let mut last_requests = 0u64;
        let mut last_failed = 0u64;
        let mut last_iterations = 0u64;

        loop {
            interval.tick().await;
            tick = tick.saturating_add(1);

            let now = Instant::now();
            let dt = now.duration_since(last_at);
            last_at = now;

            let requests_total = metrics.requests_total();
            let failed_total = metrics.failed_requests_total();
            let iterations_total = metrics.iterations_total();

            let delta_requests = requests_total.saturating_sub(last_requests);
            let delta_failed = failed_total.saturating_sub(last_failed);
            let delta_iterations = iterations_total.saturating_sub(last_iterations);
            last_requests = requests_total;
            last_failed = failed_total;
            last_iterations = iterations_total;

            let error_rate_now = if delta_requests == 0 {
                0.0
            } else {
                (delta_failed as f64 / delta_requests as f64).min(1.0)
            };

            let elapsed = started.elapsed();
            let live = LiveMetrics {
                requests_total,
                rps_now: per_sec(delta_requests, dt),
                failed_requests_total: failed_total,
                error_rate_now,
                iterations_total,
                iterations_per_sec_now: per_sec(delta_iterations, dt),
                dropped_iterations_total: metrics.dropped_total(),
                active_vus: u64::try_from(metrics.vus().gauge_value()).unwrap_or(0),
                latency_p50_ms: metrics.duration_percentile(50.0),
                latency_p99_ms: metrics.duration_percentile(99.0),
                bytes_received_total: metrics.bytes_received_total(),
                bytes_sent_total: metrics.bytes_sent_total(),
            };

            (progress)(ProgressEvent::Tick(ProgressUpdate {
                tick,
                elapsed,
                scenario: scenario_name.clone(),
                executor: executor.clone(),
                metrics: live,
                progress: info.snapshot(elapsed),
            }));
        }
    })
}

/// Converts the arrival rate into starts every [`PACER_TICK`] until `duration` elapses.
fn spawn_pacer(
    pacer: Arc<ArrivalPacer>,
    rate: u64,
    time_unit: Duration,
    duration: Duration,
    metrics: Arc<RunMetrics>,
    started: Instant,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::from_std(started), PACER_TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let per_unit = rate as f64;
        let unit_s = time_unit.as_secs_f64().max(1e-9);
        let mut carry = 0.0f64;
        let mut last_tick = started;
        let mut last_log: Option<Instant> = None;
        let mut unlogged = 0u64;

        loop {
            interval.tick().await;

            let now = Instant::now();
            if now.duration_since(started) >= duration {
                break;
            }

            // Account for the real gap so a delayed tick does not lose starts.
            let dt = now.duration_since(last_tick);
            last_tick = now;
            carry += per_unit * dt.as_secs_f64() / unit_s;
            let due = carry.floor() as u64;
            carry -= due as f64;

            let dropped = pacer.offer(due);
            if dropped == 0 {
                continue;
            }
            metrics.record_dropped(dropped);
            unlogged = unlogged.saturating_add(dropped);

            if last_log.is_none_or(|at| now.duration_since(at) >= DROP_LOG_INTERVAL) {
                let err = DroppedIterationError {
                    count: unlogged,
                    max_vus: pacer.max_vus(),
                };
                tracing::warn!(error = %err, "dropped iterations");
                last_log = Some(now);
                unlogged = 0;
            }
        }

        if unlogged != 0 {
            let err = DroppedIterationError {
                count: unlogged,
                max_vus: pacer.max_vus(),
            };
            tracing::warn!(error = %err, "dropped iterations");
        }
        pacer.mark_done();
    })
}

/// Runs the scenario's executor: spawns the VU pool, starts the clock, stops new starts at
/// the end of the duration, and drains in-flight iterations within `drain_timeout`.
pub async fn run_executor<F, Fut>(
    scenario: &ScenarioConfig,
    metrics: Arc<RunMetrics>,
    iteration: F,
    progress: Option<ProgressFn>,
    on_state: &(dyn Fn(RunState, Duration) + Send + Sync),
) -> Result<ExecutorReport>
where
    F: Fn(u64) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let max_vus = scenario.executor.max_vus();
    let duration = scenario.executor.duration();

    let mut gate: Option<Arc<IterationGate>> = None;
    let mut pacer_cfg: Option<(Arc<ArrivalPacer>, u64, Duration)> = None;

    let (work, info) = match &scenario.executor {
        Executor::Fixed { vus, duration } => {
            let g = Arc::new(IterationGate::new(*duration));
            gate = Some(g.clone());
            (
                VuWork::Fixed { gate: g },
                ProgressInfo::Fixed {
                    vus: *vus,
                    duration: *duration,
                },
            )
        }
        Executor::Staged {
            start_vus,
            stages,
            interpolation,
        } => {
            let schedule = Arc::new(RampSchedule::new(
                *start_vus,
                stages.clone(),
                *interpolation,
            ));
            (
                VuWork::Staged {
                    schedule: schedule.clone(),
                },
                ProgressInfo::Staged { schedule },
            )
        }
        Executor::ConstantArrivalRate {
            rate,
            time_unit,
            duration,
            pre_allocated_vus,
            max_vus,
        } => {
            let pacer = Arc::new(ArrivalPacer::new(*pre_allocated_vus, *max_vus));
            pacer_cfg = Some((pacer.clone(), *rate, *time_unit));
            (
                VuWork::ArrivalRate {
                    pacer: pacer.clone(),
                },
                ProgressInfo::ArrivalRate {
                    rate: *rate,
                    time_unit: *time_unit,
                    duration: *duration,
                    pacer,
                },
            )
        }
    };

    let vu_count = usize::try_from(max_vus).unwrap_or(usize::MAX);
    let ready_barrier = Arc::new(Barrier::new(vu_count.saturating_add(1)));
    let start_signal = Arc::new(StartSignal::new());
    let run_started: Arc<OnceLock<Instant>> = Arc::new(OnceLock::new());

    let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(vu_count);
    for vu_index in 1..=max_vus {
        let ctx = VuContext {
            vu_index,
            metrics: metrics.clone(),
            work: work.clone(),
            run_started: run_started.clone(),
            ready_barrier: ready_barrier.clone(),
            start_signal: start_signal.clone(),
        };
        handles.push(tokio::spawn(run_vu(ctx, iteration.clone())));
    }

    // Every VU task is parked on the barrier; start timing now.
    ready_barrier.wait().await;

    let started = Instant::now();
    let _ = run_started.set(started);
    if let Some(gate) = &gate {
        gate.start_at(started);
    }
    // Reported before any VU is released.
    on_state(RunState::Running, Duration::ZERO);
    start_signal.start();
    tracing::info!(
        scenario = %scenario.name,
        executor = %scenario.executor.kind(),
        vus = max_vus,
        duration = ?duration,
        "scenario started"
    );

    let pacer_handle = pacer_cfg.map(|(pacer, rate, time_unit)| {
        spawn_pacer(pacer, rate, time_unit, duration, metrics.clone(), started)
    });
    let progress_handle = progress
        .map(|p| spawn_progress(p, info, scenario, metrics.clone(), started));

    tokio::time::sleep_until(tokio::time::Instant::from_std(started + duration)).await;
    on_state(RunState::Draining, started.elapsed());

    if let Some(h) = pacer_handle {
        h.await?;
    }

    let mut joined = 0usize;
    let drained = tokio::time::timeout(scenario.drain_timeout, async {
        for h in handles.iter_mut() {
            h.await?;
            joined += 1;
        }
        Ok::<_, tokio::task::JoinError>(())
    })
    .await;

    let drain_timed_out = match drained {
        Ok(res) => {
            res?;
            false
        }
        Err(_) => {
            let remaining = &handles[joined..];
            tracing::warn!(
                vus = remaining.iter().filter(|h| !h.is_finished()).count(),
                drain_timeout = ?scenario.drain_timeout,
                "drain timeout expired; aborting in-flight iterations"
            );
            for h in remaining {
                h.abort();
            }
            for h in handles.drain(joined..) {
                if let Err(err) = h.await
                    && err.is_panic()
                {
                    return Err(err.into());
                }
            }
            true
        }
    };

    if let Some(h) = progress_handle {
        h.abort();
        let _ = h.await;
    }

    Ok(ExecutorReport {
        elapsed: started.elapsed(),
        drain_timed_out,
    })
}
