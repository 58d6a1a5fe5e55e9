use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::{Barrier, Notify};

use super::gate::IterationGate;
use super::pacer::ArrivalPacer;
use super::schedule::RampSchedule;
use crate::request_metrics::RunMetrics;

#[derive(Debug, Default)]
pub struct StartSignal {
    started: AtomicBool,
    notify: Notify,
}

impl StartSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        loop {
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.started.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Clone)]
pub enum VuWork {
    Fixed { gate: Arc<IterationGate> },
    Staged { schedule: Arc<RampSchedule> },
    ArrivalRate { pacer: Arc<ArrivalPacer> },
}

#[derive(Debug, Clone)]
pub struct VuContext {
    /// 1-based index within the scenario's pool.
    pub vu_index: u64,
    pub metrics: Arc<RunMetrics>,
    pub work: VuWork,
    pub run_started: Arc<OnceLock<Instant>>,
    pub ready_barrier: Arc<Barrier>,
    pub start_signal: Arc<StartSignal>,
}

/// Keeps the `vus` gauge in step with this VU's active state, including on abort.
struct ActiveVu<'a> {
    metrics: &'a RunMetrics,
    active: bool,
}

impl<'a> ActiveVu<'a> {
    fn new(metrics: &'a RunMetrics) -> Self {
        Self {
            metrics,
            active: false,
        }
    }

    fn set(&mut self, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        if active {
            let now = self.metrics.vus().add_gauge(1);
            self.metrics.vus_max().raise_gauge(now);
        } else {
            self.metrics.vus().add_gauge(-1);
        }
    }
}

impl Drop for ActiveVu<'_> {
    fn drop(&mut self) {
        self.set(false);
    }
}

/// Counts an iteration as incomplete if it is dropped before finishing.
struct IterationGuard<'a> {
    metrics: &'a RunMetrics,
    done: bool,
}

impl Drop for IterationGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.metrics.record_incomplete(1);
        }
    }
}

async fn run_one<F, Fut>(ctx: &VuContext, iteration: &F)
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = bool>,
{
    let mut guard = IterationGuard {
        metrics: &ctx.metrics,
        done: false,
    };
    let started = Instant::now();
    let ok = iteration(ctx.vu_index).await;
    guard.done = true;
    ctx.metrics.record_iteration(started.elapsed(), ok);
}

/// Drives one VU until its executor stops handing out iterations.
pub async fn run_vu<F, Fut>(ctx: VuContext, iteration: F)
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = bool>,
{
    // All VUs exist before the clock starts.
    ctx.ready_barrier.wait().await;
    ctx.start_signal.wait().await;

    let started = ctx
        .run_started
        .get()
        .copied()
        .unwrap_or_else(Instant::now);
    let mut active = ActiveVu::new(&ctx.metrics);

    match &ctx.work {
        VuWork::Fixed { gate } => {
            active.set(true);
            while gate.next() {
                run_one(&ctx, &iteration).await;
            }
        }
        VuWork::Staged { schedule } => loop {
            let elapsed = started.elapsed();
            if schedule.is_done(elapsed) {
                break;
            }

            if ctx.vu_index > schedule.target_at(elapsed) {
                active.set(false);
                let wait = schedule.next_recheck_in(elapsed, ctx.vu_index);
                tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
                continue;
            }

            active.set(true);
            run_one(&ctx, &iteration).await;
        },
        VuWork::ArrivalRate { pacer } => loop {
            if ctx.vu_index > pacer.active_vus() {
                active.set(false);
            }
            if !pacer.wait_until_active(ctx.vu_index).await {
                break;
            }
            active.set(true);

            if !pacer.claim_next().await {
                break;
            }
            run_one(&ctx, &iteration).await;
            pacer.finish();
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn context(work: VuWork, metrics: Arc<RunMetrics>) -> (VuContext, Arc<StartSignal>) {
        let start_signal = Arc::new(StartSignal::new());
        let ctx = VuContext {
            vu_index: 1,
            metrics,
            work,
            run_started: Arc::new(OnceLock::new()),
            ready_barrier: Arc::new(Barrier::new(1)),
            start_signal: start_signal.clone(),
        };
        (ctx, start_signal)
    }

    #[tokio::test]
    async fn fixed_vu_runs_until_gate_closes() {
        let metrics = Arc::new(RunMetrics::new("default", 2000.0));
        let gate = Arc::new(IterationGate::new(Duration::from_millis(100)));
        let (ctx, start) = context(VuWork::Fixed { gate: gate.clone() }, metrics.clone());

        let calls = Arc::new(AtomicU64::new(0));
        let iteration = {
            let calls = calls.clone();
            move |_vu: u64| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    true
                }
            }
        };

        let handle = tokio::spawn(run_vu(ctx, iteration));
        gate.start_at(Instant::now());
        start.start();
        handle.await.unwrap_or_else(|e| panic!("join: {e}"));

        let n = calls.load(Ordering::Relaxed);
        assert!((5..=11).contains(&n), "iterations={n}");
        assert_eq!(metrics.iterations_total(), n);
        assert_eq!(metrics.vus().gauge_value(), 0);
        assert_eq!(metrics.vus_max().gauge_value(), 1);
    }

    #[tokio::test]
    async fn aborted_iteration_counts_as_incomplete() {
        let metrics = Arc::new(RunMetrics::new("default", 2000.0));
        let gate = Arc::new(IterationGate::new(Duration::from_secs(60)));
        let (ctx, start) = context(VuWork::Fixed { gate }, metrics.clone());

        let iteration = |_vu: u64| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            true
        };

        let handle = tokio::spawn(run_vu(ctx, iteration));
        start.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        let _ = handle.await;

        assert_eq!(metrics.incomplete_total(), 1);
        assert_eq!(metrics.iterations_total(), 1);
        assert_eq!(metrics.vus().gauge_value(), 0);
    }
}
