use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_bytes, format_duration, format_ms, format_percent, format_rate};
use progress::HumanProgress;
use summary::render;
use volley_core::config::Executor;
use volley_core::{ProgressEvent, ProgressUpdate, ScenarioProgress};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

fn executor_shape(executor: &Executor) -> String {
    match executor {
        Executor::ConstantArrivalRate {
            rate,
            time_unit,
            duration,
            pre_allocated_vus,
            max_vus,
        } => format!(
            "constant-arrival-rate rate={rate}/{} duration={} vus={pre_allocated_vus}..{max_vus}",
            format_duration(*time_unit),
            format_duration(*duration)
        ),
        Executor::Staged {
            start_vus, stages, ..
        } => format!(
            "staged start_vus={start_vus} stages={} max_vus={} duration={}",
            stages.len(),
            executor.max_vus(),
            format_duration(executor.duration())
        ),
        Executor::Fixed { vus, duration } => {
            format!("fixed vus={vus} duration={}", format_duration(*duration))
        }
    }
}

fn progress_message(u: &ProgressUpdate) -> (std::time::Duration, String) {
    let m = &u.metrics;
    let rates = format!(
        " iters/s={} rps={} errors={} p99={} recv={}",
        format_rate(m.iterations_per_sec_now),
        format_rate(m.rps_now),
        format_percent(Some(m.error_rate_now)),
        format_ms(m.latency_p99_ms),
        format_bytes(m.bytes_received_total)
    );

    match &u.progress {
        ScenarioProgress::Fixed { vus, duration } => (
            *duration,
            format!("vus={vus} elapsed={}{rates}", format_duration(u.elapsed)),
        ),
        ScenarioProgress::Staged {
            total_duration,
            stage,
        } => {
            let msg = match stage {
                Some(stage) => format!(
                    "stage={}/{} target={} vus={} elapsed={} stage_remaining={}{rates}",
                    stage.stage,
                    stage.stages,
                    stage.current_target,
                    m.active_vus,
                    format_duration(u.elapsed),
                    format_duration(stage.stage_remaining),
                ),
                None => format!("elapsed={}{rates}", format_duration(u.elapsed)),
            };
            (*total_duration, msg)
        }
        ScenarioProgress::ArrivalRate {
            duration,
            active_vus,
            max_vus,
            dropped_iterations_total,
            ..
        } => (
            *duration,
            format!(
                "active_vus={active_vus}/{max_vus} dropped={dropped_iterations_total} elapsed={}{rates}",
                format_duration(u.elapsed)
            ),
        ),
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, scenario: &volley_core::ScenarioConfig) {
        println!("scenario: {}", scenario.name);
        println!("target: {} ({})", scenario.base_url, scenario.plan.label());
        println!("executor: {}", executor_shape(&scenario.executor));
        if scenario.auth.is_some() {
            println!("auth: client_credentials");
        }
        println!();
    }

    fn progress(&self) -> Option<volley_core::ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |ev| {
            // State transitions are already logged.
            let ProgressEvent::Tick(u) = ev else {
                return;
            };
            let (total, message) = progress_message(&u);
            progress.update(&u.scenario, total, u.elapsed, message);
        }))
    }

    fn print_summary(&self, summary: &volley_core::RunSummary) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(summary));

        if !summary.thresholds_passed() {
            eprintln!("thresholds failed:");
            for t in summary.thresholds.iter().filter(|t| !t.passed) {
                match t.observed {
                    Some(obs) => eprintln!("  {}: {} (observed {obs})", t.metric, t.expression),
                    None => eprintln!("  {}: {} (missing series)", t.metric, t.expression),
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn executor_shape_describes_arrival_rate() {
        let shape = executor_shape(&Executor::ConstantArrivalRate {
            rate: 50,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_secs(30),
            pre_allocated_vus: 5,
            max_vus: 20,
        });
        assert_eq!(
            shape,
            "constant-arrival-rate rate=50/1s duration=30s vus=5..20"
        );
    }

    #[test]
    fn progress_message_for_fixed_pool() {
        let update = ProgressUpdate {
            tick: 1,
            elapsed: Duration::from_secs(1),
            scenario: "default".to_string(),
            executor: "fixed".to_string(),
            metrics: volley_core::runner::LiveMetrics {
                rps_now: 42.0,
                ..Default::default()
            },
            progress: ScenarioProgress::Fixed {
                vus: 5,
                duration: Duration::from_secs(10),
            },
        };

        let (total, msg) = progress_message(&update);
        assert_eq!(total, Duration::from_secs(10));
        assert!(msg.starts_with("vus=5 elapsed=1s"), "{msg}");
        assert!(msg.contains("rps=42"), "{msg}");
    }
}
