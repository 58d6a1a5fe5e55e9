use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// One progress bar for the running scenario, drawn on stderr.
pub(crate) struct HumanProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    pub(crate) fn update(
        &self,
        scenario: &str,
        total: Duration,
        elapsed: Duration,
        message: String,
    ) {
        let mut bar = self
            .bar
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let pb = bar.get_or_insert_with(|| {
            let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr_with_hz(5));
            pb.set_style(bar_style());
            pb.set_prefix(scenario.to_string());
            pb
        });

        let total_ms = total.as_millis() as u64;
        pb.set_length(total_ms);
        pb.set_position((elapsed.as_millis() as u64).min(total_ms));
        pb.set_message(message);
    }

    pub(crate) fn finish(&self) {
        let mut bar = self
            .bar
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(pb) = bar.take() {
            pb.finish_and_clear();
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [ {bar:20.cyan/blue} ] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}
