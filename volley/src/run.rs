use anyhow::Context as _;
use volley_core::{RunOptions, RunOverrides, resolve_scenario, run_scenario};

use crate::cli::RunArgs;
use crate::config_file::{ConfigFormat, parse_config, read_config_text};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::report;
use crate::run_error::RunError;

fn run_overrides(args: &RunArgs) -> RunOverrides {
    RunOverrides {
        vus: args.vus,
        duration: args.duration,
        rate: args.rate,
        insecure_skip_tls_verify: args.insecure,
        drain_timeout: args.drain_timeout,
    }
}

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let text = read_config_text(&args.config)
        .await
        .map_err(RunError::InvalidInput)?;
    let config = parse_config(&text, ConfigFormat::from_path(&args.config))
        .with_context(|| format!("invalid config: {}", args.config.display()))
        .map_err(RunError::InvalidInput)?;

    let scenario = resolve_scenario(&config, args.scenario.as_deref(), &run_overrides(&args))?;
    tracing::info!(
        scenario = %scenario.name,
        executor = %scenario.executor.kind(),
        base_url = %scenario.base_url,
        "scenario resolved"
    );

    out.print_header(&scenario);
    let summary = run_scenario(
        scenario,
        RunOptions {
            progress: out.progress(),
        },
    )
    .await?;

    out.print_summary(&summary)
        .map_err(RunError::RuntimeError)?;

    if !args.no_report {
        let path = report::write_report(&args.reports_dir, &summary)
            .await
            .map_err(RunError::RuntimeError)?;
        tracing::info!(path = %path.display(), "summary report written");
    }

    match summary.check_thresholds() {
        Ok(()) => Ok(ExitCode::Success),
        Err(violation) => {
            tracing::warn!(
                failed = violation.failed,
                total = violation.total,
                "{violation}"
            );
            Ok(ExitCode::ThresholdsFailed)
        }
    }
}
