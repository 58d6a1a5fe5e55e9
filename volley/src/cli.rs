use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "scenarios/config.json";
pub const DEFAULT_REPORTS_DIR: &str = "reports";

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m30s)".to_string());
    }
    // Bare numbers are seconds, like in scenario files.
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s)
        .map_err(|e| format!("invalid duration '{s}': {e} (expected e.g. 10s, 250ms, 1m30s)"))
}

fn parse_positive(input: &str) -> Result<u64, String> {
    match input.trim().parse::<u64>() {
        Ok(0) => Err("must be a positive integer".to_string()),
        Ok(v) => Ok(v),
        Err(_) => Err(format!("invalid number '{input}'")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar and text summary.
    HumanReadable,
    /// Emit progress and the summary as JSON lines (NDJSON) on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "volley",
    author,
    version,
    about = "HTTP load generator with arrival-rate pacing and thresholds",
    long_about = "volley runs one scenario from a configuration file against an HTTP(S) API.\n\nA scenario selects an executor (constant-arrival-rate, staged, or fixed), the request mix, optional OAuth2 client-credentials auth, and pass/fail thresholds.\n\nThe process exits with 0 on success, 10 when thresholds fail, 20 when setup fails, 30 on invalid input, and 40 on runtime errors.",
    after_help = "Examples:\n  volley run scenarios/config.json\n  volley run --scenario spike --vus 50 --duration 30s\n  SCENARIO=steady volley run --output json --no-report"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scenario from a configuration file
    #[command(
        long_about = "Load the configuration file, resolve the selected scenario and run it.\n\nCLI flags override values from the configuration file."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the scenario configuration (.json, .yaml or .yml)
    #[arg(env = "CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Scenario to run (falls back to `default`)
    #[arg(long, env = "SCENARIO")]
    pub scenario: Option<String>,

    /// Directory for the JSON summary report
    #[arg(long, env = "REPORTS_PATH", default_value = DEFAULT_REPORTS_DIR)]
    pub reports_dir: PathBuf,

    /// Do not write the summary report file
    #[arg(long)]
    pub no_report: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Override the run duration (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Override the number of virtual users (switches staged scenarios to a fixed pool)
    #[arg(long, value_parser = parse_positive)]
    pub vus: Option<u64>,

    /// Override the arrival rate of a constant-arrival-rate scenario
    #[arg(long, value_parser = parse_positive)]
    pub rate: Option<u64>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// How long in-flight iterations may run after the duration ends
    #[arg(long, value_parser = parse_duration)]
    pub drain_timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("15"), Ok(Duration::from_secs(15)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn cli_parses_run_overrides() {
        let parsed = Cli::try_parse_from([
            "volley",
            "run",
            "load.yaml",
            "--scenario",
            "spike",
            "--vus",
            "20",
            "--duration",
            "30s",
            "--insecure",
            "--no-report",
            "--output",
            "json",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        let Command::Run(args) = cli.command;
        assert_eq!(args.config, PathBuf::from("load.yaml"));
        assert_eq!(args.scenario.as_deref(), Some("spike"));
        assert_eq!(args.vus, Some(20));
        assert_eq!(args.duration, Some(Duration::from_secs(30)));
        assert_eq!(args.rate, None);
        assert!(args.insecure);
        assert!(args.no_report);
        assert_eq!(args.output, OutputFormat::Json);
    }

    #[test]
    fn cli_rejects_zero_vus() {
        let parsed = Cli::try_parse_from(["volley", "run", "--vus", "0"]);
        assert!(parsed.is_err());
    }
}
