use crate::cli::OutputFormat;

mod human;
pub(crate) mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, scenario: &volley_core::ScenarioConfig);
    fn progress(&self) -> Option<volley_core::ProgressFn>;
    fn print_summary(&self, summary: &volley_core::RunSummary) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
