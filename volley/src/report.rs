use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context as _;

use crate::output::json::build_summary_line;

/// `report-<scenario>-<YYYY-MM-DDTHH-MM-SS>-summary.json`, UTC.
pub(crate) fn report_file_name(scenario: &str, at: SystemTime) -> String {
    let stamp = humantime::format_rfc3339_seconds(at)
        .to_string()
        .trim_end_matches('Z')
        .replace(':', "-");
    let scenario: String = scenario
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("report-{scenario}-{stamp}-summary.json")
}

pub(crate) async fn write_report(
    dir: &Path,
    summary: &volley_core::RunSummary,
) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create reports dir: {}", dir.display()))?;

    let path = dir.join(report_file_name(&summary.scenario, summary.started_at));
    let body = serde_json::to_vec_pretty(&build_summary_line(summary))
        .context("failed to serialize summary")?;
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("failed to write report: {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn file_name_uses_scenario_and_timestamp() {
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(
            report_file_name("default", at),
            "report-default-2023-11-14T22-13-20-summary.json"
        );
        assert_eq!(
            report_file_name("spike/eu", at),
            "report-spike_eu-2023-11-14T22-13-20-summary.json"
        );
    }
}
