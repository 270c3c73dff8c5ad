//! Output formatting for CLI commands.

use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::check::CleanupReport;
use crate::config::{Fingerprint, ValidationResult};
use crate::reconciler::{ReconciliationResult, StatusReport};
use crate::render::RenderedConfig;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    format: OutputFormat,
}

/// Workload row for table display.
#[derive(Tabled)]
struct WorkloadRow {
    #[tabled(rename = "Pod")]
    name: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
    #[tabled(rename = "Phase")]
    phase: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn json(value: &impl Serialize) -> String {
        serde_json::to_string_pretty(value).unwrap_or_default()
    }

    /// Formats rendered configuration files.
    #[must_use]
    pub fn format_rendered(&self, rendered: &RenderedConfig, show_fingerprint: bool) -> String {
        match self.format {
            OutputFormat::Json => Self::json(&RenderedJson::new(rendered)),
            OutputFormat::Text => {
                let mut output = String::new();
                if show_fingerprint {
                    let _ = writeln!(output, "# fingerprint: {}", rendered.fingerprint());
                }
                let multiple = rendered.files().len() > 1;
                for file in rendered.files() {
                    if multiple {
                        let _ = writeln!(output, "# --- {} ---", file.name);
                    }
                    output.push_str(&file.content);
                }
                output
            }
        }
    }

    /// Formats a fingerprint.
    #[must_use]
    pub fn format_fingerprint(&self, rendered: &RenderedConfig) -> String {
        match self.format {
            OutputFormat::Json => Self::json(&serde_json::json!({
                "fingerprint": rendered.fingerprint(),
                "digest": rendered.digest(),
            })),
            OutputFormat::Text => format!("{}\n", rendered.fingerprint()),
        }
    }

    /// Formats the outcome of configuration validation.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => Self::json(&ValidationJson {
                valid: result.is_valid(),
                errors: result.errors.iter().map(ToString::to_string).collect(),
                warnings: result.warnings.clone(),
            }),
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid\n", "✓".green())
                } else {
                    format!(
                        "{} Configuration has {} error(s):\n",
                        "✗".red(),
                        result.error_count()
                    )
                };

                for error in &result.errors {
                    let _ = writeln!(output, "   - {error}");
                }

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                } else if result.warning_count() > 0 {
                    let _ = writeln!(
                        output,
                        "   ({} warning(s), use --warnings to show)",
                        result.warning_count()
                    );
                }

                output
            }
        }
    }

    /// Formats a reconciliation result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => Self::json(result),
            OutputFormat::Text => {
                let verdict = match (result.record.ready, result.record.valid) {
                    (true, true) => format!("{} valid", "✓".green()),
                    (true, false) => format!("{} invalid", "✗".red()),
                    (false, _) => format!("{} pending ({})", "…".yellow(), result.record.state),
                };

                let mut output = format!("Config {}: {verdict}\n", result.fingerprint);
                if result.reused {
                    output.push_str("   Verdict taken from recorded results\n");
                }
                if let Some(message) = &result.record.message {
                    let _ = writeln!(output, "   {message}");
                }
                if let Some(cleanup) = &result.cleanup {
                    output.push_str(&Self::format_cleanup_text(cleanup));
                }

                if !result.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                output
            }
        }
    }

    /// Formats a cleanup report.
    #[must_use]
    pub fn format_cleanup(&self, report: &CleanupReport) -> String {
        match self.format {
            OutputFormat::Json => Self::json(report),
            OutputFormat::Text => {
                if report.removed.is_empty() && report.is_clean() {
                    format!("{} Nothing to clean up\n", "✓".green())
                } else {
                    Self::format_cleanup_text(report)
                }
            }
        }
    }

    fn format_cleanup_text(report: &CleanupReport) -> String {
        let mut output = String::new();
        for fingerprint in &report.removed {
            let _ = writeln!(output, "   {} removed {fingerprint}", "-".red());
        }
        for failure in &report.failures {
            let _ = writeln!(
                output,
                "   {} {} ({}): {}",
                "✗".red(),
                failure.fingerprint,
                failure.resource,
                failure.error
            );
        }
        output
    }

    /// Formats the status report.
    #[must_use]
    pub fn format_status(&self, status: &StatusReport) -> String {
        match self.format {
            OutputFormat::Json => Self::json(status),
            OutputFormat::Text => {
                let mut output = format!("\nConfig: {}\n", status.fingerprint);

                match &status.recorded {
                    Some(recorded) => {
                        let record = &recorded.record;
                        let verdict = match (record.ready, record.valid) {
                            (true, true) => "valid".green().to_string(),
                            (true, false) => "invalid".red().to_string(),
                            (false, _) => record.state.to_string().yellow().to_string(),
                        };
                        let _ = writeln!(
                            output,
                            "   Result: {verdict} (checked {})",
                            recorded.checked_at.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                    None => output.push_str("   Result: not checked\n"),
                }

                if !status.stale.is_empty() {
                    let _ = writeln!(output, "   Stale results: {}", status.stale.len());
                }

                if status.workloads.is_empty() {
                    output.push_str("\n   No validation pods.\n");
                    return output;
                }

                let rows: Vec<WorkloadRow> = status
                    .workloads
                    .iter()
                    .map(|w| WorkloadRow {
                        name: w.name.clone(),
                        fingerprint: w
                            .fingerprint
                            .as_ref()
                            .map_or_else(|| String::from("-"), ToString::to_string),
                        phase: Self::format_phase(&w.phase),
                    })
                    .collect();

                output.push('\n');
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    fn format_phase(phase: &str) -> String {
        match phase {
            "Succeeded" => phase.green().to_string(),
            "Failed" => phase.red().to_string(),
            "Pending" | "Running" => phase.yellow().to_string(),
            _ => phase.dimmed().to_string(),
        }
    }
}

// JSON serialization helpers

#[derive(Serialize)]
struct RenderedJson<'a> {
    fingerprint: Fingerprint,
    digest: String,
    files: BTreeMap<&'a str, &'a str>,
}

impl<'a> RenderedJson<'a> {
    fn new(rendered: &'a RenderedConfig) -> Self {
        Self {
            fingerprint: rendered.fingerprint(),
            digest: rendered.digest(),
            files: rendered
                .files()
                .iter()
                .map(|f| (f.name.as_str(), f.content.as_str()))
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct ValidationJson {
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, CheckConfig, ConfigValidator};
    use crate::render::{BASE_CONFIG_NAME, Renderer};

    fn rendered() -> RenderedConfig {
        Renderer::new().render(&AgentConfig::default()).unwrap()
    }

    #[test]
    fn test_rendered_text_is_the_config() {
        colored::control::set_override(false);
        let rendered = rendered();
        let text = OutputFormatter::new(OutputFormat::Text).format_rendered(&rendered, false);
        assert_eq!(text, rendered.main());

        let with_fp = OutputFormatter::new(OutputFormat::Text).format_rendered(&rendered, true);
        assert!(with_fp.starts_with(&format!("# fingerprint: {}\n", rendered.fingerprint())));
    }

    #[test]
    fn test_rendered_json() {
        let rendered = rendered();
        let json = OutputFormatter::new(OutputFormat::Json).format_rendered(&rendered, false);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["fingerprint"], rendered.fingerprint().as_str());
        assert_eq!(value["files"][BASE_CONFIG_NAME], rendered.main());
    }

    #[test]
    fn test_validation_json_lists_errors() {
        let mut config = CheckConfig::default();
        config.checker.image.clear();
        let result = ConfigValidator::new().inspect(&config);

        let json = OutputFormatter::new(OutputFormat::Json).format_validation(&result, true);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["valid"], false);
        assert!(!value["errors"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_empty_cleanup_text() {
        colored::control::set_override(false);
        let text = OutputFormatter::new(OutputFormat::Text).format_cleanup(&CleanupReport::default());
        assert_eq!(text, "✓ Nothing to clean up\n");
    }
}
