//! Output formatting for CLI commands.
//!
//! Stack events are the main product of a run and go to stdout, either as
//! JSON objects for log shipping or as colored text lines. Everything else
//! is a short summary.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::cloud::{EventRecord, StackEvent};
use crate::stack::{DeployOutcome, PolicyReport};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Policy propagation row for table display.
#[derive(Tabled)]
struct PolicyRow {
    #[tabled(rename = "Stack")]
    stack: String,
    #[tabled(rename = "Result")]
    result: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a single stack event.
    #[must_use]
    pub fn format_event(&self, event: &StackEvent) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&EventRecord::from(event)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_event_text(event),
        }
    }

    fn format_event_text(event: &StackEvent) -> String {
        let mut output = format!(
            "{} {} {} {}",
            event
                .timestamp
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S"),
            event.logical_resource_id.bold(),
            event.resource_type.dimmed(),
            Self::format_status(&event.resource_status),
        );

        if let Some(reason) = event.resource_status_reason.as_deref() {
            let _ = write!(output, " {reason}");
        }

        output
    }

    /// Formats the result of a deploy call.
    #[must_use]
    pub fn format_outcome(&self, outcome: &DeployOutcome) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&OutcomeJson::from(outcome)).unwrap_or_default()
            }
            OutputFormat::Text => match outcome {
                DeployOutcome::Created { stack_id, .. } => {
                    format!("{} Creating stack {stack_id}", "+".green())
                }
                DeployOutcome::Updated { stack_id } => {
                    format!("{} Updating stack {stack_id}", "~".yellow())
                }
                DeployOutcome::NoUpdates { message } => {
                    format!("{} {message}", "✓".green())
                }
            },
        }
    }

    /// Formats a policy propagation report.
    #[must_use]
    pub fn format_policy_report(&self, report: &PolicyReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let rows: Vec<PolicyRow> = report
                    .applied
                    .iter()
                    .map(|stack_id| PolicyRow {
                        stack: stack_id.clone(),
                        result: "applied".green().to_string(),
                    })
                    .chain(report.failed.iter().map(|failure| PolicyRow {
                        stack: failure.stack_id.clone(),
                        result: format!("{} {}", "skipped:".red(), failure.error),
                    }))
                    .collect();

                let mut output = String::from("\nStack policy\n");
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Colors a resource or stack status by how it ended.
    fn format_status(status: &str) -> String {
        if status.ends_with("_IN_PROGRESS") {
            status.yellow().to_string()
        } else if status.ends_with("_FAILED") || status.contains("ROLLBACK") {
            status.red().to_string()
        } else if status.ends_with("_COMPLETE") {
            status.green().to_string()
        } else {
            status.to_string()
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct OutcomeJson {
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl From<&DeployOutcome> for OutcomeJson {
    fn from(outcome: &DeployOutcome) -> Self {
        match outcome {
            DeployOutcome::Created { stack_id, .. } => Self {
                action: "Create",
                stack_id: Some(stack_id.clone()),
                message: None,
            },
            DeployOutcome::Updated { stack_id } => Self {
                action: "Update",
                stack_id: Some(stack_id.clone()),
                message: None,
            },
            DeployOutcome::NoUpdates { message } => Self {
                action: "None",
                stack_id: None,
                message: Some(message.clone()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{PendingPolicy, PolicyFailure};
    use chrono::DateTime;

    fn event() -> StackEvent {
        StackEvent {
            logical_resource_id: String::from("Bucket"),
            physical_resource_id: Some(String::from("app-bucket-1x2y3z")),
            resource_type: String::from("AWS::S3::Bucket"),
            resource_status: String::from("CREATE_FAILED"),
            resource_status_reason: Some(String::from("Bucket already exists")),
            timestamp: DateTime::from_timestamp(1_500_000_000, 0).unwrap_or_default(),
        }
    }

    #[test]
    fn test_format_event_json() {
        let output = OutputFormatter::new(OutputFormat::Json).format_event(&event());
        let json: serde_json::Value = serde_json::from_str(&output).expect("valid json");

        assert_eq!(json["LogicalResourceId"], "Bucket");
        assert_eq!(json["PhysicalResourceId"], "app-bucket-1x2y3z");
        assert_eq!(json["ResourceStatusReason"], "Bucket already exists");
    }

    #[test]
    fn test_format_event_text() {
        let output = OutputFormatter::new(OutputFormat::Text).format_event(&event());

        assert!(output.contains("Bucket"));
        assert!(output.contains("AWS::S3::Bucket"));
        assert!(output.contains("CREATE_FAILED"));
        assert!(output.ends_with("Bucket already exists"));
    }

    #[test]
    fn test_format_outcome() {
        let json = OutputFormatter::new(OutputFormat::Json).format_outcome(&DeployOutcome::NoUpdates {
            message: String::from("No updates are to be performed."),
        });
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["Action"], "None");
        assert!(value.get("StackId").is_none());

        let text = OutputFormatter::new(OutputFormat::Text).format_outcome(&DeployOutcome::Updated {
            stack_id: String::from("arn:stack/app/1"),
        });
        assert!(text.contains("Updating stack arn:stack/app/1"));
    }

    #[test]
    fn test_format_created_outcome_is_one_json_document() {
        let json = OutputFormatter::new(OutputFormat::Json).format_outcome(&DeployOutcome::Created {
            stack_id: String::from("arn:stack/app/1"),
            pending_policy: Some(PendingPolicy {
                stack_id: String::from("arn:stack/app/1"),
                policy: String::from(r#"{"Statement": []}"#),
            }),
        });

        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["Action"], "Create");
        assert_eq!(value["StackId"], "arn:stack/app/1");
        assert_eq!(value.as_object().map(serde_json::Map::len), Some(2));
    }

    #[test]
    fn test_format_policy_report_lists_skipped_stacks() {
        let report = PolicyReport {
            applied: vec![String::from("root")],
            failed: vec![PolicyFailure {
                stack_id: String::from("child"),
                error: String::from("Access denied"),
            }],
        };

        let text = OutputFormatter::new(OutputFormat::Text).format_policy_report(&report);
        assert!(text.contains("root"));
        assert!(text.contains("child"));
        assert!(text.contains("Access denied"));

        let json = OutputFormatter::new(OutputFormat::Json).format_policy_report(&report);
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["failed"][0]["stack_id"], "child");
    }
}
