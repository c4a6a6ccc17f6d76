//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stackforge - CD friendly `CloudFormation` stack deployments.
#[derive(Parser, Debug)]
#[command(name = "stackforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Name of the stack to operate on.
    #[arg(short = 'n', long, global = true, env = "STACKFORGE_STACK_NAME")]
    pub stack_name: Option<String>,

    /// Name of the service role `CloudFormation` assumes for stack operations.
    #[arg(long, global = true, env = "STACKFORGE_CFN_ROLE_NAME")]
    pub cfn_role_name: Option<String>,

    /// Role to assume before doing anything else.
    #[arg(long, global = true, env = "STACKFORGE_ASSUME_ROLE_ARN")]
    pub assume_role_arn: Option<String>,

    /// Current MFA token code, used while assuming the role.
    #[arg(long, global = true, requires = "assume_role_arn")]
    pub mfa_token: Option<String>,

    /// MFA device serial. Detected from the caller's devices when omitted.
    #[arg(long, global = true, requires = "mfa_token")]
    pub mfa_serial: Option<String>,

    /// Seconds between two polls of the stack status.
    #[arg(long, global = true, default_value = "10")]
    pub event_polling_period: u64,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format for stack events (json, text).
    #[arg(long, global = true, default_value = "json")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update a stack and follow it to completion.
    Deploy {
        /// Path to the template file.
        #[arg(
            short = 't',
            long,
            conflicts_with = "template_url",
            required_unless_present = "template_url"
        )]
        template_file: Option<PathBuf>,

        /// URL of a template stored in S3.
        #[arg(long)]
        template_url: Option<String>,

        /// Parameter documents, merged in order. Later files win.
        #[arg(short = 'p', long = "parameters-file")]
        parameters_files: Vec<PathBuf>,

        /// Parameter values as KEY=VALUE, taking precedence over every file.
        #[arg(long = "parameter-overrides")]
        parameter_overrides: Vec<String>,

        /// Tags document.
        #[arg(long)]
        tags_file: Option<PathBuf>,

        /// Stack policy document (JSON).
        #[arg(long)]
        stack_policy_file: Option<PathBuf>,

        /// Enable termination protection. Never disables it.
        #[arg(long)]
        termination_protection: bool,
    },

    /// Delete a stack and follow it to completion.
    Destroy,

    /// Print the full event history of a stack.
    Events,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per event, for log shipping.
    #[default]
    Json,
    /// Human-readable text output.
    Text,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
