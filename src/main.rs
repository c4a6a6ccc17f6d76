//! Stackforge CLI entrypoint.
//!
//! This is the main entrypoint for the stackforge command-line tool.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use stackforge::auth::Session;
use stackforge::cli::{Cli, Commands, OutputFormatter};
use stackforge::cloud::{AwsClientFactory, TemplateSource};
use stackforge::config::{load_document, load_dotenv, parse_parameter_overrides};
use stackforge::error::{Result, StackError, StackforgeError};
use stackforge::stack::{DeployOutcome, Stack, StackOperation, StackWatcher, EPOCH};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// Logs go to stderr so that stdout carries only stack events.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Arguments of the deploy command.
struct DeployArgs {
    template_file: Option<PathBuf>,
    template_url: Option<String>,
    parameters_files: Vec<PathBuf>,
    parameter_overrides: Vec<String>,
    tags_file: Option<PathBuf>,
    stack_policy_file: Option<PathBuf>,
    termination_protection: bool,
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    load_dotenv(None)?;

    let formatter = OutputFormatter::new(cli.output);
    let watcher_interval = Duration::from_secs(cli.event_polling_period);

    let factory = Arc::new(AwsClientFactory::load().await);
    let mut session = Session::new(factory.clone(), factory.ambient());

    if let Some(role_arn) = cli.assume_role_arn.as_deref() {
        match cli.mfa_token.as_deref() {
            Some(token) => {
                session
                    .assume_role_with_mfa(role_arn, token, cli.mfa_serial.as_deref())
                    .await?;
            }
            None => session.assume_role(role_arn).await?,
        }
    }

    let mut stack = Stack::new();
    if let Some(name) = cli.stack_name {
        stack = stack.with_name(name);
    }
    if let Some(role_name) = cli.cfn_role_name {
        stack = stack.with_role_name(role_name);
    }

    match cli.command {
        Commands::Deploy {
            template_file,
            template_url,
            parameters_files,
            parameter_overrides,
            tags_file,
            stack_policy_file,
            termination_protection,
        } => {
            let args = DeployArgs {
                template_file,
                template_url,
                parameters_files,
                parameter_overrides,
                tags_file,
                stack_policy_file,
                termination_protection,
            };
            cmd_deploy(&mut session, stack, args, watcher_interval, &formatter).await
        }
        Commands::Destroy => cmd_destroy(&mut session, stack, watcher_interval, &formatter).await,
        Commands::Events => cmd_events(&session, stack, &formatter).await,
    }
}

/// Create or update a stack and follow it.
async fn cmd_deploy(
    session: &mut Session,
    stack: Stack,
    args: DeployArgs,
    poll_interval: Duration,
    formatter: &OutputFormatter,
) -> Result<()> {
    let template = match (args.template_file, args.template_url) {
        (Some(path), _) => TemplateSource::Body(load_document(path)?),
        (None, Some(url)) => TemplateSource::Url(url),
        (None, None) => {
            return Err(StackforgeError::Stack(StackError::MissingTemplate));
        }
    };

    let mut stack = stack
        .with_template(template)
        .with_parameter_overrides(parse_parameter_overrides(&args.parameter_overrides)?)
        .with_termination_protection(args.termination_protection);
    for path in &args.parameters_files {
        stack = stack.with_parameter_document(load_document(path)?);
    }
    if let Some(path) = &args.tags_file {
        stack = stack.with_tags_document(load_document(path)?);
    }
    if let Some(path) = &args.stack_policy_file {
        stack = stack.with_stack_policy(load_document(path)?);
    }

    // Only events emitted by this deployment are printed
    if let Err(e) = stack.describe(session.clients()).await {
        debug!("Stack not described before deploying: {e}");
    }
    let mut cursor = stack
        .last_event_time(session.clients())
        .await
        .unwrap_or(EPOCH);

    let outcome = stack.deploy(session.clients()).await?;
    if let DeployOutcome::NoUpdates { message } = &outcome {
        println!("{message}");
        return Ok(());
    }
    eprintln!("{}", formatter.format_outcome(&outcome));

    let status = StackWatcher::new(StackOperation::Deploy)
        .with_poll_interval(poll_interval)
        .wait(session, &mut stack, &mut cursor, |event| {
            println!("{}", formatter.format_event(event));
        })
        .await?;
    info!("Deploy finished with {status}");

    if let DeployOutcome::Created {
        pending_policy: Some(pending),
        ..
    } = outcome
    {
        match pending.apply(session.clients()).await {
            Ok(report) => eprintln!("{}", formatter.format_policy_report(&report)),
            Err(e) => warn!("Failed to set stack policy on {}: {e}", pending.stack_id),
        }
    }

    Ok(())
}

/// Delete a stack and follow it.
async fn cmd_destroy(
    session: &mut Session,
    mut stack: Stack,
    poll_interval: Duration,
    formatter: &OutputFormatter,
) -> Result<()> {
    stack.describe(session.clients()).await?;
    let mut cursor = stack
        .last_event_time(session.clients())
        .await
        .unwrap_or(EPOCH);

    stack.destroy(session.clients()).await?;

    let status = StackWatcher::new(StackOperation::Destroy)
        .with_poll_interval(poll_interval)
        .wait(session, &mut stack, &mut cursor, |event| {
            println!("{}", formatter.format_event(event));
        })
        .await?;
    info!("Destroy finished with {status}");

    Ok(())
}

/// Print the full event history of a stack.
async fn cmd_events(session: &Session, mut stack: Stack, formatter: &OutputFormatter) -> Result<()> {
    stack.describe(session.clients()).await?;

    for event in stack.list_events(session.clients(), EPOCH).await? {
        println!("{}", formatter.format_event(&event));
    }

    Ok(())
}
