//! The managed stack and its lifecycle.
//!
//! This module provides:
//! - [`Stack`], the deployment inputs and last observed state of one stack
//! - Deploy and destroy operations
//! - Event history reading and stack policy propagation
//! - A poll loop that follows the remote state machine to completion

mod deploy;
mod destroy;
mod events;
mod policy;
mod watch;

pub use deploy::DeployOutcome;
pub use events::{list_events, EPOCH};
pub use policy::{
    apply_stack_policy, wildcard_match, OneOrMany, PendingPolicy, PolicyDocument,
    PolicyFailure, PolicyReport, Statement,
};
pub use watch::{StackOperation, StackWatcher, DEFAULT_POLL_INTERVAL};

use std::collections::BTreeMap;

use tracing::debug;

use crate::cloud::{Clients, StackInfo, TemplateSource};
use crate::config::DocumentParser;
use crate::error::{Result, Stage, StackError, StackforgeError};

/// One managed stack.
///
/// Holds everything needed to deploy the stack, plus the last snapshot
/// observed from the remote service. The snapshot is only ever replaced by
/// describing the stack again.
#[derive(Debug, Clone, Default)]
pub struct Stack {
    /// Stack name, if known.
    stack_name: Option<String>,
    /// Remote-assigned stack id, once known.
    stack_id: Option<String>,
    /// Template to deploy.
    template: Option<TemplateSource>,
    /// Parameter documents, merged in order.
    parameter_documents: Vec<String>,
    /// Parameter values taking precedence over every document.
    parameter_overrides: BTreeMap<String, String>,
    /// Tags document.
    tags_document: Option<String>,
    /// Stack policy document (JSON).
    stack_policy: Option<String>,
    /// Name of the service role for the remote service to assume.
    role_name: Option<String>,
    /// Requested termination protection.
    termination_protection: bool,
    /// Parser for tag and parameter documents.
    parser: DocumentParser,
    /// Last observed snapshot.
    info: Option<StackInfo>,
}

impl Stack {
    /// Creates an empty stack definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stack name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.stack_name = Some(name.into());
        self
    }

    /// Sets the stack id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.stack_id = Some(id.into());
        self
    }

    /// Sets the template.
    #[must_use]
    pub fn with_template(mut self, template: TemplateSource) -> Self {
        self.template = Some(template);
        self
    }

    /// Appends a parameter document.
    #[must_use]
    pub fn with_parameter_document(mut self, document: impl Into<String>) -> Self {
        self.parameter_documents.push(document.into());
        self
    }

    /// Sets the parameter overrides.
    #[must_use]
    pub fn with_parameter_overrides(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.parameter_overrides = overrides;
        self
    }

    /// Sets the tags document.
    #[must_use]
    pub fn with_tags_document(mut self, document: impl Into<String>) -> Self {
        self.tags_document = Some(document.into());
        self
    }

    /// Sets the stack policy document.
    #[must_use]
    pub fn with_stack_policy(mut self, policy: impl Into<String>) -> Self {
        self.stack_policy = Some(policy.into());
        self
    }

    /// Sets the service role name.
    #[must_use]
    pub fn with_role_name(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = Some(role_name.into());
        self
    }

    /// Requests termination protection.
    #[must_use]
    pub const fn with_termination_protection(mut self, enabled: bool) -> Self {
        self.termination_protection = enabled;
        self
    }

    /// Sets the document parser.
    #[must_use]
    pub fn with_parser(mut self, parser: DocumentParser) -> Self {
        self.parser = parser;
        self
    }

    /// Returns the stack name.
    #[must_use]
    pub fn stack_name(&self) -> Option<&str> {
        self.stack_name.as_deref()
    }

    /// Returns the stack id.
    #[must_use]
    pub fn stack_id(&self) -> Option<&str> {
        self.stack_id.as_deref()
    }

    /// Returns the last observed snapshot.
    #[must_use]
    pub const fn info(&self) -> Option<&StackInfo> {
        self.info.as_ref()
    }

    /// The identifier used to address the stack: its id when known,
    /// otherwise its name.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::MissingStackNameOrId`] if neither is known.
    pub fn target(&self) -> Result<&str> {
        self.stack_id
            .as_deref()
            .or(self.stack_name.as_deref())
            .ok_or(StackforgeError::Stack(StackError::MissingStackNameOrId))
    }

    /// Describes the stack and records the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if neither name nor id is known, or if the call fails.
    pub async fn describe(&mut self, clients: &Clients) -> Result<&StackInfo> {
        let target = self.target()?.to_string();
        let info = clients
            .cloudformation
            .describe_stack(&target)
            .await
            .map_err(|e| StackforgeError::remote(Stage::Describe, e))?;

        Ok(self.record(info))
    }

    /// Records a snapshot, filling in the name and id if still unknown.
    pub fn record(&mut self, info: StackInfo) -> &StackInfo {
        if self.stack_name.is_none() {
            self.stack_name = Some(info.stack_name.clone());
        }
        if self.stack_id.is_none() {
            self.stack_id = Some(info.stack_id.clone());
        }
        self.info.insert(info)
    }

    /// Full ARN of the service role, resolved against the caller's account.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller identity cannot be looked up.
    pub async fn role_arn(&self, clients: &Clients) -> Result<Option<String>> {
        let Some(role_name) = self.role_name.as_deref() else {
            return Ok(None);
        };

        let identity = clients
            .sts
            .get_caller_identity()
            .await
            .map_err(|e| StackforgeError::remote(Stage::RoleArn, e))?;

        let arn = identity.role_arn(role_name);
        debug!("Resolved service role {role_name} to {arn}");
        Ok(Some(arn))
    }
}

/// Longest stack name the remote service accepts.
pub const MAX_STACK_NAME_LEN: usize = 128;

/// Checks a stack name locally, before any remote call uses it.
///
/// Names are 1 to 128 ASCII letters, digits and hyphens, and cannot start or
/// end with a hyphen.
///
/// # Errors
///
/// Returns [`StackError::InvalidStackName`] if the name breaks those rules.
pub fn validate_stack_name(name: &str) -> Result<()> {
    let valid = (1..=MAX_STACK_NAME_LEN).contains(&name.len())
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        && !name.starts_with('-')
        && !name.ends_with('-');

    if valid {
        Ok(())
    } else {
        Err(StackforgeError::Stack(StackError::InvalidStackName {
            name: name.to_string(),
        }))
    }
}
