//! Records exchanged with the remote infrastructure service.
//!
//! These types are the engine's own view of CloudFormation, STS and IAM
//! payloads. They are independent of the SDK so the lifecycle code can run
//! against any implementation of the service traits.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Resource type of a stack nested inside another stack.
pub const NESTED_STACK_TYPE: &str = "AWS::CloudFormation::Stack";

/// Capability that template validation never reports.
pub const CAPABILITY_AUTO_EXPAND: &str = "CAPABILITY_AUTO_EXPAND";

/// Where the template for a deployment comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Inline template body.
    Body(String),
    /// Template stored at a remote URL.
    Url(String),
}

/// A stack parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter key.
    pub key: String,
    /// Parameter value, already in its flat string encoding.
    pub value: String,
}

impl Parameter {
    /// Creates a new parameter.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A stack tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Creates a new tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Result of validating a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateValidation {
    /// Keys of the parameters the template declares, in template order.
    pub parameters: Vec<String>,
    /// Capabilities the template requires.
    pub capabilities: Vec<String>,
}

/// Last observed snapshot of a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackInfo {
    /// Remote-assigned stack id.
    pub stack_id: String,
    /// Stack name.
    pub stack_name: String,
    /// Current status, e.g. `UPDATE_IN_PROGRESS`.
    pub status: String,
    /// Reason attached to the current status.
    pub status_reason: Option<String>,
    /// Tags currently applied to the stack.
    pub tags: Vec<Tag>,
    /// Parameters the stack was last deployed with.
    pub parameters: Vec<Parameter>,
    /// Service role used by the stack.
    pub role_arn: Option<String>,
    /// Termination protection flag, when reported.
    pub termination_protection: Option<bool>,
}

impl StackInfo {
    /// Returns true while the remote service is still working on the stack.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status.ends_with("_IN_PROGRESS")
    }
}

/// A direct child resource of a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackResource {
    /// Logical id from the template.
    pub logical_id: String,
    /// Physical id, once the resource exists.
    pub physical_id: Option<String>,
    /// Resource type, e.g. `AWS::S3::Bucket`.
    pub resource_type: String,
}

impl StackResource {
    /// Returns true if this resource is itself a stack.
    #[must_use]
    pub fn is_nested_stack(&self) -> bool {
        self.resource_type == NESTED_STACK_TYPE
    }
}

/// An immutable stack event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEvent {
    /// Logical id of the resource the event concerns.
    pub logical_resource_id: String,
    /// Physical id of the resource.
    pub physical_resource_id: Option<String>,
    /// Resource type.
    pub resource_type: String,
    /// Resource status.
    pub resource_status: String,
    /// Reason attached to the status.
    pub resource_status_reason: Option<String>,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
}

/// One page of the stack event history.
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    /// Events on this page, newest first as returned by the service.
    pub events: Vec<StackEvent>,
    /// Token for the next page.
    pub next_token: Option<String>,
}

/// Fields shared by create and update requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRequest {
    /// Stack name for creation, stack id for updates.
    pub stack_name: String,
    /// Template to deploy.
    pub template: TemplateSource,
    /// Resolved parameters.
    pub parameters: Vec<Parameter>,
    /// Tags to apply.
    pub tags: Vec<Tag>,
    /// Capabilities to acknowledge.
    pub capabilities: Vec<String>,
    /// Service role for the remote service to assume.
    pub role_arn: Option<String>,
}

/// A `CreateStack` request. Stacks that fail to create are deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStackRequest {
    /// Common request fields.
    pub stack: StackRequest,
    /// Enable termination protection on the new stack.
    pub termination_protection: bool,
}

/// Identity of the current caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Account id.
    pub account: String,
    /// Caller ARN.
    pub arn: String,
}

impl CallerIdentity {
    /// Session name derived from the last path segment of the caller ARN.
    #[must_use]
    pub fn session_name(&self) -> &str {
        self.arn.rsplit('/').next().unwrap_or(&self.arn)
    }

    /// ARN of a role with the given name in the caller's account.
    #[must_use]
    pub fn role_arn(&self, role_name: &str) -> String {
        format!("arn:aws:iam::{}:role/{role_name}", self.account)
    }
}

/// An `AssumeRole` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    /// Role to assume.
    pub role_arn: String,
    /// Session name.
    pub session_name: String,
    /// Requested lifetime of the credentials.
    pub duration_secs: i32,
    /// MFA device serial and token code.
    pub mfa: Option<MfaToken>,
}

/// MFA device serial and the current token code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaToken {
    /// Device serial number or ARN.
    pub serial: String,
    /// Current token code.
    pub code: String,
}

/// Short-lived credentials returned by `AssumeRole`.
#[derive(Clone, PartialEq, Eq)]
pub struct TemporaryCredentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token.
    pub session_token: String,
    /// Expiry time.
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// JSON form of a stack event printed to the operator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventRecord {
    /// Logical id.
    pub logical_resource_id: String,
    /// Physical id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    /// Resource status.
    pub resource_status: String,
    /// Status reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_status_reason: Option<String>,
    /// Resource type.
    pub resource_type: String,
    /// Event time in the local time zone.
    pub timestamp: DateTime<chrono::Local>,
}

impl From<&StackEvent> for EventRecord {
    fn from(event: &StackEvent) -> Self {
        Self {
            logical_resource_id: event.logical_resource_id.clone(),
            physical_resource_id: event.physical_resource_id.clone(),
            resource_status: event.resource_status.clone(),
            resource_status_reason: event.resource_status_reason.clone(),
            resource_type: event.resource_type.clone(),
            timestamp: event.timestamp.with_timezone(&chrono::Local),
        }
    }
}
