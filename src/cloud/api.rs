//! Service traits for the remote infrastructure API.
//!
//! Each remote sub-service is a trait so the lifecycle engine can be driven
//! against the AWS SDK in production and against in-memory doubles in tests.
//! Every call returns a [`ServiceError`] on failure, which carries the upstream
//! error code and message and can be classified with [`ServiceError::kind`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::types::{
    AssumeRoleRequest, CallerIdentity, CreateStackRequest, EventPage, StackInfo, StackRequest,
    StackResource, TemplateSource, TemplateValidation, TemporaryCredentials,
};

/// Message returned by the service when an update changes nothing.
pub const NO_UPDATES_MESSAGE: &str = "No updates are to be performed.";

/// Error code for expired session credentials.
const EXPIRED_TOKEN_CODE: &str = "ExpiredToken";

/// Error code for denied requests.
const ACCESS_DENIED_CODE: &str = "AccessDenied";

/// Error reported by a remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    /// Upstream error code, e.g. `ValidationError`.
    pub code: Option<String>,
    /// Upstream error message.
    pub message: Option<String>,
}

/// Closed set of upstream conditions the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Session credentials have expired; the call can be retried after rotation.
    ExpiredToken,
    /// The stack does not exist (yet).
    StackNotFound,
    /// An update was requested that changes nothing.
    NoUpdates,
    /// The caller is not allowed to perform the call.
    AccessDenied,
    /// Anything else.
    Other,
}

impl ServiceError {
    /// Creates a service error with a code and a message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: Some(message.into()),
        }
    }

    /// Creates a service error that has a message but no code.
    #[must_use]
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: Some(message.into()),
        }
    }

    /// The error the service returns for a stack that does not exist.
    #[must_use]
    pub fn stack_not_found(stack: &str) -> Self {
        Self::new(
            "ValidationError",
            format!("Stack with id {stack} does not exist"),
        )
    }

    /// Classifies this error.
    ///
    /// "No updates" is matched on the exact message text, because the service
    /// reports it with the generic `ValidationError` code.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        let code = self.code.as_deref();
        let message = self.message.as_deref().unwrap_or_default();

        match code {
            Some(EXPIRED_TOKEN_CODE) => ErrorKind::ExpiredToken,
            Some(ACCESS_DENIED_CODE) => ErrorKind::AccessDenied,
            _ if message == NO_UPDATES_MESSAGE => ErrorKind::NoUpdates,
            Some("ValidationError")
                if message.starts_with("Stack with id ") && message.ends_with(" does not exist") =>
            {
                ErrorKind::StackNotFound
            }
            _ => ErrorKind::Other,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{code}: {message}"),
            (Some(code), None) => f.write_str(code),
            (None, Some(message)) => f.write_str(message),
            (None, None) => f.write_str("unknown service error"),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Result of a single remote call.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// CloudFormation operations used by the engine.
#[async_trait]
pub trait CloudFormationApi: Send + Sync {
    /// Validates a template and reports its parameters and capabilities.
    async fn validate_template(
        &self,
        template: &TemplateSource,
    ) -> ServiceResult<TemplateValidation>;

    /// Returns the template's `Metadata` section as a JSON string.
    async fn template_metadata(&self, template: &TemplateSource) -> ServiceResult<Option<String>>;

    /// Describes a stack by name or id.
    async fn describe_stack(&self, stack: &str) -> ServiceResult<StackInfo>;

    /// Lists the direct child resources of a stack.
    async fn describe_stack_resources(&self, stack: &str) -> ServiceResult<Vec<StackResource>>;

    /// Creates a stack and returns its id.
    async fn create_stack(&self, request: &CreateStackRequest) -> ServiceResult<String>;

    /// Updates a stack and returns its id.
    async fn update_stack(&self, request: &StackRequest) -> ServiceResult<String>;

    /// Deletes a stack.
    async fn delete_stack(&self, stack: &str, role_arn: Option<&str>) -> ServiceResult<()>;

    /// Replaces the stack policy.
    async fn set_stack_policy(&self, stack: &str, policy: &str) -> ServiceResult<()>;

    /// Sets the termination protection flag.
    async fn update_termination_protection(&self, stack: &str, enabled: bool) -> ServiceResult<()>;

    /// Fetches one page of the stack's event history.
    async fn describe_stack_events(
        &self,
        stack: &str,
        next_token: Option<&str>,
    ) -> ServiceResult<EventPage>;
}

/// STS operations used by the engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StsApi: Send + Sync {
    /// Returns the identity of the current credentials.
    async fn get_caller_identity(&self) -> ServiceResult<CallerIdentity>;

    /// Requests short-lived credentials for a role.
    async fn assume_role(&self, request: &AssumeRoleRequest) -> ServiceResult<TemporaryCredentials>;
}

/// IAM operations used by the engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IamApi: Send + Sync {
    /// Lists the serial numbers of the caller's MFA devices.
    async fn list_mfa_devices(&self) -> ServiceResult<Vec<String>>;
}

/// One client per remote sub-service, all using the same credentials.
#[derive(Clone)]
pub struct Clients {
    /// CloudFormation client.
    pub cloudformation: Arc<dyn CloudFormationApi>,
    /// STS client.
    pub sts: Arc<dyn StsApi>,
    /// IAM client.
    pub iam: Arc<dyn IamApi>,
}

impl fmt::Debug for Clients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clients").finish_non_exhaustive()
    }
}

impl Clients {
    /// Bundles the three service clients.
    #[must_use]
    pub fn new(
        cloudformation: Arc<dyn CloudFormationApi>,
        sts: Arc<dyn StsApi>,
        iam: Arc<dyn IamApi>,
    ) -> Self {
        Self {
            cloudformation,
            sts,
            iam,
        }
    }
}

/// Builds a client set from assumed-role credentials.
pub trait ClientFactory: Send + Sync {
    /// Returns clients that sign requests with the given credentials.
    fn from_credentials(&self, credentials: &TemporaryCredentials) -> Clients;
}
