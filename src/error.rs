//! Error types for the Stackforge deployment engine.
//!
//! This module provides the error hierarchy for every phase of a stack
//! lifecycle: document parsing, credential handling, stack preconditions and
//! the remote calls issued while deploying or destroying a stack.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::cloud::{ErrorKind, ServiceError};
use crate::config::CoerceError;

/// The main error type for Stackforge.
#[derive(Debug, Error)]
pub enum StackforgeError {
    /// Document parsing and templating errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Role assumption and credential errors.
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// Stack precondition and lifecycle errors.
    #[error("{0}")]
    Stack(#[from] StackError),

    /// A remote call failed during a specific phase.
    #[error("{stage}: {source}")]
    Remote {
        /// Phase in which the call was issued.
        stage: Stage,
        /// Upstream error.
        #[source]
        source: ServiceError,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Phase of a lifecycle operation that issued a failing remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// `GetTemplateSummary` while deriving a stack name.
    TemplateSummary,
    /// `DescribeStacks`.
    Describe,
    /// `CreateStack`.
    Create,
    /// `UpdateStack`.
    Update,
    /// `UpdateTerminationProtection`.
    TerminationProtection,
    /// `DescribeStackResources` / `SetStackPolicy`.
    Policy,
    /// `DeleteStack`.
    Delete,
    /// `DescribeStackEvents`.
    Events,
    /// `GetCallerIdentity` while building a role ARN.
    RoleArn,
    /// `ListMFADevices`.
    MfaLookup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TemplateSummary => "Failed to get Template Summary",
            Self::Describe => "Failed to describe stack",
            Self::Create => "Failed to Create Stack",
            Self::Update => "Failed to Update Stack",
            Self::TerminationProtection => "Failed to Update Termination Protection",
            Self::Policy => "Failed to Set Stack Policy",
            Self::Delete => "Failed to Delete Stack",
            Self::Events => "Failed to list stack events",
            Self::RoleArn => "Failed to resolve role ARN",
            Self::MfaLookup => "Failed to list MFA devices",
        };
        f.write_str(label)
    }
}

/// Document parsing and templating errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A document file was not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The document could not be decoded, or its shape is wrong.
    #[error("{message}")]
    InvalidFormat {
        /// Description of the problem.
        message: String,
    },

    /// A single entry could not be converted to its string form.
    #[error("Invalid {kind} {key}: {source}")]
    InvalidValue {
        /// "Tag" or "Parameter".
        kind: &'static str,
        /// Key of the offending entry.
        key: String,
        /// Coercion failure.
        #[source]
        source: CoerceError,
    },

    /// Environment variable referenced by a template is not defined.
    #[error("Environment variable by the name \"{name}\" is not defined")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// A value template could not be parsed.
    #[error("Invalid template in \"{input}\": {message}")]
    TemplateSyntax {
        /// The raw value.
        input: String,
        /// Description of the syntax problem.
        message: String,
    },

    /// A `KEY=VALUE` override argument is malformed.
    #[error("Parameter override \"{input}\" is invalid. Must be of the format \"<key>=<value>\"")]
    InvalidOverride {
        /// The raw argument.
        input: String,
    },
}

/// Role assumption and credential errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The STS call or the caller identity lookup failed.
    #[error("Failed to assume role {role_arn}: {source}")]
    AssumeRoleFailed {
        /// Role that could not be assumed.
        role_arn: String,
        /// Upstream error.
        #[source]
        source: ServiceError,
    },

    /// The caller has no MFA device registered.
    #[error("MFA device not found for the current user")]
    MfaDeviceNotFound,

    /// The caller may not list its MFA devices.
    #[error("Access Denied to list available MFA devices. Please specify an MFA serial manually")]
    AccessDenied,
}

/// Stack precondition and lifecycle errors.
#[derive(Debug, Error)]
pub enum StackError {
    /// The operation requires a stack id.
    #[error("Stack ID is required for this operation")]
    MissingStackId,

    /// Neither a stack name nor a stack id is known.
    #[error("Either a stack name or a stack ID must be provided")]
    MissingStackNameOrId,

    /// The stack name cannot be used by the remote service.
    #[error(
        "Invalid stack name \"{name}\": must be 1 to 128 letters, digits and hyphens, \
         starting and ending with a letter or digit"
    )]
    InvalidStackName {
        /// Rejected name.
        name: String,
    },

    /// No template body or URL was supplied for a deployment.
    #[error("A template body or template URL is required to deploy")]
    MissingTemplate,

    /// The remote service rejected the template.
    #[error("Failed to Validate Template: {source}")]
    ValidationFailed {
        /// Upstream error.
        #[source]
        source: ServiceError,
    },

    /// The stack policy document is not valid JSON of the expected shape.
    #[error("Invalid stack policy: {message}")]
    InvalidPolicy {
        /// Description of the decoding error.
        message: String,
    },

    /// The stack reached a terminal status other than success.
    #[error("Stack deploy failed! Stack Status: {status}")]
    DeployFailed {
        /// Final observed status.
        status: String,
    },
}

/// Result type alias for Stackforge operations.
pub type Result<T> = std::result::Result<T, StackforgeError>;

impl StackforgeError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Wraps an upstream error with the phase that issued the call.
    #[must_use]
    pub const fn remote(stage: Stage, source: ServiceError) -> Self {
        Self::Remote { stage, source }
    }

    /// Returns the upstream service error carried by this error, if any.
    #[must_use]
    pub const fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::Remote { source, .. }
            | Self::Auth(AuthError::AssumeRoleFailed { source, .. })
            | Self::Stack(StackError::ValidationFailed { source }) => Some(source),
            _ => None,
        }
    }

    /// Classifies the upstream error, or `Other` for local failures.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.service_error().map_or(ErrorKind::Other, ServiceError::kind)
    }

    /// Returns true if the credentials used for the call have expired.
    #[must_use]
    pub fn is_expired_token(&self) -> bool {
        self.kind() == ErrorKind::ExpiredToken
    }

    /// Returns true if the remote service reported the stack as missing.
    #[must_use]
    pub fn is_stack_not_found(&self) -> bool {
        self.kind() == ErrorKind::StackNotFound
    }
}
