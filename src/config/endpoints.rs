//! Per-service endpoint overrides.
//!
//! Each remote sub-service can be redirected to another endpoint, for
//! example a local emulator, through its own environment variable.

use tracing::debug;

/// Environment variable redirecting CloudFormation traffic.
pub const CLOUDFORMATION_ENDPOINT_VAR: &str = "AWS_ENDPOINT_CLOUDFORMATION";

/// Environment variable redirecting IAM traffic.
pub const IAM_ENDPOINT_VAR: &str = "AWS_ENDPOINT_IAM";

/// Environment variable redirecting STS traffic.
pub const STS_ENDPOINT_VAR: &str = "AWS_ENDPOINT_STS";

/// Endpoint URLs that replace the default regional endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointOverrides {
    /// CloudFormation endpoint.
    pub cloudformation: Option<String>,
    /// IAM endpoint.
    pub iam: Option<String>,
    /// STS endpoint.
    pub sts: Option<String>,
}

impl EndpointOverrides {
    /// Reads the overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the overrides through `lookup`; empty values are ignored.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            let value = lookup(name).filter(|v| !v.trim().is_empty());
            if let Some(url) = &value {
                debug!("Endpoint override {name}={url}");
            }
            value
        };

        Self {
            cloudformation: read(CLOUDFORMATION_ENDPOINT_VAR),
            iam: read(IAM_ENDPOINT_VAR),
            sts: read(STS_ENDPOINT_VAR),
        }
    }
}
