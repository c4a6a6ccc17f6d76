//! Remote infrastructure service access.
//!
//! This module provides:
//! - The records exchanged with CloudFormation, STS and IAM
//! - Async traits for each sub-service and typed error classification
//! - AWS SDK implementations and a client factory

mod api;
mod aws;
#[cfg(test)]
pub(crate) mod fake;
mod types;

pub use api::{
    ClientFactory, Clients, CloudFormationApi, ErrorKind, IamApi, ServiceError, ServiceResult,
    StsApi, NO_UPDATES_MESSAGE,
};
#[cfg(test)]
pub use api::{MockIamApi, MockStsApi};
pub use aws::{AwsClientFactory, AwsCloudFormation, AwsIam, AwsSts};
pub use types::{
    AssumeRoleRequest, CallerIdentity, CreateStackRequest, EventPage, EventRecord, MfaToken,
    Parameter, StackEvent, StackInfo, StackRequest, StackResource, Tag, TemplateSource,
    TemplateValidation, TemporaryCredentials, CAPABILITY_AUTO_EXPAND, NESTED_STACK_TYPE,
};
