//! AWS SDK implementations of the service traits.
//!
//! Clients are built from a shared base configuration, with a per-service
//! endpoint override applied at construction time and a generous retry
//! budget for throttled calls.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::SdkConfig;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use aws_sdk_cloudformation as cfn;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::config::EndpointOverrides;

use super::api::{
    ClientFactory, Clients, CloudFormationApi, IamApi, ServiceError, ServiceResult, StsApi,
};
use super::types::{
    AssumeRoleRequest, CallerIdentity, CreateStackRequest, EventPage, Parameter, StackEvent,
    StackInfo, StackRequest, StackResource, Tag, TemplateSource, TemplateValidation,
    TemporaryCredentials,
};

/// Maximum attempts per call, including the first.
const MAX_ATTEMPTS: u32 = 10;

/// Provider name attached to assumed-role credentials.
const CREDENTIALS_PROVIDER_NAME: &str = "stackforge-assume-role";

/// Converts any SDK error into a [`ServiceError`].
fn service_error<E>(err: &E) -> ServiceError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    ServiceError {
        code: err.code().map(str::to_owned),
        message: Some(
            err.message()
                .map_or_else(|| DisplayErrorContext(err).to_string(), str::to_owned),
        ),
    }
}

fn to_chrono(time: &aws_sdk_cloudformation::primitives::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos()).unwrap_or_default()
}

/// Builds SDK clients for a given credential set.
#[derive(Debug, Clone)]
pub struct AwsClientFactory {
    /// Base configuration loaded from the environment.
    base: SdkConfig,
    /// Endpoint overrides read at construction time.
    endpoints: EndpointOverrides,
}

impl AwsClientFactory {
    /// Loads the ambient AWS configuration and endpoint overrides.
    pub async fn load() -> Self {
        let base = aws_config::load_from_env().await;
        Self::with_config(base, EndpointOverrides::from_env())
    }

    /// Creates a factory from an existing configuration.
    #[must_use]
    pub const fn with_config(base: SdkConfig, endpoints: EndpointOverrides) -> Self {
        Self { base, endpoints }
    }

    /// Clients using the ambient credentials.
    #[must_use]
    pub fn ambient(&self) -> Clients {
        self.build(&self.base)
    }

    fn build(&self, config: &SdkConfig) -> Clients {
        let retry = RetryConfig::standard().with_max_attempts(MAX_ATTEMPTS);

        let mut cfn_config = cfn::config::Builder::from(config).retry_config(retry.clone());
        if let Some(url) = &self.endpoints.cloudformation {
            cfn_config = cfn_config.endpoint_url(url);
        }

        let mut iam_config = aws_sdk_iam::config::Builder::from(config).retry_config(retry.clone());
        if let Some(url) = &self.endpoints.iam {
            iam_config = iam_config.endpoint_url(url);
        }

        let mut sts_config = aws_sdk_sts::config::Builder::from(config).retry_config(retry);
        if let Some(url) = &self.endpoints.sts {
            sts_config = sts_config.endpoint_url(url);
        }

        Clients::new(
            Arc::new(AwsCloudFormation::new(cfn::Client::from_conf(cfn_config.build()))),
            Arc::new(AwsSts::new(aws_sdk_sts::Client::from_conf(sts_config.build()))),
            Arc::new(AwsIam::new(aws_sdk_iam::Client::from_conf(iam_config.build()))),
        )
    }
}

impl ClientFactory for AwsClientFactory {
    fn from_credentials(&self, credentials: &TemporaryCredentials) -> Clients {
        let expiry = credentials.expiration.and_then(|at| {
            u64::try_from(at.timestamp())
                .ok()
                .map(|secs| SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        });

        let provider = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            Some(credentials.session_token.clone()),
            expiry,
            CREDENTIALS_PROVIDER_NAME,
        );

        let config = self
            .base
            .to_builder()
            .credentials_provider(SharedCredentialsProvider::new(provider))
            .build();

        debug!("Built clients for assumed-role credentials");
        self.build(&config)
    }
}

/// CloudFormation over the AWS SDK.
#[derive(Debug, Clone)]
pub struct AwsCloudFormation {
    client: cfn::Client,
}

impl AwsCloudFormation {
    /// Wraps an SDK client.
    #[must_use]
    pub const fn new(client: cfn::Client) -> Self {
        Self { client }
    }

    fn parameters(parameters: &[Parameter]) -> Vec<cfn::types::Parameter> {
        parameters
            .iter()
            .map(|p| {
                cfn::types::Parameter::builder()
                    .parameter_key(&p.key)
                    .parameter_value(&p.value)
                    .build()
            })
            .collect()
    }

    fn tags(tags: &[Tag]) -> Vec<cfn::types::Tag> {
        tags.iter()
            .map(|t| cfn::types::Tag::builder().key(&t.key).value(&t.value).build())
            .collect()
    }

    fn capabilities(capabilities: &[String]) -> Vec<cfn::types::Capability> {
        capabilities
            .iter()
            .map(|c| cfn::types::Capability::from(c.as_str()))
            .collect()
    }

    fn stack_info(stack: &cfn::types::Stack) -> StackInfo {
        StackInfo {
            stack_id: stack.stack_id().unwrap_or_default().to_string(),
            stack_name: stack.stack_name().unwrap_or_default().to_string(),
            status: stack
                .stack_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            status_reason: stack.stack_status_reason().map(str::to_owned),
            tags: stack
                .tags()
                .iter()
                .map(|t| {
                    Tag::new(t.key().unwrap_or_default(), t.value().unwrap_or_default())
                })
                .collect(),
            parameters: stack
                .parameters()
                .iter()
                .filter_map(|p| {
                    Some(Parameter::new(p.parameter_key()?, p.parameter_value().unwrap_or_default()))
                })
                .collect(),
            role_arn: stack.role_arn().map(str::to_owned),
            termination_protection: stack.enable_termination_protection(),
        }
    }

    fn stack_event(event: &cfn::types::StackEvent) -> StackEvent {
        StackEvent {
            logical_resource_id: event.logical_resource_id().unwrap_or_default().to_string(),
            physical_resource_id: event
                .physical_resource_id()
                .filter(|id| !id.is_empty())
                .map(str::to_owned),
            resource_type: event.resource_type().unwrap_or_default().to_string(),
            resource_status: event
                .resource_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            resource_status_reason: event.resource_status_reason().map(str::to_owned),
            timestamp: event.timestamp().map(to_chrono).unwrap_or_default(),
        }
    }
}

#[async_trait]
impl CloudFormationApi for AwsCloudFormation {
    async fn validate_template(
        &self,
        template: &TemplateSource,
    ) -> ServiceResult<TemplateValidation> {
        let request = match template {
            TemplateSource::Body(body) => self.client.validate_template().template_body(body),
            TemplateSource::Url(url) => self.client.validate_template().template_url(url),
        };
        let output = request.send().await.map_err(|e| service_error(&e))?;

        Ok(TemplateValidation {
            parameters: output
                .parameters()
                .iter()
                .filter_map(|p| p.parameter_key().map(str::to_owned))
                .collect(),
            capabilities: output
                .capabilities()
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
        })
    }

    async fn template_metadata(&self, template: &TemplateSource) -> ServiceResult<Option<String>> {
        let request = match template {
            TemplateSource::Body(body) => self.client.get_template_summary().template_body(body),
            TemplateSource::Url(url) => self.client.get_template_summary().template_url(url),
        };
        let output = request.send().await.map_err(|e| service_error(&e))?;
        Ok(output.metadata().map(str::to_owned))
    }

    async fn describe_stack(&self, stack: &str) -> ServiceResult<StackInfo> {
        trace!("DescribeStacks {stack}");
        let output = self
            .client
            .describe_stacks()
            .stack_name(stack)
            .send()
            .await
            .map_err(|e| service_error(&e))?;

        output
            .stacks()
            .first()
            .map(Self::stack_info)
            .ok_or_else(|| ServiceError::stack_not_found(stack))
    }

    async fn describe_stack_resources(&self, stack: &str) -> ServiceResult<Vec<StackResource>> {
        let output = self
            .client
            .describe_stack_resources()
            .stack_name(stack)
            .send()
            .await
            .map_err(|e| service_error(&e))?;

        Ok(output
            .stack_resources()
            .iter()
            .map(|r| StackResource {
                logical_id: r.logical_resource_id().unwrap_or_default().to_string(),
                physical_id: r.physical_resource_id().map(str::to_owned),
                resource_type: r.resource_type().unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn create_stack(&self, request: &CreateStackRequest) -> ServiceResult<String> {
        let stack = &request.stack;
        let builder = self
            .client
            .create_stack()
            .stack_name(&stack.stack_name)
            .set_parameters(Some(Self::parameters(&stack.parameters)))
            .set_tags(Some(Self::tags(&stack.tags)))
            .set_capabilities(Some(Self::capabilities(&stack.capabilities)))
            .set_role_arn(stack.role_arn.clone())
            // a stack that fails to create is deleted
            .on_failure(cfn::types::OnFailure::Delete)
            .enable_termination_protection(request.termination_protection);

        let builder = match &stack.template {
            TemplateSource::Body(body) => builder.template_body(body),
            TemplateSource::Url(url) => builder.template_url(url),
        };

        let output = builder.send().await.map_err(|e| service_error(&e))?;
        Ok(output.stack_id().unwrap_or_default().to_string())
    }

    async fn update_stack(&self, request: &StackRequest) -> ServiceResult<String> {
        let builder = self
            .client
            .update_stack()
            .stack_name(&request.stack_name)
            .set_parameters(Some(Self::parameters(&request.parameters)))
            .set_tags(Some(Self::tags(&request.tags)))
            .set_capabilities(Some(Self::capabilities(&request.capabilities)))
            .set_role_arn(request.role_arn.clone());

        let builder = match &request.template {
            TemplateSource::Body(body) => builder.template_body(body),
            TemplateSource::Url(url) => builder.template_url(url),
        };

        let output = builder.send().await.map_err(|e| service_error(&e))?;
        Ok(output
            .stack_id()
            .map_or_else(|| request.stack_name.clone(), str::to_owned))
    }

    async fn delete_stack(&self, stack: &str, role_arn: Option<&str>) -> ServiceResult<()> {
        self.client
            .delete_stack()
            .stack_name(stack)
            .set_role_arn(role_arn.map(str::to_owned))
            .send()
            .await
            .map_err(|e| service_error(&e))?;
        Ok(())
    }

    async fn set_stack_policy(&self, stack: &str, policy: &str) -> ServiceResult<()> {
        self.client
            .set_stack_policy()
            .stack_name(stack)
            .stack_policy_body(policy)
            .send()
            .await
            .map_err(|e| service_error(&e))?;
        Ok(())
    }

    async fn update_termination_protection(&self, stack: &str, enabled: bool) -> ServiceResult<()> {
        self.client
            .update_termination_protection()
            .stack_name(stack)
            .enable_termination_protection(enabled)
            .send()
            .await
            .map_err(|e| service_error(&e))?;
        Ok(())
    }

    async fn describe_stack_events(
        &self,
        stack: &str,
        next_token: Option<&str>,
    ) -> ServiceResult<EventPage> {
        let output = self
            .client
            .describe_stack_events()
            .stack_name(stack)
            .set_next_token(next_token.map(str::to_owned))
            .send()
            .await
            .map_err(|e| service_error(&e))?;

        Ok(EventPage {
            events: output.stack_events().iter().map(Self::stack_event).collect(),
            next_token: output.next_token().map(str::to_owned),
        })
    }
}

/// STS over the AWS SDK.
#[derive(Debug, Clone)]
pub struct AwsSts {
    client: aws_sdk_sts::Client,
}

impl AwsSts {
    /// Wraps an SDK client.
    #[must_use]
    pub const fn new(client: aws_sdk_sts::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StsApi for AwsSts {
    async fn get_caller_identity(&self) -> ServiceResult<CallerIdentity> {
        let output = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| service_error(&e))?;

        Ok(CallerIdentity {
            account: output.account().unwrap_or_default().to_string(),
            arn: output.arn().unwrap_or_default().to_string(),
        })
    }

    async fn assume_role(&self, request: &AssumeRoleRequest) -> ServiceResult<TemporaryCredentials> {
        let mut builder = self
            .client
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .duration_seconds(request.duration_secs);

        if let Some(mfa) = &request.mfa {
            builder = builder.serial_number(&mfa.serial).token_code(&mfa.code);
        }

        let output = builder.send().await.map_err(|e| service_error(&e))?;
        let credentials = output
            .credentials()
            .ok_or_else(|| ServiceError::message_only("AssumeRole returned no credentials"))?;

        let expiration = credentials.expiration();
        Ok(TemporaryCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration: DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos()),
        })
    }
}

/// IAM over the AWS SDK.
#[derive(Debug, Clone)]
pub struct AwsIam {
    client: aws_sdk_iam::Client,
}

impl AwsIam {
    /// Wraps an SDK client.
    #[must_use]
    pub const fn new(client: aws_sdk_iam::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IamApi for AwsIam {
    async fn list_mfa_devices(&self) -> ServiceResult<Vec<String>> {
        let output = self
            .client
            .list_mfa_devices()
            .send()
            .await
            .map_err(|e| service_error(&e))?;

        Ok(output
            .mfa_devices()
            .iter()
            .map(|device| device.serial_number().to_string())
            .collect())
    }
}
