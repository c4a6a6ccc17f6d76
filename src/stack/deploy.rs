//! Create-or-update deployment.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, info};

use crate::cloud::{
    CloudFormationApi, Clients, CreateStackRequest, ErrorKind, Parameter, StackRequest,
    TemplateSource, CAPABILITY_AUTO_EXPAND, NO_UPDATES_MESSAGE,
};
use crate::error::{Result, Stage, StackError, StackforgeError};

use super::policy::{apply_stack_policy, PendingPolicy};
use super::{validate_stack_name, Stack};

/// What a deployment did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// A new stack was created.
    Created {
        /// Id of the new stack.
        stack_id: String,
        /// Stack policy to set once the caller is done with the create result.
        pending_policy: Option<PendingPolicy>,
    },
    /// An existing stack is being updated.
    Updated {
        /// Id of the stack.
        stack_id: String,
    },
    /// The service reported that the update changes nothing.
    NoUpdates {
        /// The service's message.
        message: String,
    },
}

impl DeployOutcome {
    /// Returns true if nothing was changed.
    #[must_use]
    pub const fn is_no_op(&self) -> bool {
        matches!(self, Self::NoUpdates { .. })
    }
}

/// Template metadata used to derive a stack name from a parameter value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TemplateMetadata {
    #[serde(default)]
    stack_name: HashMap<String, HashMap<String, String>>,
}

impl Stack {
    /// Creates the stack, or updates it if it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is rejected, a document cannot be
    /// parsed, or any remote call fails. A no-op update is not an error.
    pub async fn deploy(&mut self, clients: &Clients) -> Result<DeployOutcome> {
        let template = self
            .template
            .clone()
            .ok_or(StackforgeError::Stack(StackError::MissingTemplate))?;
        if let Some(name) = &self.stack_name {
            validate_stack_name(name)?;
        }
        let cloudformation = clients.cloudformation.as_ref();

        let validation = cloudformation
            .validate_template(&template)
            .await
            .map_err(|source| StackforgeError::Stack(StackError::ValidationFailed { source }))?;

        let mut capabilities = validation.capabilities;
        if !capabilities.iter().any(|c| c == CAPABILITY_AUTO_EXPAND) {
            capabilities.push(CAPABILITY_AUTO_EXPAND.to_string());
        }

        let parameters = self.resolve_parameters(&validation.parameters)?;

        if self.stack_name.is_none() {
            self.derive_stack_name(cloudformation, &template, &parameters)
                .await?;
            if let Some(name) = &self.stack_name {
                validate_stack_name(name)?;
            }
        }

        match self.describe(clients).await {
            Ok(info) => debug!("Found existing stack {} ({})", info.stack_id, info.status),
            Err(err) if err.is_stack_not_found() => debug!("Stack does not exist yet"),
            Err(err) => return Err(err),
        }

        let tags = match (&self.tags_document, &self.info) {
            (Some(document), _) => self.parser.parse_tags(document)?,
            (None, Some(info)) => info.tags.clone(),
            (None, None) => Vec::new(),
        };

        let role_arn = self.role_arn(clients).await?;

        let request = StackRequest {
            stack_name: self.stack_name.clone().unwrap_or_default(),
            template,
            parameters,
            tags,
            capabilities,
            role_arn,
        };

        if self.info.is_none() {
            self.create(cloudformation, request).await
        } else {
            self.update(clients, request).await
        }
    }

    /// Resolves the value of every parameter the template declares.
    ///
    /// Overrides win over documents, later documents win over earlier ones,
    /// and parameters set by neither are left to the template default. Keys
    /// the template does not declare are dropped.
    fn resolve_parameters(&self, declared: &[String]) -> Result<Vec<Parameter>> {
        let parsed = self.parser.parse_parameters(&self.parameter_documents)?;

        for dropped in parsed.iter().filter(|p| !declared.contains(&p.key)) {
            debug!("Ignoring parameter {} not declared by the template", dropped.key);
        }

        Ok(declared
            .iter()
            .filter_map(|key| {
                self.parameter_overrides
                    .get(key)
                    .map(|value| Parameter::new(key, value))
                    .or_else(|| parsed.iter().find(|p| &p.key == key).cloned())
            })
            .collect())
    }

    /// Picks a stack name from the template's `StackName` metadata using the
    /// resolved parameter values. Leaves the name unset if nothing matches.
    async fn derive_stack_name(
        &mut self,
        cloudformation: &dyn CloudFormationApi,
        template: &TemplateSource,
        parameters: &[Parameter],
    ) -> Result<()> {
        let metadata = cloudformation
            .template_metadata(template)
            .await
            .map_err(|e| StackforgeError::remote(Stage::TemplateSummary, e))?;

        let Some(metadata) = metadata else {
            return Ok(());
        };

        let metadata: TemplateMetadata = match serde_json::from_str(&metadata) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Template metadata has no usable StackName mapping: {e}");
                return Ok(());
            }
        };

        let derived = parameters.iter().find_map(|p| {
            metadata
                .stack_name
                .get(&p.key)
                .and_then(|names| names.get(&p.value))
        });

        if let Some(name) = derived {
            info!("Using stack name {name} from template metadata");
            self.stack_name = Some(name.clone());
        }
        Ok(())
    }

    async fn create(
        &mut self,
        cloudformation: &dyn CloudFormationApi,
        request: StackRequest,
    ) -> Result<DeployOutcome> {
        info!("Creating stack {}", request.stack_name);

        let request = CreateStackRequest {
            stack: request,
            termination_protection: self.termination_protection,
        };
        let stack_id = cloudformation
            .create_stack(&request)
            .await
            .map_err(|e| StackforgeError::remote(Stage::Create, e))?;

        self.stack_id = Some(stack_id.clone());
        let pending_policy = self.stack_policy.clone().map(|policy| PendingPolicy {
            stack_id: stack_id.clone(),
            policy,
        });

        Ok(DeployOutcome::Created {
            stack_id,
            pending_policy,
        })
    }

    async fn update(&mut self, clients: &Clients, mut request: StackRequest) -> Result<DeployOutcome> {
        let stack_id = self
            .stack_id
            .clone()
            .ok_or(StackforgeError::Stack(StackError::MissingStackId))?;
        let cloudformation = clients.cloudformation.as_ref();
        info!("Updating stack {stack_id}");

        let protection_off = self
            .info
            .as_ref()
            .is_some_and(|info| info.termination_protection == Some(false));
        if protection_off && self.termination_protection {
            cloudformation
                .update_termination_protection(&stack_id, true)
                .await
                .map_err(|e| StackforgeError::remote(Stage::TerminationProtection, e))?;
            info!("Enabled termination protection");
        }

        if let Some(policy) = &self.stack_policy {
            apply_stack_policy(clients, policy, &stack_id).await?;
        }

        request.stack_name.clone_from(&stack_id);
        match cloudformation.update_stack(&request).await {
            Ok(_) => Ok(DeployOutcome::Updated { stack_id }),
            Err(e) if e.kind() == ErrorKind::NoUpdates => Ok(DeployOutcome::NoUpdates {
                message: e.message.unwrap_or_else(|| NO_UPDATES_MESSAGE.to_string()),
            }),
            Err(e) => Err(StackforgeError::remote(Stage::Update, e)),
        }
    }
}
