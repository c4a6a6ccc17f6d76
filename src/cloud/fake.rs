//! In-memory CloudFormation used by the lifecycle tests.
//!
//! The fake keeps just enough state to behave like the real service for a
//! single account: stacks addressable by name or id, child resources, paged
//! event history, and a script of statuses and failures to inject.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::DateTime;

use super::api::{
    ClientFactory, Clients, CloudFormationApi, MockIamApi, MockStsApi, ServiceError, ServiceResult,
    NO_UPDATES_MESSAGE,
};
use super::types::{
    CreateStackRequest, EventPage, StackEvent, StackInfo, StackRequest, StackResource,
    TemplateSource, TemplateValidation, TemporaryCredentials,
};

/// Mutable state behind the fake.
#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub stacks: Vec<StackInfo>,
    /// Direct children, keyed by stack id.
    pub resources: HashMap<String, Vec<StackResource>>,
    /// Event history, keyed by stack id, newest first.
    pub events: HashMap<String, Vec<StackEvent>>,
    /// Events per `DescribeStackEvents` page.
    pub page_size: usize,
    pub declared_parameters: Vec<String>,
    pub capabilities: Vec<String>,
    pub metadata: Option<String>,
    /// Statuses applied to the described stack, one per `DescribeStacks`.
    pub statuses: VecDeque<String>,
    /// Errors returned by the next call of the named operation.
    pub failures: Vec<(&'static str, ServiceError)>,
    /// Every call received, in order.
    pub calls: Vec<String>,
    pub creates: Vec<CreateStackRequest>,
    pub updates: Vec<StackRequest>,
    pub policies: Vec<(String, String)>,
    /// Stacks whose `SetStackPolicy` is always rejected.
    pub locked_policies: Vec<String>,
    pub protection_updates: Vec<(String, bool)>,
    pub deletes: Vec<(String, Option<String>)>,
    /// Reject every update as a no-op.
    pub no_updates: bool,
    created: usize,
}

impl FakeState {
    fn position(&self, stack: &str) -> Option<usize> {
        self.stacks
            .iter()
            .position(|s| s.stack_id == stack || s.stack_name == stack)
    }

    fn find_mut(&mut self, stack: &str) -> ServiceResult<&mut StackInfo> {
        let index = self
            .position(stack)
            .ok_or_else(|| ServiceError::stack_not_found(stack))?;
        Ok(&mut self.stacks[index])
    }

    fn resolve_id(&self, stack: &str) -> String {
        self.position(stack)
            .map_or_else(|| stack.to_string(), |i| self.stacks[i].stack_id.clone())
    }
}

/// In-memory [`CloudFormationApi`].
#[derive(Debug)]
pub(crate) struct FakeCloudFormation {
    state: Mutex<FakeState>,
}

impl Default for FakeCloudFormation {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCloudFormation {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                page_size: 2,
                ..FakeState::default()
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state poisoned")
    }

    /// Registers an existing stack.
    pub fn with_stack(self, info: StackInfo) -> Self {
        self.state().stacks.push(info);
        self
    }

    /// Makes the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: &'static str, error: ServiceError) {
        self.state().failures.push((operation, error));
    }

    /// Names of the calls received so far.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    fn begin(&self, operation: &'static str) -> ServiceResult<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.calls.push(operation.to_string());
        if let Some(index) = state.failures.iter().position(|(op, _)| *op == operation) {
            let (_, error) = state.failures.remove(index);
            return Err(error);
        }
        Ok(state)
    }
}

/// A stack snapshot with the given identity and status.
pub(crate) fn stack_info(stack_id: &str, stack_name: &str, status: &str) -> StackInfo {
    StackInfo {
        stack_id: stack_id.to_string(),
        stack_name: stack_name.to_string(),
        status: status.to_string(),
        status_reason: None,
        tags: vec![],
        parameters: vec![],
        role_arn: None,
        termination_protection: Some(false),
    }
}

/// An event for `logical_id` at `secs` seconds after the epoch.
pub(crate) fn event(logical_id: &str, status: &str, secs: i64) -> StackEvent {
    StackEvent {
        logical_resource_id: logical_id.to_string(),
        physical_resource_id: None,
        resource_type: String::from("AWS::CloudFormation::Stack"),
        resource_status: status.to_string(),
        resource_status_reason: None,
        timestamp: DateTime::from_timestamp(secs, 0).expect("valid timestamp"),
    }
}

/// Clients backed by `cloudformation`, with STS and IAM mocks that expect no calls.
pub(crate) fn clients(cloudformation: &Arc<FakeCloudFormation>) -> Clients {
    Clients::new(
        cloudformation.clone(),
        Arc::new(MockStsApi::new()),
        Arc::new(MockIamApi::new()),
    )
}

/// Factory that hands out a fixed client set and records the credentials.
pub(crate) struct FakeFactory {
    clients: Clients,
    pub issued: Mutex<Vec<TemporaryCredentials>>,
}

impl FakeFactory {
    pub fn new(clients: Clients) -> Self {
        Self {
            clients,
            issued: Mutex::new(Vec::new()),
        }
    }

    pub fn issued(&self) -> usize {
        self.issued.lock().expect("issued poisoned").len()
    }
}

impl ClientFactory for FakeFactory {
    fn from_credentials(&self, credentials: &TemporaryCredentials) -> Clients {
        self.issued
            .lock()
            .expect("issued poisoned")
            .push(credentials.clone());
        self.clients.clone()
    }
}

#[async_trait]
impl CloudFormationApi for FakeCloudFormation {
    async fn validate_template(
        &self,
        _template: &TemplateSource,
    ) -> ServiceResult<TemplateValidation> {
        let state = self.begin("ValidateTemplate")?;
        Ok(TemplateValidation {
            parameters: state.declared_parameters.clone(),
            capabilities: state.capabilities.clone(),
        })
    }

    async fn template_metadata(&self, _template: &TemplateSource) -> ServiceResult<Option<String>> {
        let state = self.begin("GetTemplateSummary")?;
        Ok(state.metadata.clone())
    }

    async fn describe_stack(&self, stack: &str) -> ServiceResult<StackInfo> {
        let mut state = self.begin("DescribeStacks")?;
        let next_status = state.statuses.pop_front();
        let info = state.find_mut(stack)?;
        if let Some(status) = next_status {
            info.status = status;
        }
        Ok(info.clone())
    }

    async fn describe_stack_resources(&self, stack: &str) -> ServiceResult<Vec<StackResource>> {
        let state = self.begin("DescribeStackResources")?;
        let id = state.resolve_id(stack);
        match state.resources.get(&id) {
            Some(resources) => Ok(resources.clone()),
            None if state.position(stack).is_some() => Ok(vec![]),
            None => Err(ServiceError::stack_not_found(stack)),
        }
    }

    async fn create_stack(&self, request: &CreateStackRequest) -> ServiceResult<String> {
        let mut state = self.begin("CreateStack")?;
        let name = &request.stack.stack_name;
        if name.is_empty() {
            return Err(ServiceError::new(
                "ValidationError",
                "1 validation error detected: Value null at 'stackName' failed to satisfy constraint",
            ));
        }
        if state.position(name).is_some() {
            return Err(ServiceError::new(
                "AlreadyExistsException",
                format!("Stack [{name}] already exists"),
            ));
        }

        state.created += 1;
        let stack_id = format!(
            "arn:aws:cloudformation:us-east-1:123456789012:stack/{name}/{}",
            state.created
        );

        state.stacks.push(StackInfo {
            stack_id: stack_id.clone(),
            stack_name: name.clone(),
            status: String::from("CREATE_COMPLETE"),
            status_reason: None,
            tags: request.stack.tags.clone(),
            parameters: request.stack.parameters.clone(),
            role_arn: request.stack.role_arn.clone(),
            termination_protection: Some(request.termination_protection),
        });
        state.creates.push(request.clone());
        Ok(stack_id)
    }

    async fn update_stack(&self, request: &StackRequest) -> ServiceResult<String> {
        let mut state = self.begin("UpdateStack")?;
        if state.no_updates {
            return Err(ServiceError::new("ValidationError", NO_UPDATES_MESSAGE));
        }

        let info = state.find_mut(&request.stack_name)?;
        info.status = String::from("UPDATE_COMPLETE");
        info.tags = request.tags.clone();
        info.parameters = request.parameters.clone();
        let stack_id = info.stack_id.clone();

        state.updates.push(request.clone());
        Ok(stack_id)
    }

    async fn delete_stack(&self, stack: &str, role_arn: Option<&str>) -> ServiceResult<()> {
        let mut state = self.begin("DeleteStack")?;
        state.find_mut(stack)?.status = String::from("DELETE_COMPLETE");
        state
            .deletes
            .push((stack.to_string(), role_arn.map(str::to_owned)));
        Ok(())
    }

    async fn set_stack_policy(&self, stack: &str, policy: &str) -> ServiceResult<()> {
        let mut state = self.begin("SetStackPolicy")?;
        let id = state.resolve_id(stack);
        if state.position(stack).is_none() && !state.resources.contains_key(&id) {
            return Err(ServiceError::stack_not_found(stack));
        }
        if state.locked_policies.contains(&id) {
            return Err(ServiceError::new(
                "ValidationError",
                format!("Stack {id} is in UPDATE_IN_PROGRESS state"),
            ));
        }
        state.policies.push((id, policy.to_string()));
        Ok(())
    }

    async fn update_termination_protection(&self, stack: &str, enabled: bool) -> ServiceResult<()> {
        let mut state = self.begin("UpdateTerminationProtection")?;
        state.find_mut(stack)?.termination_protection = Some(enabled);
        state.protection_updates.push((stack.to_string(), enabled));
        Ok(())
    }

    async fn describe_stack_events(
        &self,
        stack: &str,
        next_token: Option<&str>,
    ) -> ServiceResult<EventPage> {
        let state = self.begin("DescribeStackEvents")?;
        let id = state.resolve_id(stack);
        let Some(events) = state.events.get(&id) else {
            return if state.position(stack).is_some() {
                Ok(EventPage::default())
            } else {
                Err(ServiceError::stack_not_found(stack))
            };
        };

        let start = next_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + state.page_size.max(1)).min(events.len());
        Ok(EventPage {
            events: events[start.min(end)..end].to_vec(),
            next_token: (end < events.len()).then(|| end.to_string()),
        })
    }
}
