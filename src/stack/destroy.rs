//! Stack deletion.

use tracing::info;

use crate::cloud::Clients;
use crate::error::{Result, Stage, StackError, StackforgeError};

use super::Stack;

impl Stack {
    /// Deletes the stack.
    ///
    /// The stack is always addressed by its id, never by name, so a stack
    /// created under the same name after this one was resolved is never
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::MissingStackId`] if the id is unknown, or an
    /// error if the role lookup or the delete call fails.
    pub async fn destroy(&self, clients: &Clients) -> Result<()> {
        let stack_id = self
            .stack_id()
            .ok_or(StackforgeError::Stack(StackError::MissingStackId))?;
        let role_arn = self.role_arn(clients).await?;

        info!("Deleting stack {stack_id}");
        clients
            .cloudformation
            .delete_stack(stack_id, role_arn.as_deref())
            .await
            .map_err(|e| StackforgeError::remote(Stage::Delete, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::fake::{self, FakeCloudFormation};
    use crate::cloud::ServiceError;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_destroy_requires_id() {
        let cfn = Arc::new(
            FakeCloudFormation::new().with_stack(fake::stack_info("id-1", "app", "CREATE_COMPLETE")),
        );
        let clients = fake::clients(&cfn);

        let err = Stack::new()
            .with_name("app")
            .destroy(&clients)
            .await
            .expect_err("name alone is not enough");
        assert!(matches!(err, StackforgeError::Stack(StackError::MissingStackId)));
        assert!(cfn.calls().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_by_id() {
        let cfn = Arc::new(
            FakeCloudFormation::new().with_stack(fake::stack_info("id-1", "app", "CREATE_COMPLETE")),
        );
        let clients = fake::clients(&cfn);

        let mut stack = Stack::new().with_name("app");
        stack.describe(&clients).await.expect("describe");
        stack.destroy(&clients).await.expect("destroy");

        let state = cfn.state();
        assert_eq!(state.deletes, vec![(String::from("id-1"), None)]);
        assert_eq!(state.stacks[0].status, "DELETE_COMPLETE");
    }

    #[tokio::test]
    async fn test_destroy_failure_names_stage() {
        let cfn = Arc::new(
            FakeCloudFormation::new().with_stack(fake::stack_info("id-1", "app", "CREATE_COMPLETE")),
        );
        cfn.fail_next(
            "DeleteStack",
            ServiceError::new("ValidationError", "Stack [app] cannot be deleted while TerminationProtection is enabled"),
        );
        let clients = fake::clients(&cfn);

        let err = Stack::new()
            .with_id("id-1")
            .destroy(&clients)
            .await
            .expect_err("protected");
        assert!(err.to_string().starts_with("Failed to Delete Stack: "));
    }
}
