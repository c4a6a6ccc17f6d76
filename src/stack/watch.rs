//! Polling a stack until the remote service settles it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::auth::Session;
use crate::cloud::StackEvent;
use crate::error::{Result, Stage, StackError, StackforgeError};

use super::events::list_events;
use super::Stack;

/// Default delay between two polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

const DELETE_COMPLETE: &str = "DELETE_COMPLETE";

/// The operation being followed, which decides what counts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOperation {
    /// A create or an update.
    Deploy,
    /// A delete.
    Destroy,
}

impl StackOperation {
    /// Returns true if `status` is the successful end of this operation.
    #[must_use]
    pub fn is_success(self, status: &str) -> bool {
        match self {
            Self::Deploy => matches!(status, "CREATE_COMPLETE" | "UPDATE_COMPLETE"),
            Self::Destroy => status == DELETE_COMPLETE,
        }
    }
}

/// Follows a stack through its in-progress states.
#[derive(Debug, Clone)]
pub struct StackWatcher {
    operation: StackOperation,
    poll_interval: Duration,
}

impl StackWatcher {
    /// Creates a watcher for `operation`.
    #[must_use]
    pub const fn new(operation: StackOperation) -> Self {
        Self {
            operation,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the delay between polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Polls the stack until it leaves the in-progress states.
    ///
    /// Each iteration refreshes the stack, hands every event newer than
    /// `cursor` to `on_event` in chronological order, and advances `cursor`
    /// past them. Both calls are retried after a credential rotation when
    /// they fail with an expired token.
    ///
    /// Returns the final status on success. While destroying, a stack that
    /// can no longer be found counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::DeployFailed`] if the stack settles in any other
    /// status, or the first unrecoverable remote error.
    pub async fn wait<F>(
        &self,
        session: &mut Session,
        stack: &mut Stack,
        cursor: &mut DateTime<Utc>,
        mut on_event: F,
    ) -> Result<String>
    where
        F: FnMut(&StackEvent),
    {
        loop {
            let target = stack.target()?.to_string();
            let refreshed = session
                .retry_on_expiry(|clients| {
                    let target = target.as_str();
                    async move {
                        clients
                            .cloudformation
                            .describe_stack(target)
                            .await
                            .map_err(|e| StackforgeError::remote(Stage::Describe, e))
                    }
                })
                .await;

            let info = match refreshed {
                Ok(info) => info,
                Err(err) if self.operation == StackOperation::Destroy && err.is_stack_not_found() => {
                    info!("Stack {target} no longer exists");
                    return Ok(DELETE_COMPLETE.to_string());
                }
                Err(err) => return Err(err),
            };

            let snapshot = stack.record(info);
            let status = snapshot.status.clone();
            let in_progress = snapshot.is_in_progress();
            debug!("Stack status: {status}");

            if let Some(stack_id) = stack.stack_id() {
                let after = *cursor;
                let events = session
                    .retry_on_expiry(|clients| async move {
                        list_events(clients.cloudformation.as_ref(), stack_id, after).await
                    })
                    .await?;

                if let Some(last) = events.last() {
                    *cursor = last.timestamp;
                }
                for event in &events {
                    on_event(event);
                }
            }

            if in_progress {
                tokio::time::sleep(self.poll_interval).await;
            } else if self.operation.is_success(&status) {
                info!("Stack reached {status}");
                return Ok(status);
            } else {
                return Err(StackforgeError::Stack(StackError::DeployFailed { status }));
            }
        }
    }
}
