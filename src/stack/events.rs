//! Stack event history.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::cloud::{CloudFormationApi, Clients, StackEvent};
use crate::error::{Result, Stage, StackError, StackforgeError};

use super::Stack;

/// Cursor value that precedes every event.
pub const EPOCH: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Fetches every page of a stack's event history and returns the events
/// strictly newer than `after`, oldest first.
///
/// Pages are not guaranteed to be ordered relative to each other, so the
/// whole set is sorted after fetching. The sort is stable: events sharing a
/// timestamp keep the order in which they were received.
///
/// # Errors
///
/// Returns an error if any page cannot be fetched.
pub async fn list_events(
    cloudformation: &dyn CloudFormationApi,
    stack_id: &str,
    after: DateTime<Utc>,
) -> Result<Vec<StackEvent>> {
    let mut events = Vec::new();
    let mut next_token: Option<String> = None;

    loop {
        let page = cloudformation
            .describe_stack_events(stack_id, next_token.as_deref())
            .await
            .map_err(|e| StackforgeError::remote(Stage::Events, e))?;

        trace!("Received {} events", page.events.len());
        events.extend(page.events.into_iter().filter(|e| e.timestamp > after));

        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    events.sort_by_key(|e| e.timestamp);
    Ok(events)
}

impl Stack {
    /// Lists events newer than `after`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::MissingStackId`] if the stack has no id yet, or
    /// an error if the history cannot be fetched.
    pub async fn list_events(&self, clients: &Clients, after: DateTime<Utc>) -> Result<Vec<StackEvent>> {
        let stack_id = self
            .stack_id()
            .ok_or(StackforgeError::Stack(StackError::MissingStackId))?;
        list_events(clients.cloudformation.as_ref(), stack_id, after).await
    }

    /// Timestamp of the most recent event, for use as an event cursor.
    ///
    /// A stack without an id or without events yields [`EPOCH`].
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be fetched.
    pub async fn last_event_time(&self, clients: &Clients) -> Result<DateTime<Utc>> {
        if self.stack_id().is_none() {
            return Ok(EPOCH);
        }

        let events = self.list_events(clients, EPOCH).await?;
        Ok(events.last().map_or(EPOCH, |e| e.timestamp))
    }
}
