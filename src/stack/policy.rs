//! Stack policy propagation across nested stacks.
//!
//! A stack policy is authored once for a whole stack tree. Before it is set
//! on any single stack, its statements are filtered down to those that
//! reference at least one resource that stack actually contains, since the
//! service rejects policies naming resources it cannot find.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cloud::{Clients, StackResource};
use crate::error::{Result, Stage, StackError, StackforgeError};

/// A stack policy document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    /// Policy language version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Policy statements.
    #[serde(default)]
    pub statement: Vec<Statement>,
}

/// A single policy statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    /// `Allow` or `Deny`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    /// Update actions, a string or a list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
    /// Update actions excluded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_action: Option<Value>,
    /// Principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,
    /// Resources, as `LogicalResourceId/<pattern>` paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<OneOrMany>,
    /// Resources excluded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_resource: Option<OneOrMany>,
    /// Conditions, e.g. on resource type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
}

/// A string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    /// A single string.
    One(String),
    /// A list of strings.
    Many(Vec<String>),
}

impl OneOrMany {
    fn iter(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            Self::One(one) => std::slice::from_ref(one),
            Self::Many(many) => many,
        };
        items.iter().map(String::as_str)
    }
}

impl Statement {
    /// Logical-id patterns referenced by this statement: the last path
    /// segment of each `Resource` entry, or of each `NotResource` entry when
    /// there is no `Resource`.
    #[must_use]
    pub fn patterns(&self) -> Vec<&str> {
        self.resource
            .as_ref()
            .or(self.not_resource.as_ref())
            .map(|r| {
                r.iter()
                    .map(|path| path.rsplit('/').next().unwrap_or(path))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns true if the statement applies to a stack with these logical ids.
    ///
    /// Statements that reference no resource at all always apply.
    #[must_use]
    pub fn applies_to<S: AsRef<str>>(&self, logical_ids: &[S]) -> bool {
        let patterns = self.patterns();
        patterns.is_empty()
            || patterns.iter().any(|pattern| {
                logical_ids
                    .iter()
                    .any(|id| wildcard_match(pattern, id.as_ref()))
            })
    }
}

impl PolicyDocument {
    /// Parses a JSON policy document.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::InvalidPolicy`] if the document is not a valid
    /// policy.
    pub fn parse(document: &str) -> Result<Self> {
        serde_json::from_str(document).map_err(|e| {
            StackforgeError::Stack(StackError::InvalidPolicy {
                message: e.to_string(),
            })
        })
    }

    /// Keeps only the statements that apply to a stack with these logical ids.
    #[must_use]
    pub fn filtered_for<S: AsRef<str>>(&self, logical_ids: &[S]) -> Self {
        Self {
            version: self.version.clone(),
            statement: self
                .statement
                .iter()
                .filter(|s| s.applies_to(logical_ids))
                .cloned()
                .collect(),
        }
    }
}

/// Matches `name` against a pattern where `*` matches any run of characters
/// and `?` matches exactly one.
#[must_use]
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// A nested stack whose policy could not be set.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyFailure {
    /// Stack that was skipped.
    pub stack_id: String,
    /// Reason.
    pub error: String,
}

/// Outcome of a policy propagation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PolicyReport {
    /// Stacks that received their filtered policy, root first.
    pub applied: Vec<String>,
    /// Nested stacks that were skipped.
    pub failed: Vec<PolicyFailure>,
}

/// Sets `policy` on `stack_id` and on every stack nested below it, each
/// filtered against that stack's own direct children.
///
/// Stacks are visited depth-first in resource order. A failure on the root
/// stack aborts the propagation. A nested stack whose policy cannot be set
/// is recorded in the report and its children are still visited; only a
/// nested stack whose resources cannot be listed has its subtree skipped.
///
/// # Errors
///
/// Returns an error if the policy is invalid or the root stack fails.
pub async fn apply_stack_policy(clients: &Clients, policy: &str, stack_id: &str) -> Result<PolicyReport> {
    let document = PolicyDocument::parse(policy)?;
    let mut report = PolicyReport::default();
    let mut pending = vec![stack_id.to_string()];
    let mut is_root = true;

    while let Some(current) = pending.pop() {
        let root = std::mem::replace(&mut is_root, false);

        let (nested, applied) = match apply_one(clients, &document, &current).await {
            Ok(visit) => visit,
            Err(err) if root => return Err(err),
            Err(err) => (Vec::new(), Err(err)),
        };

        match applied {
            Ok(()) => report.applied.push(current),
            Err(err) if root => return Err(err),
            Err(err) => {
                warn!("Failed to set stack policy on nested stack {current}: {err}");
                report.failed.push(PolicyFailure {
                    stack_id: current,
                    error: err.to_string(),
                });
            }
        }

        // reversed so the first child is visited first
        pending.extend(nested.into_iter().rev());
    }

    info!(
        "Stack policy applied to {} stack(s), {} failed",
        report.applied.len(),
        report.failed.len()
    );
    Ok(report)
}

/// Sets the filtered policy on one stack.
///
/// Fails outright only when the stack's resources cannot be listed.
/// Otherwise returns its nested stack ids along with the outcome of
/// setting the policy.
async fn apply_one(
    clients: &Clients,
    document: &PolicyDocument,
    stack_id: &str,
) -> Result<(Vec<String>, Result<()>)> {
    let resources = clients
        .cloudformation
        .describe_stack_resources(stack_id)
        .await
        .map_err(|e| StackforgeError::remote(Stage::Policy, e))?;

    let logical_ids: Vec<&str> = resources.iter().map(|r| r.logical_id.as_str()).collect();
    let filtered = document.filtered_for(&logical_ids);
    debug!(
        "Stack {stack_id}: {} of {} policy statements apply",
        filtered.statement.len(),
        document.statement.len()
    );

    let applied = match serde_json::to_string(&filtered) {
        Ok(body) => clients
            .cloudformation
            .set_stack_policy(stack_id, &body)
            .await
            .map_err(|e| StackforgeError::remote(Stage::Policy, e)),
        Err(e) => Err(StackforgeError::internal(format!(
            "Failed to encode stack policy: {e}"
        ))),
    };

    let nested = resources
        .into_iter()
        .filter(StackResource::is_nested_stack)
        .filter_map(|r| r.physical_id)
        .collect();
    Ok((nested, applied))
}

/// A stack policy to set once a newly created stack exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPolicy {
    /// Stack to start from.
    pub stack_id: String,
    /// Unfiltered policy document.
    pub policy: String,
}

impl PendingPolicy {
    /// Propagates the policy.
    ///
    /// # Errors
    ///
    /// See [`apply_stack_policy`].
    pub async fn apply(&self, clients: &Clients) -> Result<PolicyReport> {
        apply_stack_policy(clients, &self.policy, &self.stack_id).await
    }
}
