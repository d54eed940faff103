//! The container service shapes the coordination layer relies on

use std::collections::HashMap;

use crate::client::Error;

/// A task definition the container service registered
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegisteredDefinition {
    /// The provider-assigned id of this definition
    pub id: String,
    /// The family this definition belongs to
    pub family: String,
    /// The revision of this definition within its family
    pub revision: i32,
}

/// A task definition as the container service describes it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DescribedDefinition {
    /// The provider-assigned id of this definition
    pub id: String,
    /// The family this definition belongs to
    pub family: String,
    /// The revision of this definition within its family
    pub revision: i32,
    /// Whether this definition is still active
    pub active: bool,
    /// The tags on this definition
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// A failure the container service reported for part of a request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// The id of the resource that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    /// The reason this resource failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Any detail the provider attached to the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({})",
            self.arn.as_deref().unwrap_or("unknown"),
            self.reason.as_deref().unwrap_or("no reason"),
            self.detail.as_deref().unwrap_or("no detail"),
        )
    }
}

/// A container inside a task snapshot
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContainerSnapshot {
    /// The provider-assigned id of this container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The name of this container
    pub name: String,
    /// The provider lifecycle state of this container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<String>,
}

/// A task as the container service last saw it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    /// The provider-assigned id of this task
    pub arn: String,
    /// The provider lifecycle state of this task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<String>,
    /// The containers in this task
    #[serde(default)]
    pub containers: Vec<ContainerSnapshot>,
}

/// The outcome of running or describing tasks
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskResults {
    /// The tasks the provider returned
    #[serde(default)]
    pub tasks: Vec<TaskSnapshot>,
    /// The failures the provider reported
    #[serde(default)]
    pub failures: Vec<TaskFailure>,
}

impl TaskResults {
    /// Convert a describe's failures into a domain error
    ///
    /// A describe failure whose reason is `MISSING` means the task does
    /// not exist; anything else surfaces as a partial failure listing
    /// every entry. Run failures must not come through here, since a run
    /// always reports its full composite list whatever the reasons say.
    ///
    /// # Arguments
    ///
    /// * `op` - The operation these failures came from
    pub fn failure_error(&self, op: &str) -> Error {
        if let Some(missing) = self
            .failures
            .iter()
            .find(|failure| failure.reason.as_deref() == Some("MISSING"))
        {
            let arn = missing.arn.as_deref().unwrap_or("unknown");
            return Error::NotFound(format!("{op}: task {arn} not found"));
        }
        Error::PartialFailure {
            op: op.to_owned(),
            failures: self.failures.clone(),
        }
    }
}
