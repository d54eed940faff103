//! The capability traits the coordination layer depends on
//!
//! The production clients implement these over the real provider APIs; the
//! in-memory double implements the same contracts so the coordination layer
//! can be exercised without a cloud account.

use async_trait::async_trait;
use std::collections::HashMap;

use super::Error;
use crate::models::{
    DescribedDefinition, PodDefinitionItem, PodDefinitionOpts, PodExecutionOpts,
    RegisteredDefinition, StoredSecret, TagFilter, TaggedResource, TaskResults,
};

/// The container service operations the coordination layer needs
#[async_trait]
pub trait ContainerService: Send + Sync {
    /// Register an immutable task definition from pod definition options
    ///
    /// Secret references must already be provisioned; the registered
    /// definition carries the options' tags.
    async fn register_task_definition(
        &self,
        opts: &PodDefinitionOpts,
    ) -> Result<RegisteredDefinition, Error>;

    /// Deregister a task definition, marking it inactive
    async fn deregister_task_definition(&self, id: &str) -> Result<(), Error>;

    /// Describe a task definition, including its tags
    async fn describe_task_definition(&self, id: &str) -> Result<DescribedDefinition, Error>;

    /// List task definition ids, optionally filtered by family prefix
    async fn list_task_definitions(&self, family_prefix: Option<&str>)
        -> Result<Vec<String>, Error>;

    /// Run a task from a registered definition
    async fn run_task(
        &self,
        definition_id: &str,
        opts: &PodExecutionOpts,
    ) -> Result<TaskResults, Error>;

    /// Stop a running task
    async fn stop_task(&self, cluster: &str, task: &str) -> Result<(), Error>;

    /// Describe tasks on a cluster
    ///
    /// Tasks the provider no longer knows surface as failures with reason
    /// `MISSING`, not as an error.
    async fn describe_tasks(&self, cluster: &str, tasks: &[String]) -> Result<TaskResults, Error>;

    /// List task ids on a cluster, optionally filtered by family
    async fn list_tasks(&self, cluster: &str, family: Option<&str>) -> Result<Vec<String>, Error>;

    /// Add tags to a task or task definition
    async fn tag_resource(&self, id: &str, tags: HashMap<String, String>) -> Result<(), Error>;
}

/// The secret store operations the coordination layer needs
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Create a secret and return its store-assigned id
    async fn create_secret(
        &self,
        name: &str,
        value: &str,
        tags: HashMap<String, String>,
    ) -> Result<String, Error>;

    /// Get a secret's value
    async fn get_secret_value(&self, id: &str) -> Result<String, Error>;

    /// Replace a secret's value
    async fn update_secret(&self, id: &str, value: &str) -> Result<(), Error>;

    /// Delete a secret
    ///
    /// With `force` set the secret is removed immediately with no recovery
    /// window.
    async fn delete_secret(&self, id: &str, force: bool) -> Result<(), Error>;

    /// Describe a secret without its value
    async fn describe_secret(&self, id: &str) -> Result<StoredSecret, Error>;

    /// List secrets, optionally filtered by name prefix
    async fn list_secrets(&self, prefix: Option<&str>) -> Result<Vec<StoredSecret>, Error>;

    /// Add tags to a secret
    async fn tag_resource(&self, id: &str, tags: HashMap<String, String>) -> Result<(), Error>;
}

/// Tag-based resource search
#[async_trait]
pub trait TagSearch: Send + Sync {
    /// Find resources by type and tag filters
    ///
    /// A resource matches when its type is in `resource_type_filters` (or
    /// that list is empty) and it satisfies every tag filter: the set union
    /// across resource types, the set intersection across tag filters. An
    /// empty filter key is an input error.
    async fn get_resources(
        &self,
        resource_type_filters: &[String],
        tag_filters: &[TagFilter],
    ) -> Result<Vec<TaggedResource>, Error>;
}

/// An external cache tracking registered pod definitions
#[async_trait]
pub trait PodDefinitionCache: Send + Sync {
    /// Insert a definition into the cache
    async fn put(&self, item: &PodDefinitionItem) -> Result<(), Error>;

    /// Remove a definition from the cache
    async fn delete(&self, id: &str) -> Result<(), Error>;
}

/// An external cache tracking created secrets
#[async_trait]
pub trait SecretCache: Send + Sync {
    /// Insert a secret into the cache
    async fn put(&self, id: &str, name: &str) -> Result<(), Error>;

    /// Remove a secret from the cache
    async fn delete(&self, id: &str) -> Result<(), Error>;
}
