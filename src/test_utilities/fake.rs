//! An in-memory double for the container service, secret store, and tag api

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::client::{
    ContainerService, Error, PodDefinitionCache, SecretCache, SecretStore, TagSearch,
};
use crate::models::{
    ContainerSnapshot, DescribedDefinition, PodDefinitionItem, PodDefinitionOpts,
    PodExecutionOpts, RegisteredDefinition, StoredSecret, TagFilter, TaggedResource, TaskFailure,
    TaskResults, TaskSnapshot,
};

/// A secret held by the fake store
#[derive(Debug, Clone)]
struct FakeSecret {
    /// The arn assigned to this secret
    arn: String,
    /// The name this secret was stored under
    name: String,
    /// The value of this secret
    value: String,
    /// The tags on this secret
    tags: HashMap<String, String>,
    /// Whether this secret is scheduled for deletion
    deleted: bool,
}

/// A task definition held by the fake container service
#[derive(Debug, Clone)]
struct FakeDefinition {
    /// The arn assigned to this definition
    arn: String,
    /// The family this definition belongs to
    family: String,
    /// The revision of this definition within its family
    revision: i32,
    /// Whether this definition is still active
    active: bool,
    /// The tags on this definition
    tags: HashMap<String, String>,
    /// The names of the containers this definition declares
    container_names: Vec<String>,
}

/// A task held by the fake container service
#[derive(Debug, Clone)]
struct FakeTask {
    /// The arn assigned to this task
    arn: String,
    /// The cluster this task runs on
    cluster: String,
    /// The family of the definition this task was started from
    family: String,
    /// The provider lifecycle state of this task
    status: String,
    /// The containers in this task as (arn, name) pairs
    containers: Vec<(String, String)>,
    /// The tags on this task
    tags: HashMap<String, String>,
}

/// The mutable state behind a fake cloud
#[derive(Debug, Default)]
struct FakeState {
    /// The stored secrets by arn
    secrets: HashMap<String, FakeSecret>,
    /// The secret arns by name
    secret_names: HashMap<String, String>,
    /// The registered definitions by arn
    definitions: HashMap<String, FakeDefinition>,
    /// The latest revision per family
    revisions: HashMap<String, i32>,
    /// The running tasks by arn
    tasks: HashMap<String, FakeTask>,
}

/// An in-memory cloud implementing the same contracts as the real clients
///
/// Each instance owns its own state, so every test can build a fresh one
/// and no test observes another's resources.
#[derive(Debug, Default)]
pub struct FakeCloud {
    /// The state behind this fake
    state: Mutex<FakeState>,
    /// Failures the next run hands back instead of starting a task
    run_failures: Mutex<Vec<TaskFailure>>,
}

impl FakeCloud {
    /// Create an empty fake cloud
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all state, as if the account were wiped
    pub fn reset(&self) {
        *self.state.lock().unwrap() = FakeState::default();
        self.run_failures.lock().unwrap().clear();
    }

    /// Make the next run report these failures instead of starting a task
    ///
    /// # Arguments
    ///
    /// * `failures` - The failures the next run_task call hands back
    pub fn fail_next_run(&self, failures: Vec<TaskFailure>) {
        *self.run_failures.lock().unwrap() = failures;
    }

    /// Set the lifecycle state of a task and its containers
    ///
    /// # Arguments
    ///
    /// * `arn` - The arn of the task to update
    /// * `status` - The provider state to set
    pub fn set_task_status(&self, arn: &str, status: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(task) = state.tasks.get_mut(arn) {
            task.status = status.to_owned();
        }
    }

    /// Get a short random suffix for generated names
    fn suffix() -> String {
        let id = Uuid::new_v4().simple().to_string();
        id[..8].to_owned()
    }

    /// Resolve a secret arn from an arn or name
    ///
    /// # Arguments
    ///
    /// * `state` - The locked state to resolve in
    /// * `id` - The arn or name to resolve
    fn resolve_secret(state: &FakeState, id: &str) -> Option<String> {
        if state.secrets.contains_key(id) {
            return Some(id.to_owned());
        }
        state.secret_names.get(id).cloned()
    }

    /// Convert a fake task into a snapshot
    ///
    /// # Arguments
    ///
    /// * `task` - The fake task to convert
    fn snapshot(task: &FakeTask) -> TaskSnapshot {
        let containers = task
            .containers
            .iter()
            .map(|(arn, name)| ContainerSnapshot {
                id: Some(arn.clone()),
                name: name.clone(),
                last_status: Some(task.status.clone()),
            })
            .collect();
        TaskSnapshot {
            arn: task.arn.clone(),
            last_status: Some(task.status.clone()),
            containers,
        }
    }
}

#[async_trait]
impl SecretStore for FakeCloud {
    async fn create_secret(
        &self,
        name: &str,
        value: &str,
        tags: HashMap<String, String>,
    ) -> Result<String, Error> {
        if name.is_empty() || value.is_empty() {
            return Err(Error::InvalidInput(
                "create_secret: name and value must be set".to_owned(),
            ));
        }
        let mut state = self.state.lock().unwrap();
        if let Some(arn) = state.secret_names.get(name) {
            // a live secret blocks the name until it is removed
            if state.secrets.get(arn).map_or(false, |secret| !secret.deleted) {
                return Err(Error::AlreadyExists(format!(
                    "create_secret {name}: ResourceExistsException"
                )));
            }
        }
        let arn = format!("arn:aws:secretsmanager:secret/{name}-{}", Self::suffix());
        let secret = FakeSecret {
            arn: arn.clone(),
            name: name.to_owned(),
            value: value.to_owned(),
            tags,
            deleted: false,
        };
        state.secret_names.insert(name.to_owned(), arn.clone());
        state.secrets.insert(arn.clone(), secret);
        Ok(arn)
    }

    async fn get_secret_value(&self, id: &str) -> Result<String, Error> {
        let state = self.state.lock().unwrap();
        let arn = Self::resolve_secret(&state, id)
            .ok_or_else(|| Error::NotFound(format!("secret {id} not found")))?;
        match state.secrets.get(&arn) {
            Some(secret) if !secret.deleted => Ok(secret.value.clone()),
            _ => Err(Error::NotFound(format!("secret {id} not found"))),
        }
    }

    async fn update_secret(&self, id: &str, value: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let arn = Self::resolve_secret(&state, id)
            .ok_or_else(|| Error::NotFound(format!("secret {id} not found")))?;
        match state.secrets.get_mut(&arn) {
            Some(secret) if !secret.deleted => {
                secret.value = value.to_owned();
                Ok(())
            }
            _ => Err(Error::NotFound(format!("secret {id} not found"))),
        }
    }

    async fn delete_secret(&self, id: &str, force: bool) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let arn = Self::resolve_secret(&state, id)
            .ok_or_else(|| Error::NotFound(format!("secret {id} not found")))?;
        if force {
            // forced deletes skip the recovery window entirely
            if let Some(secret) = state.secrets.remove(&arn) {
                state.secret_names.remove(&secret.name);
            }
        } else if let Some(secret) = state.secrets.get_mut(&arn) {
            secret.deleted = true;
        }
        Ok(())
    }

    async fn describe_secret(&self, id: &str) -> Result<StoredSecret, Error> {
        let state = self.state.lock().unwrap();
        let arn = Self::resolve_secret(&state, id)
            .ok_or_else(|| Error::NotFound(format!("secret {id} not found")))?;
        let secret = state
            .secrets
            .get(&arn)
            .ok_or_else(|| Error::NotFound(format!("secret {id} not found")))?;
        Ok(StoredSecret {
            id: secret.arn.clone(),
            name: secret.name.clone(),
            tags: secret.tags.clone(),
            is_deleted: secret.deleted,
        })
    }

    async fn list_secrets(&self, prefix: Option<&str>) -> Result<Vec<StoredSecret>, Error> {
        let state = self.state.lock().unwrap();
        let secrets = state
            .secrets
            .values()
            .filter(|secret| prefix.map_or(true, |prefix| secret.name.starts_with(prefix)))
            .map(|secret| StoredSecret {
                id: secret.arn.clone(),
                name: secret.name.clone(),
                tags: secret.tags.clone(),
                is_deleted: secret.deleted,
            })
            .collect();
        Ok(secrets)
    }

    async fn tag_resource(&self, id: &str, tags: HashMap<String, String>) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let arn = Self::resolve_secret(&state, id)
            .ok_or_else(|| Error::NotFound(format!("secret {id} not found")))?;
        if let Some(secret) = state.secrets.get_mut(&arn) {
            secret.tags.extend(tags);
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerService for FakeCloud {
    async fn register_task_definition(
        &self,
        opts: &PodDefinitionOpts,
    ) -> Result<RegisteredDefinition, Error> {
        if opts.family_name.is_empty() {
            return Err(Error::InvalidInput(
                "register_task_definition: family_name must be set".to_owned(),
            ));
        }
        // references must be provisioned before registration, like the
        // real wrapper requires
        for container in &opts.container_opts {
            for env in &container.env_vars {
                if let crate::models::EnvValue::Secret(secret) = &env.value {
                    if secret.needs_creation() {
                        return Err(Error::InvalidInput(format!(
                            "container '{}' references an unprovisioned secret",
                            container.name
                        )));
                    }
                }
            }
        }
        let mut state = self.state.lock().unwrap();
        let revision = state
            .revisions
            .entry(opts.family_name.clone())
            .and_modify(|revision| *revision += 1)
            .or_insert(1)
            .to_owned();
        let arn = format!("arn:aws:ecs:task-definition/{}:{revision}", opts.family_name);
        let definition = FakeDefinition {
            arn: arn.clone(),
            family: opts.family_name.clone(),
            revision,
            active: true,
            tags: opts.tags.clone(),
            container_names: opts
                .container_opts
                .iter()
                .map(|container| container.name.clone())
                .collect(),
        };
        state.definitions.insert(arn.clone(), definition);
        Ok(RegisteredDefinition {
            id: arn,
            family: opts.family_name.clone(),
            revision,
        })
    }

    async fn deregister_task_definition(&self, id: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        match state.definitions.get_mut(id) {
            Some(definition) => {
                // deregistering an inactive definition holds
                definition.active = false;
                Ok(())
            }
            None => Err(Error::NotFound(format!("task definition {id} not found"))),
        }
    }

    async fn describe_task_definition(&self, id: &str) -> Result<DescribedDefinition, Error> {
        let state = self.state.lock().unwrap();
        let definition = state
            .definitions
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("task definition {id} not found")))?;
        Ok(DescribedDefinition {
            id: definition.arn.clone(),
            family: definition.family.clone(),
            revision: definition.revision,
            active: definition.active,
            tags: definition.tags.clone(),
        })
    }

    async fn list_task_definitions(
        &self,
        family_prefix: Option<&str>,
    ) -> Result<Vec<String>, Error> {
        let state = self.state.lock().unwrap();
        let arns = state
            .definitions
            .values()
            .filter(|definition| definition.active)
            .filter(|definition| {
                family_prefix.map_or(true, |prefix| definition.family.starts_with(prefix))
            })
            .map(|definition| definition.arn.clone())
            .collect();
        Ok(arns)
    }

    async fn run_task(
        &self,
        definition_id: &str,
        opts: &PodExecutionOpts,
    ) -> Result<TaskResults, Error> {
        if definition_id.is_empty() || opts.cluster.is_empty() {
            return Err(Error::InvalidInput(
                "run_task: definition_id and cluster must be set".to_owned(),
            ));
        }
        // injected failures come back in the response like the provider's
        let injected = std::mem::take(&mut *self.run_failures.lock().unwrap());
        if !injected.is_empty() {
            return Ok(TaskResults {
                tasks: Vec::new(),
                failures: injected,
            });
        }
        let mut state = self.state.lock().unwrap();
        let Some(definition) = state.definitions.get(definition_id).cloned() else {
            return Err(Error::NotFound(format!(
                "task definition {definition_id} not found"
            )));
        };
        if !definition.active {
            return Err(Error::InvalidInput(format!(
                "task definition {definition_id} is inactive"
            )));
        }
        let arn = format!("arn:aws:ecs:task/{}/{}", opts.cluster, Uuid::new_v4());
        let containers = definition
            .container_names
            .iter()
            .map(|name| {
                let container_arn = format!("arn:aws:ecs:container/{}", Uuid::new_v4());
                (container_arn, name.clone())
            })
            .collect();
        let task = FakeTask {
            arn: arn.clone(),
            cluster: opts.cluster.clone(),
            family: definition.family.clone(),
            status: "PROVISIONING".to_owned(),
            containers,
            tags: opts.tags.clone(),
        };
        let snapshot = Self::snapshot(&task);
        state.tasks.insert(arn, task);
        Ok(TaskResults {
            tasks: vec![snapshot],
            failures: Vec::new(),
        })
    }

    async fn stop_task(&self, cluster: &str, task: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        match state.tasks.get_mut(task) {
            Some(found) if found.cluster == cluster => {
                found.status = "STOPPED".to_owned();
                Ok(())
            }
            _ => Err(Error::NotFound(format!("task {task} not found"))),
        }
    }

    async fn describe_tasks(&self, cluster: &str, tasks: &[String]) -> Result<TaskResults, Error> {
        let state = self.state.lock().unwrap();
        let mut results = TaskResults::default();
        for id in tasks {
            match state.tasks.get(id) {
                Some(task) if task.cluster == cluster => {
                    results.tasks.push(Self::snapshot(task));
                }
                // unknown tasks surface as failures, not an error
                _ => results.failures.push(TaskFailure {
                    arn: Some(id.clone()),
                    reason: Some("MISSING".to_owned()),
                    detail: None,
                }),
            }
        }
        Ok(results)
    }

    async fn list_tasks(&self, cluster: &str, family: Option<&str>) -> Result<Vec<String>, Error> {
        let state = self.state.lock().unwrap();
        let arns = state
            .tasks
            .values()
            .filter(|task| task.cluster == cluster)
            .filter(|task| family.map_or(true, |family| task.family == family))
            .map(|task| task.arn.clone())
            .collect();
        Ok(arns)
    }

    async fn tag_resource(&self, id: &str, tags: HashMap<String, String>) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if let Some(definition) = state.definitions.get_mut(id) {
            definition.tags.extend(tags);
            return Ok(());
        }
        if let Some(task) = state.tasks.get_mut(id) {
            task.tags.extend(tags);
            return Ok(());
        }
        Err(Error::NotFound(format!("resource {id} not found")))
    }
}

#[async_trait]
impl TagSearch for FakeCloud {
    async fn get_resources(
        &self,
        resource_type_filters: &[String],
        tag_filters: &[TagFilter],
    ) -> Result<Vec<TaggedResource>, Error> {
        if tag_filters.iter().any(|filter| filter.key.is_empty()) {
            return Err(Error::InvalidInput(
                "get_resources: tag filter keys must be set".to_owned(),
            ));
        }
        let state = self.state.lock().unwrap();
        // every resource in the account with its service type
        let mut candidates: Vec<(&str, String, HashMap<String, String>)> = Vec::new();
        for secret in state.secrets.values() {
            candidates.push((
                "secretsmanager:secret",
                secret.arn.clone(),
                secret.tags.clone(),
            ));
        }
        for definition in state.definitions.values() {
            candidates.push((
                "ecs:task-definition",
                definition.arn.clone(),
                definition.tags.clone(),
            ));
        }
        for task in state.tasks.values() {
            candidates.push(("ecs:task", task.arn.clone(), task.tags.clone()));
        }
        let resources = candidates
            .into_iter()
            // union across resource types
            .filter(|(resource_type, _, _)| {
                resource_type_filters.is_empty()
                    || resource_type_filters
                        .iter()
                        .any(|filter| filter == resource_type)
            })
            // intersection across tag filters
            .filter(|(_, _, tags)| {
                tag_filters.iter().all(|filter| match tags.get(&filter.key) {
                    Some(value) => filter.values.is_empty() || filter.values.contains(value),
                    None => false,
                })
            })
            .map(|(_, arn, tags)| TaggedResource { id: arn, tags })
            .collect();
        Ok(resources)
    }
}

/// An in-memory pod definition cache with failure injection
#[derive(Debug, Default)]
pub struct MemoryDefinitionCache {
    /// The cached items by id
    items: Mutex<HashMap<String, PodDefinitionItem>>,
    /// Whether puts should fail
    fail_puts: AtomicBool,
}

impl MemoryDefinitionCache {
    /// Create an empty definition cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every put fail until turned off again
    ///
    /// # Arguments
    ///
    /// * `fail` - Whether puts should fail
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Get a cached item by id
    ///
    /// # Arguments
    ///
    /// * `id` - The id to look up
    pub fn get(&self, id: &str) -> Option<PodDefinitionItem> {
        self.items.lock().unwrap().get(id).cloned()
    }

    /// The number of cached items
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PodDefinitionCache for MemoryDefinitionCache {
    async fn put(&self, item: &PodDefinitionItem) -> Result<(), Error> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::new("injected definition cache failure"));
        }
        self.items
            .lock()
            .unwrap()
            .insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        self.items.lock().unwrap().remove(id);
        Ok(())
    }
}

/// An in-memory secret cache with failure injection
#[derive(Debug, Default)]
pub struct MemorySecretCache {
    /// The cached names by secret id
    items: Mutex<HashMap<String, String>>,
    /// Whether puts should fail
    fail_puts: AtomicBool,
    /// Whether deletes should fail
    fail_deletes: AtomicBool,
}

impl MemorySecretCache {
    /// Create an empty secret cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every put fail until turned off again
    ///
    /// # Arguments
    ///
    /// * `fail` - Whether puts should fail
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make every delete fail until turned off again
    ///
    /// # Arguments
    ///
    /// * `fail` - Whether deletes should fail
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Get a cached name by secret id
    ///
    /// # Arguments
    ///
    /// * `id` - The id to look up
    pub fn get(&self, id: &str) -> Option<String> {
        self.items.lock().unwrap().get(id).cloned()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl SecretCache for MemorySecretCache {
    async fn put(&self, id: &str, name: &str) -> Result<(), Error> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::new("injected secret cache failure"));
        }
        self.items
            .lock()
            .unwrap()
            .insert(id.to_owned(), name.to_owned());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::new("injected secret cache failure"));
        }
        self.items.lock().unwrap().remove(id);
        Ok(())
    }
}
