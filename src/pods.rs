//! Creating pods and managing their lifecycle
//!
//! The creator materializes a pod: it provisions referenced secrets,
//! registers the definition (directly or through the definition manager
//! when a cache is configured), runs the task, and hands back a [`Pod`]
//! annotated with everything it owns. Failures after secret provisioning
//! do not roll anything back; the two-phase tags keep leftover resources
//! discoverable instead, since a rollback can itself fail and leak
//! something different.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{event, instrument, Level};

use crate::client::{ContainerService, Error};
use crate::definitions::{provision_secrets, PodDefinitionManager};
use crate::models::{
    ContainerResource, ContainerStatusInfo, PodCreationOpts, PodExecutionOpts, PodResources,
    PodStatus, PodStatusInfo, TaskDefinitionHandle, TaskSnapshot,
};
use crate::vault::Vault;

/// Materializes pods on the container service
pub struct PodCreator {
    /// The container service to run tasks on
    service: Arc<dyn ContainerService>,
    /// The vault that provisions referenced secrets
    vault: Vault,
    /// The definition manager to register through, when a cache is configured
    manager: Option<PodDefinitionManager>,
}

impl PodCreator {
    /// Create a pod creator that registers definitions directly
    ///
    /// # Arguments
    ///
    /// * `service` - The container service to run tasks on
    /// * `vault` - The vault that provisions referenced secrets
    pub fn new(service: Arc<dyn ContainerService>, vault: Vault) -> Self {
        PodCreator {
            service,
            vault,
            manager: None,
        }
    }

    /// Register definitions through a manager instead of directly
    ///
    /// With a definition cache attached to the manager, registrations run
    /// the two-phase reconciliation protocol.
    ///
    /// # Arguments
    ///
    /// * `manager` - The definition manager to register through
    #[must_use]
    pub fn with_manager(mut self, manager: PodDefinitionManager) -> Self {
        self.manager = Some(manager);
        self
    }

    /// The tag key reserved for cache reconciliation
    fn reserved_tag(&self) -> &str {
        match &self.manager {
            Some(manager) => manager.cache_tag_key(),
            None => self.vault.cache_tag_key(),
        }
    }

    /// Create a pod and return a handle to it
    ///
    /// # Arguments
    ///
    /// * `opts` - The merged definition and execution options
    #[instrument(name = "PodCreator::create", skip_all, fields(family = %opts.definition.family_name, cluster = %opts.execution.cluster), err(Debug))]
    pub async fn create(&self, opts: PodCreationOpts) -> Result<Pod, Error> {
        opts.validate(Some(self.reserved_tag()))?;
        let PodCreationOpts {
            definition,
            execution,
        } = opts;
        // secrets created here are owned by the pod and deleted with it
        let (definition, provisioned) = provision_secrets(&self.vault, definition).await?;
        let registered = match &self.manager {
            Some(manager) => manager.register(&definition).await?,
            None => self.service.register_task_definition(&definition).await?,
        };
        let run = self.service.run_task(&registered.id, &execution).await?;
        // a run failure always surfaces the full composite list, whatever
        // the individual reasons say
        if !run.failures.is_empty() {
            return Err(Error::PartialFailure {
                op: "run_task".to_owned(),
                failures: run.failures,
            });
        }
        let task = match run.tasks.into_iter().next() {
            Some(task) if !task.arn.is_empty() => task,
            _ => return Err(Error::new("run_task: provider returned no task")),
        };
        // attach provider container ids to the provisioned containers
        let mut containers = provisioned;
        for snapshot in &task.containers {
            if let Some(container) = containers
                .iter_mut()
                .find(|container| container.name == snapshot.name)
            {
                container.container_id = snapshot.id.clone();
            }
        }
        let status = PodStatusInfo::starting(
            containers.iter().map(|container| container.name.as_str()),
        );
        let resources = PodResources {
            cluster: execution.cluster.clone(),
            task_id: task.arn,
            task_definition: TaskDefinitionHandle {
                id: registered.id,
                owned: true,
                family: Some(registered.family),
                revision: Some(registered.revision),
            },
            containers,
        };
        event!(Level::INFO, task = %resources.task_id, "created pod");
        Ok(Pod::new(
            self.service.clone(),
            self.vault.clone(),
            resources,
            status,
        ))
    }

    /// Run a pod from a definition that already exists
    ///
    /// The returned pod does not own the definition or any of its secrets,
    /// so deleting it only stops the task.
    ///
    /// # Arguments
    ///
    /// * `definition_id` - The id of the registered definition to run
    /// * `execution` - The options for executing the pod
    #[instrument(name = "PodCreator::create_from_existing", skip(self, execution), err(Debug))]
    pub async fn create_from_existing(
        &self,
        definition_id: &str,
        execution: PodExecutionOpts,
    ) -> Result<Pod, Error> {
        execution.validate(None, Some(self.reserved_tag()))?;
        // resolve the definition up front so a bad id fails fast
        let described = self.service.describe_task_definition(definition_id).await?;
        let run = self.service.run_task(&described.id, &execution).await?;
        if !run.failures.is_empty() {
            return Err(Error::PartialFailure {
                op: "run_task".to_owned(),
                failures: run.failures,
            });
        }
        let task = match run.tasks.into_iter().next() {
            Some(task) if !task.arn.is_empty() => task,
            _ => return Err(Error::new("run_task: provider returned no task")),
        };
        let containers: Vec<ContainerResource> = task
            .containers
            .iter()
            .map(|snapshot| ContainerResource {
                container_id: snapshot.id.clone(),
                name: snapshot.name.clone(),
                secrets: Vec::new(),
            })
            .collect();
        let status = PodStatusInfo::starting(
            containers.iter().map(|container| container.name.as_str()),
        );
        let resources = PodResources {
            cluster: execution.cluster.clone(),
            task_id: task.arn,
            task_definition: TaskDefinitionHandle {
                id: described.id,
                owned: false,
                family: Some(described.family),
                revision: Some(described.revision),
            },
            containers,
        };
        Ok(Pod::new(
            self.service.clone(),
            self.vault.clone(),
            resources,
            status,
        ))
    }
}

/// A handle to a running pod
///
/// The handle caches the pod's resources and last-known status. Callers
/// serialize operations on a single handle; independent handles can be
/// driven concurrently without coordination.
pub struct Pod {
    /// The container service the pod's task runs on
    service: Arc<dyn ContainerService>,
    /// The vault owned secrets are deleted through
    vault: Vault,
    /// The resources this pod tracks for status and cleanup
    resources: RwLock<PodResources>,
    /// The last status this handle observed
    status: RwLock<PodStatusInfo>,
}

impl Pod {
    /// Build a pod handle around its resources and initial status
    ///
    /// # Arguments
    ///
    /// * `service` - The container service the pod's task runs on
    /// * `vault` - The vault owned secrets are deleted through
    /// * `resources` - The resources the pod tracks
    /// * `status` - The initial status to cache
    pub(crate) fn new(
        service: Arc<dyn ContainerService>,
        vault: Vault,
        resources: PodResources,
        status: PodStatusInfo,
    ) -> Self {
        Pod {
            service,
            vault,
            resources: RwLock::new(resources),
            status: RwLock::new(status),
        }
    }

    /// Rebuild a pod handle from previously captured resources
    ///
    /// The status starts out unknown and the container list may be empty;
    /// a status refresh fills both in from the provider.
    ///
    /// # Arguments
    ///
    /// * `service` - The container service the pod's task runs on
    /// * `vault` - The vault owned secrets are deleted through
    /// * `resources` - The resources captured when the pod was created
    pub fn reconstitute(
        service: Arc<dyn ContainerService>,
        vault: Vault,
        resources: PodResources,
    ) -> Self {
        let status = PodStatusInfo {
            status: PodStatus::Unknown,
            containers: Vec::new(),
        };
        Pod::new(service, vault, resources, status)
    }

    /// Get the resources this pod tracks
    pub async fn resources(&self) -> PodResources {
        self.resources.read().await.clone()
    }

    /// Get the last status this handle observed without calling out
    pub async fn status_info(&self) -> PodStatusInfo {
        self.status.read().await.clone()
    }

    /// Refresh this pod's status from the container service
    ///
    /// The fresh description also fills in any container ids the cached
    /// resources were missing, which happens when a handle is rebuilt from
    /// partial state.
    #[instrument(name = "Pod::latest_status_info", skip(self), err(Debug))]
    pub async fn latest_status_info(&self) -> Result<PodStatusInfo, Error> {
        {
            let status = self.status.read().await;
            // deleted is terminal, there is nothing fresher to learn
            if status.status == PodStatus::Deleted {
                return Ok(status.clone());
            }
        }
        let (cluster, task_id) = {
            let resources = self.resources.read().await;
            (resources.cluster.clone(), resources.task_id.clone())
        };
        let mut results = self
            .service
            .describe_tasks(&cluster, &[task_id.clone()])
            .await?;
        let Some(task) = results.tasks.pop() else {
            return Err(results.failure_error("describe_tasks"));
        };
        let info = status_from_snapshot(&task);
        self.merge_containers(&task).await;
        *self.status.write().await = info.clone();
        Ok(info)
    }

    /// Fill cached resources in from a fresh task snapshot
    ///
    /// # Arguments
    ///
    /// * `task` - The snapshot to merge container details from
    async fn merge_containers(&self, task: &TaskSnapshot) {
        let mut resources = self.resources.write().await;
        if resources.containers.is_empty() {
            // the handle was rebuilt without a container list
            resources.containers = task
                .containers
                .iter()
                .map(|snapshot| ContainerResource {
                    container_id: snapshot.id.clone(),
                    name: snapshot.name.clone(),
                    secrets: Vec::new(),
                })
                .collect();
            return;
        }
        for container in &mut resources.containers {
            if container.container_id.is_none() {
                if let Some(snapshot) = task
                    .containers
                    .iter()
                    .find(|snapshot| snapshot.name == container.name)
                {
                    container.container_id = snapshot.id.clone();
                }
            }
        }
    }

    /// Stop this pod's task
    ///
    /// Idempotent: a pod that is already stopped or deleted is left alone.
    /// On failure the cached status is untouched so a retry can succeed.
    #[instrument(name = "Pod::stop", skip(self), err(Debug))]
    pub async fn stop(&self) -> Result<(), Error> {
        {
            let status = self.status.read().await;
            if status.status.is_stopped() {
                return Ok(());
            }
        }
        let (cluster, task_id) = {
            let resources = self.resources.read().await;
            (resources.cluster.clone(), resources.task_id.clone())
        };
        self.service.stop_task(&cluster, &task_id).await?;
        self.status.write().await.set_all(PodStatus::Stopped);
        event!(Level::INFO, task = %task_id, "stopped pod");
        Ok(())
    }

    /// Stop this pod and reclaim everything it owns
    ///
    /// The pod is stopped first; a stop failure aborts the delete. The
    /// owned definition is then deregistered and owned secrets deleted,
    /// proceeding past individual failures and aggregating them. Only a
    /// fully clean pass moves the pod to deleted; on error the pod stays
    /// stopped and the delete can be retried, since every step holds when
    /// repeated.
    #[instrument(name = "Pod::delete", skip(self), err(Debug))]
    pub async fn delete(&self) -> Result<(), Error> {
        {
            let status = self.status.read().await;
            if status.status == PodStatus::Deleted {
                return Ok(());
            }
        }
        // a pod that will not stop is not safe to strip
        self.stop().await?;
        let resources = self.resources.read().await.clone();
        let mut errors = Vec::new();
        let handle = &resources.task_definition;
        if handle.owned && !handle.id.is_empty() {
            if let Err(err) = self.service.deregister_task_definition(&handle.id).await {
                // a definition that is already gone counts as deregistered
                if !err.is_not_found() {
                    errors.push(err.context(format!("deregistering {}", handle.id)));
                }
            }
        }
        for container in &resources.containers {
            for secret in &container.secrets {
                if secret.owned {
                    if let Err(err) = self.vault.delete(&secret.id).await {
                        errors.push(err.context(format!("deleting secret {}", secret.id)));
                    }
                }
            }
        }
        if errors.is_empty() {
            self.status.write().await.set_all(PodStatus::Deleted);
            event!(Level::INFO, task = %resources.task_id, "deleted pod");
            Ok(())
        } else {
            Err(Error::Aggregate(errors))
        }
    }
}

/// Translate a task snapshot into pod status info
///
/// # Arguments
///
/// * `task` - The snapshot to translate
fn status_from_snapshot(task: &TaskSnapshot) -> PodStatusInfo {
    let containers = task
        .containers
        .iter()
        .map(|container| ContainerStatusInfo {
            name: container.name.clone(),
            status: PodStatus::translate(container.last_status.as_deref()),
        })
        .collect();
    PodStatusInfo {
        status: PodStatus::translate(task.last_status.as_deref()),
        containers,
    }
}
