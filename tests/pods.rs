//! Tests the pod lifecycle against the in-memory cloud

use std::sync::Arc;

use cocoa::models::{
    ContainerOpts, EnvVar, PodCreationOpts, PodDefinitionOpts, PodResources, PodStatus, SecretRef,
    TaskDefinitionHandle, TaskFailure,
};
use cocoa::test_utilities::{generators, FakeCloud, MemoryDefinitionCache};
use cocoa::{fail, is, is_not};
use cocoa::{ContainerService, ErrorKind, Pod, PodCreator, PodDefinitionManager, Vault};

/// Build creation options whose container reads a new owned secret
fn opts_with_owned_secret(cluster: &str) -> PodCreationOpts {
    let secret = SecretRef::create(generators::secret_name("pfx/s"), "x").owned(true);
    let mut definition = PodDefinitionOpts::new(generators::family()).container(
        ContainerOpts::new("c", "image")
            .memory_mb(128)
            .cpu(128)
            .env(EnvVar::secret("TOKEN", secret)),
    );
    definition.task_role = Some("cocoa-task-role".to_owned());
    definition.execution_role = Some("cocoa-execution-role".to_owned());
    PodCreationOpts::new(definition, generators::execution_opts(cluster))
}

#[tokio::test]
async fn lifecycle() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let vault = Vault::new(cloud.clone());
    let creator = PodCreator::new(cloud.clone(), vault.clone());
    let pod = creator.create(opts_with_owned_secret("c")).await?;
    // the new pod starts out starting and tracks everything it owns
    is!(pod.status_info().await.status, PodStatus::Starting);
    let resources = pod.resources().await;
    is_not!(resources.task_id, String::new());
    is!(resources.task_definition.owned, true);
    is!(resources.containers[0].secrets[0].owned, true);
    let secret_id = resources.containers[0].secrets[0].id.clone();
    // stop the pod
    pod.stop().await?;
    is!(pod.status_info().await.status, PodStatus::Stopped);
    // delete the pod, which reclaims the definition and the secret
    pod.delete().await?;
    is!(pod.status_info().await.status, PodStatus::Deleted);
    fail!(vault.get(&secret_id).await, ErrorKind::NotFound);
    let described = cloud
        .describe_task_definition(&resources.task_definition.id)
        .await?;
    is!(described.active, false);
    Ok(())
}

#[tokio::test]
async fn stop_and_delete_hold_when_repeated() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let creator = PodCreator::new(cloud.clone(), Vault::new(cloud.clone()));
    // stop twice, then delete twice
    let pod = creator.create(opts_with_owned_secret("c")).await?;
    pod.stop().await?;
    pod.stop().await?;
    is!(pod.status_info().await.status, PodStatus::Stopped);
    pod.delete().await?;
    pod.delete().await?;
    is!(pod.status_info().await.status, PodStatus::Deleted);
    // stop then delete then delete on a fresh pod
    let pod = creator.create(opts_with_owned_secret("c")).await?;
    pod.stop().await?;
    pod.delete().await?;
    pod.delete().await?;
    is!(pod.status_info().await.status, PodStatus::Deleted);
    // delete without an explicit stop also lands on deleted
    let pod = creator.create(opts_with_owned_secret("c")).await?;
    pod.delete().await?;
    is!(pod.status_info().await.status, PodStatus::Deleted);
    Ok(())
}

#[tokio::test]
async fn stop_failure_leaves_status_untouched() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let creator = PodCreator::new(cloud.clone(), Vault::new(cloud.clone()));
    let pod = creator.create(generators::creation_opts("c")).await?;
    // wipe the account so the stop cannot find the task
    cloud.reset();
    fail!(pod.stop().await, ErrorKind::NotFound);
    // a failed stop must not move the cached status
    is!(pod.status_info().await.status, PodStatus::Starting);
    Ok(())
}

#[tokio::test]
async fn create_from_existing_definition_owns_nothing() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let manager = PodDefinitionManager::new(cloud.clone(), Vault::new(cloud.clone()));
    let item = manager.create(generators::definition_opts()).await?;
    let creator = PodCreator::new(cloud.clone(), Vault::new(cloud.clone()));
    let pod = creator
        .create_from_existing(&item.id, generators::execution_opts("c"))
        .await?;
    let resources = pod.resources().await;
    is!(resources.task_definition.owned, false);
    is!(resources.task_definition.id, item.id);
    // deleting the pod must leave the definition registered
    pod.delete().await?;
    is!(pod.status_info().await.status, PodStatus::Deleted);
    is!(manager.describe(&item.id).await?.active, true);
    Ok(())
}

#[tokio::test]
async fn create_from_existing_rejects_unknown_definitions() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let creator = PodCreator::new(cloud.clone(), Vault::new(cloud.clone()));
    let result = creator
        .create_from_existing(
            "arn:aws:ecs:task-definition/never-was:1",
            generators::execution_opts("c"),
        )
        .await;
    fail!(result, ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn create_registers_through_the_manager() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let cache = Arc::new(MemoryDefinitionCache::new());
    let manager = PodDefinitionManager::new(cloud.clone(), Vault::new(cloud.clone()))
        .with_cache(cache.clone())
        .cache_tag("cache-tag");
    let creator = PodCreator::new(cloud.clone(), Vault::new(cloud.clone())).with_manager(manager);
    let pod = creator.create(generators::creation_opts("c")).await?;
    let resources = pod.resources().await;
    // the definition must have been reconciled on the way through
    is!(cache.get(&resources.task_definition.id).is_some(), true);
    let described = cloud
        .describe_task_definition(&resources.task_definition.id)
        .await?;
    is!(
        described.tags.get("cache-tag").map(String::as_str),
        Some("true")
    );
    Ok(())
}

#[tokio::test]
async fn latest_status_tracks_the_provider() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let creator = PodCreator::new(cloud.clone(), Vault::new(cloud.clone()));
    let pod = creator.create(generators::creation_opts("c")).await?;
    let task_id = pod.resources().await.task_id;
    // the fake starts tasks in PROVISIONING
    is!(pod.latest_status_info().await?.status, PodStatus::Starting);
    cloud.set_task_status(&task_id, "RUNNING");
    is!(pod.latest_status_info().await?.status, PodStatus::Running);
    cloud.set_task_status(&task_id, "DEPROVISIONING");
    is!(pod.latest_status_info().await?.status, PodStatus::Stopping);
    Ok(())
}

#[tokio::test]
async fn latest_status_populates_missing_containers() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let vault = Vault::new(cloud.clone());
    let creator = PodCreator::new(cloud.clone(), vault.clone());
    let pod = creator.create(generators::creation_opts("c")).await?;
    let original = pod.resources().await;
    // rebuild a handle from partial state with no container list
    let partial = PodResources {
        cluster: original.cluster.clone(),
        task_id: original.task_id.clone(),
        task_definition: TaskDefinitionHandle {
            id: original.task_definition.id.clone(),
            owned: false,
            family: None,
            revision: None,
        },
        containers: Vec::new(),
    };
    let rebuilt = Pod::reconstitute(cloud.clone(), vault, partial);
    is!(rebuilt.status_info().await.status, PodStatus::Unknown);
    rebuilt.latest_status_info().await?;
    // the fresh description must have filled the container list in
    let resources = rebuilt.resources().await;
    is!(resources.containers.len(), original.containers.len());
    is!(resources.containers[0].name, original.containers[0].name);
    Ok(())
}

#[tokio::test]
async fn describe_missing_task_is_not_found() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let vault = Vault::new(cloud.clone());
    // a handle over a task the provider never heard of
    let resources = PodResources {
        cluster: "c".to_owned(),
        task_id: "arn:aws:ecs:task/c/never-was".to_owned(),
        task_definition: TaskDefinitionHandle::default(),
        containers: Vec::new(),
    };
    let pod = Pod::reconstitute(cloud.clone(), vault, resources);
    fail!(pod.latest_status_info().await, ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn independent_pods_run_concurrently() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let creator = PodCreator::new(cloud.clone(), Vault::new(cloud.clone()));
    // drive two independent pods through their lifecycles at once
    let (first, second) = tokio::join!(
        creator.create(opts_with_owned_secret("c")),
        creator.create(opts_with_owned_secret("c")),
    );
    let (first, second) = (first?, second?);
    is_not!(
        first.resources().await.task_id,
        second.resources().await.task_id
    );
    let (stopped, deleted) = tokio::join!(first.stop(), second.delete());
    stopped?;
    deleted?;
    is!(first.status_info().await.status, PodStatus::Stopped);
    is!(second.status_info().await.status, PodStatus::Deleted);
    Ok(())
}

#[tokio::test]
async fn failed_delete_stays_stopped_and_can_be_retried() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let cache = Arc::new(cocoa::test_utilities::MemorySecretCache::new());
    let vault = Vault::new(cloud.clone()).with_cache(cache.clone());
    let creator = PodCreator::new(cloud.clone(), vault.clone());
    let pod = creator.create(opts_with_owned_secret("c")).await?;
    // make reclaiming the owned secret fail partway through
    cache.fail_deletes(true);
    fail!(pod.delete().await, ErrorKind::Internal);
    // the pod stopped but is not reclaimed, so it must not report deleted
    is!(pod.status_info().await.status, PodStatus::Stopped);
    // with the failure gone a second delete finishes the job
    cache.fail_deletes(false);
    pod.delete().await?;
    is!(pod.status_info().await.status, PodStatus::Deleted);
    Ok(())
}

#[tokio::test]
async fn run_failures_keep_the_composite_list() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let creator = PodCreator::new(cloud.clone(), Vault::new(cloud.clone()));
    // even a MISSING reason from a run must keep the full failure list
    cloud.fail_next_run(vec![
        TaskFailure {
            arn: Some("arn:aws:ecs:container-instance/i-1".to_owned()),
            reason: Some("MISSING".to_owned()),
            detail: Some("no container instance".to_owned()),
        },
        TaskFailure {
            arn: Some("arn:aws:ecs:container-instance/i-2".to_owned()),
            reason: Some("RESOURCE:MEMORY".to_owned()),
            detail: None,
        },
    ]);
    let result = creator.create(generators::creation_opts("c")).await;
    match result {
        Err(cocoa::Error::PartialFailure { op, failures }) => {
            is!(op, "run_task");
            is!(failures.len(), 2);
            is!(failures[0].reason.as_deref(), Some("MISSING"));
            is!(failures[1].reason.as_deref(), Some("RESOURCE:MEMORY"));
        }
        Err(err) => return Err(err.context("expected a partial failure")),
        Ok(_) => return Err(cocoa::Error::new("expected a partial failure")),
    }
    // running from an existing definition reports failures the same way
    let manager = PodDefinitionManager::new(cloud.clone(), Vault::new(cloud.clone()));
    let item = manager.create(generators::definition_opts()).await?;
    cloud.fail_next_run(vec![TaskFailure {
        arn: Some("arn:aws:ecs:container-instance/i-3".to_owned()),
        reason: Some("MISSING".to_owned()),
        detail: None,
    }]);
    let result = creator
        .create_from_existing(&item.id, generators::execution_opts("c"))
        .await;
    match result {
        Err(cocoa::Error::PartialFailure { op, failures }) => {
            is!(op, "run_task");
            is!(failures.len(), 1);
        }
        Err(err) => return Err(err.context("expected a partial failure")),
        Ok(_) => return Err(cocoa::Error::new("expected a partial failure")),
    }
    Ok(())
}

#[tokio::test]
async fn run_failures_surface_each_entry() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    // describing a mix of known and unknown tasks reports the unknown as
    // MISSING failures alongside the known snapshots
    let creator = PodCreator::new(cloud.clone(), Vault::new(cloud.clone()));
    let pod = creator.create(generators::creation_opts("c")).await?;
    let known = pod.resources().await.task_id;
    let unknown = "arn:aws:ecs:task/c/never-was".to_owned();
    let results = cloud
        .describe_tasks("c", &[known.clone(), unknown.clone()])
        .await?;
    is!(results.tasks.len(), 1);
    is!(results.failures.len(), 1);
    is!(results.failures[0].arn, Some(unknown.clone()));
    is!(results.failures[0].reason.as_deref(), Some("MISSING"));
    Ok(())
}
