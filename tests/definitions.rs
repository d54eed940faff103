//! Tests the pod definition manager against the in-memory cloud

use std::sync::Arc;

use cocoa::models::{EnvValue, SecretSource};
use cocoa::test_utilities::{generators, FakeCloud, MemoryDefinitionCache};
use cocoa::{fail, is, is_in};
use cocoa::{ContainerService, ErrorKind, PodDefinitionManager, Vault};

/// Build a manager without a cache over a fresh fake cloud
fn manager(cloud: &Arc<FakeCloud>) -> PodDefinitionManager {
    PodDefinitionManager::new(cloud.clone(), Vault::new(cloud.clone()))
}

#[tokio::test]
async fn create_registers_a_revision() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let manager = manager(&cloud);
    let opts = generators::definition_opts();
    let item = manager.create(opts.clone()).await?;
    let described = manager.describe(&item.id).await?;
    is!(described.family, opts.family_name);
    is!(described.revision, 1);
    is!(described.active, true);
    // registering the same family again appends a revision
    let second = manager.create(opts).await?;
    is!(manager.describe(&second.id).await?.revision, 2);
    Ok(())
}

#[tokio::test]
async fn cached_create_reconciles() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let cache = Arc::new(MemoryDefinitionCache::new());
    let manager = manager(&cloud)
        .with_cache(cache.clone())
        .cache_tag("cache-tag");
    let opts = generators::definition_opts().tag("creation", "v");
    let item = manager.create(opts).await?;
    // the definition must carry the user tag and the flipped cache tag
    let described = manager.describe(&item.id).await?;
    is!(described.tags.get("creation").map(String::as_str), Some("v"));
    is!(
        described.tags.get("cache-tag").map(String::as_str),
        Some("true")
    );
    // and the cache must hold the same item
    is!(cache.get(&item.id), Some(item.clone()));
    Ok(())
}

#[tokio::test]
async fn cached_create_strands_on_cache_failure() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let cache = Arc::new(MemoryDefinitionCache::new());
    let manager = manager(&cloud)
        .with_cache(cache.clone())
        .cache_tag("cache-tag");
    cache.fail_puts(true);
    let opts = generators::definition_opts().tag("creation", "v");
    let family = opts.family_name.clone();
    fail!(manager.create(opts).await, ErrorKind::Internal);
    // the registration went through but was never reconciled
    let arns = cloud.list_task_definitions(Some(&family)).await?;
    is!(arns.len(), 1);
    let described = manager.describe(&arns[0]).await?;
    is!(
        described.tags.get("cache-tag").map(String::as_str),
        Some("false")
    );
    is!(cache.is_empty(), true);
    Ok(())
}

#[tokio::test]
async fn create_provisions_referenced_secrets() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let manager = manager(&cloud);
    let opts = generators::definition_opts_with_secret("pfx/defs");
    let item = manager.create(opts).await?;
    // the reference must have been rewritten to the store-assigned id
    let env = &item.opts.container_opts[0].env_vars[0];
    let EnvValue::Secret(secret_ref) = &env.value else {
        return Err(cocoa::Error::new("expected a secret reference"));
    };
    is!(secret_ref.owned, true);
    let SecretSource::Existing { id } = &secret_ref.source else {
        return Err(cocoa::Error::new("expected an existing reference"));
    };
    // and the secret must be readable through the store
    let vault = Vault::new(cloud.clone());
    is!(vault.get(id).await.is_ok(), true);
    Ok(())
}

#[tokio::test]
async fn create_rejects_invalid_options() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let manager = manager(&cloud);
    // no family and no containers
    let opts = cocoa::models::PodDefinitionOpts::default();
    fail!(manager.create(opts).await, ErrorKind::InvalidInput);
    Ok(())
}

#[tokio::test]
async fn create_rejects_reserved_tag() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let cache = Arc::new(MemoryDefinitionCache::new());
    let manager = manager(&cloud)
        .with_cache(cache.clone())
        .cache_tag("cache-tag");
    let opts = generators::definition_opts().tag("cache-tag", "true");
    fail!(manager.create(opts).await, ErrorKind::InvalidInput);
    Ok(())
}

#[tokio::test]
async fn deregister_holds_when_repeated() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let cache = Arc::new(MemoryDefinitionCache::new());
    let manager = manager(&cloud).with_cache(cache.clone());
    let item = manager.create(generators::definition_opts()).await?;
    manager.deregister(&item.id).await?;
    is!(manager.describe(&item.id).await?.active, false);
    is!(cache.get(&item.id), None);
    // deregistering again and deregistering the unknown both hold
    manager.deregister(&item.id).await?;
    manager
        .deregister("arn:aws:ecs:task-definition/never-was:1")
        .await?;
    Ok(())
}

#[tokio::test]
async fn find_stranded_reports_unreconciled_definitions() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let cache = Arc::new(MemoryDefinitionCache::new());
    let manager = manager(&cloud)
        .with_cache(cache.clone())
        .with_tag_search(cloud.clone())
        .cache_tag("cache-tag");
    // strand one definition, reconcile another
    cache.fail_puts(true);
    let stranded = generators::definition_opts();
    let stranded_family = stranded.family_name.clone();
    fail!(manager.create(stranded).await, ErrorKind::Internal);
    cache.fail_puts(false);
    let healthy = manager.create(generators::definition_opts()).await?;
    let found = manager.find_stranded(None).await?;
    let stranded_arns = cloud.list_task_definitions(Some(&stranded_family)).await?;
    is_in!(found, stranded_arns[0]);
    is!(found.contains(&healthy.id), false);
    Ok(())
}
