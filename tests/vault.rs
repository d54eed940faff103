//! Tests the vault against the in-memory secret store

use std::sync::Arc;

use cocoa::models::NamedSecret;
use cocoa::test_utilities::{generators, FakeCloud, MemorySecretCache};
use cocoa::{fail, is, is_in, is_not};
use cocoa::{ErrorKind, Vault};

#[tokio::test]
async fn round_trip() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let vault = Vault::new(cloud.clone());
    // create a secret and read it back
    let secret = NamedSecret::new(generators::secret_name("pfx/n1"), "v1");
    let id = vault.create(&secret).await?;
    is_not!(id, String::new());
    is!(vault.get(&id).await?, "v1");
    // update it and read the new value back
    vault.update(&id, "v2").await?;
    is!(vault.get(&id).await?, "v2");
    // delete twice, the second must also succeed
    vault.delete(&id).await?;
    vault.delete(&id).await?;
    fail!(vault.get(&id).await, ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn create_requires_name_and_value() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let vault = Vault::new(cloud.clone());
    fail!(
        vault.create(&NamedSecret::new("", "value")).await,
        ErrorKind::InvalidInput
    );
    fail!(
        vault.create(&NamedSecret::new("pfx/name", "")).await,
        ErrorKind::InvalidInput
    );
    Ok(())
}

#[tokio::test]
async fn create_surfaces_conflicts() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let vault = Vault::new(cloud.clone());
    let secret = NamedSecret::new(generators::secret_name("pfx/conflict"), "v1");
    vault.create(&secret).await?;
    // a second create against the same name must conflict
    fail!(vault.create(&secret).await, ErrorKind::AlreadyExists);
    Ok(())
}

#[tokio::test]
async fn upsert_creates_then_updates() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let vault = Vault::new(cloud.clone());
    let name = generators::secret_name("pfx/upsert");
    // the first upsert creates
    let id = vault.upsert(&NamedSecret::new(name.clone(), "v1")).await?;
    is!(vault.get(&id).await?, "v1");
    // the second resolves the existing secret and updates it in place
    let second = vault.upsert(&NamedSecret::new(name, "v2")).await?;
    is!(second, id);
    is!(vault.get(&id).await?, "v2");
    Ok(())
}

#[tokio::test]
async fn cached_create_reconciles() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let cache = Arc::new(MemorySecretCache::new());
    let vault = Vault::new(cloud.clone())
        .with_cache(cache.clone())
        .cache_tag("cache-tag");
    let secret = NamedSecret::new(generators::secret_name("pfx/cached"), "v1");
    let id = vault.create(&secret).await?;
    // the cloud tag must have been flipped to true and the cache filled
    let stored = vault.describe(&id).await?;
    is!(stored.tags.get("cache-tag").map(String::as_str), Some("true"));
    is!(cache.get(&id), Some(secret.name.clone()));
    Ok(())
}

#[tokio::test]
async fn cached_create_strands_on_cache_failure() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let cache = Arc::new(MemorySecretCache::new());
    let vault = Vault::new(cloud.clone())
        .with_cache(cache.clone())
        .cache_tag("cache-tag");
    cache.fail_puts(true);
    let secret = NamedSecret::new(generators::secret_name("pfx/stranded"), "v1");
    fail!(vault.create(&secret).await, ErrorKind::Internal);
    // the secret exists but its tag was never flipped
    let stored = vault.describe(&secret.name).await?;
    is!(
        stored.tags.get("cache-tag").map(String::as_str),
        Some("false")
    );
    is!(cache.is_empty(), true);
    Ok(())
}

#[tokio::test]
async fn create_rejects_reserved_tag() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let cache = Arc::new(MemorySecretCache::new());
    let vault = Vault::new(cloud.clone())
        .with_cache(cache.clone())
        .cache_tag("cache-tag");
    let secret = NamedSecret::new(generators::secret_name("pfx/reserved"), "v1");
    let tags = std::collections::HashMap::from([("cache-tag".to_owned(), "true".to_owned())]);
    fail!(
        vault.create_with_tags(&secret, tags).await,
        ErrorKind::InvalidInput
    );
    Ok(())
}

#[tokio::test]
async fn delete_removes_from_cache() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let cache = Arc::new(MemorySecretCache::new());
    let vault = Vault::new(cloud.clone()).with_cache(cache.clone());
    let secret = NamedSecret::new(generators::secret_name("pfx/gone"), "v1");
    let id = vault.create(&secret).await?;
    is!(cache.get(&id).is_some(), true);
    vault.delete(&id).await?;
    is!(cache.get(&id), None);
    fail!(vault.get(&id).await, ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn list_stranded_finds_unreconciled_secrets() -> Result<(), cocoa::Error> {
    let cloud = Arc::new(FakeCloud::new());
    let cache = Arc::new(MemorySecretCache::new());
    let vault = Vault::new(cloud.clone())
        .with_cache(cache.clone())
        .with_tag_search(cloud.clone())
        .cache_tag("cache-tag");
    // strand one secret, reconcile another
    cache.fail_puts(true);
    let stranded = NamedSecret::new(generators::secret_name("pfx/stranded"), "v1");
    fail!(vault.create(&stranded).await, ErrorKind::Internal);
    cache.fail_puts(false);
    let healthy = NamedSecret::new(generators::secret_name("pfx/healthy"), "v1");
    let healthy_id = vault.create(&healthy).await?;
    let found = vault.list_stranded(None).await?;
    let stranded_id = vault.describe(&stranded.name).await?.id;
    is_in!(found, stranded_id);
    is!(found.contains(&healthy_id), false);
    Ok(())
}
