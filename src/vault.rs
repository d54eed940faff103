//! The policy layer over the secret store
//!
//! The vault adds idempotent deletes, upserts, and the two-phase tag
//! protocol that keeps an attached secret cache reconciled with the store.
//! A secret whose cache tag is still `"false"` was created but never
//! successfully reconciled, and a sweeper can find it through the tag
//! client.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, instrument, Level};

use crate::client::{Error, SecretCache, SecretStore, TagSearch};
use crate::models::{NamedSecret, StoredSecret};

/// The default tag key marking whether a secret has been reconciled
pub const DEFAULT_CACHE_TAG: &str = "cocoa-cached";

/// The resource type the tag service uses for secrets
const SECRET_RESOURCE_TYPE: &str = "secretsmanager:secret";

/// The policy layer over the secret store
#[derive(Clone)]
pub struct Vault {
    /// The secret store to call through to
    store: Arc<dyn SecretStore>,
    /// The cache tracking created secrets, if one is attached
    cache: Option<Arc<dyn SecretCache>>,
    /// The tag search used to find stranded secrets, if attached
    tag_search: Option<Arc<dyn TagSearch>>,
    /// The tag key reserved for cache reconciliation
    cache_tag: String,
}

impl Vault {
    /// Create a vault over a secret store
    ///
    /// # Arguments
    ///
    /// * `store` - The secret store to call through to
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Vault {
            store,
            cache: None,
            tag_search: None,
            cache_tag: DEFAULT_CACHE_TAG.to_owned(),
        }
    }

    /// Attach a secret cache, enabling the two-phase create protocol
    ///
    /// # Arguments
    ///
    /// * `cache` - The cache tracking created secrets
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn SecretCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach a tag search client for finding stranded secrets
    ///
    /// # Arguments
    ///
    /// * `tag_search` - The tag search client to attach
    #[must_use]
    pub fn with_tag_search(mut self, tag_search: Arc<dyn TagSearch>) -> Self {
        self.tag_search = Some(tag_search);
        self
    }

    /// Override the tag key reserved for cache reconciliation
    ///
    /// # Arguments
    ///
    /// * `cache_tag` - The tag key to reserve
    #[must_use]
    pub fn cache_tag<T: Into<String>>(mut self, cache_tag: T) -> Self {
        self.cache_tag = cache_tag.into();
        self
    }

    /// Get the tag key this vault reserves for cache reconciliation
    pub fn cache_tag_key(&self) -> &str {
        &self.cache_tag
    }

    /// Create a secret and return its store-assigned id
    ///
    /// # Arguments
    ///
    /// * `secret` - The secret to create
    #[instrument(name = "Vault::create", skip_all, fields(name = %secret.name), err(Debug))]
    pub async fn create(&self, secret: &NamedSecret) -> Result<String, Error> {
        self.create_with_tags(secret, HashMap::default()).await
    }

    /// Create a secret with user tags and return its store-assigned id
    ///
    /// With a cache attached the create runs the two-phase protocol: the
    /// secret is stored tagged unreconciled, inserted into the cache, and
    /// only then tagged reconciled. A crash between the phases leaves the
    /// tag `"false"` so the secret stays discoverable.
    ///
    /// # Arguments
    ///
    /// * `secret` - The secret to create
    /// * `tags` - The user tags to store alongside it
    #[instrument(name = "Vault::create_with_tags", skip_all, fields(name = %secret.name), err(Debug))]
    pub async fn create_with_tags(
        &self,
        secret: &NamedSecret,
        mut tags: HashMap<String, String>,
    ) -> Result<String, Error> {
        if secret.name.is_empty() || secret.value.is_empty() {
            return Err(Error::InvalidInput(
                "create: secret name and value must be set".to_owned(),
            ));
        }
        if tags.contains_key(&self.cache_tag) {
            return Err(Error::InvalidInput(format!(
                "create: the tag key '{}' is reserved",
                self.cache_tag
            )));
        }
        let Some(cache) = &self.cache else {
            // no cache attached, plain create
            return self
                .store
                .create_secret(&secret.name, &secret.value, tags)
                .await;
        };
        // phase one: store the secret marked unreconciled
        tags.insert(self.cache_tag.clone(), "false".to_owned());
        let id = self
            .store
            .create_secret(&secret.name, &secret.value, tags)
            .await?;
        // phase two: cache it, then flip the tag
        cache.put(&id, &secret.name).await?;
        let reconciled = HashMap::from([(self.cache_tag.clone(), "true".to_owned())]);
        self.store.tag_resource(&id, reconciled).await?;
        event!(Level::DEBUG, id = %id, "created and reconciled secret");
        Ok(id)
    }

    /// Get a secret's value
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the secret to read
    #[instrument(name = "Vault::get", skip(self), err(Debug))]
    pub async fn get(&self, id: &str) -> Result<String, Error> {
        self.store.get_secret_value(id).await
    }

    /// Replace a secret's value
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the secret to update
    /// * `value` - The value to replace it with
    #[instrument(name = "Vault::update", skip(self, value), err(Debug))]
    pub async fn update(&self, id: &str, value: &str) -> Result<(), Error> {
        self.store.update_secret(id, value).await
    }

    /// Create a secret, or update it if its name already exists
    ///
    /// # Arguments
    ///
    /// * `secret` - The secret to create or update
    #[instrument(name = "Vault::upsert", skip_all, fields(name = %secret.name), err(Debug))]
    pub async fn upsert(&self, secret: &NamedSecret) -> Result<String, Error> {
        match self.create(secret).await {
            Ok(id) => Ok(id),
            Err(err) if err.kind() == crate::client::ErrorKind::AlreadyExists => {
                // resolve the existing id by name and update in place
                let existing = self.store.describe_secret(&secret.name).await?;
                self.store.update_secret(&existing.id, &secret.value).await?;
                Ok(existing.id)
            }
            Err(err) => Err(err),
        }
    }

    /// Describe a secret without reading its value
    ///
    /// # Arguments
    ///
    /// * `id` - The id or name of the secret to describe
    #[instrument(name = "Vault::describe", skip(self), err(Debug))]
    pub async fn describe(&self, id: &str) -> Result<StoredSecret, Error> {
        self.store.describe_secret(id).await
    }

    /// Delete a secret
    ///
    /// The delete is forced (no recovery window) and idempotent: a missing
    /// secret is a success. The cache entry is removed only after the
    /// store delete succeeds.
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the secret to delete
    #[instrument(name = "Vault::delete", skip(self), err(Debug))]
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        match self.store.delete_secret(id, true).await {
            Ok(()) => {}
            // deleting a missing secret already holds
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        if let Some(cache) = &self.cache {
            cache.delete(id).await?;
        }
        Ok(())
    }

    /// Find secrets that were created but never reconciled
    ///
    /// These carry the cache tag `"false"`: phase one ran but phase two
    /// never completed. A sweeper outside this crate decides whether to
    /// re-reconcile or delete them.
    ///
    /// # Arguments
    ///
    /// * `prefix` - An id prefix to narrow the result, if any
    #[instrument(name = "Vault::list_stranded", skip(self), err(Debug))]
    pub async fn list_stranded(&self, prefix: Option<&str>) -> Result<Vec<String>, Error> {
        let Some(tag_search) = &self.tag_search else {
            return Err(Error::InvalidInput(
                "list_stranded: no tag search client is attached".to_owned(),
            ));
        };
        let types = vec![SECRET_RESOURCE_TYPE.to_owned()];
        let filters = vec![crate::models::TagFilter::new(&self.cache_tag, "false")];
        let resources = tag_search.get_resources(&types, &filters).await?;
        let stranded = resources
            .into_iter()
            .map(|resource| resource.id)
            .filter(|id| prefix.map_or(true, |prefix| id.contains(prefix)))
            .collect();
        Ok(stranded)
    }
}
