//! The manager for immutable pod definitions
//!
//! Registration is coupled to an external definition cache with a
//! two-phase tag protocol: register tagged unreconciled, insert into the
//! cache, then flip the tag. Every id handed to a caller is therefore
//! cached and tagged `"true"`, and every stranded registration is tagged
//! `"false"` and discoverable through the tag client.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, instrument, Level};

use crate::client::{ContainerService, Error, PodDefinitionCache, TagSearch};
use crate::models::{
    ContainerResource, DescribedDefinition, EnvValue, NamedSecret, PodDefinitionItem,
    PodDefinitionOpts, RegisteredDefinition, RegistryAuth, RepoCredsSource, SecretRef,
    SecretResource, SecretSource,
};
use crate::vault::{Vault, DEFAULT_CACHE_TAG};

/// The resource type the tag service uses for task definitions
const DEFINITION_RESOURCE_TYPE: &str = "ecs:task-definition";

/// Create every secret the definition's containers still reference by value
///
/// New env-var secrets are created through the vault and their references
/// rewritten to the store-assigned ids; new repository credentials are
/// materialized as a json secret the same way. Created secrets come back
/// marked owned so a pod built from these options cleans them up.
///
/// # Arguments
///
/// * `vault` - The vault to create secrets through
/// * `opts` - The definition options to provision
pub(crate) async fn provision_secrets(
    vault: &Vault,
    mut opts: PodDefinitionOpts,
) -> Result<(PodDefinitionOpts, Vec<ContainerResource>), Error> {
    let mut containers = Vec::with_capacity(opts.container_opts.len());
    for container in &mut opts.container_opts {
        let mut secrets = Vec::new();
        for env in &mut container.env_vars {
            if let EnvValue::Secret(secret_ref) = &mut env.value {
                match &secret_ref.source {
                    SecretSource::Existing { id } => {
                        secrets.push(SecretResource {
                            id: id.clone(),
                            name: id.clone(),
                            value: None,
                            owned: secret_ref.owned,
                        });
                    }
                    SecretSource::New { name, value } => {
                        let id = vault
                            .create(&NamedSecret::new(name.clone(), value.clone()))
                            .await?;
                        secrets.push(SecretResource {
                            id: id.clone(),
                            name: name.clone(),
                            value: Some(value.clone()),
                            owned: true,
                        });
                        // the pod created this secret so the pod owns it
                        *secret_ref = SecretRef::existing(id).owned(true);
                    }
                }
            }
        }
        if let Some(creds) = &mut container.repo_creds {
            match &creds.source {
                RepoCredsSource::Existing { secret_id } => {
                    secrets.push(SecretResource {
                        id: secret_id.clone(),
                        name: secret_id.clone(),
                        value: None,
                        owned: creds.owned,
                    });
                }
                RepoCredsSource::New {
                    name,
                    username,
                    password,
                } => {
                    let blob = serde_json::to_string(&RegistryAuth {
                        username: username.clone(),
                        password: password.clone(),
                    })?;
                    let id = vault.create(&NamedSecret::new(name, blob.clone())).await?;
                    secrets.push(SecretResource {
                        id: id.clone(),
                        name: name.clone(),
                        value: Some(blob),
                        owned: true,
                    });
                    creds.source = RepoCredsSource::Existing { secret_id: id };
                    creds.owned = true;
                }
            }
        }
        containers.push(ContainerResource {
            container_id: None,
            name: container.name.clone(),
            secrets,
        });
    }
    Ok((opts, containers))
}

/// Builds immutable pod definitions and keeps a cache reconciled with them
#[derive(Clone)]
pub struct PodDefinitionManager {
    /// The container service to register definitions with
    service: Arc<dyn ContainerService>,
    /// The vault that provisions referenced secrets
    vault: Vault,
    /// The cache tracking registered definitions, if one is attached
    cache: Option<Arc<dyn PodDefinitionCache>>,
    /// The tag search used to find stranded definitions, if attached
    tag_search: Option<Arc<dyn TagSearch>>,
    /// The tag key reserved for cache reconciliation
    cache_tag: String,
}

impl PodDefinitionManager {
    /// Create a pod definition manager
    ///
    /// # Arguments
    ///
    /// * `service` - The container service to register definitions with
    /// * `vault` - The vault that provisions referenced secrets
    pub fn new(service: Arc<dyn ContainerService>, vault: Vault) -> Self {
        PodDefinitionManager {
            service,
            vault,
            cache: None,
            tag_search: None,
            cache_tag: DEFAULT_CACHE_TAG.to_owned(),
        }
    }

    /// Attach a definition cache, enabling the two-phase protocol
    ///
    /// # Arguments
    ///
    /// * `cache` - The cache tracking registered definitions
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn PodDefinitionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach a tag search client for finding stranded definitions
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

    /// Get the tag key this manager reserves for cache reconciliation
    pub fn cache_tag_key(&self) -> &str {
        &self.cache_tag
    }

    /// Validate, provision, and register a pod definition
    ///
    /// # Arguments
    ///
    /// * `opts` - The options to build the definition from
    #[instrument(name = "PodDefinitionManager::create", skip_all, fields(family = %opts.family_name), err(Debug))]
    pub async fn create(&self, opts: PodDefinitionOpts) -> Result<PodDefinitionItem, Error> {
        opts.validate(Some(&self.cache_tag))?;
        let (opts, _) = provision_secrets(&self.vault, opts).await?;
        let registered = self.register(&opts).await?;
        Ok(PodDefinitionItem {
            id: registered.id,
            opts,
        })
    }

    /// Register an already-provisioned definition, reconciling the cache
    ///
    /// # Arguments
    ///
    /// * `opts` - The provisioned options to register
    pub(crate) async fn register(
        &self,
        opts: &PodDefinitionOpts,
    ) -> Result<RegisteredDefinition, Error> {
        let Some(cache) = &self.cache else {
            return self.service.register_task_definition(opts).await;
        };
        // phase one: register marked unreconciled
        let mut tagged = opts.clone();
        tagged
            .tags
            .insert(self.cache_tag.clone(), "false".to_owned());
        let registered = self.service.register_task_definition(&tagged).await?;
        // phase two: cache it, then flip the tag; a failure here strands
        // the definition with the tag still "false"
        let item = PodDefinitionItem {
            id: registered.id.clone(),
            opts: opts.clone(),
        };
        cache.put(&item).await?;
        let reconciled = HashMap::from([(self.cache_tag.clone(), "true".to_owned())]);
        self.service.tag_resource(&registered.id, reconciled).await?;
        event!(Level::DEBUG, id = %registered.id, "registered and reconciled definition");
        Ok(registered)
    }

    /// Describe a registered definition, including its tags
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the definition to describe
    #[instrument(name = "PodDefinitionManager::describe", skip(self), err(Debug))]
    pub async fn describe(&self, id: &str) -> Result<DescribedDefinition, Error> {
        self.service.describe_task_definition(id).await
    }

    /// Deregister a definition, marking it inactive
    ///
    /// Idempotent: a missing definition is a success. The cache entry is
    /// removed only after the deregistration succeeds.
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the definition to deregister
    #[instrument(name = "PodDefinitionManager::deregister", skip(self), err(Debug))]
    pub async fn deregister(&self, id: &str) -> Result<(), Error> {
        match self.service.deregister_task_definition(id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        if let Some(cache) = &self.cache {
            cache.delete(id).await?;
        }
        Ok(())
    }

    /// Find definitions that were registered but never reconciled
    ///
    /// # Arguments
    ///
    /// * `family_prefix` - A family prefix to narrow the result, if any
    #[instrument(name = "PodDefinitionManager::find_stranded", skip(self), err(Debug))]
    pub async fn find_stranded(&self, family_prefix: Option<&str>) -> Result<Vec<String>, Error> {
        let Some(tag_search) = &self.tag_search else {
            return Err(Error::InvalidInput(
                "find_stranded: no tag search client is attached".to_owned(),
            ));
        };
        let types = vec![DEFINITION_RESOURCE_TYPE.to_owned()];
        let filters = vec![crate::models::TagFilter::new(&self.cache_tag, "false")];
        let resources = tag_search.get_resources(&types, &filters).await?;
        let stranded = resources
            .into_iter()
            .map(|resource| resource.id)
            .filter(|id| family_prefix.map_or(true, |prefix| id.contains(prefix)))
            .collect();
        Ok(stranded)
    }
}
