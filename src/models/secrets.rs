//! The secret shapes referenced by pod and container options

use std::collections::HashMap;

/// A secret to store by name
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NamedSecret {
    /// The path-like name to store this secret under
    pub name: String,
    /// The value of this secret
    pub value: String,
}

impl NamedSecret {
    /// Create a new named secret
    ///
    /// # Arguments
    ///
    /// * `name` - The name to store this secret under
    /// * `value` - The value of this secret
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        NamedSecret {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Where a secret reference points
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Reuse a secret that already exists in the store
    Existing {
        /// The store-assigned id or name of the secret
        id: String,
    },
    /// Create this secret when the pod or definition is created
    New {
        /// The name to store this secret under
        name: String,
        /// The value of this secret
        value: String,
    },
}

/// A reference to a secret from a container definition
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    /// Where this reference points
    pub source: SecretSource,
    /// Whether the pod that creates this secret deletes it on pod delete
    #[serde(default)]
    pub owned: bool,
}

impl SecretRef {
    /// Reference a secret that already exists in the store
    ///
    /// # Arguments
    ///
    /// * `id` - The store-assigned id or name of the secret
    pub fn existing<T: Into<String>>(id: T) -> Self {
        SecretRef {
            source: SecretSource::Existing { id: id.into() },
            owned: false,
        }
    }

    /// Reference a secret to create on pod or definition creation
    ///
    /// # Arguments
    ///
    /// * `name` - The name to store this secret under
    /// * `value` - The value of this secret
    ///
    /// # Examples
    ///
    /// ```
    /// use cocoa::models::{EnvVar, SecretRef};
    ///
    /// // created with the pod and deleted when the pod is deleted
    /// EnvVar::secret("TOKEN", SecretRef::create("workers/token", "s3cret").owned(true));
    /// ```
    pub fn create<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        SecretRef {
            source: SecretSource::New {
                name: name.into(),
                value: value.into(),
            },
            owned: false,
        }
    }

    /// Set whether the creating pod owns this secret
    ///
    /// # Arguments
    ///
    /// * `owned` - Whether the pod deletes this secret on pod delete
    #[must_use]
    pub fn owned(mut self, owned: bool) -> Self {
        self.owned = owned;
        self
    }

    /// Whether this reference still needs a secret created for it
    pub fn needs_creation(&self) -> bool {
        matches!(self.source, SecretSource::New { .. })
    }
}

/// Where repository credentials come from
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum RepoCredsSource {
    /// Reuse a credentials secret that already exists in the store
    Existing {
        /// The store-assigned id of the credentials secret
        secret_id: String,
    },
    /// Materialize these credentials as a secret on create
    New {
        /// The name to store the credentials secret under
        name: String,
        /// The registry username
        username: String,
        /// The registry password
        password: String,
    },
}

/// Credentials for pulling a container image from a private repository
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RepositoryCreds {
    /// Where these credentials come from
    pub source: RepoCredsSource,
    /// Whether the pod that creates the credentials secret owns it
    #[serde(default)]
    pub owned: bool,
}

impl RepositoryCreds {
    /// Reference a credentials secret that already exists
    ///
    /// # Arguments
    ///
    /// * `secret_id` - The store-assigned id of the credentials secret
    pub fn existing<T: Into<String>>(secret_id: T) -> Self {
        RepositoryCreds {
            source: RepoCredsSource::Existing {
                secret_id: secret_id.into(),
            },
            owned: false,
        }
    }

    /// Materialize new credentials as a secret on create
    ///
    /// # Arguments
    ///
    /// * `name` - The name to store the credentials secret under
    /// * `username` - The registry username
    /// * `password` - The registry password
    pub fn create<N, U, P>(name: N, username: U, password: P) -> Self
    where
        N: Into<String>,
        U: Into<String>,
        P: Into<String>,
    {
        RepositoryCreds {
            source: RepoCredsSource::New {
                name: name.into(),
                username: username.into(),
                password: password.into(),
            },
            owned: false,
        }
    }

    /// Set whether the creating pod owns the credentials secret
    ///
    /// # Arguments
    ///
    /// * `owned` - Whether the pod deletes this secret on pod delete
    #[must_use]
    pub fn owned(mut self, owned: bool) -> Self {
        self.owned = owned;
        self
    }
}

/// The json blob materialized for new repository credentials
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    /// The registry username
    pub username: String,
    /// The registry password
    pub password: String,
}

/// A secret as the store describes it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredSecret {
    /// The store-assigned id of this secret
    pub id: String,
    /// The name this secret is stored under
    pub name: String,
    /// The tags on this secret
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Whether this secret is scheduled for deletion
    #[serde(default)]
    pub is_deleted: bool,
}
