//! The options for a single container in a pod

use super::{RepositoryCreds, SecretRef};

/// The value of an environment variable
///
/// A variable carries either a literal value or a secret reference, never
/// both.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    /// A literal value passed through as is
    Literal(String),
    /// A value pulled from the secret store at container start
    Secret(SecretRef),
}

/// An environment variable for a container
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    /// The name of this variable
    pub name: String,
    /// The value of this variable
    pub value: EnvValue,
}

impl EnvVar {
    /// Create a literal environment variable
    ///
    /// # Arguments
    ///
    /// * `name` - The name of this variable
    /// * `value` - The literal value to set
    pub fn literal<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        EnvVar {
            name: name.into(),
            value: EnvValue::Literal(value.into()),
        }
    }

    /// Create an environment variable backed by a secret
    ///
    /// # Arguments
    ///
    /// * `name` - The name of this variable
    /// * `secret` - The secret reference to resolve at container start
    pub fn secret<N: Into<String>>(name: N, secret: SecretRef) -> Self {
        EnvVar {
            name: name.into(),
            value: EnvValue::Secret(secret),
        }
    }
}

/// A port exposed by a container
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    /// The port inside the container
    pub container_port: u16,
    /// The port on the host, if it should be fixed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
}

/// The options for a single container in a pod
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContainerOpts {
    /// The name of this container
    pub name: String,
    /// The image to run
    pub image: String,
    /// The command to run instead of the image's default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// The working directory to run the command in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// The memory to reserve for this container in MiB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,
    /// The cpu units to reserve for this container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    /// The ports this container exposes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_mappings: Vec<PortMapping>,
    /// The environment variables to set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_vars: Vec<EnvVar>,
    /// The credentials for pulling this container's image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_creds: Option<RepositoryCreds>,
}

impl ContainerOpts {
    /// Create options for a container
    ///
    /// # Arguments
    ///
    /// * `name` - The name of this container
    /// * `image` - The image to run
    pub fn new<N: Into<String>, I: Into<String>>(name: N, image: I) -> Self {
        ContainerOpts {
            name: name.into(),
            image: image.into(),
            command: None,
            working_dir: None,
            memory_mb: None,
            cpu: None,
            port_mappings: Vec::default(),
            env_vars: Vec::default(),
            repo_creds: None,
        }
    }

    /// Set the command to run
    ///
    /// # Arguments
    ///
    /// * `command` - The command and its arguments
    #[must_use]
    pub fn command<T: Into<String>, I: IntoIterator<Item = T>>(mut self, command: I) -> Self {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    /// Set the memory reservation in MiB
    ///
    /// # Arguments
    ///
    /// * `memory_mb` - The memory to reserve
    #[must_use]
    pub fn memory_mb(mut self, memory_mb: u32) -> Self {
        self.memory_mb = Some(memory_mb);
        self
    }

    /// Set the cpu reservation in cpu units
    ///
    /// # Arguments
    ///
    /// * `cpu` - The cpu units to reserve
    #[must_use]
    pub fn cpu(mut self, cpu: u32) -> Self {
        self.cpu = Some(cpu);
        self
    }

    /// Add an environment variable
    ///
    /// # Arguments
    ///
    /// * `env_var` - The variable to add
    #[must_use]
    pub fn env(mut self, env_var: EnvVar) -> Self {
        self.env_vars.push(env_var);
        self
    }

    /// Set the credentials for pulling this container's image
    ///
    /// # Arguments
    ///
    /// * `creds` - The credentials to pull with
    #[must_use]
    pub fn repo_creds(mut self, creds: RepositoryCreds) -> Self {
        self.repo_creds = Some(creds);
        self
    }

    /// Whether this container references any secret
    pub fn references_secrets(&self) -> bool {
        self.repo_creds.is_some()
            || self
                .env_vars
                .iter()
                .any(|env| matches!(env.value, EnvValue::Secret(_)))
    }

    /// Check this container's invariants, collecting any problems
    ///
    /// # Arguments
    ///
    /// * `problems` - The list to collect problems into
    pub(crate) fn check(&self, problems: &mut Vec<String>) {
        if self.name.is_empty() {
            problems.push("container name must be set".to_owned());
        }
        if self.image.is_empty() {
            problems.push(format!("container '{}' must set an image", self.name));
        }
        for env in &self.env_vars {
            if env.name.is_empty() {
                problems.push(format!(
                    "container '{}' has an environment variable with no name",
                    self.name
                ));
            }
        }
    }
}
