//! The options and resource records for pods

use std::collections::HashMap;

use super::ContainerOpts;
use crate::client::Error;

/// The closed set of task placement strategies
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStrategy {
    /// Pack tasks onto the fewest instances
    Binpack,
    /// Place tasks at random
    Random,
    /// Spread tasks across a placement field
    Spread,
}

impl PlacementStrategy {
    /// Get the provider's name for this strategy
    pub fn as_str(self) -> &'static str {
        match self {
            PlacementStrategy::Binpack => "binpack",
            PlacementStrategy::Random => "random",
            PlacementStrategy::Spread => "spread",
        }
    }
}

/// Where and how the provider should place a pod's task
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementOpts {
    /// The placement strategy to use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<PlacementStrategy>,
    /// The field the strategy operates on (e.g. memory or an attribute)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_parameter: Option<String>,
    /// Cluster query expressions instances must match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instance_filters: Vec<String>,
}

/// The network settings for a pod using provider-managed networking
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsVpcOpts {
    /// The subnets the task may be placed in
    pub subnets: Vec<String>,
    /// The security groups to attach
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,
}

/// An override applied to one container at run time
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerOverride {
    /// The name of the container to override
    pub name: String,
    /// The command to run instead of the definition's command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Environment variables to add or replace
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

/// Overrides applied to a pod's containers at run time
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideOpts {
    /// The per-container overrides
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerOverride>,
}

/// The options for an immutable pod definition
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PodDefinitionOpts {
    /// The family to register this definition under
    pub family_name: String,
    /// The memory limit for the pod as a whole in MiB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,
    /// The cpu units for the pod as a whole
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    /// The role the pod's containers assume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_role: Option<String>,
    /// The role the provider assumes to pull images and read secrets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_role: Option<String>,
    /// The network mode to run the pod's containers in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    /// The tags to register the definition with
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    /// The containers in this pod
    #[serde(default)]
    pub container_opts: Vec<ContainerOpts>,
}

impl PodDefinitionOpts {
    /// Create options for a pod definition
    ///
    /// # Arguments
    ///
    /// * `family_name` - The family to register this definition under
    ///
    /// # Examples
    ///
    /// ```
    /// use cocoa::models::{ContainerOpts, PodDefinitionOpts};
    ///
    /// let opts = PodDefinitionOpts::new("workers")
    ///     .container(ContainerOpts::new("worker", "busybox").memory_mb(128))
    ///     .tag("team", "infra");
    /// assert!(opts.validate(None).is_ok());
    /// ```
    pub fn new<T: Into<String>>(family_name: T) -> Self {
        PodDefinitionOpts {
            family_name: family_name.into(),
            ..Self::default()
        }
    }

    /// Add a container to this definition
    ///
    /// # Arguments
    ///
    /// * `container` - The container to add
    #[must_use]
    pub fn container(mut self, container: ContainerOpts) -> Self {
        self.container_opts.push(container);
        self
    }

    /// Add a tag to register the definition with
    ///
    /// # Arguments
    ///
    /// * `key` - The tag key to add
    /// * `value` - The tag value to add
    #[must_use]
    pub fn tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Whether any container in this definition references a secret
    pub fn references_secrets(&self) -> bool {
        self.container_opts
            .iter()
            .any(ContainerOpts::references_secrets)
    }

    /// Fold a list of option records into one
    ///
    /// Later records win per field when they set one; tags union and
    /// containers concatenate.
    ///
    /// # Arguments
    ///
    /// * `records` - The option records to fold, earliest first
    pub fn merge<I: IntoIterator<Item = Self>>(records: I) -> Self {
        let mut merged = Self::default();
        for next in records {
            if !next.family_name.is_empty() {
                merged.family_name = next.family_name;
            }
            if next.memory_mb.is_some() {
                merged.memory_mb = next.memory_mb;
            }
            if next.cpu.is_some() {
                merged.cpu = next.cpu;
            }
            if next.task_role.is_some() {
                merged.task_role = next.task_role;
            }
            if next.execution_role.is_some() {
                merged.execution_role = next.execution_role;
            }
            if next.network_mode.is_some() {
                merged.network_mode = next.network_mode;
            }
            merged.tags.extend(next.tags);
            merged.container_opts.extend(next.container_opts);
        }
        merged
    }

    /// Check this definition's invariants, collecting any problems
    ///
    /// # Arguments
    ///
    /// * `reserved_tag` - The tag key reserved for cache reconciliation
    /// * `problems` - The list to collect problems into
    pub(crate) fn check(&self, reserved_tag: Option<&str>, problems: &mut Vec<String>) {
        if self.family_name.is_empty() {
            problems.push("family_name must be set".to_owned());
        }
        if self.container_opts.is_empty() {
            problems.push("at least one container must be given".to_owned());
        }
        for container in &self.container_opts {
            container.check(problems);
        }
        if self.references_secrets() && self.execution_role.is_none() {
            problems.push(
                "an execution_role must be set when containers reference secrets".to_owned(),
            );
        }
        // pod-level limits must cover the container-level sums when both sides are set
        if let Some(memory) = self.memory_mb {
            let sum: u32 = self
                .container_opts
                .iter()
                .filter_map(|container| container.memory_mb)
                .sum();
            if sum > 0 && memory < sum {
                problems.push(format!(
                    "pod memory {memory}MiB is below the container total of {sum}MiB"
                ));
            }
        }
        if let Some(cpu) = self.cpu {
            let sum: u32 = self
                .container_opts
                .iter()
                .filter_map(|container| container.cpu)
                .sum();
            if sum > 0 && cpu < sum {
                problems.push(format!(
                    "pod cpu {cpu} is below the container total of {sum}"
                ));
            }
        }
        if let Some(reserved) = reserved_tag {
            if self.tags.contains_key(reserved) {
                problems.push(format!("the tag key '{reserved}' is reserved"));
            }
        }
    }

    /// Validate this definition's invariants
    ///
    /// # Arguments
    ///
    /// * `reserved_tag` - The tag key reserved for cache reconciliation
    pub fn validate(&self, reserved_tag: Option<&str>) -> Result<(), Error> {
        let mut problems = Vec::new();
        self.check(reserved_tag, &mut problems);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidInput(problems.join("; ")))
        }
    }
}

/// The options for executing a pod on a cluster
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PodExecutionOpts {
    /// The cluster to place the pod's task on
    pub cluster: String,
    /// The capacity provider to draw instances from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_provider: Option<String>,
    /// Where and how to place the task
    #[serde(default)]
    pub placement: PlacementOpts,
    /// The network settings for provider-managed networking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awsvpc: Option<AwsVpcOpts>,
    /// The tags to run the task with
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    /// Whether to enable interactive debugging on the task
    #[serde(default)]
    pub supports_debug: bool,
    /// Overrides applied to the definition at run time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<OverrideOpts>,
}

impl PodExecutionOpts {
    /// Create options for executing a pod
    ///
    /// # Arguments
    ///
    /// * `cluster` - The cluster to place the pod's task on
    pub fn new<T: Into<String>>(cluster: T) -> Self {
        PodExecutionOpts {
            cluster: cluster.into(),
            ..Self::default()
        }
    }

    /// Fold a list of option records into one
    ///
    /// # Arguments
    ///
    /// * `records` - The option records to fold, earliest first
    pub fn merge<I: IntoIterator<Item = Self>>(records: I) -> Self {
        let mut merged = Self::default();
        for next in records {
            if !next.cluster.is_empty() {
                merged.cluster = next.cluster;
            }
            if next.capacity_provider.is_some() {
                merged.capacity_provider = next.capacity_provider;
            }
            if next.placement.strategy.is_some() {
                merged.placement.strategy = next.placement.strategy;
            }
            if next.placement.strategy_parameter.is_some() {
                merged.placement.strategy_parameter = next.placement.strategy_parameter;
            }
            merged
                .placement
                .instance_filters
                .extend(next.placement.instance_filters);
            if next.awsvpc.is_some() {
                merged.awsvpc = next.awsvpc;
            }
            merged.tags.extend(next.tags);
            merged.supports_debug |= next.supports_debug;
            if next.overrides.is_some() {
                merged.overrides = next.overrides;
            }
        }
        merged
    }

    /// Check this record's invariants, collecting any problems
    ///
    /// # Arguments
    ///
    /// * `network_mode` - The definition's network mode, if any
    /// * `reserved_tag` - The tag key reserved for cache reconciliation
    /// * `problems` - The list to collect problems into
    pub(crate) fn check(
        &self,
        network_mode: Option<&str>,
        reserved_tag: Option<&str>,
        problems: &mut Vec<String>,
    ) {
        if self.cluster.is_empty() {
            problems.push("cluster must be set".to_owned());
        }
        if self.placement.strategy.is_none() && self.placement.strategy_parameter.is_some() {
            problems.push("a strategy_parameter requires a placement strategy".to_owned());
        }
        if network_mode == Some("awsvpc") {
            match &self.awsvpc {
                Some(awsvpc) if awsvpc.subnets.is_empty() => {
                    problems.push("awsvpc network mode requires at least one subnet".to_owned());
                }
                Some(_) => {}
                None => {
                    problems.push("awsvpc network mode requires awsvpc options".to_owned());
                }
            }
        }
        if let Some(reserved) = reserved_tag {
            if self.tags.contains_key(reserved) {
                problems.push(format!("the tag key '{reserved}' is reserved"));
            }
        }
    }

    /// Validate this record's invariants
    ///
    /// # Arguments
    ///
    /// * `network_mode` - The definition's network mode, if any
    /// * `reserved_tag` - The tag key reserved for cache reconciliation
    pub fn validate(
        &self,
        network_mode: Option<&str>,
        reserved_tag: Option<&str>,
    ) -> Result<(), Error> {
        let mut problems = Vec::new();
        self.check(network_mode, reserved_tag, &mut problems);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidInput(problems.join("; ")))
        }
    }
}

/// The full options for creating a pod
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PodCreationOpts {
    /// The options for the pod's definition
    pub definition: PodDefinitionOpts,
    /// The options for executing the pod
    pub execution: PodExecutionOpts,
}

impl PodCreationOpts {
    /// Create pod creation options
    ///
    /// # Arguments
    ///
    /// * `definition` - The options for the pod's definition
    /// * `execution` - The options for executing the pod
    pub fn new(definition: PodDefinitionOpts, execution: PodExecutionOpts) -> Self {
        PodCreationOpts {
            definition,
            execution,
        }
    }

    /// Validate both halves of these options together
    ///
    /// # Arguments
    ///
    /// * `reserved_tag` - The tag key reserved for cache reconciliation
    pub fn validate(&self, reserved_tag: Option<&str>) -> Result<(), Error> {
        let mut problems = Vec::new();
        self.definition.check(reserved_tag, &mut problems);
        self.execution.check(
            self.definition.network_mode.as_deref(),
            reserved_tag,
            &mut problems,
        );
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidInput(problems.join("; ")))
        }
    }
}

/// A handle to a registered task definition
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDefinitionHandle {
    /// The provider-assigned id of the definition
    pub id: String,
    /// Whether the pod registered this definition and deregisters it on delete
    pub owned: bool,
    /// The family the definition belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    /// The revision of the definition within its family
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<i32>,
}

/// A secret a pod's container references
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SecretResource {
    /// The store-assigned id of this secret
    pub id: String,
    /// The name this secret is known by
    pub name: String,
    /// The value of this secret, when the pod created it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Whether the pod created this secret and deletes it on pod delete
    pub owned: bool,
}

/// A container in a pod and the secrets it references
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContainerResource {
    /// The provider-assigned id of this container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// The name of this container
    pub name: String,
    /// The secrets this container references
    #[serde(default)]
    pub secrets: Vec<SecretResource>,
}

/// The resources a pod tracks for status and cleanup
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PodResources {
    /// The cluster the pod's task runs on
    pub cluster: String,
    /// The provider-assigned id of the pod's task
    pub task_id: String,
    /// The definition the pod's task was started from
    pub task_definition: TaskDefinitionHandle,
    /// The pod's containers and their secrets
    #[serde(default)]
    pub containers: Vec<ContainerResource>,
}

/// A pod definition and its id, as stored in the definition cache
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PodDefinitionItem {
    /// The provider-assigned id of the definition
    pub id: String,
    /// The options the definition was registered from
    pub opts: PodDefinitionOpts,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnvVar, SecretRef};

    #[test]
    fn validate_rejects_all_problems_at_once() {
        // no family, no containers
        let opts = PodDefinitionOpts::default();
        let err = opts.validate(None).unwrap_err();
        let msg = err.msg().unwrap();
        assert!(msg.contains("family_name"));
        assert!(msg.contains("at least one container"));
    }

    #[test]
    fn validate_requires_execution_role_for_secrets() {
        let opts = PodDefinitionOpts::new("fam").container(
            ContainerOpts::new("c", "busybox")
                .env(EnvVar::secret("TOKEN", SecretRef::create("pfx/tok", "v"))),
        );
        let err = opts.validate(None).unwrap_err();
        assert!(err.msg().unwrap().contains("execution_role"));
    }

    #[test]
    fn validate_checks_memory_and_cpu_sums() {
        let opts = PodDefinitionOpts::new("fam")
            .container(ContainerOpts::new("a", "img").memory_mb(256).cpu(256))
            .container(ContainerOpts::new("b", "img").memory_mb(256).cpu(256));
        let mut opts = opts;
        opts.memory_mb = Some(128);
        opts.cpu = Some(1024);
        let err = opts.validate(None).unwrap_err();
        let msg = err.msg().unwrap();
        assert!(msg.contains("memory"));
        assert!(!msg.contains("pod cpu"));
    }

    #[test]
    fn validate_rejects_reserved_tag() {
        let opts = PodDefinitionOpts::new("fam")
            .container(ContainerOpts::new("c", "img"))
            .tag("cache-tag", "true");
        assert!(opts.validate(Some("cache-tag")).is_err());
        assert!(opts.validate(Some("other-key")).is_ok());
    }

    #[test]
    fn awsvpc_requires_subnets() {
        let mut definition = PodDefinitionOpts::new("fam").container(ContainerOpts::new("c", "img"));
        definition.network_mode = Some("awsvpc".to_owned());
        let execution = PodExecutionOpts::new("cluster");
        let opts = PodCreationOpts::new(definition, execution);
        let err = opts.validate(None).unwrap_err();
        assert!(err.msg().unwrap().contains("awsvpc"));
    }

    #[test]
    fn execution_merge_is_last_non_empty_wins() {
        let base = PodExecutionOpts::new("base-cluster");
        let mut layer = PodExecutionOpts::default();
        layer.capacity_provider = Some("spot".to_owned());
        layer.placement.strategy = Some(PlacementStrategy::Spread);
        let merged = PodExecutionOpts::merge([base, layer]);
        assert_eq!(merged.cluster, "base-cluster");
        assert_eq!(merged.capacity_provider.as_deref(), Some("spot"));
        assert_eq!(merged.placement.strategy, Some(PlacementStrategy::Spread));
    }

    #[test]
    fn merge_is_last_non_empty_wins() {
        let base = PodDefinitionOpts::new("base")
            .container(ContainerOpts::new("a", "img"))
            .tag("team", "infra");
        let mut layer = PodDefinitionOpts::default();
        layer.memory_mb = Some(512);
        layer.tags.insert("env".to_owned(), "prod".to_owned());
        let merged = PodDefinitionOpts::merge([base, layer]);
        assert_eq!(merged.family_name, "base");
        assert_eq!(merged.memory_mb, Some(512));
        assert_eq!(merged.container_opts.len(), 1);
        assert_eq!(merged.tags.get("team").map(String::as_str), Some("infra"));
        assert_eq!(merged.tags.get("env").map(String::as_str), Some("prod"));
    }
}
