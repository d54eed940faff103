//! Generators for random names and options in tests

use rand::Rng;

use crate::models::{
    ContainerOpts, EnvVar, PodCreationOpts, PodDefinitionOpts, PodExecutionOpts, SecretRef,
};

/// generate a random string
fn gen_string(len: usize) -> String {
    // build the possible values we can generate
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Generate a random task definition family name
pub fn family() -> String {
    format!("cocoa-fam-{}", gen_string(12))
}

/// Generate a random secret name under a prefix
///
/// # Arguments
///
/// * `prefix` - The prefix to place the name under
pub fn secret_name(prefix: &str) -> String {
    format!("{prefix}/{}", gen_string(12))
}

/// Generate a random cluster name
pub fn cluster() -> String {
    format!("cocoa-cluster-{}", gen_string(8))
}

/// Generate a small runnable container
pub fn container() -> ContainerOpts {
    ContainerOpts::new(gen_string(8), "busybox")
        .command(["echo", "hi"])
        .memory_mb(128)
        .cpu(128)
}

/// Generate definition options with one container
pub fn definition_opts() -> PodDefinitionOpts {
    PodDefinitionOpts::new(family()).container(container())
}

/// Generate definition options whose container reads a new owned secret
///
/// # Arguments
///
/// * `secret_prefix` - The prefix to place the secret's name under
pub fn definition_opts_with_secret(secret_prefix: &str) -> PodDefinitionOpts {
    let secret = SecretRef::create(secret_name(secret_prefix), gen_string(16)).owned(true);
    let mut opts = PodDefinitionOpts::new(family())
        .container(container().env(EnvVar::secret("SECRET", secret)));
    opts.task_role = Some("cocoa-task-role".to_owned());
    opts.execution_role = Some("cocoa-execution-role".to_owned());
    opts
}

/// Generate execution options for a cluster
///
/// # Arguments
///
/// * `cluster` - The cluster to execute on
pub fn execution_opts(cluster: &str) -> PodExecutionOpts {
    PodExecutionOpts::new(cluster)
}

/// Generate full pod creation options
///
/// # Arguments
///
/// * `cluster` - The cluster to execute on
pub fn creation_opts(cluster: &str) -> PodCreationOpts {
    PodCreationOpts::new(definition_opts(), execution_opts(cluster))
}
