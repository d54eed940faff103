//! The data model for pods, containers, secrets, and tags

mod containers;
mod pods;
mod secrets;
mod status;
mod tags;
mod tasks;

pub use containers::{ContainerOpts, EnvValue, EnvVar, PortMapping};
pub use pods::{
    AwsVpcOpts, ContainerOverride, ContainerResource, OverrideOpts, PlacementOpts,
    PlacementStrategy, PodCreationOpts, PodDefinitionItem, PodDefinitionOpts, PodExecutionOpts,
    PodResources, SecretResource, TaskDefinitionHandle,
};
pub use secrets::{
    NamedSecret, RegistryAuth, RepoCredsSource, RepositoryCreds, SecretRef, SecretSource,
    StoredSecret,
};
pub use status::{ContainerStatusInfo, PodStatus, PodStatusInfo};
pub use tags::{TagFilter, TaggedResource};
pub use tasks::{
    ContainerSnapshot, DescribedDefinition, RegisteredDefinition, TaskFailure, TaskResults,
    TaskSnapshot,
};
