//! Cocoa runs and manages groups of cloud-hosted containers (pods) on a
//! managed container service, with container configuration allowed to
//! reference secrets held in an external secret store.
//!
//! The interesting machinery sits above the raw service clients: the pod
//! lifecycle coordinator, the definition manager and vault with their
//! two-phase tag-based cache reconciliation, the ownership model that lets
//! a pod reclaim everything it created, and the retry engine layered over
//! every provider call.

#[macro_use]
extern crate serde_derive;

pub mod client;
pub mod conf;
pub mod definitions;
pub mod models;
pub mod pods;
pub mod vault;

// expose test utilities if that feature is enabled
#[cfg(feature = "test-utilities")]
pub mod test_utilities;

pub use client::{
    ContainerService, EcsClient, Error, ErrorKind, PodDefinitionCache, RetryConf, SecretCache,
    SecretStore, SecretsClient, TagSearch, TaggingClient,
};
pub use conf::CloudConf;
pub use definitions::PodDefinitionManager;
pub use pods::{Pod, PodCreator};
pub use vault::Vault;
