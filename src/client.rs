//! The typed cloud clients, error taxonomy, and retry engine

mod base;
mod ecs;
mod error;
mod retry;
mod secrets;
mod tags;
mod traits;

pub use ecs::EcsClient;
pub use error::{Error, ErrorKind};
pub use retry::{retry, RetryConf};
pub use secrets::SecretsClient;
pub use tags::TaggingClient;
pub use traits::{ContainerService, PodDefinitionCache, SecretCache, SecretStore, TagSearch};
