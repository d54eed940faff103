//! The shared config for Cocoa's cloud clients

use std::path::Path;

use crate::client::{Error, RetryConf};

/// Helps serde default the region
fn default_region() -> String {
    "us-east-1".to_owned()
}

/// Helps serde default the per-call timeout to 30 seconds
fn default_timeout() -> u64 {
    30
}

/// Static credentials for the cloud provider
///
/// When these are not set the provider's default credential chain is used
/// instead.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    /// The access key to authenticate with
    pub access_key: String,
    /// The secret key to authenticate with
    pub secret_key: String,
}

/// The settings shared by all of Cocoa's cloud clients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CloudConf {
    /// The region to talk to
    #[serde(default = "default_region")]
    pub region: String,
    /// An endpoint override, mostly for local stacks in tests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Static credentials to use instead of the default chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<StaticCredentials>,
    /// A role to assume before calling the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    /// The settings for retrying provider calls
    #[serde(default)]
    pub retry: RetryConf,
    /// The per-call timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for CloudConf {
    /// Default the cloud settings to sane values
    fn default() -> Self {
        CloudConf {
            region: default_region(),
            endpoint: None,
            credentials: None,
            role_arn: None,
            retry: RetryConf::default(),
            timeout: default_timeout(),
        }
    }
}

impl CloudConf {
    /// Create a config for a region with everything else defaulted
    ///
    /// # Arguments
    ///
    /// * `region` - The region to talk to
    pub fn new<T: Into<String>>(region: T) -> Self {
        CloudConf {
            region: region.into(),
            ..Self::default()
        }
    }

    /// Load a [`CloudConf`] from a file with an environment overlay
    ///
    /// Environment variables prefixed with `COCOA` override file values
    /// (e.g. `COCOA__REGION`).
    ///
    /// # Arguments
    ///
    /// * `path` - The path to load this config from
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conf = config::Config::builder()
            // load from a file first
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Yaml))
            // then overlay any environment args on top
            .add_source(config::Environment::with_prefix("COCOA").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(conf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let conf: CloudConf = serde_json::from_str("{}").unwrap();
        assert_eq!(conf.region, "us-east-1");
        assert_eq!(conf.timeout, 30);
        assert_eq!(conf.retry, RetryConf::default());
        assert!(conf.endpoint.is_none());
        assert!(conf.credentials.is_none());
    }

    #[test]
    fn loads_from_a_yaml_file() {
        let yaml = "region: eu-west-1\nendpoint: http://localhost:4566\nretry:\n  max_attempts: 2\n";
        let path = std::env::temp_dir().join(format!("cocoa-conf-{}.yml", std::process::id()));
        std::fs::write(&path, yaml).unwrap();
        let conf = CloudConf::from_path(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(conf.region, "eu-west-1");
        assert_eq!(conf.endpoint.as_deref(), Some("http://localhost:4566"));
        assert_eq!(conf.retry.max_attempts, 2);
        // unset retry fields still default
        assert_eq!(conf.retry.max_delay_ms, RetryConf::default().max_delay_ms);
    }
}
