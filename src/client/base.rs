//! The shared session pieces every cloud client is built from

use aws_config::BehaviorVersion;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use aws_smithy_types::timeout::TimeoutConfig;
use aws_types::region::Region;
use std::time::Duration;

use crate::conf::CloudConf;
use crate::Error;

/// The resolved session settings shared by all of Cocoa's clients
///
/// Each concrete client turns this into its own sdk config. Sdk-level
/// retries are disabled everywhere since the retry engine is the single
/// retry authority.
#[derive(Debug, Clone)]
pub(crate) struct BaseSession {
    /// The region to talk to
    pub region: Region,
    /// An endpoint override, if any
    pub endpoint: Option<String>,
    /// The resolved credentials provider
    pub credentials: SharedCredentialsProvider,
    /// The per-call timeouts to apply
    pub timeout: TimeoutConfig,
}

impl BaseSession {
    /// Resolve a session from the shared config
    ///
    /// Static credentials win when set; otherwise the provider's default
    /// chain resolves them. A configured role is assumed on top of either.
    ///
    /// # Arguments
    ///
    /// * `conf` - The shared cloud config to resolve
    pub async fn new(conf: &CloudConf) -> Result<Self, Error> {
        let region = Region::new(conf.region.clone());
        // resolve base credentials from statics or the default chain
        let credentials = match &conf.credentials {
            Some(statics) => SharedCredentialsProvider::new(Credentials::new(
                statics.access_key.clone(),
                statics.secret_key.clone(),
                None,
                None,
                "Cocoa",
            )),
            None => {
                let loaded = aws_config::defaults(BehaviorVersion::latest())
                    .region(region.clone())
                    .load()
                    .await;
                match loaded.credentials_provider() {
                    Some(provider) => provider,
                    None => {
                        return Err(Error::new(
                            "no credentials provider resolved from the default chain",
                        ))
                    }
                }
            }
        };
        // layer an assumed role on top when one is configured
        let credentials = match &conf.role_arn {
            Some(role_arn) => {
                let assumed = aws_config::sts::AssumeRoleProvider::builder(role_arn.clone())
                    .region(region.clone())
                    .session_name("cocoa")
                    .build()
                    .await;
                SharedCredentialsProvider::new(assumed)
            }
            None => credentials,
        };
        let timeout = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(conf.timeout))
            .build();
        Ok(BaseSession {
            region,
            endpoint: conf.endpoint.clone(),
            credentials,
            timeout,
        })
    }
}
