//! The typed client for the secret store

use async_trait::async_trait;
use aws_sdk_secretsmanager::config::retry::RetryConfig;
use aws_sdk_secretsmanager::config::BehaviorVersion;
use aws_sdk_secretsmanager::types;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::base::BaseSession;
use super::error::classify_sdk;
use super::retry::retry;
use super::traits::SecretStore;
use super::{Error, RetryConf};
use crate::conf::CloudConf;
use crate::models::StoredSecret;

/// A typed client for the secret store
///
/// The same validation, retry, and classification regime as the container
/// service client.
pub struct SecretsClient {
    /// The sdk client calls go through
    client: aws_sdk_secretsmanager::Client,
    /// The settings for retrying calls
    retry: RetryConf,
    /// The token cancelling in-flight retries
    token: Option<CancellationToken>,
}

impl SecretsClient {
    /// Build a secret store client from the shared config
    ///
    /// # Arguments
    ///
    /// * `conf` - The shared cloud config
    pub async fn new(conf: &CloudConf) -> Result<Self, Error> {
        let session = BaseSession::new(conf).await?;
        let mut builder = aws_sdk_secretsmanager::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(session.region.clone())
            .credentials_provider(session.credentials.clone())
            .timeout_config(session.timeout.clone())
            // the retry engine is the single retry authority
            .retry_config(RetryConfig::disabled());
        if let Some(endpoint) = &session.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        let client = aws_sdk_secretsmanager::Client::from_conf(builder.build());
        Ok(SecretsClient {
            client,
            retry: conf.retry.clone(),
            token: None,
        })
    }

    /// Set a token that cancels this client's in-flight retries
    ///
    /// # Arguments
    ///
    /// * `token` - The cancellation token to honor
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }
}

/// Convert a provider tag list into a map
///
/// # Arguments
///
/// * `tags` - The provider tags to convert
fn tag_map(tags: Option<Vec<types::Tag>>) -> HashMap<String, String> {
    tags.unwrap_or_default()
        .into_iter()
        .filter_map(|tag| Some((tag.key?, tag.value?)))
        .collect()
}

#[async_trait]
impl SecretStore for SecretsClient {
    #[instrument(name = "SecretsClient::create_secret", skip(self, value, tags), err(Debug))]
    async fn create_secret(
        &self,
        name: &str,
        value: &str,
        tags: HashMap<String, String>,
    ) -> Result<String, Error> {
        if name.is_empty() || value.is_empty() {
            return Err(Error::InvalidInput(
                "create_secret: name and value must be set".to_owned(),
            ));
        }
        let mut call = self.client.create_secret().name(name).secret_string(value);
        for (key, tag_value) in &tags {
            call = call.tags(types::Tag::builder().key(key).value(tag_value).build());
        }
        let output = retry(&self.retry, self.token.as_ref(), "create_secret", || {
            let call = call.clone();
            async move {
                call.send()
                    .await
                    .map_err(|err| classify_sdk("create_secret", name, err))
            }
        })
        .await?;
        output
            .arn
            .ok_or_else(|| Error::new(format!("create_secret {name}: provider returned no arn")))
    }

    #[instrument(name = "SecretsClient::get_secret_value", skip(self), err(Debug))]
    async fn get_secret_value(&self, id: &str) -> Result<String, Error> {
        if id.is_empty() {
            return Err(Error::InvalidInput(
                "get_secret_value: id must be set".to_owned(),
            ));
        }
        let call = self.client.get_secret_value().secret_id(id);
        let output = retry(&self.retry, self.token.as_ref(), "get_secret_value", || {
            let call = call.clone();
            async move {
                call.send()
                    .await
                    .map_err(|err| classify_sdk("get_secret_value", id, err))
            }
        })
        .await?;
        output
            .secret_string
            .ok_or_else(|| Error::new(format!("get_secret_value {id}: secret has no string value")))
    }

    #[instrument(name = "SecretsClient::update_secret", skip(self, value), err(Debug))]
    async fn update_secret(&self, id: &str, value: &str) -> Result<(), Error> {
        if id.is_empty() || value.is_empty() {
            return Err(Error::InvalidInput(
                "update_secret: id and value must be set".to_owned(),
            ));
        }
        let call = self.client.update_secret().secret_id(id).secret_string(value);
        retry(&self.retry, self.token.as_ref(), "update_secret", || {
            let call = call.clone();
            async move {
                call.send()
                    .await
                    .map_err(|err| classify_sdk("update_secret", id, err))
            }
        })
        .await?;
        Ok(())
    }

    #[instrument(name = "SecretsClient::delete_secret", skip(self), err(Debug))]
    async fn delete_secret(&self, id: &str, force: bool) -> Result<(), Error> {
        if id.is_empty() {
            return Err(Error::InvalidInput("delete_secret: id must be set".to_owned()));
        }
        let call = self
            .client
            .delete_secret()
            .secret_id(id)
            .force_delete_without_recovery(force);
        retry(&self.retry, self.token.as_ref(), "delete_secret", || {
            let call = call.clone();
            async move {
                call.send()
                    .await
                    .map_err(|err| classify_sdk("delete_secret", id, err))
            }
        })
        .await?;
        Ok(())
    }

    #[instrument(name = "SecretsClient::describe_secret", skip(self), err(Debug))]
    async fn describe_secret(&self, id: &str) -> Result<StoredSecret, Error> {
        if id.is_empty() {
            return Err(Error::InvalidInput(
                "describe_secret: id must be set".to_owned(),
            ));
        }
        let call = self.client.describe_secret().secret_id(id);
        let output = retry(&self.retry, self.token.as_ref(), "describe_secret", || {
            let call = call.clone();
            async move {
                call.send()
                    .await
                    .map_err(|err| classify_sdk("describe_secret", id, err))
            }
        })
        .await?;
        Ok(StoredSecret {
            id: output.arn.unwrap_or_else(|| id.to_owned()),
            name: output.name.unwrap_or_default(),
            tags: tag_map(output.tags),
            is_deleted: output.deleted_date.is_some(),
        })
    }

    #[instrument(name = "SecretsClient::list_secrets", skip(self), err(Debug))]
    async fn list_secrets(&self, prefix: Option<&str>) -> Result<Vec<StoredSecret>, Error> {
        let mut secrets = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut call = self.client.list_secrets();
            if let Some(prefix) = prefix {
                call = call.filters(
                    types::Filter::builder()
                        .key(types::FilterNameStringType::Name)
                        .values(prefix)
                        .build(),
                );
            }
            if let Some(token) = next_token.take() {
                call = call.next_token(token);
            }
            let output = retry(&self.retry, self.token.as_ref(), "list_secrets", || {
                let call = call.clone();
                async move {
                    call.send()
                        .await
                        .map_err(|err| classify_sdk("list_secrets", prefix.unwrap_or("all"), err))
                }
            })
            .await?;
            for entry in output.secret_list.unwrap_or_default() {
                secrets.push(StoredSecret {
                    id: entry.arn.unwrap_or_default(),
                    name: entry.name.unwrap_or_default(),
                    tags: tag_map(entry.tags),
                    is_deleted: entry.deleted_date.is_some(),
                });
            }
            match output.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        Ok(secrets)
    }

    #[instrument(name = "SecretsClient::tag_resource", skip(self, tags), err(Debug))]
    async fn tag_resource(&self, id: &str, tags: HashMap<String, String>) -> Result<(), Error> {
        if id.is_empty() {
            return Err(Error::InvalidInput("tag_resource: id must be set".to_owned()));
        }
        let mut call = self.client.tag_resource().secret_id(id);
        for (key, value) in &tags {
            call = call.tags(types::Tag::builder().key(key).value(value).build());
        }
        retry(&self.retry, self.token.as_ref(), "tag_resource", || {
            let call = call.clone();
            async move {
                call.send()
                    .await
                    .map_err(|err| classify_sdk("tag_resource", id, err))
            }
        })
        .await?;
        Ok(())
    }
}
