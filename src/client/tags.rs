//! The typed client for tag-based resource search

use async_trait::async_trait;
use aws_sdk_resourcegroupstaggingapi::config::retry::RetryConfig;
use aws_sdk_resourcegroupstaggingapi::config::BehaviorVersion;
use aws_sdk_resourcegroupstaggingapi::types;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::base::BaseSession;
use super::error::classify_sdk;
use super::retry::retry;
use super::traits::TagSearch;
use super::{Error, RetryConf};
use crate::conf::CloudConf;
use crate::models::{TagFilter, TaggedResource};

/// A typed client for filtering cloud resources by type and tags
///
/// The cleanup paths use this to find stranded resources: anything whose
/// cache tag was written as `"false"` and never flipped to `"true"`.
pub struct TaggingClient {
    /// The sdk client calls go through
    client: aws_sdk_resourcegroupstaggingapi::Client,
    /// The settings for retrying calls
    retry: RetryConf,
    /// The token cancelling in-flight retries
    token: Option<CancellationToken>,
}

impl TaggingClient {
    /// Build a tag search client from the shared config
    ///
    /// # Arguments
    ///
    /// * `conf` - The shared cloud config
    pub async fn new(conf: &CloudConf) -> Result<Self, Error> {
        let session = BaseSession::new(conf).await?;
        let mut builder = aws_sdk_resourcegroupstaggingapi::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(session.region.clone())
            .credentials_provider(session.credentials.clone())
            .timeout_config(session.timeout.clone())
            // the retry engine is the single retry authority
            .retry_config(RetryConfig::disabled());
        if let Some(endpoint) = &session.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        let client = aws_sdk_resourcegroupstaggingapi::Client::from_conf(builder.build());
        Ok(TaggingClient {
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

#[async_trait]
impl TagSearch for TaggingClient {
    #[instrument(name = "TaggingClient::get_resources", skip_all, err(Debug))]
    async fn get_resources(
        &self,
        resource_type_filters: &[String],
        tag_filters: &[TagFilter],
    ) -> Result<Vec<TaggedResource>, Error> {
        // an empty filter key would silently match nothing, so reject it
        if tag_filters.iter().any(|filter| filter.key.is_empty()) {
            return Err(Error::InvalidInput(
                "get_resources: tag filter keys must be set".to_owned(),
            ));
        }
        let mut resources = Vec::new();
        let mut pagination_token: Option<String> = None;
        loop {
            let mut call = self
                .client
                .get_resources()
                .set_resource_type_filters(Some(resource_type_filters.to_vec()));
            for filter in tag_filters {
                call = call.tag_filters(
                    types::TagFilter::builder()
                        .key(&filter.key)
                        .set_values(Some(filter.values.clone()))
                        .build(),
                );
            }
            if let Some(token) = pagination_token.take() {
                call = call.pagination_token(token);
            }
            let output = retry(&self.retry, self.token.as_ref(), "get_resources", || {
                let call = call.clone();
                async move {
                    call.send()
                        .await
                        .map_err(|err| classify_sdk("get_resources", "tagged resources", err))
                }
            })
            .await?;
            for mapping in output.resource_tag_mapping_list.unwrap_or_default() {
                let tags = mapping
                    .tags
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tag| (tag.key, tag.value))
                    .collect();
                resources.push(TaggedResource {
                    id: mapping.resource_arn.unwrap_or_default(),
                    tags,
                });
            }
            // the provider signals the last page with an empty token
            match output.pagination_token {
                Some(token) if !token.is_empty() => pagination_token = Some(token),
                _ => break,
            }
        }
        Ok(resources)
    }
}
