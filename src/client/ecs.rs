//! The typed client for the container service

use async_trait::async_trait;
use aws_sdk_ecs::config::retry::RetryConfig;
use aws_sdk_ecs::config::BehaviorVersion;
use aws_sdk_ecs::types;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::base::BaseSession;
use super::error::classify_sdk;
use super::retry::retry;
use super::traits::ContainerService;
use super::{Error, RetryConf};
use crate::conf::CloudConf;
use crate::models::{
    ContainerOpts, ContainerSnapshot, DescribedDefinition, EnvValue, PodDefinitionOpts,
    PodExecutionOpts, RegisteredDefinition, RepoCredsSource, SecretSource, TaskFailure,
    TaskResults, TaskSnapshot,
};

/// A typed client for the container service
///
/// Every method validates its identifiers before any network call, runs
/// the call through the retry engine, and classifies provider errors into
/// the domain taxonomy. The underlying sdk client is thread safe so this
/// client can be shared freely.
pub struct EcsClient {
    /// The sdk client calls go through
    client: aws_sdk_ecs::Client,
    /// The settings for retrying calls
    retry: RetryConf,
    /// The token cancelling in-flight retries
    token: Option<CancellationToken>,
}

impl EcsClient {
    /// Build a container service client from the shared config
    ///
    /// # Arguments
    ///
    /// * `conf` - The shared cloud config
    pub async fn new(conf: &CloudConf) -> Result<Self, Error> {
        let session = BaseSession::new(conf).await?;
        let mut builder = aws_sdk_ecs::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(session.region.clone())
            .credentials_provider(session.credentials.clone())
            .timeout_config(session.timeout.clone())
            // the retry engine is the single retry authority
            .retry_config(RetryConfig::disabled());
        if let Some(endpoint) = &session.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        let client = aws_sdk_ecs::Client::from_conf(builder.build());
        Ok(EcsClient {
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

/// Build a provider container definition from container options
///
/// # Arguments
///
/// * `opts` - The container options to translate
fn container_definition(opts: &ContainerOpts) -> Result<types::ContainerDefinition, Error> {
    let mut builder = types::ContainerDefinition::builder()
        .name(&opts.name)
        .image(&opts.image);
    if let Some(command) = &opts.command {
        builder = builder.set_command(Some(command.clone()));
    }
    if let Some(working_dir) = &opts.working_dir {
        builder = builder.working_directory(working_dir);
    }
    if let Some(memory) = opts.memory_mb {
        builder = builder.memory(memory as i32);
    }
    if let Some(cpu) = opts.cpu {
        builder = builder.cpu(cpu as i32);
    }
    for port in &opts.port_mappings {
        let mut mapping = types::PortMapping::builder().container_port(i32::from(port.container_port));
        if let Some(host_port) = port.host_port {
            mapping = mapping.host_port(i32::from(host_port));
        }
        builder = builder.port_mappings(mapping.build());
    }
    for env in &opts.env_vars {
        match &env.value {
            EnvValue::Literal(value) => {
                builder = builder.environment(
                    types::KeyValuePair::builder()
                        .name(&env.name)
                        .value(value)
                        .build(),
                );
            }
            EnvValue::Secret(secret) => match &secret.source {
                SecretSource::Existing { id } => {
                    builder = builder
                        .secrets(types::Secret::builder().name(&env.name).value_from(id).build()?);
                }
                SecretSource::New { name, .. } => {
                    return Err(Error::InvalidInput(format!(
                        "secret '{name}' must be provisioned before registering a definition"
                    )));
                }
            },
        }
    }
    if let Some(creds) = &opts.repo_creds {
        match &creds.source {
            RepoCredsSource::Existing { secret_id } => {
                builder = builder.repository_credentials(
                    types::RepositoryCredentials::builder()
                        .credentials_parameter(secret_id)
                        .build()?,
                );
            }
            RepoCredsSource::New { name, .. } => {
                return Err(Error::InvalidInput(format!(
                    "repository credentials '{name}' must be provisioned before registering a definition"
                )));
            }
        }
    }
    Ok(builder.build())
}

/// Convert a provider task into a snapshot
///
/// # Arguments
///
/// * `task` - The provider task to convert
fn snapshot(task: types::Task) -> TaskSnapshot {
    let containers = task
        .containers
        .unwrap_or_default()
        .into_iter()
        .map(|container| ContainerSnapshot {
            id: container.container_arn,
            name: container.name.unwrap_or_default(),
            last_status: container.last_status,
        })
        .collect();
    TaskSnapshot {
        arn: task.task_arn.unwrap_or_default(),
        last_status: task.last_status,
        containers,
    }
}

/// Convert provider tasks and failures into task results
///
/// # Arguments
///
/// * `tasks` - The tasks the provider returned
/// * `failures` - The failures the provider reported
fn task_results(
    tasks: Option<Vec<types::Task>>,
    failures: Option<Vec<types::Failure>>,
) -> TaskResults {
    TaskResults {
        tasks: tasks.unwrap_or_default().into_iter().map(snapshot).collect(),
        failures: failures
            .unwrap_or_default()
            .into_iter()
            .map(|failure| TaskFailure {
                arn: failure.arn,
                reason: failure.reason,
                detail: failure.detail,
            })
            .collect(),
    }
}

#[async_trait]
impl ContainerService for EcsClient {
    #[instrument(name = "EcsClient::register_task_definition", skip_all, fields(family = %opts.family_name), err(Debug))]
    async fn register_task_definition(
        &self,
        opts: &PodDefinitionOpts,
    ) -> Result<RegisteredDefinition, Error> {
        if opts.family_name.is_empty() {
            return Err(Error::InvalidInput(
                "register_task_definition: family_name must be set".to_owned(),
            ));
        }
        let mut call = self
            .client
            .register_task_definition()
            .family(&opts.family_name);
        if let Some(memory) = opts.memory_mb {
            call = call.memory(memory.to_string());
        }
        if let Some(cpu) = opts.cpu {
            call = call.cpu(cpu.to_string());
        }
        if let Some(role) = &opts.task_role {
            call = call.task_role_arn(role);
        }
        if let Some(role) = &opts.execution_role {
            call = call.execution_role_arn(role);
        }
        if let Some(mode) = &opts.network_mode {
            call = call.network_mode(types::NetworkMode::from(mode.as_str()));
        }
        for container in &opts.container_opts {
            call = call.container_definitions(container_definition(container)?);
        }
        for (key, value) in &opts.tags {
            call = call.tags(types::Tag::builder().key(key).value(value).build());
        }
        let output = retry(
            &self.retry,
            self.token.as_ref(),
            "register_task_definition",
            || {
                let call = call.clone();
                async move {
                    call.send().await.map_err(|err| {
                        classify_sdk("register_task_definition", &opts.family_name, err)
                    })
                }
            },
        )
        .await?;
        let definition = output.task_definition.ok_or_else(|| {
            Error::new("register_task_definition: provider returned no definition")
        })?;
        Ok(RegisteredDefinition {
            id: definition.task_definition_arn.unwrap_or_default(),
            family: definition.family.unwrap_or_default(),
            revision: definition.revision,
        })
    }

    #[instrument(name = "EcsClient::deregister_task_definition", skip(self), err(Debug))]
    async fn deregister_task_definition(&self, id: &str) -> Result<(), Error> {
        if id.is_empty() {
            return Err(Error::InvalidInput(
                "deregister_task_definition: id must be set".to_owned(),
            ));
        }
        let call = self.client.deregister_task_definition().task_definition(id);
        retry(
            &self.retry,
            self.token.as_ref(),
            "deregister_task_definition",
            || {
                let call = call.clone();
                async move {
                    call.send()
                        .await
                        .map_err(|err| classify_sdk("deregister_task_definition", id, err))
                }
            },
        )
        .await?;
        Ok(())
    }

    #[instrument(name = "EcsClient::describe_task_definition", skip(self), err(Debug))]
    async fn describe_task_definition(&self, id: &str) -> Result<DescribedDefinition, Error> {
        if id.is_empty() {
            return Err(Error::InvalidInput(
                "describe_task_definition: id must be set".to_owned(),
            ));
        }
        let call = self
            .client
            .describe_task_definition()
            .task_definition(id)
            .include(types::TaskDefinitionField::Tags);
        let output = retry(
            &self.retry,
            self.token.as_ref(),
            "describe_task_definition",
            || {
                let call = call.clone();
                async move {
                    call.send()
                        .await
                        .map_err(|err| classify_sdk("describe_task_definition", id, err))
                }
            },
        )
        .await?;
        let definition = output
            .task_definition
            .ok_or_else(|| Error::NotFound(format!("task definition {id} not found")))?;
        let tags = output
            .tags
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tag| Some((tag.key?, tag.value?)))
            .collect();
        Ok(DescribedDefinition {
            id: definition.task_definition_arn.unwrap_or_default(),
            family: definition.family.unwrap_or_default(),
            revision: definition.revision,
            active: matches!(
                definition.status,
                Some(types::TaskDefinitionStatus::Active)
            ),
            tags,
        })
    }

    #[instrument(name = "EcsClient::list_task_definitions", skip(self), err(Debug))]
    async fn list_task_definitions(
        &self,
        family_prefix: Option<&str>,
    ) -> Result<Vec<String>, Error> {
        let mut arns = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut call = self.client.list_task_definitions();
            if let Some(prefix) = family_prefix {
                call = call.family_prefix(prefix);
            }
            if let Some(token) = next_token.take() {
                call = call.next_token(token);
            }
            let output = retry(
                &self.retry,
                self.token.as_ref(),
                "list_task_definitions",
                || {
                    let call = call.clone();
                    async move {
                        call.send().await.map_err(|err| {
                            classify_sdk(
                                "list_task_definitions",
                                family_prefix.unwrap_or("all"),
                                err,
                            )
                        })
                    }
                },
            )
            .await?;
            arns.extend(output.task_definition_arns.unwrap_or_default());
            match output.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        Ok(arns)
    }

    #[instrument(name = "EcsClient::run_task", skip(self, opts), fields(cluster = %opts.cluster), err(Debug))]
    async fn run_task(
        &self,
        definition_id: &str,
        opts: &PodExecutionOpts,
    ) -> Result<TaskResults, Error> {
        if definition_id.is_empty() {
            return Err(Error::InvalidInput(
                "run_task: definition_id must be set".to_owned(),
            ));
        }
        if opts.cluster.is_empty() {
            return Err(Error::InvalidInput("run_task: cluster must be set".to_owned()));
        }
        let mut call = self
            .client
            .run_task()
            .cluster(&opts.cluster)
            .task_definition(definition_id)
            .count(1);
        if let Some(provider) = &opts.capacity_provider {
            call = call.capacity_provider_strategy(
                types::CapacityProviderStrategyItem::builder()
                    .capacity_provider(provider)
                    .build()?,
            );
        }
        if let Some(strategy) = opts.placement.strategy {
            let mut built = types::PlacementStrategy::builder()
                .r#type(types::PlacementStrategyType::from(strategy.as_str()));
            if let Some(field) = &opts.placement.strategy_parameter {
                built = built.field(field);
            }
            call = call.placement_strategy(built.build());
        }
        for filter in &opts.placement.instance_filters {
            call = call.placement_constraints(
                types::PlacementConstraint::builder()
                    .r#type(types::PlacementConstraintType::MemberOf)
                    .expression(filter)
                    .build(),
            );
        }
        if let Some(awsvpc) = &opts.awsvpc {
            let vpc = types::AwsVpcConfiguration::builder()
                .set_subnets(Some(awsvpc.subnets.clone()))
                .set_security_groups(Some(awsvpc.security_groups.clone()))
                .build()?;
            call = call.network_configuration(
                types::NetworkConfiguration::builder()
                    .awsvpc_configuration(vpc)
                    .build(),
            );
        }
        if opts.supports_debug {
            call = call.enable_execute_command(true);
        }
        if let Some(overrides) = &opts.overrides {
            let mut task_override = types::TaskOverride::builder();
            for container in &overrides.containers {
                let mut built = types::ContainerOverride::builder().name(&container.name);
                if let Some(command) = &container.command {
                    built = built.set_command(Some(command.clone()));
                }
                for (key, value) in &container.env {
                    built = built.environment(
                        types::KeyValuePair::builder().name(key).value(value).build(),
                    );
                }
                task_override = task_override.container_overrides(built.build());
            }
            call = call.overrides(task_override.build());
        }
        for (key, value) in &opts.tags {
            call = call.tags(types::Tag::builder().key(key).value(value).build());
        }
        let output = retry(&self.retry, self.token.as_ref(), "run_task", || {
            let call = call.clone();
            async move {
                call.send()
                    .await
                    .map_err(|err| classify_sdk("run_task", definition_id, err))
            }
        })
        .await?;
        Ok(task_results(output.tasks, output.failures))
    }

    #[instrument(name = "EcsClient::stop_task", skip(self), err(Debug))]
    async fn stop_task(&self, cluster: &str, task: &str) -> Result<(), Error> {
        if cluster.is_empty() || task.is_empty() {
            return Err(Error::InvalidInput(
                "stop_task: cluster and task must be set".to_owned(),
            ));
        }
        let call = self
            .client
            .stop_task()
            .cluster(cluster)
            .task(task)
            .reason("stopped by cocoa");
        retry(&self.retry, self.token.as_ref(), "stop_task", || {
            let call = call.clone();
            async move {
                call.send()
                    .await
                    .map_err(|err| classify_sdk("stop_task", task, err))
            }
        })
        .await?;
        Ok(())
    }

    #[instrument(name = "EcsClient::describe_tasks", skip(self, tasks), err(Debug))]
    async fn describe_tasks(&self, cluster: &str, tasks: &[String]) -> Result<TaskResults, Error> {
        if cluster.is_empty() || tasks.is_empty() {
            return Err(Error::InvalidInput(
                "describe_tasks: cluster and at least one task must be set".to_owned(),
            ));
        }
        let call = self
            .client
            .describe_tasks()
            .cluster(cluster)
            .set_tasks(Some(tasks.to_vec()));
        let output = retry(&self.retry, self.token.as_ref(), "describe_tasks", || {
            let call = call.clone();
            async move {
                call.send()
                    .await
                    .map_err(|err| classify_sdk("describe_tasks", cluster, err))
            }
        })
        .await?;
        Ok(task_results(output.tasks, output.failures))
    }

    #[instrument(name = "EcsClient::list_tasks", skip(self), err(Debug))]
    async fn list_tasks(&self, cluster: &str, family: Option<&str>) -> Result<Vec<String>, Error> {
        if cluster.is_empty() {
            return Err(Error::InvalidInput("list_tasks: cluster must be set".to_owned()));
        }
        let mut arns = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut call = self.client.list_tasks().cluster(cluster);
            if let Some(family) = family {
                call = call.family(family);
            }
            if let Some(token) = next_token.take() {
                call = call.next_token(token);
            }
            let output = retry(&self.retry, self.token.as_ref(), "list_tasks", || {
                let call = call.clone();
                async move {
                    call.send()
                        .await
                        .map_err(|err| classify_sdk("list_tasks", cluster, err))
                }
            })
            .await?;
            arns.extend(output.task_arns.unwrap_or_default());
            match output.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        Ok(arns)
    }

    #[instrument(name = "EcsClient::tag_resource", skip(self, tags), err(Debug))]
    async fn tag_resource(&self, id: &str, tags: HashMap<String, String>) -> Result<(), Error> {
        if id.is_empty() {
            return Err(Error::InvalidInput("tag_resource: id must be set".to_owned()));
        }
        let mut call = self.client.tag_resource().resource_arn(id);
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
