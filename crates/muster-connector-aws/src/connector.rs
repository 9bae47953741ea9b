//! AWS EC2 connector.
//!
//! Each enabled region is one discovery scope; instances are enumerated
//! with the paginated `DescribeInstances` API and normalized onto the
//! canonical model. The instance id is the identity — AWS never reuses one
//! within an account.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2 as ec2;
use aws_sdk_ec2::types::{Instance, InstanceStateName};
use aws_sdk_sts as sts;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use muster_connector::asset::{DiscoveredImage, NormalizedAsset};
use muster_connector::config::ConnectorConfig;
use muster_connector::error::{ConnectorError, ConnectorResult};
use muster_connector::traits::{Connector, Discovery};
use muster_connector::types::{AssetState, Platform, SessionState};
use muster_core::TenantId;

use crate::config::AwsConfig;

/// Connector for one AWS account.
pub struct AwsConnector {
    config: AwsConfig,
    display_name: String,
    session: RwLock<Session>,
}

#[derive(Default)]
struct Session {
    state: SessionState,
    sdk_config: Option<aws_config::SdkConfig>,
}

impl std::fmt::Debug for AwsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsConnector")
            .field("account_id", &self.config.account_id)
            .finish()
    }
}

/// Map the EC2 instance state onto the canonical lifecycle.
///
/// `shutting-down` instances are already on their way out and will not come
/// back, so they normalize to `Terminated`; `stopping`/`stopped` instances
/// still exist and map to `Stopped`.
fn map_instance_state(state: Option<&InstanceStateName>) -> AssetState {
    match state {
        Some(InstanceStateName::Pending) => AssetState::Pending,
        Some(InstanceStateName::Running) => AssetState::Running,
        Some(InstanceStateName::Stopping) | Some(InstanceStateName::Stopped) => AssetState::Stopped,
        Some(InstanceStateName::ShuttingDown) | Some(InstanceStateName::Terminated) => {
            AssetState::Terminated
        }
        _ => AssetState::Unknown,
    }
}

impl AwsConnector {
    /// Create a connector from validated configuration.
    pub fn new(config: AwsConfig) -> ConnectorResult<Self> {
        config.validate()?;
        let display_name = format!("aws: {}", config.account_id);
        Ok(Self {
            config,
            display_name,
            session: RwLock::new(Session::default()),
        })
    }

    async fn sdk_config(&self) -> ConnectorResult<aws_config::SdkConfig> {
        let session = self.session.read().await;
        match (&session.state, &session.sdk_config) {
            (SessionState::Connected, Some(config)) => Ok(config.clone()),
            _ => Err(ConnectorError::NotConnected),
        }
    }

    fn ec2_client(&self, sdk_config: &aws_config::SdkConfig, region: &str) -> ec2::Client {
        let mut builder = ec2::config::Builder::from(sdk_config).region(Region::new(region.to_string()));
        if let Some(endpoint) = &self.config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        ec2::Client::from_conf(builder.build())
    }

    /// Enabled regions allowed by the scope filter.
    async fn list_regions(&self, sdk_config: &aws_config::SdkConfig) -> ConnectorResult<Vec<String>> {
        let client = ec2::Client::new(sdk_config);
        let response = client
            .describe_regions()
            .send()
            .await
            .map_err(|e| ConnectorError::discovery_failed_with_source("cannot list regions", e))?;

        Ok(response
            .regions()
            .iter()
            .filter_map(|r| r.region_name().map(str::to_string))
            .filter(|name| self.config.regions.allows(name))
            .collect())
    }

    fn normalize_instance(&self, region: &str, instance: &Instance) -> Option<NormalizedAsset> {
        // An instance without an id cannot be tracked across runs.
        let instance_id = instance.instance_id()?;

        let image = instance.image_id().unwrap_or_default();
        let mut asset = NormalizedAsset::new(Platform::Aws, &self.config.account_id, region, instance_id)
            .with_image(image, "latest")
            .with_state(map_instance_state(instance.state().and_then(|s| s.name())));

        for tag in instance.tags() {
            let (Some(key), Some(value)) = (tag.key(), tag.value()) else {
                continue;
            };
            match key {
                "Name" => asset.name = value.to_string(),
                "aws:autoscaling:groupName" => asset.set_owner(format!("asg/{value}")),
                _ => asset.add_label(key, value),
            }
        }

        if let Some(instance_type) = instance.instance_type() {
            asset.add_spec("instance-type", instance_type.as_str());
        }
        if let Some(zone) = instance.placement().and_then(|p| p.availability_zone()) {
            asset.set_host(zone);
        }
        if let Some(private_dns) = instance.private_dns_name() {
            if !private_dns.is_empty() && asset.name.is_empty() {
                asset.name = private_dns.to_string();
            }
        }

        Some(asset)
    }

    async fn discover_region(
        &self,
        sdk_config: &aws_config::SdkConfig,
        region: &str,
        discovery: &mut Discovery,
    ) -> ConnectorResult<()> {
        let client = self.ec2_client(sdk_config, region);
        let mut pages = client.describe_instances().into_paginator().send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                ConnectorError::partial_scope(region, format!("describe-instances failed: {e}"))
            })?;
            for reservation in page.reservations() {
                for instance in reservation.instances() {
                    if let Some(asset) = self.normalize_instance(region, instance) {
                        discovery.push_asset(asset);
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for AwsConnector {
    fn platform(&self) -> Platform {
        Platform::Aws
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn account(&self) -> &str {
        &self.config.account_id
    }

    async fn connect(&self) -> ConnectorResult<()> {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;

        // The caller identity doubles as the auth probe and guards against
        // pointing this connector at the wrong account.
        let sts_client = sts::Client::new(&sdk_config);
        let identity = sts_client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| ConnectorError::connection_failed_with_source("caller identity failed", e))?;

        let actual = identity.account().unwrap_or_default();
        if actual != self.config.account_id {
            return Err(ConnectorError::connection_failed(format!(
                "credentials belong to account {actual}, configuration expects {}",
                self.config.account_id
            )));
        }

        debug!(account_id = %self.config.account_id, "Connected to aws");

        let mut session = self.session.write().await;
        session.state = SessionState::Connected;
        session.sdk_config = Some(sdk_config);
        Ok(())
    }

    async fn close(&self) -> ConnectorResult<()> {
        let mut session = self.session.write().await;
        session.sdk_config = None;
        session.state = SessionState::Closed;
        Ok(())
    }

    async fn health(&self) -> ConnectorResult<()> {
        let sdk_config = self.sdk_config().await?;
        let sts_client = sts::Client::new(&sdk_config);
        sts_client
            .get_caller_identity()
            .send()
            .await
            .map(|_| ())
            .map_err(|e| ConnectorError::health_check_failed(e.to_string()))
    }

    #[instrument(skip(self, cancel), fields(account_id = %self.config.account_id))]
    async fn discover_assets(
        &self,
        tenant_id: TenantId,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Discovery> {
        let sdk_config = self.sdk_config().await?;
        let regions = self.list_regions(&sdk_config).await?;

        let mut discovery = Discovery::new();
        let mut attempted = 0usize;

        for region in &regions {
            if cancel.is_cancelled() {
                debug!(tenant_id = %tenant_id, "Discovery cancelled, returning partial results");
                break;
            }
            attempted += 1;
            if let Err(e) = self.discover_region(&sdk_config, region, &mut discovery).await {
                warn!(region = %region, error = %e, "Region enumeration failed, skipping");
                discovery.fail_scope(region, e.to_string());
            }
        }

        discovery.into_result(attempted)
    }

    async fn discover_images(
        &self,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Vec<DiscoveredImage>> {
        if !self.config.discover_owned_images {
            return Ok(Vec::new());
        }

        let sdk_config = self.sdk_config().await?;
        let regions = self.list_regions(&sdk_config).await?;
        let mut images = Vec::new();

        for region in &regions {
            if cancel.is_cancelled() {
                break;
            }
            let client = self.ec2_client(&sdk_config, region);
            let response = match client.describe_images().owners("self").send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(region = %region, error = %e, "Image enumeration failed, skipping");
                    continue;
                }
            };
            for image in response.images() {
                let Some(image_id) = image.image_id() else {
                    continue;
                };
                let mut discovered = DiscoveredImage::new(
                    Platform::Aws,
                    &self.config.account_id,
                    image_id,
                    "latest",
                );
                if let Some(name) = image.name() {
                    discovered.name = name.to_string();
                }
                images.push(discovered);
            }
        }

        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::types::{InstanceState, Placement, Tag};

    fn connector() -> AwsConnector {
        AwsConnector::new(AwsConfig {
            account_id: "123456789012".to_string(),
            regions: Default::default(),
            endpoint_url: None,
            discover_owned_images: true,
        })
        .unwrap()
    }

    fn instance(id: &str, state: InstanceStateName) -> Instance {
        Instance::builder()
            .instance_id(id)
            .state(InstanceState::builder().name(state).build())
            .build()
    }

    #[test]
    fn state_mapping_is_explicit() {
        assert_eq!(
            map_instance_state(Some(&InstanceStateName::Pending)),
            AssetState::Pending
        );
        assert_eq!(
            map_instance_state(Some(&InstanceStateName::Running)),
            AssetState::Running
        );
        assert_eq!(
            map_instance_state(Some(&InstanceStateName::Stopping)),
            AssetState::Stopped
        );
        assert_eq!(
            map_instance_state(Some(&InstanceStateName::Stopped)),
            AssetState::Stopped
        );
        assert_eq!(
            map_instance_state(Some(&InstanceStateName::ShuttingDown)),
            AssetState::Terminated
        );
        assert_eq!(
            map_instance_state(Some(&InstanceStateName::Terminated)),
            AssetState::Terminated
        );
        assert_eq!(map_instance_state(None), AssetState::Unknown);
    }

    #[test]
    fn normalize_reads_identity_and_tags() {
        let instance = Instance::builder()
            .instance_id("i-0123456789abcdef0")
            .image_id("ami-0abc")
            .instance_type(aws_sdk_ec2::types::InstanceType::T3Medium)
            .state(
                InstanceState::builder()
                    .name(InstanceStateName::Running)
                    .build(),
            )
            .placement(Placement::builder().availability_zone("us-east-1a").build())
            .tags(Tag::builder().key("Name").value("web-01").build())
            .tags(Tag::builder().key("env").value("prod").build())
            .tags(
                Tag::builder()
                    .key("aws:autoscaling:groupName")
                    .value("web")
                    .build(),
            )
            .build();

        let asset = connector()
            .normalize_instance("us-east-1", &instance)
            .unwrap();
        assert_eq!(asset.platform, Platform::Aws);
        assert_eq!(asset.account, "123456789012");
        assert_eq!(asset.region, "us-east-1");
        assert_eq!(asset.instance_id, "i-0123456789abcdef0");
        assert_eq!(asset.name, "web-01");
        assert_eq!(asset.image_ref, "ami-0abc");
        assert_eq!(asset.image_version, "latest");
        assert_eq!(asset.state, AssetState::Running);
        assert_eq!(asset.tags.get("label:env"), Some(&"prod".to_string()));
        assert_eq!(asset.tags.get("owner:controller"), Some(&"asg/web".to_string()));
        assert_eq!(asset.tags.get("node:host"), Some(&"us-east-1a".to_string()));
        assert_eq!(
            asset.tags.get("spec:instance-type"),
            Some(&"t3.medium".to_string())
        );
    }

    #[test]
    fn instance_without_id_is_dropped() {
        let no_id = Instance::builder().build();
        assert!(connector().normalize_instance("us-east-1", &no_id).is_none());
    }

    #[test]
    fn terminated_instance_keeps_terminated_state() {
        let asset = connector()
            .normalize_instance("eu-west-1", &instance("i-1", InstanceStateName::Terminated))
            .unwrap();
        assert_eq!(asset.state, AssetState::Terminated);
    }

    #[tokio::test]
    async fn operations_require_connect() {
        let connector = connector();
        assert!(matches!(
            connector.health().await,
            Err(ConnectorError::NotConnected)
        ));
        assert!(connector.close().await.is_ok());
    }
}
