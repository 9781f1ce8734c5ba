//! EC2, ELB and Auto Scaling backed cloud provider

use crate::error::{error_code, from_list, from_sdk};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ec2::config::Region;
use aws_sdk_ec2::types::{Filter, InstanceStateName, Tag};
use clusterflow_cloud::{
    CLUSTER_TAG, CloudError, CloudProvider, CloudResource, ClusterIdentity, Result,
};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

pub const INSTANCE: &str = "instance";
pub const VOLUME: &str = "volume";
pub const SECURITY_GROUP: &str = "security-group";
pub const SUBNET: &str = "subnet";
pub const ROUTE_TABLE: &str = "route-table";
pub const INTERNET_GATEWAY: &str = "internet-gateway";
pub const VPC: &str = "vpc";
pub const LOAD_BALANCER: &str = "load-balancer";
pub const AUTOSCALING_GROUP: &str = "autoscaling-group";

/// Set by Auto Scaling on every instance it launches
const GROUP_MEMBER_TAG: &str = "aws:autoscaling:groupName";

/// DescribeTags accepts at most this many load balancer names
const ELB_TAG_BATCH: usize = 20;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_TIMEOUT: Duration = Duration::from_secs(600);

/// AWS provider scoped to one region
pub struct AwsCloudProvider {
    ec2: aws_sdk_ec2::Client,
    elb: aws_sdk_elasticloadbalancing::Client,
    autoscaling: aws_sdk_autoscaling::Client,
    region: String,
    wait_timeout: Duration,
}

impl AwsCloudProvider {
    /// Creates a provider using the default credential chain
    pub async fn new(region: impl Into<String>) -> Self {
        let region = region.into();
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;
        Self::from_config(&config, region)
    }

    /// Builds every service client from one shared configuration
    pub fn from_config(config: &SdkConfig, region: impl Into<String>) -> Self {
        Self {
            ec2: aws_sdk_ec2::Client::new(config),
            elb: aws_sdk_elasticloadbalancing::Client::new(config),
            autoscaling: aws_sdk_autoscaling::Client::new(config),
            region: region.into(),
            wait_timeout: WAIT_TIMEOUT,
        }
    }

    /// How long to wait for a deleted resource to release its dependents
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Polls `done` until it reports true or the wait timeout passes
    async fn wait_for<F, Fut>(
        &self,
        resource: &CloudResource,
        what: &str,
        mut done: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let deadline = tokio::time::Instant::now() + self.wait_timeout;
        loop {
            if done().await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CloudError::Timeout(format!(
                    "{} did not {} within {:?}",
                    resource, what, self.wait_timeout
                )));
            }
            tracing::debug!("Waiting for {} to {}", resource, what);
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn list_instances(&self, filter: &Filter, out: &mut Vec<CloudResource>) -> Result<()> {
        let mut next_token = None;
        loop {
            let resp = self
                .ec2
                .describe_instances()
                .filters(filter.clone())
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| from_list("DescribeInstances", e))?;

            for instance in resp.reservations().iter().flat_map(|r| r.instances()) {
                let state = instance.state().and_then(|s| s.name());
                if matches!(state, Some(InstanceStateName::Terminated)) {
                    continue;
                }
                push(out, INSTANCE, instance.instance_id(), ec2_tags(instance.tags()));
            }

            next_token = resp.next_token().map(str::to_string);
            if next_token.is_none() {
                return Ok(());
            }
        }
    }

    async fn list_volumes(&self, filter: &Filter, out: &mut Vec<CloudResource>) -> Result<()> {
        let mut next_token = None;
        loop {
            let resp = self
                .ec2
                .describe_volumes()
                .filters(filter.clone())
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| from_list("DescribeVolumes", e))?;

            for volume in resp.volumes() {
                push(out, VOLUME, volume.volume_id(), ec2_tags(volume.tags()));
            }

            next_token = resp.next_token().map(str::to_string);
            if next_token.is_none() {
                return Ok(());
            }
        }
    }

    async fn list_autoscaling_groups(
        &self,
        cluster: &str,
        out: &mut Vec<CloudResource>,
    ) -> Result<()> {
        let filter = aws_sdk_autoscaling::types::Filter::builder()
            .name(format!("tag:{}", CLUSTER_TAG))
            .values(cluster)
            .build();

        let mut next_token = None;
        loop {
            let resp = self
                .autoscaling
                .describe_auto_scaling_groups()
                .filters(filter.clone())
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| from_list("DescribeAutoScalingGroups", e))?;

            for group in resp.auto_scaling_groups() {
                let tags = group
                    .tags()
                    .iter()
                    .filter_map(|t| Some((opt(t.key())?, opt(t.value()).unwrap_or(""))));
                push(out, AUTOSCALING_GROUP, opt(group.auto_scaling_group_name()), tags);
            }

            next_token = resp.next_token().map(str::to_string);
            if next_token.is_none() {
                return Ok(());
            }
        }
    }

    /// Classic ELB has no server-side tag filter, so every balancer's tags are fetched
    async fn list_load_balancers(
        &self,
        cluster: &str,
        out: &mut Vec<CloudResource>,
    ) -> Result<()> {
        let mut names = Vec::new();
        let mut marker = None;
        loop {
            let resp = self
                .elb
                .describe_load_balancers()
                .set_marker(marker)
                .send()
                .await
                .map_err(|e| from_list("DescribeLoadBalancers", e))?;

            names.extend(
                resp.load_balancer_descriptions()
                    .iter()
                    .filter_map(|lb| opt(lb.load_balancer_name()).map(str::to_string)),
            );

            marker = resp.next_marker().map(str::to_string);
            if marker.is_none() {
                break;
            }
        }

        for batch in names.chunks(ELB_TAG_BATCH) {
            let resp = self
                .elb
                .describe_tags()
                .set_load_balancer_names(Some(batch.to_vec()))
                .send()
                .await
                .map_err(|e| from_list("DescribeTags", e))?;

            for description in resp.tag_descriptions() {
                let tags: BTreeMap<&str, &str> = description
                    .tags()
                    .iter()
                    .filter_map(|t| Some((opt(t.key())?, opt(t.value()).unwrap_or(""))))
                    .collect();
                if tags.get(CLUSTER_TAG) != Some(&cluster) {
                    continue;
                }
                push(
                    out,
                    LOAD_BALANCER,
                    opt(description.load_balancer_name()),
                    tags,
                );
            }
        }
        Ok(())
    }

    async fn list_network(&self, filter: &Filter, out: &mut Vec<CloudResource>) -> Result<()> {
        let groups = self
            .ec2
            .describe_security_groups()
            .filters(filter.clone())
            .send()
            .await
            .map_err(|e| from_list("DescribeSecurityGroups", e))?;
        for group in groups.security_groups() {
            // Removed together with its VPC
            if group.group_name() == Some("default") {
                continue;
            }
            push(out, SECURITY_GROUP, group.group_id(), ec2_tags(group.tags()));
        }

        let subnets = self
            .ec2
            .describe_subnets()
            .filters(filter.clone())
            .send()
            .await
            .map_err(|e| from_list("DescribeSubnets", e))?;
        for subnet in subnets.subnets() {
            push(out, SUBNET, subnet.subnet_id(), ec2_tags(subnet.tags()));
        }

        let tables = self
            .ec2
            .describe_route_tables()
            .filters(filter.clone())
            .send()
            .await
            .map_err(|e| from_list("DescribeRouteTables", e))?;
        for table in tables.route_tables() {
            let is_main = table
                .associations()
                .iter()
                .any(|a| a.main().unwrap_or(false));
            if is_main {
                continue;
            }
            push(out, ROUTE_TABLE, table.route_table_id(), ec2_tags(table.tags()));
        }

        let gateways = self
            .ec2
            .describe_internet_gateways()
            .filters(filter.clone())
            .send()
            .await
            .map_err(|e| from_list("DescribeInternetGateways", e))?;
        for gateway in gateways.internet_gateways() {
            push(
                out,
                INTERNET_GATEWAY,
                gateway.internet_gateway_id(),
                ec2_tags(gateway.tags()),
            );
        }

        let vpcs = self
            .ec2
            .describe_vpcs()
            .filters(filter.clone())
            .send()
            .await
            .map_err(|e| from_list("DescribeVpcs", e))?;
        for vpc in vpcs.vpcs() {
            push(out, VPC, vpc.vpc_id(), ec2_tags(vpc.tags()));
        }

        Ok(())
    }

    async fn terminate_instance(&self, resource: &CloudResource) -> Result<()> {
        self.ec2
            .terminate_instances()
            .instance_ids(&resource.id)
            .send()
            .await
            .map_err(|e| from_sdk(resource, e))?;

        // Volumes and security groups stay in use until the instance is gone
        let ec2 = &self.ec2;
        self.wait_for(resource, "terminate", move || async move {
            match ec2
                .describe_instances()
                .instance_ids(&resource.id)
                .send()
                .await
            {
                Ok(resp) => Ok(resp
                    .reservations()
                    .iter()
                    .flat_map(|r| r.instances())
                    .all(|i| {
                        matches!(
                            i.state().and_then(|s| s.name()),
                            Some(InstanceStateName::Terminated)
                        )
                    })),
                Err(e) if error_code(&e).is_some_and(|c| c.ends_with(".NotFound")) => Ok(true),
                Err(e) => Err(from_sdk(resource, e)),
            }
        })
        .await
    }

    /// Force delete terminates the group's instances too
    async fn delete_autoscaling_group(&self, resource: &CloudResource) -> Result<()> {
        self.autoscaling
            .delete_auto_scaling_group()
            .auto_scaling_group_name(&resource.id)
            .force_delete(true)
            .send()
            .await
            .map_err(|e| from_sdk(resource, e))?;

        let autoscaling = &self.autoscaling;
        self.wait_for(resource, "be deleted", move || async move {
            let resp = autoscaling
                .describe_auto_scaling_groups()
                .auto_scaling_group_names(&resource.id)
                .send()
                .await
                .map_err(|e| from_sdk(resource, e))?;
            Ok(resp.auto_scaling_groups().is_empty())
        })
        .await
    }

    async fn delete_load_balancer(&self, resource: &CloudResource) -> Result<()> {
        self.elb
            .delete_load_balancer()
            .load_balancer_name(&resource.id)
            .send()
            .await
            .map_err(|e| from_sdk(resource, e))?;

        // The balancer's network interfaces keep its subnets and security groups in use
        let ec2 = &self.ec2;
        let interfaces = Filter::builder()
            .name("description")
            .values(format!("ELB {}", resource.id))
            .build();
        self.wait_for(resource, "release its network interfaces", move || {
            let interfaces = interfaces.clone();
            async move {
                let resp = ec2
                    .describe_network_interfaces()
                    .filters(interfaces)
                    .send()
                    .await
                    .map_err(|e| from_sdk(resource, e))?;
                Ok(resp.network_interfaces().is_empty())
            }
        })
        .await
    }

    async fn delete_internet_gateway(&self, resource: &CloudResource) -> Result<()> {
        let resp = self
            .ec2
            .describe_internet_gateways()
            .internet_gateway_ids(&resource.id)
            .send()
            .await
            .map_err(|e| from_sdk(resource, e))?;

        let attached: Vec<String> = resp
            .internet_gateways()
            .iter()
            .flat_map(|g| g.attachments())
            .filter_map(|a| a.vpc_id().map(str::to_string))
            .collect();

        for vpc_id in attached {
            tracing::debug!("Detaching {} from {}", resource, vpc_id);
            match self
                .ec2
                .detach_internet_gateway()
                .internet_gateway_id(&resource.id)
                .vpc_id(&vpc_id)
                .send()
                .await
            {
                Ok(_) => {}
                Err(e) if error_code(&e) == Some("Gateway.NotAttached") => {}
                Err(e) => return Err(from_sdk(resource, e)),
            }
        }

        self.ec2
            .delete_internet_gateway()
            .internet_gateway_id(&resource.id)
            .send()
            .await
            .map_err(|e| from_sdk(resource, e))?;
        Ok(())
    }
}

#[async_trait]
impl CloudProvider for AwsCloudProvider {
    fn name(&self) -> &str {
        "aws"
    }

    async fn list_resources(&self, cluster: &ClusterIdentity) -> Result<Vec<CloudResource>> {
        if let Some(region) = cluster.region.as_deref().filter(|r| *r != self.region) {
            return Err(CloudError::InvalidConfig(format!(
                "provider is bound to region {}, not {}",
                self.region, region
            )));
        }

        let filter = cluster_filter(&cluster.name);
        let mut resources = Vec::new();
        self.list_autoscaling_groups(&cluster.name, &mut resources)
            .await?;
        self.list_load_balancers(&cluster.name, &mut resources)
            .await?;
        self.list_instances(&filter, &mut resources).await?;
        self.list_volumes(&filter, &mut resources).await?;
        self.list_network(&filter, &mut resources).await?;
        drop_group_members(&mut resources);

        tracing::debug!(
            "Listed {} tagged resources in {}",
            resources.len(),
            self.region
        );
        Ok(resources)
    }

    async fn delete_resource(&self, resource: &CloudResource) -> Result<()> {
        tracing::debug!("Deleting {}", resource);
        let id = resource.id.as_str();

        match resource.resource_type.as_str() {
            AUTOSCALING_GROUP => self.delete_autoscaling_group(resource).await,
            LOAD_BALANCER => self.delete_load_balancer(resource).await,
            INSTANCE => self.terminate_instance(resource).await,
            INTERNET_GATEWAY => self.delete_internet_gateway(resource).await,
            VOLUME => self
                .ec2
                .delete_volume()
                .volume_id(id)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| from_sdk(resource, e)),
            SECURITY_GROUP => self
                .ec2
                .delete_security_group()
                .group_id(id)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| from_sdk(resource, e)),
            SUBNET => self
                .ec2
                .delete_subnet()
                .subnet_id(id)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| from_sdk(resource, e)),
            ROUTE_TABLE => self
                .ec2
                .delete_route_table()
                .route_table_id(id)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| from_sdk(resource, e)),
            VPC => self
                .ec2
                .delete_vpc()
                .vpc_id(id)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| from_sdk(resource, e)),
            other => Err(CloudError::UnsupportedResource(other.to_string())),
        }
    }
}

/// `tag:KubernetesCluster=<name>`
fn cluster_filter(cluster: &str) -> Filter {
    Filter::builder()
        .name(format!("tag:{}", CLUSTER_TAG))
        .values(cluster)
        .build()
}

/// Accepts SDK accessors whether they return `&str` or `Option<&str>`
fn opt<'a>(value: impl Into<Option<&'a str>>) -> Option<&'a str> {
    value.into()
}

fn ec2_tags(tags: &[Tag]) -> impl Iterator<Item = (&str, &str)> {
    tags.iter().filter_map(|t| Some((t.key()?, t.value()?)))
}

/// Instances launched by a discovered group go away with the group.
/// Terminating them directly would only make the group launch replacements.
fn drop_group_members(resources: &mut Vec<CloudResource>) {
    let groups: BTreeSet<String> = resources
        .iter()
        .filter(|r| r.resource_type == AUTOSCALING_GROUP)
        .map(|r| r.id.clone())
        .collect();
    resources.retain(|r| {
        r.resource_type != INSTANCE
            || !r.tags.get(GROUP_MEMBER_TAG).is_some_and(|g| groups.contains(g))
    });
}

fn push<'a>(
    out: &mut Vec<CloudResource>,
    resource_type: &str,
    id: Option<&str>,
    tags: impl IntoIterator<Item = (&'a str, &'a str)>,
) {
    if let Some(resource) = to_resource(resource_type, id, tags) {
        out.push(resource);
    }
}

fn to_resource<'a>(
    resource_type: &str,
    id: Option<&str>,
    tags: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Option<CloudResource> {
    let mut resource = CloudResource::new(resource_type, id?);
    for (key, value) in tags {
        resource = resource.with_tag(key, value);
    }
    if let Some(name) = resource.tags.get("Name").cloned() {
        resource.name = name;
    }
    Some(resource)
}
