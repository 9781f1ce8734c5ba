//! Cluster document model

use crate::cidr;
use crate::error::{ClusterError, Result};
use crate::model::CloudPermissions;
use serde::{Deserialize, Serialize};

pub const DEFAULT_NETWORK_CIDR: &str = "172.20.0.0/16";
pub const DEFAULT_NON_MASQUERADE_CIDR: &str = "100.64.0.0/10";

/// Persisted desired state of a cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: ClusterSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Cloud provider to use (aws, gce)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cloud_provider: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubernetes_version: String,

    /// Zones the cluster spans
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zones: Vec<ZoneSpec>,

    /// Cloud project, required on GCE
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_permissions: Option<CloudPermissions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_permissions: Option<CloudPermissions>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub master_public_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub master_internal_name: String,

    /// Real network range of the VPC / network, not the internal k8s network
    #[serde(
        default,
        rename = "networkCIDR",
        skip_serializing_if = "String::is_empty"
    )]
    pub network_cidr: String,

    /// Identifier of an existing network to share (e.g. an AWS VPC)
    #[serde(default, rename = "networkID", skip_serializing_if = "String::is_empty")]
    pub network_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_store: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_store: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub config_store: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dns_zone: String,

    #[serde(
        default,
        rename = "clusterDNSDomain",
        skip_serializing_if = "String::is_empty"
    )]
    pub cluster_dns_domain: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multizone: Option<bool>,

    #[serde(
        default,
        rename = "serviceClusterIPRange",
        skip_serializing_if = "String::is_empty"
    )]
    pub service_cluster_ip_range: String,

    /// Internal k8s network for pods and services
    #[serde(
        default,
        rename = "nonMasqueradeCIDR",
        skip_serializing_if = "String::is_empty"
    )]
    pub non_masquerade_cidr: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub etcd_clusters: Vec<EtcdClusterSpec>,

    #[serde(default, rename = "kubeDNS", skip_serializing_if = "Option::is_none")]
    pub kube_dns: Option<KubeDnsConfig>,
}

/// A zone and the subnet it hosts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cidr: String,
}

impl ZoneSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cidr: String::new(),
        }
    }

    pub fn with_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.cidr = cidr.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EtcdClusterSpec {
    /// main, events, ...
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, rename = "etcdMembers", skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<EtcdMemberSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdMemberSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub volume_type: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub volume_size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KubeDnsConfig {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub replicas: u32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,

    #[serde(default, rename = "serverIP", skip_serializing_if = "String::is_empty")]
    pub server_ip: String,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl Cluster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta { name: name.into() },
            spec: ClusterSpec::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Whether the cluster reuses an externally supplied network
    pub fn shared_vpc(&self) -> bool {
        !self.spec.network_id.is_empty()
    }

    /// Fills in values that are required and immutable once set: network
    /// defaults and per-zone subnet ranges.
    pub fn perform_assignments(&mut self) -> Result<()> {
        if self.spec.network_cidr.is_empty() && !self.shared_vpc() {
            self.spec.network_cidr = DEFAULT_NETWORK_CIDR.to_string();
        }

        if self.spec.non_masquerade_cidr.is_empty() {
            self.spec.non_masquerade_cidr = DEFAULT_NON_MASQUERADE_CIDR.to_string();
        }

        if self.spec.zones.iter().all(|z| !z.cidr.is_empty()) {
            return Ok(());
        }

        cidr::assign_all(&self.spec.network_cidr, &mut self.spec.zones)
    }

    /// Region derived from the zone names (`us-east-1a` -> `us-east-1`)
    pub fn region(&self) -> Result<String> {
        let mut region: Option<&str> = None;

        for zone in &self.spec.zones {
            let name = zone.name.as_str();
            let Some((last, _)) = name.char_indices().last() else {
                return Err(ClusterError::config("zone with empty name"));
            };
            let zone_region = &name[..last];

            match region {
                None => region = Some(zone_region),
                Some(r) if r == zone_region => {}
                Some(r) => {
                    return Err(ClusterError::config(format!(
                        "zones span multiple regions: {:?} and {:?}",
                        r, zone_region
                    )));
                }
            }
        }

        region
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ClusterError::config("unable to determine region: no zones configured"))
    }
}
