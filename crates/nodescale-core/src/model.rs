//! Cluster model types.
//!
//! `ClusterModel` mirrors the on-disk api model document. Every struct
//! keeps unknown keys in a flattened `extra` map so that a load/save
//! round trip only changes the fields this crate touches.
//!
//! `ClusterSnapshot` is the per-invocation view the scaler works from:
//! the loaded model plus the derived cluster name suffix.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::SnapshotError;

/// Orchestrator type string for Kubernetes clusters.
pub const KUBERNETES: &str = "Kubernetes";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterModel {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    pub properties: ClusterProperties,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterProperties {
    pub orchestrator_profile: OrchestratorProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_profile: Option<MasterProfile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_pool_profiles: Vec<AgentPoolProfile>,
    /// Explicit cluster name suffix. Derived from the DNS prefix when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_suffix: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorProfile {
    pub orchestrator_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MasterProfile {
    pub dns_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One worker pool.
///
/// Profile fields the file leaves out stay `None` so a save writes back
/// only what was read. The accessors apply the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolProfile {
    pub name: String,
    pub count: u32,
    #[serde(
        default,
        rename = "availabilityProfile",
        skip_serializing_if = "Option::is_none"
    )]
    pub aggregation: Option<AggregationMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_profile: Option<StorageMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<OsFlavor>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How a pool's VMs are grouped at the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregationMode {
    /// Individually addressed VMs.
    #[default]
    AvailabilitySet,
    /// One scale set whose capacity is the pool size.
    #[serde(rename = "VirtualMachineScaleSets")]
    ScaleSet,
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageMode {
    #[default]
    ManagedDisks,
    StorageAccount,
    Ephemeral,
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OsFlavor {
    #[default]
    Linux,
    Windows,
    #[serde(untagged)]
    Other(String),
}

impl AgentPoolProfile {
    pub fn aggregation(&self) -> AggregationMode {
        self.aggregation.clone().unwrap_or_default()
    }

    pub fn storage_profile(&self) -> StorageMode {
        self.storage_profile.clone().unwrap_or_default()
    }

    pub fn os_type(&self) -> OsFlavor {
        self.os_type.clone().unwrap_or_default()
    }

    /// Unrecognized availability profiles are addressed VM by VM.
    pub fn is_availability_set(&self) -> bool {
        self.aggregation() != AggregationMode::ScaleSet
    }

    pub fn is_windows(&self) -> bool {
        self.os_type() == OsFlavor::Windows
    }

    /// Name prefix shared by the pool's VMs.
    ///
    /// Windows names only have room for four suffix characters and a
    /// two-digit pool slot.
    pub fn vm_name_prefix(&self, name_suffix: &str, pool_slot: u32) -> String {
        if self.is_windows() {
            let short = name_suffix.get(..4).unwrap_or(name_suffix);
            format!("{short}k8s{pool_slot:02}")
        } else {
            format!("k8s-{}-{}-", self.name, name_suffix)
        }
    }
}

impl ClusterModel {
    pub fn is_kubernetes(&self) -> bool {
        self.properties.orchestrator_profile.orchestrator_type == KUBERNETES
    }

    pub fn pool_position(&self, name: &str) -> Option<usize> {
        self.properties
            .agent_pool_profiles
            .iter()
            .position(|p| p.name == name)
    }
}

/// The cluster as loaded for one scale operation.
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    model: ClusterModel,
    name_suffix: String,
}

impl ClusterSnapshot {
    pub fn new(model: ClusterModel) -> Result<Self, SnapshotError> {
        let name_suffix = match (&model.properties.name_suffix, &model.properties.master_profile) {
            (Some(suffix), _) if !suffix.is_empty() => suffix.clone(),
            (_, Some(master)) if !master.dns_prefix.is_empty() => {
                derive_name_suffix(&master.dns_prefix)
            }
            _ => return Err(SnapshotError::MissingClusterIdentity),
        };
        Ok(Self { model, name_suffix })
    }

    pub fn model(&self) -> &ClusterModel {
        &self.model
    }

    pub fn location(&self) -> &str {
        &self.model.location
    }

    pub fn set_location(&mut self, location: &str) {
        self.model.location = location.to_string();
    }

    /// Suffix that marks the cluster's resources in the resource group.
    pub fn name_suffix(&self) -> &str {
        &self.name_suffix
    }

    pub fn is_kubernetes(&self) -> bool {
        self.model.is_kubernetes()
    }

    pub fn pools(&self) -> &[AgentPoolProfile] {
        &self.model.properties.agent_pool_profiles
    }

    pub fn pool(&self, name: &str) -> Option<&AgentPoolProfile> {
        self.pools().iter().find(|p| p.name == name)
    }

    /// A copy of the model reduced to one pool with its count replaced.
    ///
    /// This is what the template generator sees. The snapshot itself is
    /// left untouched.
    pub fn template_model(&self, pool: &AgentPoolProfile, count: u32) -> ClusterModel {
        let mut model = self.model.clone();
        let mut pool = pool.clone();
        pool.count = count;
        model.properties.agent_pool_profiles = vec![pool];
        model.properties.name_suffix = Some(self.name_suffix.clone());
        model
    }
}

/// Derive the cluster name suffix from the master DNS prefix.
///
/// The first eight hex digits of the prefix's SHA-256, so it also fits
/// the eight-hex-digit slot of Linux VM names.
pub fn derive_name_suffix(dns_prefix: &str) -> String {
    let digest = Sha256::digest(dns_prefix.as_bytes());
    hex::encode(digest)[..8].to_string()
}

/// Normalize a region name: lower case, no spaces ("West US 2" → "westus2").
pub fn normalize_region(region: &str) -> String {
    region
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}
