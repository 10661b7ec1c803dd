//! Offline inventory: a JSON export of a resource group's VMs and scale
//! sets, served through `ComputeClient` so the planner can run without
//! provider credentials.
//!
//! ```json
//! { "virtualMachines": [ { "name": "k8s-agentpool1-1a2b3c4d-0", "tags": { ... } } ],
//!   "scaleSets": [] }
//! ```

use std::path::Path;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::{
    ComputeClient, Pager, ScaleSet, StaticPager, VirtualMachine, VmDeletionError,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryExport {
    #[serde(default)]
    pub virtual_machines: Vec<VirtualMachine>,
    #[serde(default)]
    pub scale_sets: Vec<ScaleSet>,
}

impl InventoryExport {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read inventory {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse inventory {}", path.display()))
    }
}

#[async_trait]
impl ComputeClient for InventoryExport {
    async fn list_virtual_machines(
        &self,
        _resource_group: &str,
    ) -> anyhow::Result<Box<dyn Pager<VirtualMachine>>> {
        Ok(Box::new(StaticPager::single(self.virtual_machines.clone())))
    }

    async fn list_scale_sets(
        &self,
        _resource_group: &str,
    ) -> anyhow::Result<Box<dyn Pager<ScaleSet>>> {
        Ok(Box::new(StaticPager::single(self.scale_sets.clone())))
    }

    async fn delete_virtual_machines(
        &self,
        _subscription_id: &str,
        _resource_group: &str,
        vm_names: &[String],
    ) -> Vec<VmDeletionError> {
        vm_names
            .iter()
            .map(|name| VmDeletionError {
                name: name.clone(),
                error: anyhow::anyhow!("inventory export is read-only"),
            })
            .collect()
    }

    async fn deploy_template(
        &self,
        _resource_group: &str,
        deployment_name: &str,
        _template: &Value,
        _parameters: &Value,
    ) -> anyhow::Result<()> {
        bail!("inventory export is read-only, cannot deploy {deployment_name}")
    }
}
