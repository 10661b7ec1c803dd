//! Template parameterization for scale operations.
//!
//! The generator emits a deployment for a fresh cluster containing only
//! the pool being scaled. Before it can be submitted against the existing
//! resource group it gets:
//!
//! - `{pool}Count` set to the template count
//! - `{pool}Index` / `{pool}VMNamePrefix` pinned to the pool's existing
//!   Windows slot, when one was found
//! - Kubernetes only: master resources and the cluster NSG / route table
//!   stripped so the deployment leaves them alone
//! - Kubernetes availability sets only: `{pool}Offset` so new VM indices
//!   start past the highest existing one
//!
//! Documents stay untyped JSON and are edited through [`Patch`].

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::provider::GeneratedTemplate;

const RESOURCES: &str = "resources";
const DEPENDS_ON: &str = "dependsOn";

const VM_RESOURCE_TYPE: &str = "Microsoft.Compute/virtualMachines";
const VM_EXTENSION_TYPE: &str = "Microsoft.Compute/virtualMachines/extensions";
const NSG_RESOURCE_TYPE: &str = "Microsoft.Network/networkSecurityGroups";
const RT_RESOURCE_TYPE: &str = "Microsoft.Network/routeTables";
const NSG_ID: &str = "[variables('nsgID')]";
const RT_ID: &str = "[variables('routeTableID')]";
const MASTER_VM_PREFIX: &str = "variables('masterVMNamePrefix')";
const JUMPBOX_NSG: &str = "variables('jumpboxNetworkSecurityGroupName')";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template path {0} does not exist")]
    MissingPath(String),

    #[error("template path {0} is not an object")]
    NotAnObject(String),

    #[error("template has no resources array")]
    MissingResources,

    #[error("found no network security group in the template, there should have been 1")]
    NoNetworkSecurityGroup,

    #[error("found {count} resources with type {kind} in the template, there should only be 1")]
    DuplicateResource { kind: &'static str, count: usize },
}

/// Set one value at a JSON pointer. The parent must already exist and be
/// an object; the last segment is inserted or overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    parent: String,
    key: String,
    value: Value,
}

impl Patch {
    pub fn new(parent: &[&str], key: &str, value: Value) -> Self {
        let parent = parent
            .iter()
            .map(|s| format!("/{}", escape(s)))
            .collect::<String>();
        Self {
            parent,
            key: key.to_string(),
            value,
        }
    }

    /// A deployment parameter, wrapped as `{ "value": ... }`.
    pub fn parameter(name: &str, value: Value) -> Self {
        Self::new(&[], name, json!({ "value": value }))
    }

    /// A template variable.
    pub fn variable(name: &str, value: Value) -> Self {
        Self::new(&["variables"], name, value)
    }

    pub fn apply(&self, doc: &mut Value) -> Result<(), TemplateError> {
        let target = doc
            .pointer_mut(&self.parent)
            .ok_or_else(|| TemplateError::MissingPath(self.parent.clone()))?;
        let object = target
            .as_object_mut()
            .ok_or_else(|| TemplateError::NotAnObject(self.parent.clone()))?;
        object.insert(self.key.clone(), self.value.clone());
        Ok(())
    }
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Scale-specific values for one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateOverrides {
    pub pool_name: String,
    pub template_count: u32,
    /// Existing Windows slot and the VM name prefix that goes with it.
    pub pool_slot: Option<(u32, String)>,
    pub kubernetes: bool,
    pub index_offset: Option<u32>,
}

impl TemplateOverrides {
    pub fn apply(&self, generated: &mut GeneratedTemplate) -> Result<(), TemplateError> {
        let pool = &self.pool_name;

        Patch::parameter(&format!("{pool}Count"), json!(self.template_count))
            .apply(&mut generated.parameters)?;

        // The generator numbers the lone pool as slot 0.
        if let Some((slot, prefix)) = &self.pool_slot {
            Patch::variable(&format!("{pool}Index"), json!(slot)).apply(&mut generated.template)?;
            Patch::variable(&format!("{pool}VMNamePrefix"), json!(prefix))
                .apply(&mut generated.template)?;
            debug!(pool = %pool, slot, prefix = %prefix, "pinned pool slot");
        }

        if self.kubernetes {
            normalize_for_scale_up(&mut generated.template)?;
            if let Some(offset) = self.index_offset {
                Patch::parameter(&format!("{pool}Offset"), json!(offset))
                    .apply(&mut generated.parameters)?;
            }
        }

        info!(
            pool = %pool,
            count = self.template_count,
            offset = ?self.index_offset,
            "template parameterized for scaling"
        );
        Ok(())
    }
}

/// Adapt a fresh-cluster Kubernetes template for adding agent nodes.
///
/// Master VMs drop the fields that would force them to be reimaged, master
/// VM extensions go away, and the cluster NSG and route table are removed
/// along with every dependency on them.
pub fn normalize_for_scale_up(template: &mut Value) -> Result<(), TemplateError> {
    let resources = template
        .get_mut(RESOURCES)
        .and_then(Value::as_array_mut)
        .ok_or(TemplateError::MissingResources)?;

    let mut nsgs = Vec::new();
    let mut route_tables = Vec::new();
    let mut master_extensions = Vec::new();

    for (index, resource) in resources.iter_mut().enumerate() {
        let Some(resource) = resource.as_object_mut() else {
            continue;
        };
        let kind = resource.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
        let name = resource.get("name").and_then(Value::as_str).unwrap_or_default().to_string();

        match kind.as_str() {
            VM_RESOURCE_TYPE if name.contains(MASTER_VM_PREFIX) => {
                if let Some(properties) = resource.get_mut("properties") {
                    strip_master_vm(properties);
                }
            }
            VM_EXTENSION_TYPE if name.contains(MASTER_VM_PREFIX) => master_extensions.push(index),
            NSG_RESOURCE_TYPE if !name.contains(JUMPBOX_NSG) => nsgs.push(index),
            RT_RESOURCE_TYPE => route_tables.push(index),
            _ => {}
        }

        if let Some(deps) = resource.get_mut(DEPENDS_ON).and_then(Value::as_array_mut) {
            deps.retain(|d| {
                let d = d.as_str().unwrap_or_default();
                !(d.contains(NSG_RESOURCE_TYPE)
                    || d.contains(NSG_ID)
                    || d.contains(RT_RESOURCE_TYPE)
                    || d.contains(RT_ID))
            });
            if deps.is_empty() {
                resource.remove(DEPENDS_ON);
            }
        }
    }

    let nsg_index =
        single(&nsgs, NSG_RESOURCE_TYPE)?.ok_or(TemplateError::NoNetworkSecurityGroup)?;
    let mut remove = master_extensions;
    remove.push(nsg_index);
    match single(&route_tables, RT_RESOURCE_TYPE)? {
        Some(i) => remove.push(i),
        None => debug!("no route table in the template"),
    }
    remove.sort_unstable();
    remove.dedup();
    for index in remove.into_iter().rev() {
        resources.remove(index);
    }

    Ok(())
}

fn single(indices: &[usize], kind: &'static str) -> Result<Option<usize>, TemplateError> {
    match indices {
        [] => Ok(None),
        [index] => Ok(Some(*index)),
        _ => Err(TemplateError::DuplicateResource {
            kind,
            count: indices.len(),
        }),
    }
}

fn strip_master_vm(properties: &mut Value) {
    if let Some(hw) = properties.get_mut("hardwareProfile").and_then(Value::as_object_mut) {
        hw.remove("vmSize");
    }
    if let Some(os) = properties.get_mut("osProfile").and_then(Value::as_object_mut) {
        os.remove("customData");
    }
    if let Some(storage) = properties.get_mut("storageProfile").and_then(Value::as_object_mut) {
        storage.remove("imageReference");
    }
}

/// `{resource_group}-{random}`; the random part keeps repeated or
/// concurrent deployments against one resource group from colliding.
pub fn deployment_name(resource_group: &str) -> String {
    let mut buf = [0u8; 4];
    let suffix = match getrandom::getrandom(&mut buf) {
        Ok(()) => u32::from_le_bytes(buf) & 0x7fff_ffff,
        Err(_) => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos()
            & 0x7fff_ffff,
    };
    format!("{resource_group}-{suffix}")
}
