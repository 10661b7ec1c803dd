//! Collaborator interfaces.
//!
//! The engine drives these; implementations wrap the real cloud SDK,
//! the orchestrator's drain logic and the template generator. All return
//! `anyhow::Result` so implementations can attach their own context.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use nodescale_core::ClusterModel;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A virtual machine as returned by the provider listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    pub name: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Publisher of the OS image reference, if any.
    #[serde(default)]
    pub image_publisher: Option<String>,
}

/// A scale set as returned by the provider listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleSet {
    pub name: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub image_publisher: Option<String>,
    /// Current instance count.
    pub capacity: u32,
}

/// A paged listing. `Ok(None)` means the listing is exhausted.
#[async_trait]
pub trait Pager<T>: Send {
    async fn next_page(&mut self) -> anyhow::Result<Option<Vec<T>>>;
}

/// Per-VM failure from a batch deletion.
#[derive(Debug)]
pub struct VmDeletionError {
    pub name: String,
    pub error: anyhow::Error,
}

/// Generated deployment document and its parameters.
///
/// Both are kept as loose JSON; the generator owns their schema.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedTemplate {
    pub template: Value,
    pub parameters: Value,
}

/// Provider compute API: listing, deletion, deployment.
#[async_trait]
pub trait ComputeClient: Send + Sync {
    async fn list_virtual_machines(
        &self,
        resource_group: &str,
    ) -> anyhow::Result<Box<dyn Pager<VirtualMachine>>>;

    async fn list_scale_sets(&self, resource_group: &str)
    -> anyhow::Result<Box<dyn Pager<ScaleSet>>>;

    /// Delete VMs (and their disks / NICs). Returns every VM that failed.
    async fn delete_virtual_machines(
        &self,
        subscription_id: &str,
        resource_group: &str,
        vm_names: &[String],
    ) -> Vec<VmDeletionError>;

    async fn deploy_template(
        &self,
        resource_group: &str,
        deployment_name: &str,
        template: &Value,
        parameters: &Value,
    ) -> anyhow::Result<()>;
}

/// Safely evicts workloads off a node (cordon, respect disruption
/// budgets, wait for eviction).
#[async_trait]
pub trait NodeDrainer: Send + Sync {
    async fn drain(
        &self,
        endpoint: &str,
        kube_config: &str,
        vm_name: &str,
        timeout: Duration,
    ) -> anyhow::Result<()>;
}

/// Turns a cluster model into a deployment document.
pub trait TemplateGenerator: Send + Sync {
    fn generate(&self, model: &ClusterModel) -> anyhow::Result<GeneratedTemplate>;

    /// Admin kubeconfig used to drain nodes.
    fn kube_config(&self, model: &ClusterModel, location: &str) -> anyhow::Result<String>;
}

/// A pager over pages already in memory.
#[derive(Debug, Clone)]
pub struct StaticPager<T> {
    pages: std::collections::VecDeque<Vec<T>>,
}

impl<T> StaticPager<T> {
    pub fn new(pages: Vec<Vec<T>>) -> Self {
        Self {
            pages: pages.into(),
        }
    }

    pub fn single(items: Vec<T>) -> Self {
        Self::new(vec![items])
    }
}

#[async_trait]
impl<T: Send> Pager<T> for StaticPager<T> {
    async fn next_page(&mut self) -> anyhow::Result<Option<Vec<T>>> {
        Ok(self.pages.pop_front())
    }
}
