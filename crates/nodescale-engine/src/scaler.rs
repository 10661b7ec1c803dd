//! Scale orchestration.
//!
//! `Planner` resolves the request against the stored api model and the
//! provider inventory. `Scaler` carries the plan out and mirrors the new
//! count back into the api model.

use std::sync::Arc;

use nodescale_core::{AgentPoolProfile, ClusterSnapshot, NameParser, ScaleSettings, normalize_region};
use nodescale_state::ModelStore;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::drain::DrainCoordinator;
use crate::error::{DeletionFailures, ScaleError, ScaleResult};
use crate::inventory::{InventoryScanner, NodeInventory, PoolMatcher};
use crate::plan::{Direction, ScalePlan};
use crate::provider::{ComputeClient, NodeDrainer, TemplateGenerator};
use crate::template::{TemplateOverrides, deployment_name};

/// One scale invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleRequest {
    /// Pool to scale. May be omitted when the cluster has a single pool.
    pub pool: Option<String>,
    pub desired_count: u32,
    pub subscription_id: String,
    pub resource_group: String,
    pub location: String,
    /// Master FQDN used to drain nodes on scale-down.
    pub drain_endpoint: Option<String>,
}

/// Everything discovery produced for one request.
#[derive(Debug, Clone)]
pub struct PlannedScale {
    pub snapshot: ClusterSnapshot,
    pub pool: AgentPoolProfile,
    pub inventory: NodeInventory,
    pub plan: ScalePlan,
}

/// What a completed scale operation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleOutcome {
    pub pool: String,
    pub plan: ScalePlan,
    /// VMs drained and deleted.
    pub removed: Vec<String>,
    /// Name of the submitted deployment, if any.
    pub deployment: Option<String>,
}

pub struct Planner {
    compute: Arc<dyn ComputeClient>,
    store: ModelStore,
    settings: ScaleSettings,
}

impl Planner {
    pub fn new(compute: Arc<dyn ComputeClient>, store: ModelStore) -> Self {
        Self {
            compute,
            store,
            settings: ScaleSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ScaleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ScaleSettings {
        &self.settings
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Discover the pool's nodes and compute the plan. Touches nothing.
    pub async fn plan(&self, request: &ScaleRequest) -> ScaleResult<PlannedScale> {
        let model = self.store.load().map_err(ScaleError::Model)?;
        let mut snapshot = ClusterSnapshot::new(model)?;
        resolve_location(&mut snapshot, &request.location)?;
        let pool = resolve_pool(&snapshot, request.pool.as_deref())?.clone();

        debug!(
            pool = %pool.name,
            name_suffix = %snapshot.name_suffix(),
            location = %snapshot.location(),
            "resolved scale target"
        );

        let parser = NameParser::with_windows_publisher(&self.settings.windows_publisher)?;
        let matcher = PoolMatcher::new(&pool.name, snapshot.name_suffix());
        let scanner = InventoryScanner::new(&parser, matcher, &request.resource_group);

        let inventory = if pool.is_availability_set() {
            let mut pager = self
                .compute
                .list_virtual_machines(&request.resource_group)
                .await
                .map_err(|source| ScaleError::ListingFailure {
                    kind: "virtual machines",
                    resource_group: request.resource_group.clone(),
                    source,
                })?;
            scanner.scan_virtual_machines(pager.as_mut()).await?
        } else {
            let mut pager = self
                .compute
                .list_scale_sets(&request.resource_group)
                .await
                .map_err(|source| ScaleError::ListingFailure {
                    kind: "scale sets",
                    resource_group: request.resource_group.clone(),
                    source,
                })?;
            scanner.scan_scale_sets(pager.as_mut()).await?
        };

        if let Some((index, first, second)) = inventory.duplicates().first() {
            return Err(ScaleError::DuplicateNodeIndex {
                pool: pool.name.clone(),
                index: *index,
                first: first.clone(),
                second: second.clone(),
            });
        }

        let plan = ScalePlan::compute(&inventory, request.desired_count)?;
        info!(
            pool = %pool.name,
            direction = ?plan.direction,
            current = plan.current_count,
            desired = plan.desired_count,
            "scale plan computed"
        );

        Ok(PlannedScale {
            snapshot,
            pool,
            inventory,
            plan,
        })
    }
}

/// Applies scale plans.
pub struct Scaler {
    planner: Planner,
    drainer: Arc<dyn NodeDrainer>,
    generator: Arc<dyn TemplateGenerator>,
}

impl Scaler {
    pub fn new(
        planner: Planner,
        drainer: Arc<dyn NodeDrainer>,
        generator: Arc<dyn TemplateGenerator>,
    ) -> Self {
        Self {
            planner,
            drainer,
            generator,
        }
    }

    /// Dry run: discovery and planning only.
    pub async fn plan(&self, request: &ScaleRequest) -> ScaleResult<PlannedScale> {
        self.planner.plan(request).await
    }

    /// Bring the pool to `request.desired_count`.
    ///
    /// Idempotent: when the pool is already at the desired count nothing
    /// is touched. A `PersistenceFailure` means the infrastructure did
    /// change.
    pub async fn scale(&self, request: &ScaleRequest) -> ScaleResult<ScaleOutcome> {
        match self.planner.settings.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(request))
                .await
                .map_err(|_| ScaleError::Timeout(limit))?,
            None => self.run(request).await,
        }
    }

    async fn run(&self, request: &ScaleRequest) -> ScaleResult<ScaleOutcome> {
        let planned = self.planner.plan(request).await?;
        let mut outcome = ScaleOutcome {
            pool: planned.pool.name.clone(),
            plan: planned.plan.clone(),
            removed: Vec::new(),
            deployment: None,
        };

        match planned.plan.direction {
            Direction::NoOp => {
                info!(pool = %outcome.pool, count = planned.plan.current_count, "pool already at desired count");
                return Ok(outcome);
            }
            Direction::ScaleDown if planned.pool.is_availability_set() => {
                outcome.removed = self.remove_nodes(request, &planned).await?;
            }
            _ => {
                outcome.deployment = Some(self.deploy(request, &planned).await?);
            }
        }

        self.planner
            .store
            .persist_pool_count(&planned.pool.name, request.desired_count)
            .map_err(|e| {
                warn!(pool = %planned.pool.name, error = %e, "api model not updated");
                ScaleError::PersistenceFailure(e)
            })?;

        info!(
            pool = %outcome.pool,
            from = planned.plan.current_count,
            to = request.desired_count,
            "pool scaled"
        );
        Ok(outcome)
    }

    /// Drain then delete the planned VMs. Nothing is deleted unless
    /// every node drained.
    async fn remove_nodes(
        &self,
        request: &ScaleRequest,
        planned: &PlannedScale,
    ) -> ScaleResult<Vec<String>> {
        let endpoint = request
            .drain_endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ScaleError::DrainEndpointRequired(planned.pool.name.clone()))?;
        let vm_names = &planned.plan.to_remove;

        if planned.snapshot.is_kubernetes() {
            let kube_config = self
                .generator
                .kube_config(planned.snapshot.model(), planned.snapshot.location())
                .map_err(ScaleError::KubeConfig)?;
            let settings = &self.planner.settings;
            DrainCoordinator::new(Arc::clone(&self.drainer))
                .with_timeout(settings.drain_timeout)
                .with_max_concurrent(settings.max_concurrent_drains)
                .drain(endpoint, &kube_config, vm_names)
                .await?;
        }

        info!(nodes = vm_names.len(), "deleting nodes");
        let failures = self
            .planner
            .compute
            .delete_virtual_machines(&request.subscription_id, &request.resource_group, vm_names)
            .await;
        if !failures.is_empty() {
            return Err(DeletionFailures { failures }.into());
        }

        Ok(vm_names.clone())
    }

    /// Generate, parameterize and submit a deployment for the pool.
    async fn deploy(&self, request: &ScaleRequest, planned: &PlannedScale) -> ScaleResult<String> {
        let PlannedScale {
            snapshot,
            pool,
            inventory,
            plan,
        } = planned;

        let model = snapshot.template_model(pool, plan.template_count);
        let mut generated =
            self.generator
                .generate(&model)
                .map_err(|source| ScaleError::TemplateGenerationFailure {
                    pool: pool.name.clone(),
                    source,
                })?;

        let kubernetes = snapshot.is_kubernetes();
        let overrides = TemplateOverrides {
            pool_name: pool.name.clone(),
            template_count: plan.template_count,
            pool_slot: inventory
                .pool_slot()
                .map(|slot| (slot, pool.vm_name_prefix(snapshot.name_suffix(), slot))),
            kubernetes,
            index_offset: plan.index_offset.filter(|_| kubernetes),
        };
        overrides.apply(&mut generated)?;

        let name = deployment_name(&request.resource_group);
        info!(deployment = %name, pool = %pool.name, count = plan.template_count, "submitting deployment");
        self.planner
            .compute
            .deploy_template(
                &request.resource_group,
                &name,
                &generated.template,
                &generated.parameters,
            )
            .await
            .map_err(|source| ScaleError::DeploymentFailure {
                name: name.clone(),
                source,
            })?;

        Ok(name)
    }
}

fn resolve_location(snapshot: &mut ClusterSnapshot, requested: &str) -> ScaleResult<()> {
    let requested = normalize_region(requested);
    if requested.is_empty() {
        return Ok(());
    }
    let model = normalize_region(snapshot.location());
    if model.is_empty() {
        snapshot.set_location(&requested);
        return Ok(());
    }
    if model != requested {
        return Err(ScaleError::LocationMismatch { requested, model });
    }
    Ok(())
}

fn resolve_pool<'a>(
    snapshot: &'a ClusterSnapshot,
    requested: Option<&str>,
) -> ScaleResult<&'a AgentPoolProfile> {
    match requested {
        Some(name) => snapshot
            .pool(name)
            .ok_or_else(|| ScaleError::PoolNotFound(name.to_string())),
        None => match snapshot.pools() {
            [] => Err(ScaleError::NoPools),
            [only] => Ok(only),
            _ => Err(ScaleError::PoolRequired),
        },
    }
}
