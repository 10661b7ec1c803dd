//! nodescale-engine — agent pool scale reconciliation.
//!
//! Brings one agent pool to a desired node count against a cloud provider.
//!
//! # Flow
//!
//! ```text
//! Planner
//!   ├── ModelStore        load api model, resolve pool and location
//!   ├── InventoryScanner  page through VMs / scale sets, match the pool
//!   └── ScalePlan         NoOp | ScaleDown | ScaleUp (+ hole compensation)
//!
//! Scaler
//!   ├── ScaleDown → DrainCoordinator → ComputeClient::delete_virtual_machines
//!   ├── ScaleUp   → TemplateGenerator → template overrides → ComputeClient::deploy_template
//!   └── ModelStore::persist_pool_count (fresh reload, count only)
//! ```
//!
//! Provider access, node draining and template generation are traits in
//! [`provider`]; the engine never talks to a cloud API directly.

pub mod drain;
pub mod error;
pub mod export;
pub mod inventory;
pub mod plan;
pub mod provider;
pub mod scaler;
pub mod template;

pub use drain::{DrainCoordinator, DrainFailureCause, DrainFailures, DrainOutcome};
pub use error::{DeletionFailures, ScaleError, ScaleResult};
pub use export::InventoryExport;
pub use inventory::{InventoryScanner, NodeInventory, PoolMatcher};
pub use plan::{Direction, ScalePlan};
pub use provider::{
    ComputeClient, GeneratedTemplate, NodeDrainer, Pager, ScaleSet, StaticPager, TemplateGenerator,
    VirtualMachine, VmDeletionError,
};
pub use scaler::{PlannedScale, Planner, ScaleOutcome, ScaleRequest, Scaler};
pub use template::{Patch, TemplateError, TemplateOverrides};
