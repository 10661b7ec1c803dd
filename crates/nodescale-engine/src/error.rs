//! Scale error types.

use std::fmt;
use std::time::Duration;

use nodescale_core::{IdentityError, SnapshotError};
use nodescale_state::ModelError;
use thiserror::Error;

use crate::drain::DrainFailures;
use crate::provider::VmDeletionError;
use crate::template::TemplateError;

pub type ScaleResult<T> = Result<T, ScaleError>;

/// Errors from a scale operation, one variant per failing stage.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("failed to load existing api model: {0}")]
    Model(#[source] ModelError),

    #[error("failed to load existing api model: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("--location {requested} does not match api model location {model}")]
    LocationMismatch { requested: String, model: String },

    #[error("node pool {0} was not found in the deployed api model")]
    PoolNotFound(String),

    #[error("--node-pool is required if more than one agent pool is defined in the cluster")]
    PoolRequired,

    #[error("no node pools found to scale")]
    NoPools,

    #[error(transparent)]
    UnparseableIdentity(#[from] IdentityError),

    #[error("failed to list {kind} in resource group {resource_group}: {source:#}")]
    ListingFailure {
        kind: &'static str,
        resource_group: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("the resource group {resource_group} does not contain any {kind}")]
    EmptyResourceGroup {
        kind: &'static str,
        resource_group: String,
    },

    #[error("nodes {first:?} and {second:?} of pool {pool} share index {index}")]
    DuplicateNodeIndex {
        pool: String,
        index: u32,
        first: String,
        second: String,
    },

    #[error("node index arithmetic overflows past highest index {highest} with desired count {desired}")]
    IndexOverflow { highest: u32, desired: u32 },

    #[error("a drain endpoint (master FQDN) is required to scale down pool {0}")]
    DrainEndpointRequired(String),

    #[error("failed to generate kube config: {0:#}")]
    KubeConfig(#[source] anyhow::Error),

    #[error("error while draining the nodes to be deleted: {0}")]
    DrainFailure(#[from] DrainFailures),

    #[error("{0}")]
    DeletionFailure(#[from] DeletionFailures),

    #[error("error generating template for pool {pool}: {source:#}")]
    TemplateGenerationFailure {
        pool: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("error transforming the template for scaling: {0}")]
    Template(#[from] TemplateError),

    #[error("deployment {name} failed: {source:#}")]
    DeploymentFailure {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("infrastructure updated but the api model was not saved: {0}")]
    PersistenceFailure(#[source] ModelError),

    #[error("scale operation did not finish within {0:?}")]
    Timeout(Duration),
}

impl ScaleError {
    /// False when the infrastructure change went through and only the
    /// api model mirror is stale.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ScaleError::PersistenceFailure(_))
    }
}

/// Every VM a batch deletion failed on.
#[derive(Debug)]
pub struct DeletionFailures {
    pub failures: Vec<VmDeletionError>,
}

impl fmt::Display for DeletionFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(
                f,
                "Node '{}' failed to delete with error: '{:#}'",
                failure.name, failure.error
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for DeletionFailures {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deletion_failures_name_every_vm() {
        let err = DeletionFailures {
            failures: vec![
                VmDeletionError {
                    name: "k8s-pool-1a2b3c4d-3".to_string(),
                    error: anyhow::anyhow!("disk busy"),
                },
                VmDeletionError {
                    name: "k8s-pool-1a2b3c4d-4".to_string(),
                    error: anyhow::anyhow!("nic locked"),
                },
            ],
        };
        let msg = ScaleError::from(err).to_string();
        assert!(msg.contains("k8s-pool-1a2b3c4d-3"));
        assert!(msg.contains("disk busy"));
        assert!(msg.contains("k8s-pool-1a2b3c4d-4"));
        assert!(msg.contains("nic locked"));
    }

    #[test]
    fn only_persistence_failure_is_non_fatal() {
        let persist = ScaleError::PersistenceFailure(ModelError::PoolNotFound("p".into()));
        assert!(!persist.is_fatal());
        assert!(ScaleError::NoPools.is_fatal());
        assert!(ScaleError::DrainEndpointRequired("p".into()).is_fatal());
    }
}
