//! Drain coordinator: evicts workloads off every node scheduled for
//! removal before any of them is deleted.
//!
//! One task per node, at most `max_concurrent` draining at once. Results
//! come back over a channel sized to the batch, and the coordinator waits
//! for every node before deciding. A single failure fails the whole batch
//! and the error lists every node that failed.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use nodescale_core::config::{DEFAULT_DRAIN_TIMEOUT, DEFAULT_MAX_CONCURRENT_DRAINS};
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::provider::NodeDrainer;

/// Why a node did not drain.
#[derive(Debug, Error)]
pub enum DrainFailureCause {
    #[error("{0:#}")]
    Failed(anyhow::Error),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The drain task ended without reporting.
    #[error("drain task aborted")]
    Aborted,
}

/// Result of draining one node.
#[derive(Debug)]
pub struct DrainOutcome {
    pub vm_name: String,
    pub failure: Option<DrainFailureCause>,
}

impl DrainOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Every node that failed to drain in a batch.
#[derive(Debug)]
pub struct DrainFailures {
    pub total: usize,
    pub failures: Vec<DrainOutcome>,
}

impl fmt::Display for DrainFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} node(s) failed to drain", self.failures.len(), self.total)?;
        for outcome in &self.failures {
            if let Some(cause) = &outcome.failure {
                write!(f, "; node {:?}: {cause}", outcome.vm_name)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for DrainFailures {}

pub struct DrainCoordinator {
    drainer: Arc<dyn NodeDrainer>,
    timeout: Duration,
    max_concurrent: usize,
}

impl DrainCoordinator {
    pub fn new(drainer: Arc<dyn NodeDrainer>) -> Self {
        Self {
            drainer,
            timeout: DEFAULT_DRAIN_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT_DRAINS,
        }
    }

    /// Per-node drain timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Drain every VM in `vm_names`. Succeeds only if all of them drained.
    ///
    /// Dropping the returned future aborts every drain still in flight.
    pub async fn drain(
        &self,
        endpoint: &str,
        kube_config: &str,
        vm_names: &[String],
    ) -> Result<(), DrainFailures> {
        let total = vm_names.len();
        if total == 0 {
            return Ok(());
        }

        let endpoint: Arc<str> = Arc::from(master_url(endpoint));
        let kube_config: Arc<str> = Arc::from(kube_config);
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let (tx, mut rx) = mpsc::channel::<DrainOutcome>(total);
        let mut tasks = JoinSet::new();

        info!(nodes = total, max_concurrent = self.max_concurrent, %endpoint, "draining nodes");

        for vm_name in vm_names {
            let tx = tx.clone();
            let drainer = Arc::clone(&self.drainer);
            let permits = Arc::clone(&permits);
            let endpoint = Arc::clone(&endpoint);
            let kube_config = Arc::clone(&kube_config);
            let vm_name = vm_name.clone();
            let timeout = self.timeout;

            tasks.spawn(async move {
                let failure = match permits.acquire_owned().await {
                    Ok(permit) => {
                        let result = tokio::time::timeout(
                            timeout,
                            drainer.drain(&endpoint, &kube_config, &vm_name, timeout),
                        )
                        .await;
                        drop(permit);
                        match result {
                            Ok(Ok(())) => None,
                            Ok(Err(e)) => Some(DrainFailureCause::Failed(e)),
                            Err(_) => Some(DrainFailureCause::TimedOut(timeout)),
                        }
                    }
                    Err(_) => Some(DrainFailureCause::Aborted),
                };

                if let Some(cause) = &failure {
                    error!(vm = %vm_name, error = %cause, "failed to drain node");
                }
                // Capacity equals the batch size, so this never waits.
                let _ = tx.send(DrainOutcome { vm_name, failure }).await;
            });
        }
        drop(tx);

        let mut reported = HashSet::with_capacity(total);
        let mut failures = Vec::new();
        while let Some(outcome) = rx.recv().await {
            reported.insert(outcome.vm_name.clone());
            if !outcome.is_success() {
                failures.push(outcome);
            }
        }

        // A task that panicked drops its sender without reporting.
        for vm_name in vm_names {
            if !reported.contains(vm_name) {
                error!(vm = %vm_name, "drain task ended without reporting");
                failures.push(DrainOutcome {
                    vm_name: vm_name.clone(),
                    failure: Some(DrainFailureCause::Aborted),
                });
            }
        }

        if failures.is_empty() {
            info!(nodes = total, "all nodes drained");
            Ok(())
        } else {
            Err(DrainFailures { total, failures })
        }
    }
}

/// Drain endpoints are always https.
fn master_url(endpoint: &str) -> String {
    if endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}
