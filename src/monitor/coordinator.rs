//! Dispatch of newly observed chains to the verification context.

use crate::base::cterror::CtError;
use crate::ct::loglist::LogId;
use crate::monitor::counter::PendingCounter;
use crate::store::{CertificateStore, Fingerprint};
use crate::worker::WorkerHandle;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Result of verifying one new chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerdict {
    pub leaf: Fingerprint,
    /// Logs with a valid SCT for the leaf
    pub logs: BTreeSet<LogId>,
    /// Whether `logs` reached the configured threshold
    pub sufficient: bool,
}

/// Sole authority over the pending counter's increment/decrement pairing.
#[derive(Debug)]
pub struct VerificationCoordinator {
    worker: WorkerHandle,
    store: Arc<CertificateStore>,
    counter: PendingCounter,
    sct_threshold: usize,
}

impl VerificationCoordinator {
    pub fn new(
        worker: WorkerHandle,
        store: Arc<CertificateStore>,
        counter: PendingCounter,
        sct_threshold: usize,
    ) -> Self {
        Self {
            worker,
            store,
            counter,
            sct_threshold,
        }
    }

    pub fn worker(&self) -> &WorkerHandle {
        &self.worker
    }

    pub fn counter(&self) -> &PendingCounter {
        &self.counter
    }

    pub fn sct_threshold(&self) -> usize {
        self.sct_threshold
    }

    /// Verify a newly observed chain and record the outcome.
    ///
    /// The counter is incremented up front and only decremented when the
    /// leaf gathers at least `sct_threshold` valid SCTs. On any error the
    /// chain stays counted as unverified and nothing is merged.
    pub async fn dispatch_new_chain(
        &self,
        leaf: Vec<u8>,
        issuer: Vec<u8>,
    ) -> Result<ChainVerdict, CtError> {
        let fingerprint = Fingerprint::of(&leaf);
        let pending = self.counter.increment();
        tracing::debug!(leaf = %fingerprint, pending, "dispatching new chain");

        let logs = match self.worker.verify(leaf, issuer).await {
            Ok(logs) => logs,
            Err(e) => {
                tracing::warn!(
                    leaf = %fingerprint,
                    error = %e,
                    coordination = e.is_coordination_failure(),
                    "verification failed"
                );
                return Err(e);
            }
        };

        let store = Arc::clone(&self.store);
        let merged = logs.clone();
        tokio::task::spawn_blocking(move || store.merge_verified_logs(&fingerprint, &merged))
            .await
            .map_err(|e| CtError::storage(format!("merge task failed: {e}")))??;

        let sufficient = logs.len() >= self.sct_threshold;
        if sufficient {
            let pending = self.counter.decrement();
            tracing::debug!(
                leaf = %fingerprint,
                logs = logs.len(),
                pending,
                "enough valid SCTs"
            );
        } else {
            tracing::info!(
                leaf = %fingerprint,
                logs = logs.len(),
                threshold = self.sct_threshold,
                "not enough valid SCTs"
            );
        }

        Ok(ChainVerdict {
            leaf: fingerprint,
            logs,
            sufficient,
        })
    }
}
