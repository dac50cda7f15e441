//! CT monitor: the coordinating side of the engine.
//!
//! [`CtMonitor`] takes certificate chains observed on TLS connections,
//! records them in the [`CertificateStore`], and sends every newly seen
//! chain through SCT verification. The verification context is started on
//! construction and owns the log catalog; the monitor only ever talks to it
//! through its [`WorkerHandle`].
//!
//! ## Usage
//! ```ignore
//! let monitor = CtMonitor::in_memory(signer, MonitorConfig::default());
//! monitor.refresh_log_list(list, signature).await?;
//!
//! let chain = ObservedChain::new(url, certificates);
//! if let Some(task) = monitor.observe_connection(chain).await? {
//!     let verdict = task.await??;
//! }
//! println!("{} chains unverified", monitor.pending_count());
//! ```

pub mod config;
pub mod coordinator;
pub mod counter;

pub use config::MonitorConfig;
pub use coordinator::{ChainVerdict, VerificationCoordinator};
pub use counter::PendingCounter;

use crate::base::cterror::CtError;
use crate::ct::cache;
use crate::ct::loglist::LogListSigner;
use crate::store::{CertificateRecord, CertificateStore, ChainKey, FirstSeen, Snapshot};
use crate::worker::WorkerHandle;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

/// A certificate chain seen on one connection, leaf first.
#[derive(Debug, Clone)]
pub struct ObservedChain {
    /// URL of the request that carried the chain
    pub url: Url,
    pub timestamp: OffsetDateTime,
    /// DER certificates in presentation order
    pub certificates: Vec<Vec<u8>>,
}

impl ObservedChain {
    /// Chain observed now.
    pub fn new(url: Url, certificates: Vec<Vec<u8>>) -> Self {
        Self {
            url,
            timestamp: OffsetDateTime::now_utc(),
            certificates,
        }
    }

    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Handle to a running verification of a new chain.
pub type VerificationTask = JoinHandle<Result<ChainVerdict, CtError>>;

/// The CT monitor.
#[derive(Debug)]
pub struct CtMonitor {
    config: MonitorConfig,
    store: Arc<CertificateStore>,
    coordinator: Arc<VerificationCoordinator>,
}

impl CtMonitor {
    /// Start a monitor over `store`, trusting log lists signed by `signer`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(signer: LogListSigner, store: CertificateStore, config: MonitorConfig) -> Self {
        let worker = WorkerHandle::spawn(signer, config.call_timeout, config.reaper_interval);
        Self::with_worker(worker, store, config)
    }

    /// Monitor with an in-memory store.
    pub fn in_memory(signer: LogListSigner, config: MonitorConfig) -> Self {
        Self::new(signer, CertificateStore::in_memory(), config)
    }

    /// Monitor driving an existing verification context.
    pub fn with_worker(
        worker: WorkerHandle,
        store: CertificateStore,
        config: MonitorConfig,
    ) -> Self {
        let store = Arc::new(store);
        let coordinator = Arc::new(VerificationCoordinator::new(
            worker,
            Arc::clone(&store),
            PendingCounter::new(),
            config.sct_threshold,
        ));
        Self {
            config,
            store,
            coordinator,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    pub fn coordinator(&self) -> &VerificationCoordinator {
        &self.coordinator
    }

    /// Install a new signed log list.
    ///
    /// On success the list is written to the cache directory, if configured.
    /// On failure the previous catalog stays in effect.
    pub async fn refresh_log_list(
        &self,
        list: Vec<u8>,
        signature: Vec<u8>,
    ) -> Result<usize, CtError> {
        let cached = self
            .config
            .log_list_cache_dir
            .clone()
            .map(|dir| (dir, list.clone(), signature.clone()));

        let count = match self.coordinator.worker().update_logs(list, signature).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    user_visible = e.is_user_visible(),
                    "log list refresh failed"
                );
                return Err(e);
            }
        };
        tracing::info!(logs = count, "log list loaded");

        if let Some((dir, list, signature)) = cached {
            if let Err(e) = cache::save_log_list(&dir, &list, &signature) {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to cache log list");
            }
        }
        Ok(count)
    }

    /// Reload the cached log list, if there is one.
    ///
    /// Returns the number of logs loaded, or `None` without a cache.
    pub async fn load_cached_log_list(&self) -> Result<Option<usize>, CtError> {
        let Some(dir) = self.config.log_list_cache_dir.as_deref() else {
            return Ok(None);
        };
        let Some((list, signature)) = cache::load_log_list(dir)? else {
            tracing::debug!(dir = %dir.display(), "no cached log list");
            return Ok(None);
        };

        let count = self.coordinator.worker().update_logs(list, signature).await?;
        tracing::info!(logs = count, "cached log list loaded");
        Ok(Some(count))
    }

    /// Record a chain seen on a connection.
    ///
    /// Every certificate is stored with its first sighting. If the chain
    /// itself is new, verification of the leaf against its immediate issuer
    /// is spawned and its task returned. Store writes run on the blocking
    /// pool.
    pub async fn observe_connection(
        &self,
        chain: ObservedChain,
    ) -> Result<Option<VerificationTask>, CtError> {
        let Some(key) = ChainKey::from_der_chain(&chain.certificates) else {
            return Ok(None);
        };
        let first_seen = FirstSeen::from_url(&chain.url, chain.timestamp);
        let records: Vec<CertificateRecord> = chain
            .certificates
            .iter()
            .enumerate()
            .map(|(i, der)| CertificateRecord::new(der.clone(), i == 0, first_seen.clone()))
            .collect();

        let store = Arc::clone(&self.store);
        let new_chain = tokio::task::spawn_blocking(move || -> Result<bool, CtError> {
            for record in records {
                store.record_certificate(record)?;
            }
            Ok(store.record_chain(key)?.is_inserted())
        })
        .await
        .map_err(|e| CtError::storage(format!("record task failed: {e}")))??;
        if !new_chain {
            return Ok(None);
        }

        let mut certificates = chain.certificates.into_iter();
        let leaf = certificates.next().unwrap_or_default();
        // A missing issuer is reported by the verifier and leaves the chain pending.
        let issuer = certificates.next().unwrap_or_default();

        let coordinator = Arc::clone(&self.coordinator);
        Ok(Some(tokio::spawn(async move {
            coordinator.dispatch_new_chain(leaf, issuer).await
        })))
    }

    /// Chains still waiting for enough valid SCTs.
    pub fn pending_count(&self) -> usize {
        self.coordinator.counter().get()
    }

    /// Watch the pending count.
    pub fn subscribe_pending(&self) -> watch::Receiver<usize> {
        self.coordinator.counter().subscribe()
    }

    pub fn reset_pending(&self) {
        self.coordinator.counter().reset();
    }

    /// Dump the store from the blocking pool.
    pub async fn export_snapshot(&self) -> Result<Snapshot, CtError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.export_snapshot())
            .await
            .map_err(|e| CtError::storage(format!("export task failed: {e}")))?
    }
}
