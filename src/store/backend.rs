//! Storage contract and the in-memory backend.

use crate::base::cterror::CtError;
use crate::ct::loglist::LogId;
use crate::store::{CertificateRecord, ChainKey, Fingerprint, InsertOutcome, StoreCounts};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;

/// Keyed tables behind [`CertificateStore`](crate::store::CertificateStore).
///
/// Inserts must report duplicates as [`InsertOutcome::AlreadyPresent`] and
/// leave the existing row as it was. Serializing merges is the store's job,
/// not the backend's.
pub trait StoreBackend: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    fn insert_certificate(&self, record: &CertificateRecord) -> Result<InsertOutcome, CtError>;
    fn certificate(
        &self,
        fingerprint: &Fingerprint,
        is_leaf: bool,
    ) -> Result<Option<CertificateRecord>, CtError>;
    /// Every certificate, in `(fingerprint, is_leaf)` order.
    fn certificates(&self) -> Result<Vec<CertificateRecord>, CtError>;

    fn insert_chain(&self, chain: &ChainKey) -> Result<InsertOutcome, CtError>;
    /// Every chain, in key order.
    fn chains(&self) -> Result<Vec<ChainKey>, CtError>;
    fn chains_for_leaf(&self, leaf: &Fingerprint) -> Result<Vec<ChainKey>, CtError>;

    fn verified_logs(&self, leaf: &Fingerprint) -> Result<Option<BTreeSet<LogId>>, CtError>;
    /// Replace the verified-log set of `leaf`.
    fn put_verified_logs(&self, leaf: &Fingerprint, logs: &BTreeSet<LogId>) -> Result<(), CtError>;

    fn counts(&self) -> Result<StoreCounts, CtError>;

    /// Every table at once: certificates in `(fingerprint, is_leaf)` order,
    /// each leaf with its verified-log set, and every chain in key order.
    ///
    /// The default reads table by table. Backends with transactions answer
    /// from a single read view without holding up writers.
    fn snapshot(&self) -> Result<TableSnapshot, CtError> {
        let mut certificates = Vec::new();
        for record in self.certificates()? {
            let logs = if record.is_leaf {
                self.verified_logs(&record.fingerprint)?
            } else {
                None
            };
            certificates.push((record, logs));
        }
        Ok(TableSnapshot {
            certificates,
            chains: self.chains()?,
        })
    }
}

/// Rows read by [`StoreBackend::snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSnapshot {
    pub certificates: Vec<(CertificateRecord, Option<BTreeSet<LogId>>)>,
    pub chains: Vec<ChainKey>,
}

/// Process-local tables. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    certificates: DashMap<(Fingerprint, bool), CertificateRecord>,
    chains: DashMap<Fingerprint, BTreeSet<Vec<Fingerprint>>>,
    verified_logs: DashMap<Fingerprint, BTreeSet<LogId>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn insert_certificate(&self, record: &CertificateRecord) -> Result<InsertOutcome, CtError> {
        match self.certificates.entry((record.fingerprint, record.is_leaf)) {
            Entry::Occupied(_) => Ok(InsertOutcome::AlreadyPresent),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    fn certificate(
        &self,
        fingerprint: &Fingerprint,
        is_leaf: bool,
    ) -> Result<Option<CertificateRecord>, CtError> {
        Ok(self
            .certificates
            .get(&(*fingerprint, is_leaf))
            .map(|r| r.value().clone()))
    }

    fn certificates(&self) -> Result<Vec<CertificateRecord>, CtError> {
        let mut records: Vec<CertificateRecord> =
            self.certificates.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| (r.fingerprint, r.is_leaf));
        Ok(records)
    }

    fn insert_chain(&self, chain: &ChainKey) -> Result<InsertOutcome, CtError> {
        let mut issuers = self.chains.entry(chain.leaf).or_default();
        if issuers.insert(chain.issuers.clone()) {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::AlreadyPresent)
        }
    }

    fn chains(&self) -> Result<Vec<ChainKey>, CtError> {
        let mut chains: Vec<ChainKey> = self
            .chains
            .iter()
            .flat_map(|entry| {
                let leaf = *entry.key();
                entry
                    .value()
                    .iter()
                    .map(move |issuers| ChainKey::new(leaf, issuers.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        chains.sort();
        Ok(chains)
    }

    fn chains_for_leaf(&self, leaf: &Fingerprint) -> Result<Vec<ChainKey>, CtError> {
        Ok(self
            .chains
            .get(leaf)
            .map(|set| {
                set.iter()
                    .map(|issuers| ChainKey::new(*leaf, issuers.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn verified_logs(&self, leaf: &Fingerprint) -> Result<Option<BTreeSet<LogId>>, CtError> {
        Ok(self.verified_logs.get(leaf).map(|logs| logs.value().clone()))
    }

    fn put_verified_logs(&self, leaf: &Fingerprint, logs: &BTreeSet<LogId>) -> Result<(), CtError> {
        self.verified_logs.insert(*leaf, logs.clone());
        Ok(())
    }

    fn counts(&self) -> Result<StoreCounts, CtError> {
        Ok(StoreCounts {
            certificates: self.certificates.len(),
            chains: self.chains.iter().map(|entry| entry.value().len()).sum(),
        })
    }
}
