//! Content-addressed certificate and chain store.
//!
//! Certificates are keyed by `(fingerprint, is_leaf)`, chains by the leaf
//! fingerprint plus the ordered issuer fingerprints. Inserting a record that
//! already exists is not an error: the caller gets
//! [`InsertOutcome::AlreadyPresent`] and the stored record is left untouched.
//!
//! The verified-log set of a leaf only grows. Merges for the same
//! fingerprint are serialized through a per-key lock so concurrent
//! read-union-write cycles never drop each other's log ids.

pub mod backend;
pub mod export;
pub mod sqlite;

pub use backend::{MemoryBackend, StoreBackend, TableSnapshot};
pub use export::Snapshot;
pub use sqlite::SqliteBackend;

use crate::base::cterror::CtError;
use crate::ct::loglist::LogId;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use url::Url;

/// SHA-256 of a certificate's DER bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn of(der: &[u8]) -> Self {
        Self(boring::sha::sha256(der))
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(encoded: &str) -> Option<Self> {
        let bytes = hex::decode(encoded).ok()?;
        Some(Self(bytes.try_into().ok()?))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// Where and when a certificate was first observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstSeen {
    pub origin: String,
    /// Millisecond precision
    pub timestamp: OffsetDateTime,
}

impl FirstSeen {
    /// Truncates `timestamp` to whole milliseconds.
    pub fn new(origin: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        let millis = timestamp.unix_timestamp_nanos() / 1_000_000;
        let timestamp =
            OffsetDateTime::from_unix_timestamp_nanos(millis * 1_000_000).unwrap_or(timestamp);
        Self {
            origin: origin.into(),
            timestamp,
        }
    }

    /// First sighting while loading `url`; only its origin is kept.
    pub fn from_url(url: &Url, timestamp: OffsetDateTime) -> Self {
        Self::new(url.origin().ascii_serialization(), timestamp)
    }

    pub fn unix_millis(&self) -> i64 {
        (self.timestamp.unix_timestamp_nanos() / 1_000_000) as i64
    }

    pub fn from_unix_millis(origin: impl Into<String>, millis: i64) -> Result<Self, CtError> {
        let timestamp = OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
            .map_err(|e| CtError::storage(format!("first-seen timestamp {millis}: {e}")))?;
        Ok(Self {
            origin: origin.into(),
            timestamp,
        })
    }
}

/// A stored certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub fingerprint: Fingerprint,
    pub der: Vec<u8>,
    pub is_leaf: bool,
    pub first_seen: FirstSeen,
}

impl CertificateRecord {
    pub fn new(der: Vec<u8>, is_leaf: bool, first_seen: FirstSeen) -> Self {
        Self {
            fingerprint: Fingerprint::of(&der),
            der,
            is_leaf,
            first_seen,
        }
    }
}

/// Identity of an observed chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainKey {
    pub leaf: Fingerprint,
    /// Issuer fingerprints in presentation order
    pub issuers: Vec<Fingerprint>,
}

impl ChainKey {
    pub fn new(leaf: Fingerprint, issuers: Vec<Fingerprint>) -> Self {
        Self { leaf, issuers }
    }

    /// Key for a chain of DER certificates, leaf first.
    pub fn from_der_chain<T: AsRef<[u8]>>(chain: &[T]) -> Option<Self> {
        let (leaf, rest) = chain.split_first()?;
        Some(Self {
            leaf: Fingerprint::of(leaf.as_ref()),
            issuers: rest.iter().map(|der| Fingerprint::of(der.as_ref())).collect(),
        })
    }
}

/// Result of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

impl InsertOutcome {
    pub fn is_inserted(self) -> bool {
        self == InsertOutcome::Inserted
    }
}

/// Record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub certificates: usize,
    pub chains: usize,
}

/// The store. Sole mutator of certificate, chain and verified-log records.
pub struct CertificateStore {
    backend: Box<dyn StoreBackend>,
    merge_locks: DashMap<Fingerprint, Arc<Mutex<()>>>,
}

impl fmt::Debug for CertificateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateStore")
            .field("backend", &self.backend.name())
            .field("merges_in_flight", &self.merge_locks.len())
            .finish()
    }
}

impl Default for CertificateStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl CertificateStore {
    pub fn new(backend: impl StoreBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            merge_locks: DashMap::new(),
        }
    }

    /// Store backed by in-process tables.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Store backed by a SQLite database at `path`, created if missing.
    pub fn open_sqlite(path: impl AsRef<Path>) -> Result<Self, CtError> {
        Ok(Self::new(SqliteBackend::open(path)?))
    }

    pub fn record_certificate(&self, record: CertificateRecord) -> Result<InsertOutcome, CtError> {
        let outcome = self.backend.insert_certificate(&record)?;
        tracing::debug!(
            fingerprint = %record.fingerprint,
            is_leaf = record.is_leaf,
            ?outcome,
            "certificate recorded"
        );
        Ok(outcome)
    }

    pub fn record_chain(&self, chain: ChainKey) -> Result<InsertOutcome, CtError> {
        let outcome = self.backend.insert_chain(&chain)?;
        if outcome.is_inserted() {
            tracing::info!(
                leaf = %chain.leaf,
                issuers = chain.issuers.len(),
                "new chain observed"
            );
        }
        Ok(outcome)
    }

    /// Union `log_ids` into the verified-log set of `leaf`.
    pub fn merge_verified_logs(
        &self,
        leaf: &Fingerprint,
        log_ids: &BTreeSet<LogId>,
    ) -> Result<(), CtError> {
        let lock = Arc::clone(&self.merge_locks.entry(*leaf).or_default());
        let result = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.merge_locked(leaf, log_ids)
        };

        drop(lock);
        self.merge_locks.remove_if(leaf, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    fn merge_locked(&self, leaf: &Fingerprint, log_ids: &BTreeSet<LogId>) -> Result<(), CtError> {
        let existing = self.backend.verified_logs(leaf)?;
        let created = existing.is_none();
        let mut logs = existing.unwrap_or_default();
        let before = logs.len();
        logs.extend(log_ids.iter().copied());

        if created || logs.len() != before {
            self.backend.put_verified_logs(leaf, &logs)?;
        }
        tracing::debug!(
            leaf = %leaf,
            added = logs.len() - before,
            total = logs.len(),
            "verified logs merged"
        );
        Ok(())
    }

    pub fn certificate(
        &self,
        fingerprint: &Fingerprint,
        is_leaf: bool,
    ) -> Result<Option<CertificateRecord>, CtError> {
        self.backend.certificate(fingerprint, is_leaf)
    }

    pub fn verified_logs(&self, leaf: &Fingerprint) -> Result<Option<BTreeSet<LogId>>, CtError> {
        self.backend.verified_logs(leaf)
    }

    pub fn chains_for_leaf(&self, leaf: &Fingerprint) -> Result<Vec<ChainKey>, CtError> {
        let mut chains = self.backend.chains_for_leaf(leaf)?;
        chains.sort();
        Ok(chains)
    }

    pub fn counts(&self) -> Result<StoreCounts, CtError> {
        self.backend.counts()
    }

    /// Dump every certificate and chain.
    pub fn export_snapshot(&self) -> Result<Snapshot, CtError> {
        let tables = self.backend.snapshot()?;
        Ok(Snapshot::build(tables.certificates, tables.chains))
    }
}
