//! CT log list authentication and indexing.
//!
//! Parses Google's v3 log list, checks its detached RSA signature and
//! builds an index of logs keyed by log id. Every declared `log_id` is
//! recomputed from the log's key; the list is rejected as a whole if any
//! entry disagrees.
//!
//! The list is published at:
//! https://www.gstatic.com/ct/log_list/v3/log_list.json

use crate::base::cterror::CtError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use boring::hash::MessageDigest;
use boring::pkey::{Id, PKey, PKeyRef, Public};
use boring::sign::Verifier;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Log ID: SHA-256 hash of the log's DER-encoded SubjectPublicKeyInfo.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogId(pub [u8; 32]);

impl LogId {
    /// Compute the id of a log from its SPKI bytes.
    pub fn from_key(spki_der: &[u8]) -> Self {
        LogId(boring::sha::sha256(spki_der))
    }

    /// Decode a base64 log id, as found in the log list and in exports.
    pub fn from_base64(encoded: &str) -> Option<Self> {
        let decoded = STANDARD.decode(encoded).ok()?;
        let bytes: [u8; 32] = decoded.try_into().ok()?;
        Some(LogId(bytes))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogId({})", self.to_base64())
    }
}

impl Serialize for LogId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for LogId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        LogId::from_base64(&encoded)
            .ok_or_else(|| serde::de::Error::custom("log id must be 32 base64-encoded bytes"))
    }
}

/// Lifecycle state of a log as published in the list.
///
/// Informational only; verification treats every listed log the same.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogState {
    Pending,
    Qualified,
    Usable,
    ReadOnly,
    Retired,
    Rejected,
    Other(String),
}

impl LogState {
    fn from_state_map(state: &BTreeMap<String, serde_json::Value>) -> Option<Self> {
        let kind = state.keys().next()?;
        Some(match kind.as_str() {
            "pending" => LogState::Pending,
            "qualified" => LogState::Qualified,
            "usable" => LogState::Usable,
            "readonly" => LogState::ReadOnly,
            "retired" => LogState::Retired,
            "rejected" => LogState::Rejected,
            other => LogState::Other(other.to_string()),
        })
    }
}

/// A known CT log.
#[derive(Clone)]
pub struct Log {
    /// Log ID (SHA-256 of `key`), verified at load time
    pub id: LogId,
    /// DER-encoded SubjectPublicKeyInfo
    pub key: Vec<u8>,
    /// Submission URL
    pub url: String,
    /// Maximum merge delay in seconds
    pub max_merge_delay: u64,
    /// Human-readable description
    pub description: String,
    /// Log operator
    pub operator: String,
    /// Published state, if any
    pub state: Option<LogState>,
    verifying_key: PKey<Public>,
}

impl Log {
    /// Parsed public key used to check SCT signatures.
    pub fn verifying_key(&self) -> &PKeyRef<Public> {
        &self.verifying_key
    }

    /// Key algorithm of the log (EC or RSA for every log in the wild).
    pub fn key_type(&self) -> Id {
        self.verifying_key.id()
    }
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("max_merge_delay", &self.max_merge_delay)
            .field("description", &self.description)
            .field("operator", &self.operator)
            .field("state", &self.state)
            .finish()
    }
}

/// Trusted key that signs the log list (RSA, PKCS#1 v1.5 with SHA-256).
#[derive(Clone)]
pub struct LogListSigner {
    key: PKey<Public>,
}

impl LogListSigner {
    /// Load the signer from a DER-encoded SubjectPublicKeyInfo.
    pub fn from_der(spki_der: &[u8]) -> Result<Self, CtError> {
        let key =
            PKey::public_key_from_der(spki_der).map_err(|_| CtError::InvalidSignerKey)?;
        Self::from_key(key)
    }

    /// Load the signer from a PEM `PUBLIC KEY` block.
    pub fn from_pem(pem: &[u8]) -> Result<Self, CtError> {
        let key = PKey::public_key_from_pem(pem).map_err(|_| CtError::InvalidSignerKey)?;
        Self::from_key(key)
    }

    fn from_key(key: PKey<Public>) -> Result<Self, CtError> {
        if key.id() != Id::RSA {
            return Err(CtError::InvalidSignerKey);
        }
        Ok(Self { key })
    }

    /// Check `signature` over `list`.
    pub fn verify(&self, list: &[u8], signature: &[u8]) -> Result<(), CtError> {
        let mut verifier = Verifier::new(MessageDigest::sha256(), &self.key)
            .map_err(|_| CtError::InvalidSignerKey)?;
        verifier.update(list).map_err(|_| CtError::SignatureInvalid)?;
        match verifier.verify(signature) {
            Ok(true) => Ok(()),
            _ => Err(CtError::SignatureInvalid),
        }
    }
}

impl fmt::Debug for LogListSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogListSigner").finish_non_exhaustive()
    }
}

// v3 log list schema. Unknown fields (email, temporal_interval, ...) are ignored.
#[derive(Deserialize)]
struct LogListDocument {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    log_list_timestamp: Option<String>,
    operators: Vec<OperatorEntry>,
}

#[derive(Deserialize)]
struct OperatorEntry {
    name: String,
    #[serde(default)]
    logs: Vec<LogEntry>,
    #[serde(default)]
    tiled_logs: Vec<TiledLogEntry>,
}

#[derive(Deserialize)]
struct LogEntry {
    #[serde(default)]
    description: String,
    log_id: String,
    key: String,
    url: String,
    mmd: u64,
    #[serde(default)]
    state: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Deserialize)]
struct TiledLogEntry {
    #[serde(default)]
    description: String,
    log_id: String,
    key: String,
    submission_url: String,
    mmd: u64,
    #[serde(default)]
    state: Option<BTreeMap<String, serde_json::Value>>,
}

/// Immutable index of trusted logs, keyed by log id.
///
/// A refresh builds a new catalog and replaces the old one wholesale.
#[derive(Debug, Clone, Default)]
pub struct LogCatalog {
    logs: HashMap<LogId, Log>,
    version: Option<String>,
    list_timestamp: Option<String>,
}

impl LogCatalog {
    /// Authenticate and parse a signed log list.
    ///
    /// Fails with `SignatureInvalid` if `signature` does not verify,
    /// `LogListParse` if the JSON does not follow the schema, and
    /// `LogIdMismatch`/`InvalidLogKey` if any log entry is inconsistent.
    /// No partial catalog is ever returned.
    pub fn load(list: &[u8], signature: &[u8], signer: &LogListSigner) -> Result<Self, CtError> {
        signer.verify(list, signature)?;

        let document: LogListDocument =
            serde_json::from_slice(list).map_err(|e| CtError::LogListParse {
                message: e.to_string(),
            })?;

        let mut logs = HashMap::new();
        for operator in &document.operators {
            for entry in &operator.logs {
                let log = build_log(
                    &operator.name,
                    &entry.description,
                    &entry.log_id,
                    &entry.key,
                    &entry.url,
                    entry.mmd,
                    entry.state.as_ref(),
                )?;
                logs.insert(log.id, log);
            }
            for entry in &operator.tiled_logs {
                let log = build_log(
                    &operator.name,
                    &entry.description,
                    &entry.log_id,
                    &entry.key,
                    &entry.submission_url,
                    entry.mmd,
                    entry.state.as_ref(),
                )?;
                logs.insert(log.id, log);
            }
        }

        tracing::info!(
            logs = logs.len(),
            operators = document.operators.len(),
            version = document.version.as_deref().unwrap_or("unknown"),
            "CT log list loaded"
        );

        Ok(Self {
            logs,
            version: document.version,
            list_timestamp: document.log_list_timestamp,
        })
    }

    /// Look up a log by id. `None` means the log is not recognized.
    pub fn lookup(&self, log_id: &LogId) -> Option<&Log> {
        self.logs.get(log_id)
    }

    /// Get the number of known logs.
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// Check if the catalog has no logs.
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Iterate over all known logs.
    pub fn iter(&self) -> impl Iterator<Item = &Log> {
        self.logs.values()
    }

    /// `version` field of the source list.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// `log_list_timestamp` field of the source list.
    pub fn list_timestamp(&self) -> Option<&str> {
        self.list_timestamp.as_deref()
    }
}

fn build_log(
    operator: &str,
    description: &str,
    declared_id: &str,
    key_base64: &str,
    url: &str,
    mmd: u64,
    state: Option<&BTreeMap<String, serde_json::Value>>,
) -> Result<Log, CtError> {
    let key = STANDARD.decode(key_base64).map_err(|e| CtError::LogListParse {
        message: format!("key of log {declared_id} is not base64: {e}"),
    })?;

    let computed = LogId::from_key(&key);
    match LogId::from_base64(declared_id) {
        Some(declared) if declared == computed => {}
        _ => {
            return Err(CtError::LogIdMismatch {
                declared: declared_id.to_string(),
                computed: computed.to_base64(),
            });
        }
    }

    let verifying_key =
        PKey::public_key_from_der(&key).map_err(|_| CtError::InvalidLogKey {
            log_id: declared_id.to_string(),
        })?;

    Ok(Log {
        id: computed,
        key,
        url: url.to_string(),
        max_merge_delay: mmd,
        description: description.to_string(),
        operator: operator.to_string(),
        state: state.and_then(LogState::from_state_map),
        verifying_key,
    })
}
