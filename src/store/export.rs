//! Offline dump of the store.
//!
//! Layout: `{ "certs": [...], "chains": [...] }`. Certificates carry their
//! DER base64-encoded, fingerprints are lowercase hex, `leaf` is `1` or `0`
//! and first-seen times are Unix milliseconds. Meant for inspection, not
//! for re-import.

use crate::base::cterror::CtError;
use crate::ct::loglist::LogId;
use crate::store::{CertificateRecord, ChainKey, Fingerprint};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedFirstSeen {
    pub origin: String,
    pub t: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedCertificate {
    pub fp: String,
    pub leaf: u8,
    pub first: ExportedFirstSeen,
    pub der: String,
    /// Base64 log ids; only present for leaves that went through verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedChain {
    pub leaf: String,
    pub rest: Vec<String>,
}

/// Point-in-time copy of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub certs: Vec<ExportedCertificate>,
    pub chains: Vec<ExportedChain>,
}

impl Snapshot {
    pub(crate) fn build(
        certificates: Vec<(CertificateRecord, Option<BTreeSet<LogId>>)>,
        chains: Vec<ChainKey>,
    ) -> Self {
        let certs = certificates
            .into_iter()
            .map(|(record, logs)| ExportedCertificate {
                fp: record.fingerprint.to_hex(),
                leaf: u8::from(record.is_leaf),
                first: ExportedFirstSeen {
                    t: record.first_seen.unix_millis(),
                    origin: record.first_seen.origin,
                },
                der: BASE64.encode(&record.der),
                logs: logs.map(|ids| ids.iter().map(LogId::to_base64).collect()),
            })
            .collect();

        let chains = chains
            .into_iter()
            .map(|chain| ExportedChain {
                leaf: chain.leaf.to_hex(),
                rest: chain.issuers.iter().map(Fingerprint::to_hex).collect(),
            })
            .collect();

        Self { certs, chains }
    }

    pub fn to_json(&self) -> Result<String, CtError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, CtError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the dump to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CtError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        tracing::info!(
            path = %path.display(),
            certs = self.certs.len(),
            chains = self.chains.len(),
            "snapshot saved"
        );
        Ok(())
    }
}
