//! Multi-log SCT verifier.
//!
//! Verifies the SCTs embedded in a leaf certificate against the logs of a
//! [`LogCatalog`]. Mirrors Chromium's `net/cert/multi_log_ct_verifier.cc`,
//! minus policy: the verifier reports which logs vouched for the
//! certificate and leaves "how many is enough" to the caller.
//!
//! Unknown logs and bad signatures only drop the affected SCT; the call
//! itself fails only on precondition violations and unparseable input.

use crate::base::context::DerResultExt;
use crate::base::cterror::CtError;
use crate::ct::loglist::{Log, LogCatalog, LogId};
use crate::ct::precert::{PrecertEntry, CT_PRECERT_SCTS};
use crate::ct::sct::{decode_sct_list, Sct, SctStatus, SignatureAlgorithm};
use boring::pkey::Id;
use boring::sign::Verifier;
use std::collections::BTreeSet;
use std::sync::Arc;
use x509_cert::der::asn1::OctetString;
use x509_cert::der::Decode;
use x509_cert::Certificate;

/// Extract the embedded SCTs of `leaf`.
///
/// A leaf without the SCT list extension yields an empty list. An
/// extension whose list framing does not parse makes the certificate
/// malformed.
pub fn extract_scts(leaf: &Certificate) -> Result<Vec<Sct>, CtError> {
    let Some(extensions) = leaf.tbs_certificate.extensions.as_deref() else {
        return Ok(Vec::new());
    };
    let Some(ext) = extensions.iter().find(|ext| ext.extn_id == CT_PRECERT_SCTS) else {
        return Ok(Vec::new());
    };

    // The extension value wraps the TLS-encoded list in a second OCTET STRING.
    let list = OctetString::from_der(ext.extn_value.as_bytes())
        .map_err(|e| CtError::malformed(format!("SCT list extension: {e}")))?;
    decode_sct_list(list.as_bytes())
        .map_err(|e| CtError::malformed(format!("SCT list extension: {e}")))
}

/// SCT verifier bound to one catalog snapshot.
///
/// ## Usage
/// ```ignore
/// let verifier = SctVerifier::new(Arc::new(catalog));
/// let logs = verifier.verify(&leaf_der, &issuer_der)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct SctVerifier {
    catalog: Option<Arc<LogCatalog>>,
}

impl SctVerifier {
    /// Create a verifier over `catalog`.
    pub fn new(catalog: Arc<LogCatalog>) -> Self {
        Self {
            catalog: Some(catalog),
        }
    }

    /// Create a verifier with no logs; every call fails with `NoLogsLoaded`.
    pub fn unloaded() -> Self {
        Self::default()
    }

    /// The catalog snapshot in use.
    pub fn catalog(&self) -> Option<&LogCatalog> {
        self.catalog.as_deref()
    }

    /// Ids of the logs with a valid SCT for `leaf_der`.
    ///
    /// An empty slice counts as a missing certificate.
    pub fn verify(&self, leaf_der: &[u8], issuer_der: &[u8]) -> Result<BTreeSet<LogId>, CtError> {
        let results = self.verify_detailed(leaf_der, issuer_der)?;
        Ok(results
            .into_iter()
            .filter(|(_, status)| *status == SctStatus::Valid)
            .map(|(sct, _)| sct.log_id)
            .collect())
    }

    /// Verify every embedded SCT and report a status for each.
    pub fn verify_detailed(
        &self,
        leaf_der: &[u8],
        issuer_der: &[u8],
    ) -> Result<Vec<(Sct, SctStatus)>, CtError> {
        let catalog = self
            .catalog
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(CtError::NoLogsLoaded)?;
        if leaf_der.is_empty() {
            return Err(CtError::MissingLeaf);
        }
        if issuer_der.is_empty() {
            return Err(CtError::MissingIssuer);
        }

        let leaf = Certificate::from_der(leaf_der).certificate_context("leaf")?;
        let issuer = Certificate::from_der(issuer_der).certificate_context("issuer")?;

        let scts = extract_scts(&leaf)?;
        if scts.is_empty() {
            tracing::debug!("leaf carries no embedded SCTs");
            return Ok(Vec::new());
        }

        let entry = PrecertEntry::from_certificates(&leaf, &issuer)?.to_bytes();

        let results: Vec<(Sct, SctStatus)> = scts
            .into_iter()
            .map(|sct| {
                let status = verify_single_sct(catalog, &sct, &entry);
                tracing::debug!(log_id = %sct.log_id, ?status, "SCT checked");
                (sct, status)
            })
            .collect();

        Ok(results)
    }
}

/// Verify a single SCT.
fn verify_single_sct(catalog: &LogCatalog, sct: &Sct, precert_entry: &[u8]) -> SctStatus {
    let Some(log) = catalog.lookup(&sct.log_id) else {
        return SctStatus::UnknownLog;
    };

    verify_signature(log, sct, &sct.signed_data(precert_entry))
}

/// Verify the SCT signature using the log's public key.
fn verify_signature(log: &Log, sct: &Sct, signed_data: &[u8]) -> SctStatus {
    let Some(digest) = sct.hash_algorithm.message_digest() else {
        return SctStatus::UnsupportedAlgorithm;
    };

    let key_type = log.key_type();
    let algorithm_matches = match sct.signature_algorithm {
        SignatureAlgorithm::Ecdsa => key_type == Id::EC,
        SignatureAlgorithm::Rsa => key_type == Id::RSA,
        SignatureAlgorithm::Other(_) => false,
    };
    if !algorithm_matches {
        return SctStatus::UnsupportedAlgorithm;
    }

    let Ok(mut verifier) = Verifier::new(digest, log.verifying_key()) else {
        return SctStatus::InvalidSignature;
    };
    if verifier.update(signed_data).is_err() {
        return SctStatus::InvalidSignature;
    }

    match verifier.verify(&sct.signature) {
        Ok(true) => SctStatus::Valid,
        _ => SctStatus::InvalidSignature,
    }
}
