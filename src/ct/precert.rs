//! Precertificate reconstruction.
//!
//! A log signs the certificate as it looked before any SCTs existed.
//! Rebuilding that input means taking the leaf's TBSCertificate, dropping
//! the CT poison and SCT list extensions, re-encoding it as DER and pairing
//! it with the SHA-256 hash of the issuer's SubjectPublicKeyInfo
//! (RFC 6962 section 3.2, `PreCert`).
//!
//! The transform is kept separate from signature checking so the exact
//! output bytes can be pinned in tests.

use crate::base::context::DerResultExt;
use crate::base::cterror::CtError;
use x509_cert::certificate::Version;
use x509_cert::der::oid::ObjectIdentifier;
use x509_cert::der::{Decode, Encode};
use x509_cert::ext::Extension;
use x509_cert::{Certificate, TbsCertificate};

/// Embedded SCT list extension (RFC 6962 section 3.3).
pub const CT_PRECERT_SCTS: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.11129.2.4.2");

/// Precertificate poison extension (RFC 6962 section 3.1).
pub const CT_PRECERT_POISON: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.11129.2.4.3");

const MAX_TBS_LEN: usize = 0xFF_FFFF;

/// How the leaf relates to the precertificate that was logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecertForm {
    /// The leaf is itself a precertificate (carries the poison extension).
    Poisoned,
    /// The leaf is a final certificate with SCTs embedded after logging.
    EmbeddedScts,
}

/// Serialized-ready `PreCert` structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecertEntry {
    /// SHA-256 of the issuer's DER-encoded SubjectPublicKeyInfo
    pub issuer_key_hash: [u8; 32],
    /// DER TBSCertificate with the CT extensions removed
    pub tbs_certificate: Vec<u8>,
    pub form: PrecertForm,
}

impl PrecertEntry {
    /// Build the precertificate entry for `leaf` issued by `issuer`.
    pub fn from_certificates(leaf: &Certificate, issuer: &Certificate) -> Result<Self, CtError> {
        let tbs = &leaf.tbs_certificate;
        if tbs.version != Version::V3 {
            return Err(CtError::malformed("leaf is not an X.509 v3 certificate"));
        }

        let extensions = tbs
            .extensions
            .as_deref()
            .ok_or_else(|| CtError::malformed("leaf has no extensions"))?;

        let form = if extensions.iter().any(|ext| ext.extn_id == CT_PRECERT_POISON) {
            PrecertForm::Poisoned
        } else if extensions.iter().any(|ext| ext.extn_id == CT_PRECERT_SCTS) {
            PrecertForm::EmbeddedScts
        } else {
            return Err(CtError::malformed("leaf carries neither CT poison nor an SCT list"));
        };

        Ok(Self {
            issuer_key_hash: issuer_key_hash(issuer)?,
            tbs_certificate: precert_tbs(tbs)?,
            form,
        })
    }

    /// TLS encoding: `opaque issuer_key_hash[32]; opaque TBSCertificate<1..2^24-1>`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.tbs_certificate.len() as u32;
        let mut out = Vec::with_capacity(32 + 3 + self.tbs_certificate.len());
        out.extend_from_slice(&self.issuer_key_hash);
        out.extend_from_slice(&len.to_be_bytes()[1..]);
        out.extend_from_slice(&self.tbs_certificate);
        out
    }
}

fn is_ct_extension(ext: &Extension) -> bool {
    ext.extn_id == CT_PRECERT_SCTS || ext.extn_id == CT_PRECERT_POISON
}

/// Re-encode `tbs` with the poison and SCT list extensions removed.
///
/// The remaining extensions keep their original order. If nothing is left
/// the extensions field is omitted, since RFC 5280 forbids an empty list.
pub fn precert_tbs(tbs: &TbsCertificate) -> Result<Vec<u8>, CtError> {
    let mut precert = tbs.clone();
    precert.extensions = precert.extensions.and_then(|exts| {
        let kept: Vec<Extension> = exts
            .into_iter()
            .filter(|ext| !is_ct_extension(ext))
            .collect();
        (!kept.is_empty()).then_some(kept)
    });

    let der = precert.to_der().certificate_context("precert TBS")?;
    if der.len() > MAX_TBS_LEN {
        return Err(CtError::malformed("TBS certificate exceeds 2^24-1 bytes"));
    }
    Ok(der)
}

/// SHA-256 of the issuer's SubjectPublicKeyInfo.
pub fn issuer_key_hash(issuer: &Certificate) -> Result<[u8; 32], CtError> {
    let spki = issuer
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .certificate_context("issuer")?;
    Ok(boring::sha::sha256(&spki))
}

/// Reproduce the `PreCert` bytes a log signed for `leaf_der`.
pub fn build_precert_signing_input(leaf_der: &[u8], issuer_der: &[u8]) -> Result<Vec<u8>, CtError> {
    let leaf = Certificate::from_der(leaf_der).certificate_context("leaf")?;
    let issuer = Certificate::from_der(issuer_der).certificate_context("issuer")?;
    Ok(PrecertEntry::from_certificates(&leaf, &issuer)?.to_bytes())
}
