//! Signed Certificate Timestamps (RFC 6962 section 3.2).
//!
//! Decodes the TLS-encoded `SignedCertificateTimestampList` carried in a
//! certificate extension and rebuilds the `digitally-signed` structure a
//! log signs when it issues an SCT for a precertificate.

use crate::base::cterror::CtError;
use crate::ct::loglist::LogId;
use boring::hash::MessageDigest;
use time::OffsetDateTime;

/// SCT version v1, the only version RFC 6962 defines.
pub const SCT_VERSION_V1: u8 = 0;

const SIGNATURE_TYPE_CERTIFICATE_TIMESTAMP: u8 = 0;
const LOG_ENTRY_TYPE_PRECERT: u16 = 1;

/// TLS `HashAlgorithm` (RFC 5246 section 7.4.1.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
    Other(u8),
}

impl HashAlgorithm {
    fn from_u8(value: u8) -> Self {
        match value {
            4 => HashAlgorithm::Sha256,
            5 => HashAlgorithm::Sha384,
            6 => HashAlgorithm::Sha512,
            other => HashAlgorithm::Other(other),
        }
    }

    /// Digest to use for verification, if supported.
    pub fn message_digest(&self) -> Option<MessageDigest> {
        match self {
            HashAlgorithm::Sha256 => Some(MessageDigest::sha256()),
            HashAlgorithm::Sha384 => Some(MessageDigest::sha384()),
            HashAlgorithm::Sha512 => Some(MessageDigest::sha512()),
            HashAlgorithm::Other(_) => None,
        }
    }
}

/// TLS `SignatureAlgorithm` (RFC 5246 section 7.4.1.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Rsa,
    Ecdsa,
    Other(u8),
}

impl SignatureAlgorithm {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SignatureAlgorithm::Rsa,
            3 => SignatureAlgorithm::Ecdsa,
            other => SignatureAlgorithm::Other(other),
        }
    }
}

/// Signed Certificate Timestamp from a CT log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sct {
    /// SCT version (0 for v1)
    pub version: u8,
    /// Log ID (32-byte SHA-256 hash of log's public key)
    pub log_id: LogId,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Opaque `CtExtensions` bytes
    pub extensions: Vec<u8>,
    pub hash_algorithm: HashAlgorithm,
    pub signature_algorithm: SignatureAlgorithm,
    /// SCT signature
    pub signature: Vec<u8>,
}

impl Sct {
    /// Time at which the log issued this SCT.
    pub fn issued_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(self.timestamp as i128 * 1_000_000).ok()
    }

    /// Bytes covered by the SCT signature for a precertificate entry.
    ///
    /// `precert_entry` is the serialized `PreCert` (issuer key hash followed
    /// by the length-prefixed TBS certificate):
    /// - 1 byte: version
    /// - 1 byte: signature type (certificate_timestamp)
    /// - 8 bytes: timestamp
    /// - 2 bytes: entry type (precert_entry)
    /// - N bytes: PreCert
    /// - 2 bytes + N bytes: extensions
    pub fn signed_data(&self, precert_entry: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(14 + precert_entry.len() + self.extensions.len());
        data.push(self.version);
        data.push(SIGNATURE_TYPE_CERTIFICATE_TIMESTAMP);
        data.extend_from_slice(&self.timestamp.to_be_bytes());
        data.extend_from_slice(&LOG_ENTRY_TYPE_PRECERT.to_be_bytes());
        data.extend_from_slice(precert_entry);
        data.extend_from_slice(&(self.extensions.len() as u16).to_be_bytes());
        data.extend_from_slice(&self.extensions);
        data
    }
}

/// Result of verifying one SCT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SctStatus {
    /// SCT is valid and from a known log
    Valid,
    /// SCT signature verification failed
    InvalidSignature,
    /// SCT is from an unknown log
    UnknownLog,
    /// Hash or signature algorithm unsupported, or inconsistent with the log key
    UnsupportedAlgorithm,
}

/// Decode an SCT list from extension bytes.
///
/// The SCT list format is:
/// - 2 bytes: total length of all SCTs
/// - For each SCT:
///   - 2 bytes: SCT length
///   - SCT data
///
/// Entries with an unknown version or a corrupt body are skipped; only a
/// broken list framing is an error.
pub fn decode_sct_list(data: &[u8]) -> Result<Vec<Sct>, CtError> {
    if data.len() < 2 {
        return Ok(Vec::new());
    }

    let total_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    if data.len() != 2 + total_len {
        return Err(CtError::malformed_sct(format!(
            "list declares {} bytes, {} present",
            total_len,
            data.len() - 2
        )));
    }

    let mut scts = Vec::new();
    let mut offset = 2;

    while offset < data.len() {
        if offset + 2 > data.len() {
            return Err(CtError::malformed_sct("truncated SCT length"));
        }
        let sct_len = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
        offset += 2;

        if offset + sct_len > data.len() {
            return Err(CtError::malformed_sct("SCT overruns list"));
        }

        match decode_single_sct(&data[offset..offset + sct_len]) {
            Some(sct) => scts.push(sct),
            None => tracing::debug!(offset, len = sct_len, "skipping undecodable SCT"),
        }

        offset += sct_len;
    }

    Ok(scts)
}

/// Decode a single SCT from bytes.
///
/// SCT format (RFC 6962):
/// - 1 byte: version (0 for v1)
/// - 32 bytes: log ID
/// - 8 bytes: timestamp (ms since epoch)
/// - 2 bytes: extensions length
/// - N bytes: extensions
/// - 1 byte: hash algorithm
/// - 1 byte: signature algorithm
/// - 2 bytes: signature length
/// - signature data
fn decode_single_sct(data: &[u8]) -> Option<Sct> {
    // Minimum size: 1 + 32 + 8 + 2 + 1 + 1 + 2 = 47 bytes
    if data.len() < 47 {
        return None;
    }

    if data[0] != SCT_VERSION_V1 {
        return None;
    }

    let mut log_id = [0u8; 32];
    log_id.copy_from_slice(&data[1..33]);

    let timestamp = u64::from_be_bytes(data[33..41].try_into().ok()?);

    let ext_len = u16::from_be_bytes([data[41], data[42]]) as usize;
    let ext_end = 43 + ext_len;
    if data.len() < ext_end + 4 {
        return None;
    }
    let extensions = data[43..ext_end].to_vec();

    let hash_algorithm = HashAlgorithm::from_u8(data[ext_end]);
    let signature_algorithm = SignatureAlgorithm::from_u8(data[ext_end + 1]);

    let sig_len = u16::from_be_bytes([data[ext_end + 2], data[ext_end + 3]]) as usize;
    let sig_start = ext_end + 4;
    if data.len() != sig_start + sig_len {
        return None;
    }
    let signature = data[sig_start..].to_vec();

    Some(Sct {
        version: data[0],
        log_id: LogId(log_id),
        timestamp,
        extensions,
        hash_algorithm,
        signature_algorithm,
        signature,
    })
}
