use thiserror::Error;

/// Errors produced by the CT verification engine.
///
/// Every variant owns its context so the error can travel across the
/// worker channel and be cloned into several waiting callers.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CtError {
    // Log catalog errors
    #[error("Log list signature verification failed")]
    SignatureInvalid,
    #[error("Log list signer key is not a usable RSA public key")]
    InvalidSignerKey,
    #[error("Log list could not be parsed: {message}")]
    LogListParse { message: String },
    #[error("Invalid CT log list: log_id {declared} does not match key hash {computed}")]
    LogIdMismatch { declared: String, computed: String },
    #[error("Invalid CT log list: key for log {log_id} cannot be parsed")]
    InvalidLogKey { log_id: String },

    // Verification errors
    #[error("Malformed certificate: {reason}")]
    MalformedCertificate { reason: String },
    #[error("Malformed SCT list: {reason}")]
    MalformedSct { reason: String },
    #[error("Logs not loaded")]
    NoLogsLoaded,
    #[error("No leaf provided")]
    MissingLeaf,
    #[error("No issuer provided")]
    MissingIssuer,

    // Coordination errors
    #[error("Verification call {seq} timed out")]
    Timeout { seq: u64 },
    #[error("Verification worker is not running")]
    WorkerUnavailable,
    #[error("Verification worker failed: {message}")]
    WorkerFailed { message: String },

    // Storage errors
    #[error("Certificate store error: {message}")]
    Storage { message: String },
    #[error("Serialization error: {message}")]
    Serialization { message: String },
    #[error("IO error: {message}")]
    Io { message: String },
}

impl CtError {
    /// Create a malformed certificate error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        CtError::MalformedCertificate {
            reason: reason.into(),
        }
    }

    /// Create a malformed SCT error.
    pub fn malformed_sct(reason: impl Into<String>) -> Self {
        CtError::MalformedSct {
            reason: reason.into(),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        CtError::Storage {
            message: message.into(),
        }
    }

    /// Whether this error belongs to a failed log catalog load.
    ///
    /// Catalog refresh failures are the only errors surfaced to the user;
    /// everything else degrades to "unverified".
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            CtError::SignatureInvalid
                | CtError::InvalidSignerKey
                | CtError::LogListParse { .. }
                | CtError::LogIdMismatch { .. }
                | CtError::InvalidLogKey { .. }
        )
    }

    /// Whether the error was produced by the coordination layer rather than
    /// by the verification itself.
    pub fn is_coordination_failure(&self) -> bool {
        matches!(
            self,
            CtError::Timeout { .. } | CtError::WorkerUnavailable | CtError::WorkerFailed { .. }
        )
    }
}

impl From<rusqlite::Error> for CtError {
    fn from(err: rusqlite::Error) -> Self {
        CtError::Storage {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CtError {
    fn from(err: serde_json::Error) -> Self {
        CtError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CtError {
    fn from(err: std::io::Error) -> Self {
        CtError::Io {
            message: err.to_string(),
        }
    }
}

impl From<x509_cert::der::Error> for CtError {
    fn from(err: x509_cert::der::Error) -> Self {
        CtError::MalformedCertificate {
            reason: err.to_string(),
        }
    }
}
