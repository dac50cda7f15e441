//! Ergonomic error context helpers.
//!
//! Provides extension traits for adding context to `Result` types,
//! converting DER errors into context-rich `CtError` variants.

use crate::base::cterror::CtError;

/// Extension trait for adding certificate context to DER Results.
pub trait DerResultExt<T> {
    /// Add the certificate role to a DER error.
    ///
    /// # Example
    /// ```ignore
    /// use verifyct::base::context::DerResultExt;
    ///
    /// let cert = Certificate::from_der(bytes).certificate_context("leaf")?;
    /// // Error: "Malformed certificate: leaf: unexpected end of message"
    /// ```
    fn certificate_context(self, role: &str) -> Result<T, CtError>;
}

impl<T> DerResultExt<T> for Result<T, x509_cert::der::Error> {
    fn certificate_context(self, role: &str) -> Result<T, CtError> {
        self.map_err(|e| CtError::malformed(format!("{role}: {e}")))
    }
}
