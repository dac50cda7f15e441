//! Certificate Transparency verification.
//!
//! Authenticates the CT log list, reconstructs precertificates and checks
//! embedded Signed Certificate Timestamps (SCTs) against known logs.
//! Based on Chromium's net/cert/ct_verifier.h and RFC 6962.

pub mod cache;
pub mod loglist;
pub mod precert;
pub mod sct;
pub mod verifier;

pub use loglist::{Log, LogCatalog, LogId, LogListSigner, LogState};
pub use precert::{build_precert_signing_input, PrecertEntry, PrecertForm};
pub use sct::{decode_sct_list, Sct, SctStatus};
pub use verifier::{extract_scts, SctVerifier};
