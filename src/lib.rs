//! # verifyct
//!
//! A Certificate Transparency monitor for observed TLS certificate chains.
//!
//! `verifyct` authenticates the CT log list, verifies the Signed Certificate
//! Timestamps embedded in leaf certificates, and keeps a deduplicated record
//! of every certificate and chain it has seen together with the logs that
//! vouched for each leaf.
//!
//! ## Features
//!
//! - **Log catalog**: RSA-signed v3 log list, log ids checked against their keys
//! - **SCT verification**: precertificate reconstruction, ECDSA and RSA SCT signatures
//! - **Isolated verification**: catalog and crypto run behind a message channel with timeouts
//! - **Certificate store**: content-addressed, merge-on-write verified-log sets, SQLite or memory
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use verifyct::ct::LogListSigner;
//! use verifyct::monitor::{CtMonitor, MonitorConfig, ObservedChain};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), verifyct::base::cterror::CtError> {
//!     let signer = LogListSigner::from_pem(include_bytes!("log_list_pubkey.pem"))?;
//!     let monitor = CtMonitor::in_memory(signer, MonitorConfig::default());
//!     monitor.refresh_log_list(list, signature).await?;
//!
//!     let url = "https://example.com/".parse().unwrap();
//!     let chain = ObservedChain::new(url, chain_der);
//!     if let Some(task) = monitor.observe_connection(chain).await? {
//!         println!("{:?}", task.await.unwrap()?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error taxonomy and context helpers
//! - [`ct`] - Log catalog, SCT parsing, precertificates and verification
//! - [`worker`] - Isolated verification context and its call protocol
//! - [`store`] - Certificate, chain and verified-log storage
//! - [`monitor`] - Chain observation, dispatch and the pending counter

pub mod base;
pub mod ct;
pub mod monitor;
pub mod store;
pub mod worker;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
pub(crate) mod fixtures;
