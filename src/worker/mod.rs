//! Isolated verification context and the channel protocol used to reach it.
//!
//! - [`protocol`] - request/reply envelopes
//! - [`context`] - the context that owns the log catalog
//! - [`handle`] - caller side: sequence numbers, pending table, timeouts

pub mod context;
pub mod handle;
pub mod protocol;

pub use context::VerificationContext;
pub use handle::WorkerHandle;
pub use protocol::{Reply, Request, WorkerCall, WorkerResponse};
