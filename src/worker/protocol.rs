//! Messages exchanged with the verification context.
//!
//! Requests and replies carry owned data only; the two sides share no
//! memory. `seq` is the sole correlation key, and replies may arrive in
//! any order or not at all.

use crate::base::cterror::CtError;
use crate::ct::loglist::LogId;
use std::collections::BTreeSet;

/// Operations the verification context understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCall {
    /// Authenticate and install a new log list, replacing the current one.
    UpdateLogs { list: Vec<u8>, signature: Vec<u8> },
    /// Verify the SCTs of `leaf` issued by `issuer`.
    Verify { leaf: Vec<u8>, issuer: Vec<u8> },
}

impl WorkerCall {
    /// Function name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            WorkerCall::UpdateLogs { .. } => "updateLogs",
            WorkerCall::Verify { .. } => "verify",
        }
    }
}

/// Successful result of a [`WorkerCall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResponse {
    LogsUpdated { count: usize },
    Verified(BTreeSet<LogId>),
}

/// Outbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub seq: u64,
    pub call: WorkerCall,
}

/// Inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub seq: u64,
    pub outcome: Result<WorkerResponse, CtError>,
}
