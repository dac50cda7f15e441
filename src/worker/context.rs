//! Isolated verification context.
//!
//! Owns the log catalog and executes verification calls one at a time.
//! It only talks to the outside world through the request/reply channels;
//! CPU-bound work runs on the blocking pool so the async runtime stays
//! responsive.

use crate::base::cterror::CtError;
use crate::ct::loglist::{LogCatalog, LogListSigner};
use crate::ct::verifier::SctVerifier;
use crate::worker::protocol::{Reply, Request, WorkerCall, WorkerResponse};
use std::sync::Arc;
use tokio::sync::mpsc;

/// State owned by one verification context instance.
pub struct VerificationContext {
    signer: LogListSigner,
    catalog: Option<Arc<LogCatalog>>,
}

impl VerificationContext {
    /// Create a context that trusts log lists signed by `signer`.
    pub fn new(signer: LogListSigner) -> Self {
        Self {
            signer,
            catalog: None,
        }
    }

    /// The currently installed catalog, if any.
    pub fn catalog(&self) -> Option<&LogCatalog> {
        self.catalog.as_deref()
    }

    /// Serve requests until the request channel closes or nobody listens for replies.
    pub async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        replies: mpsc::UnboundedSender<Reply>,
    ) {
        tracing::debug!("verification context started");

        while let Some(Request { seq, call }) = requests.recv().await {
            tracing::debug!(
                seq,
                function = call.name(),
                "verification context received call"
            );
            let outcome = self.execute(call).await;
            if let Err(e) = &outcome {
                tracing::debug!(seq, error = %e, "call failed");
            }
            if replies.send(Reply { seq, outcome }).is_err() {
                break;
            }
        }

        tracing::debug!("verification context stopped");
    }

    /// Execute one call against the current state.
    pub async fn execute(&mut self, call: WorkerCall) -> Result<WorkerResponse, CtError> {
        match call {
            WorkerCall::Verify { leaf, issuer } => {
                // The snapshot taken here stays in use even if a reload follows.
                let verifier = self
                    .catalog
                    .clone()
                    .map(SctVerifier::new)
                    .unwrap_or_default();
                let logs = run_blocking(move || verifier.verify(&leaf, &issuer)).await?;
                Ok(WorkerResponse::Verified(logs))
            }
            WorkerCall::UpdateLogs { list, signature } => {
                let signer = self.signer.clone();
                let catalog =
                    run_blocking(move || LogCatalog::load(&list, &signature, &signer)).await?;
                let count = catalog.len();
                self.catalog = Some(Arc::new(catalog));
                Ok(WorkerResponse::LogsUpdated { count })
            }
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, CtError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CtError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!(error = %e, "verification task failed");
        CtError::WorkerFailed {
            message: e.to_string(),
        }
    })?
}
