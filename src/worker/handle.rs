//! Caller side of the verification context.
//!
//! Every call gets a fresh sequence number and a pending entry holding a
//! oneshot sender plus a deadline. Replies are routed by `seq`; a reply
//! for a sequence number that is no longer pending is dropped. Entries
//! leave the table when answered, when the caller's timeout fires, or when
//! the reaper finds them past their deadline.

use crate::base::cterror::CtError;
use crate::ct::loglist::{LogId, LogListSigner};
use crate::worker::context::VerificationContext;
use crate::worker::protocol::{Reply, Request, WorkerCall, WorkerResponse};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

/// An outstanding call waiting for its reply.
struct PendingCall {
    sender: oneshot::Sender<Result<WorkerResponse, CtError>>,
    deadline: Instant,
    function: &'static str,
}

type PendingTable = DashMap<u64, PendingCall>;

struct Inner {
    requests: mpsc::UnboundedSender<Request>,
    pending: Arc<PendingTable>,
    next_seq: AtomicU64,
    call_timeout: Duration,
}

/// Cloneable handle to one verification context.
///
/// Dropping the last clone closes the request channel, which stops the
/// context and the background tasks.
#[derive(Clone)]
pub struct WorkerHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("pending", &self.inner.pending.len())
            .field("next_seq", &self.inner.next_seq.load(Ordering::Relaxed))
            .field("call_timeout", &self.inner.call_timeout)
            .finish()
    }
}

impl WorkerHandle {
    /// Start a verification context trusting `signer` and return its handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(signer: LogListSigner, call_timeout: Duration, reaper_interval: Duration) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        tokio::spawn(VerificationContext::new(signer).run(request_rx, reply_tx));

        Self::attach(request_tx, reply_rx, call_timeout, reaper_interval)
    }

    /// Wrap an already running context that speaks the request/reply protocol.
    pub fn attach(
        requests: mpsc::UnboundedSender<Request>,
        replies: mpsc::UnboundedReceiver<Reply>,
        call_timeout: Duration,
        reaper_interval: Duration,
    ) -> Self {
        let pending: Arc<PendingTable> = Arc::new(DashMap::new());

        tokio::spawn(dispatch_replies(replies, Arc::downgrade(&pending)));
        tokio::spawn(reap_expired(Arc::downgrade(&pending), reaper_interval));

        Self {
            inner: Arc::new(Inner {
                requests,
                pending,
                next_seq: AtomicU64::new(1),
                call_timeout,
            }),
        }
    }

    /// Issue `call` and wait for its reply or the call timeout.
    pub async fn call(&self, call: WorkerCall) -> Result<WorkerResponse, CtError> {
        let inner = &self.inner;
        let seq = inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let function = call.name();
        let (sender, receiver) = oneshot::channel();

        inner.pending.insert(
            seq,
            PendingCall {
                sender,
                deadline: Instant::now() + inner.call_timeout,
                function,
            },
        );

        if inner.requests.send(Request { seq, call }).is_err() {
            inner.pending.remove(&seq);
            return Err(CtError::WorkerUnavailable);
        }

        match tokio::time::timeout(inner.call_timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped: the reaper expired this entry.
            Ok(Err(_)) => Err(CtError::Timeout { seq }),
            Err(_) => {
                inner.pending.remove(&seq);
                tracing::warn!(seq, function, "verification call timed out");
                Err(CtError::Timeout { seq })
            }
        }
    }

    /// Verify `leaf` against `issuer`; returns the ids of logs with a valid SCT.
    pub async fn verify(&self, leaf: Vec<u8>, issuer: Vec<u8>) -> Result<BTreeSet<LogId>, CtError> {
        match self.call(WorkerCall::Verify { leaf, issuer }).await? {
            WorkerResponse::Verified(logs) => Ok(logs),
            other => Err(unexpected(other)),
        }
    }

    /// Install a signed log list; returns the number of logs loaded.
    pub async fn update_logs(&self, list: Vec<u8>, signature: Vec<u8>) -> Result<usize, CtError> {
        match self.call(WorkerCall::UpdateLogs { list, signature }).await? {
            WorkerResponse::LogsUpdated { count } => Ok(count),
            other => Err(unexpected(other)),
        }
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }
}

fn unexpected(response: WorkerResponse) -> CtError {
    CtError::WorkerFailed {
        message: format!("unexpected response {response:?}"),
    }
}

/// Route replies to their pending callers until the context goes away.
async fn dispatch_replies(
    mut replies: mpsc::UnboundedReceiver<Reply>,
    pending: Weak<PendingTable>,
) {
    while let Some(Reply { seq, outcome }) = replies.recv().await {
        let Some(pending) = pending.upgrade() else {
            return;
        };
        match pending.remove(&seq) {
            Some((_, call)) => {
                if call.sender.send(outcome).is_err() {
                    tracing::debug!(seq, "caller went away before reply");
                }
            }
            None => tracing::warn!(seq, "ignoring reply for unknown or expired call"),
        }
    }

    // The context stopped; nobody will answer what is still pending.
    let Some(pending) = pending.upgrade() else {
        return;
    };
    let seqs: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for seq in seqs {
        if let Some((_, call)) = pending.remove(&seq) {
            let _ = call.sender.send(Err(CtError::WorkerUnavailable));
        }
    }
    tracing::debug!("verification context reply channel closed");
}

/// Periodically drop pending entries past their deadline.
async fn reap_expired(pending: Weak<PendingTable>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let Some(pending) = pending.upgrade() else {
            return;
        };

        let now = Instant::now();
        pending.retain(|seq, call| {
            let live = call.deadline > now;
            if !live {
                tracing::warn!(seq = *seq, function = call.function, "reaping expired call");
            }
            live
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);
    const REAP: Duration = Duration::from_secs(1);

    fn detached() -> (
        WorkerHandle,
        mpsc::UnboundedReceiver<Request>,
        mpsc::UnboundedSender<Reply>,
    ) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let handle = WorkerHandle::attach(request_tx, reply_rx, TIMEOUT, REAP);
        (handle, request_rx, reply_tx)
    }

    fn verified(byte: u8) -> Result<WorkerResponse, CtError> {
        Ok(WorkerResponse::Verified(BTreeSet::from([LogId([byte; 32])])))
    }

    fn reply(seq: u64, outcome: Result<WorkerResponse, CtError>) -> Reply {
        Reply { seq, outcome }
    }

    #[tokio::test]
    async fn test_replies_matched_by_seq() {
        let (handle, mut requests, replies) = detached();

        let first = tokio::spawn({
            let handle = handle.clone();
            async move { handle.verify(vec![1], vec![1]).await }
        });
        let a = requests.recv().await.unwrap();
        let second = tokio::spawn({
            let handle = handle.clone();
            async move { handle.verify(vec![2], vec![2]).await }
        });
        let b = requests.recv().await.unwrap();
        assert_ne!(a.seq, b.seq);

        // Answer in reverse order.
        replies.send(reply(b.seq, verified(2))).unwrap();
        replies.send(reply(a.seq, verified(1))).unwrap();

        assert_eq!(
            first.await.unwrap().unwrap(),
            BTreeSet::from([LogId([1; 32])])
        );
        assert_eq!(
            second.await.unwrap().unwrap(),
            BTreeSet::from([LogId([2; 32])])
        );
        assert_eq!(handle.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_seq_ignored() {
        let (handle, mut requests, replies) = detached();

        let call = tokio::spawn({
            let handle = handle.clone();
            async move { handle.verify(vec![1], vec![1]).await }
        });
        let request = requests.recv().await.unwrap();

        replies.send(reply(request.seq + 100, verified(9))).unwrap();
        replies.send(reply(request.seq, verified(1))).unwrap();

        assert_eq!(
            call.await.unwrap().unwrap(),
            BTreeSet::from([LogId([1; 32])])
        );
    }

    #[tokio::test]
    async fn test_error_reply_propagates() {
        let (handle, mut requests, replies) = detached();

        let call = tokio::spawn({
            let handle = handle.clone();
            async move { handle.verify(vec![], vec![1]).await }
        });
        let request = requests.recv().await.unwrap();
        let failed = reply(request.seq, Err(CtError::MissingLeaf));
        replies.send(failed).unwrap();

        assert_eq!(call.await.unwrap().unwrap_err(), CtError::MissingLeaf);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_pending_entry() {
        let (handle, mut requests, replies) = detached();

        let call = tokio::spawn({
            let handle = handle.clone();
            async move { handle.verify(vec![1], vec![1]).await }
        });
        let request = requests.recv().await.unwrap();

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err, CtError::Timeout { seq: request.seq });
        assert_eq!(handle.pending_calls(), 0);

        // A late reply is dropped and the handle keeps working.
        replies.send(reply(request.seq, verified(1))).unwrap();
        let next = tokio::spawn({
            let handle = handle.clone();
            async move { handle.verify(vec![2], vec![2]).await }
        });
        let request = requests.recv().await.unwrap();
        replies.send(reply(request.seq, verified(2))).unwrap();
        assert_eq!(
            next.await.unwrap().unwrap(),
            BTreeSet::from([LogId([2; 32])])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_drops_abandoned_call() {
        let (handle, mut requests, replies) = detached();

        let call = tokio::spawn({
            let handle = handle.clone();
            async move { handle.verify(vec![1], vec![1]).await }
        });
        let request = requests.recv().await.unwrap();
        call.abort();
        assert!(call.await.unwrap_err().is_cancelled());

        // Nothing is left to time the call out; the entry waits for the reaper.
        assert_eq!(handle.pending_calls(), 1);
        tokio::time::sleep(TIMEOUT + REAP + Duration::from_millis(1)).await;
        assert_eq!(handle.pending_calls(), 0);

        replies.send(reply(request.seq, verified(1))).unwrap();
        let next = tokio::spawn({
            let handle = handle.clone();
            async move { handle.verify(vec![2], vec![2]).await }
        });
        let next_request = requests.recv().await.unwrap();
        assert_ne!(next_request.seq, request.seq);
        replies.send(reply(next_request.seq, verified(2))).unwrap();

        assert_eq!(
            next.await.unwrap().unwrap(),
            BTreeSet::from([LogId([2; 32])])
        );
        assert_eq!(handle.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_mismatched_response_kind() {
        let (handle, mut requests, replies) = detached();

        let call = tokio::spawn({
            let handle = handle.clone();
            async move { handle.update_logs(vec![1], vec![2]).await }
        });
        let request = requests.recv().await.unwrap();
        replies.send(reply(request.seq, verified(1))).unwrap();

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, CtError::WorkerFailed { .. }));
    }

    #[tokio::test]
    async fn test_context_gone() {
        let (handle, requests, replies) = detached();
        drop(requests);
        drop(replies);

        let err = handle.verify(vec![1], vec![1]).await.unwrap_err();
        assert_eq!(err, CtError::WorkerUnavailable);
        assert_eq!(handle.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_context_stops_mid_call() {
        let (handle, mut requests, replies) = detached();

        let call = tokio::spawn({
            let handle = handle.clone();
            async move { handle.verify(vec![1], vec![1]).await }
        });
        requests.recv().await.unwrap();
        drop(replies);

        assert_eq!(call.await.unwrap().unwrap_err(), CtError::WorkerUnavailable);
    }
}
