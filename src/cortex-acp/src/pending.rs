//! Pending-request table.

use std::time::{Duration, Instant};

use cortex_acp_types::RequestId;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::SessionError;

/// Outcome delivered to a waiting caller.
pub type CallOutcome = Result<Value, SessionError>;

/// Bookkeeping for one outstanding outbound request.
#[derive(Debug)]
pub struct PendingCall {
    method: String,
    tx: oneshot::Sender<CallOutcome>,
    registered_at: Instant,
}

impl PendingCall {
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Time since the call was registered.
    pub fn elapsed(&self) -> Duration {
        self.registered_at.elapsed()
    }

    /// Complete the caller. A caller that already gave up is ignored.
    pub fn complete(self, outcome: CallOutcome) {
        let _ = self.tx.send(outcome);
    }
}

/// Outstanding outbound requests keyed by correlation id.
///
/// Every entry leaves the table exactly once: whoever removes it first
/// (response, timeout, send failure, shutdown) owns the completion.
#[derive(Debug, Default)]
pub struct PendingRequests {
    calls: DashMap<RequestId, PendingCall>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and return the receiving half of its completion.
    pub fn register(
        &self,
        id: RequestId,
        method: impl Into<String>,
    ) -> oneshot::Receiver<CallOutcome> {
        let (tx, rx) = oneshot::channel();
        self.calls.insert(
            id,
            PendingCall {
                method: method.into(),
                tx,
                registered_at: Instant::now(),
            },
        );
        rx
    }

    /// Remove the entry for `id`, if still present.
    pub fn remove(&self, id: &RequestId) -> Option<PendingCall> {
        self.calls.remove(id).map(|(_, call)| call)
    }

    /// Remove and complete the entry for `id`. Returns `false` when no entry
    /// was present (already timed out, duplicate, or bogus id).
    pub fn complete(&self, id: &RequestId, outcome: CallOutcome) -> bool {
        match self.remove(id) {
            Some(call) => {
                call.complete(outcome);
                true
            }
            None => false,
        }
    }

    /// Drain the table, failing each caller with an error built by `make_err`.
    /// Returns the number of callers failed.
    pub fn fail_all(&self, make_err: impl Fn() -> SessionError) -> usize {
        let ids: Vec<RequestId> = self.calls.iter().map(|entry| entry.key().clone()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some(call) = self.remove(&id) {
                call.complete(Err(make_err()));
                failed += 1;
            }
        }
        failed
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.calls.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_complete_delivers_once() {
        let table = PendingRequests::new();
        let id = RequestId::from("p-1");
        let rx = table.register(id.clone(), "echo");
        assert!(table.contains(&id));

        assert!(table.complete(&id, Ok(json!({"x": 1}))));
        assert!(!table.complete(&id, Ok(json!({"x": 2}))));
        assert!(table.is_empty());

        let outcome = rx.await.expect("sender kept");
        assert_eq!(outcome.expect("success"), json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_fail_all_drains() {
        let table = PendingRequests::new();
        let receivers: Vec<_> = (0..3)
            .map(|n| table.register(RequestId::from(format!("p-{n}")), "slow"))
            .collect();

        assert_eq!(table.fail_all(|| SessionError::Terminated), 3);
        assert_eq!(table.len(), 0);
        assert_eq!(table.fail_all(|| SessionError::Terminated), 0);

        for rx in receivers {
            let outcome = rx.await.expect("sender kept");
            assert!(matches!(outcome, Err(SessionError::Terminated)));
        }
    }

    #[test]
    fn test_complete_after_caller_gave_up() {
        let table = PendingRequests::new();
        let id = RequestId::from("p-9");
        drop(table.register(id.clone(), "echo"));
        assert!(table.complete(&id, Ok(Value::Null)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_removed_entry_keeps_method() {
        let table = PendingRequests::new();
        let id = RequestId::from("p-2");
        let _rx = table.register(id.clone(), "fs/read_text_file");
        let call = table.remove(&id).expect("registered");
        assert_eq!(call.method(), "fs/read_text_file");
        assert!(call.elapsed() < Duration::from_secs(5));
    }
}
