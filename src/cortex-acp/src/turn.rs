//! Single-turn guard for the agent role.
//!
//! At most one `session/prompt` may be running per session instance. The
//! slot is an [`ArcSwapOption`]; every transition is a compare-and-swap, so
//! unrelated requests never contend on a lock.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use cortex_acp_types::RequestId;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The prompt currently holding the guard.
#[derive(Debug)]
pub struct ActivePrompt {
    pub session_id: String,
    pub request_id: RequestId,
    cancel: CancellationToken,
}

impl ActivePrompt {
    /// Token cancelled by a matching `session/cancel` or by session close.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Compare-and-swap slot holding the active prompt, if any.
#[derive(Debug, Clone, Default)]
pub struct TurnGuard {
    slot: Arc<ArcSwapOption<ActivePrompt>>,
}

impl TurnGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to move from idle to active. Fails without touching the slot when
    /// another prompt already holds it.
    pub fn try_acquire(
        &self,
        session_id: impl Into<String>,
        request_id: RequestId,
        cancel: CancellationToken,
    ) -> Option<TurnPermit> {
        let prompt = Arc::new(ActivePrompt {
            session_id: session_id.into(),
            request_id,
            cancel,
        });

        let previous = self
            .slot
            .compare_and_swap(&None::<Arc<ActivePrompt>>, Some(Arc::clone(&prompt)));
        if previous.is_some() {
            return None;
        }

        debug!(session_id = %prompt.session_id, id = %prompt.request_id, "Prompt turn accepted");
        Some(TurnPermit {
            slot: Arc::clone(&self.slot),
            prompt,
        })
    }

    /// Clear the guard if the active prompt belongs to `session_id`, and
    /// signal its cancellation token. The handler itself keeps running.
    pub fn cancel(&self, session_id: &str) -> Option<Arc<ActivePrompt>> {
        let current = self.slot.load_full()?;
        if current.session_id != session_id {
            return None;
        }
        if !release_if_current(&self.slot, &current) {
            return None;
        }
        current.cancel.cancel();
        debug!(session_id, id = %current.request_id, "Prompt turn cancelled");
        Some(current)
    }

    /// Unconditionally return to idle.
    pub fn force_clear(&self) {
        self.slot.store(None);
    }

    /// Snapshot of the active prompt.
    pub fn active(&self) -> Option<Arc<ActivePrompt>> {
        self.slot.load_full()
    }

    pub fn is_active(&self) -> bool {
        self.slot.load().is_some()
    }
}

/// Held by the accepted prompt's handler; releases the guard on drop, but
/// only if the slot still holds this prompt.
#[derive(Debug)]
pub struct TurnPermit {
    slot: Arc<ArcSwapOption<ActivePrompt>>,
    prompt: Arc<ActivePrompt>,
}

impl TurnPermit {
    pub fn prompt(&self) -> &ActivePrompt {
        &self.prompt
    }
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        if release_if_current(&self.slot, &self.prompt) {
            debug!(session_id = %self.prompt.session_id, id = %self.prompt.request_id, "Prompt turn released");
        }
    }
}

fn release_if_current(slot: &ArcSwapOption<ActivePrompt>, expected: &Arc<ActivePrompt>) -> bool {
    let previous = slot.compare_and_swap(&Some(Arc::clone(expected)), None);
    match &*previous {
        Some(held) => Arc::ptr_eq(held, expected),
        None => false,
    }
}
