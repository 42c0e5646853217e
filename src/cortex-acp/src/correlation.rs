//! Correlation id generation.

use std::sync::atomic::{AtomicU64, Ordering};

use cortex_acp_types::RequestId;

/// Generates `"{prefix}-{n}"` request ids for one session instance.
///
/// The prefix is a short random token chosen at construction; `n` comes from
/// an atomic counter, so ids stay unique under any number of concurrent
/// callers without locking.
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl CorrelationIdGenerator {
    pub fn new() -> Self {
        let mut prefix = uuid::Uuid::new_v4().simple().to_string();
        prefix.truncate(8);
        Self::with_prefix(prefix)
    }

    /// Use a fixed prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(1),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Next id. Never repeats within the lifetime of the generator.
    pub fn next_id(&self) -> RequestId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        RequestId::String(format!("{}-{}", self.prefix, n))
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
