//! Retention queue — byte-bounded FIFO of payloads awaiting delivery
//!
//! Holds already-encoded payloads that could not be sent, bounded by total
//! byte size rather than entry count (entries vary widely after compression).
//! When an `add` pushes the total past the limit, the oldest entries are
//! evicted first — the queue exists to survive transient outages, so bounded
//! memory wins over completeness.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

#[derive(Default)]
struct QueueInner {
    entries: VecDeque<Vec<u8>>,
    total_bytes: usize,
}

/// FIFO of undelivered payloads with a total-byte-size cap.
///
/// Only the sender touches the queue (one writer-drainer); the mutex makes
/// `add` and `flush` atomic with respect to each other.
pub struct RetentionQueue {
    limit_bytes: usize,
    inner: Mutex<QueueInner>,
}

impl RetentionQueue {
    pub fn new(limit_bytes: usize) -> Self {
        Self {
            limit_bytes,
            inner: Mutex::new(QueueInner::default()),
        }
    }

    /// Append payloads, evicting from the front until the tracked total is
    /// back under the limit. A payload larger than the whole limit is dropped
    /// on arrival — it could never fit.
    ///
    /// Invariant on return: tracked bytes ≤ configured limit.
    pub fn add<I>(&self, payloads: I)
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut evicted = 0usize;

        for payload in payloads {
            if payload.len() > self.limit_bytes {
                warn!(
                    payload_bytes = payload.len(),
                    limit_bytes = self.limit_bytes,
                    "Payload exceeds retention limit — dropping"
                );
                continue;
            }

            inner.total_bytes += payload.len();
            inner.entries.push_back(payload);

            while inner.total_bytes > self.limit_bytes {
                if let Some(oldest) = inner.entries.pop_front() {
                    inner.total_bytes -= oldest.len();
                    evicted += 1;
                }
            }
        }

        if evicted > 0 {
            warn!(
                evicted = evicted,
                retained = inner.entries.len(),
                limit_bytes = self.limit_bytes,
                "Retention limit exceeded — evicted oldest payloads"
            );
        }
    }

    /// Atomically remove and return all current entries, oldest first.
    ///
    /// Once flushed, entries are no longer tracked; a caller whose delivery
    /// of a flushed entry fails is responsible for re-adding it.
    pub fn flush(&self) -> Vec<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let drained = std::mem::take(&mut *inner);
        if !drained.entries.is_empty() {
            debug!(
                payloads = drained.entries.len(),
                bytes = drained.total_bytes,
                "Retention queue flushed"
            );
        }
        drained.entries.into()
    }

    /// Total bytes currently tracked.
    pub fn total_bytes(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.total_bytes
    }

    /// Number of payloads currently tracked.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
