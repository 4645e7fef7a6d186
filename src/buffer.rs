//! Collection buffer — handoff boundary between producers and the sender
//!
//! Many producer threads append via [`collect`](ProbeBuffer::collect); the
//! single sender task drains via [`flush`](ProbeBuffer::flush), which swaps
//! the accumulated contents out atomically. Records sharing a
//! (class, session, test) key are merged in place by bitwise OR, so repeated
//! execution within one interval costs no extra memory.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::probes::{ProbeKey, ProbeRecord};

#[derive(Default)]
struct BufferInner {
    /// Accumulated records in first-collection order
    records: Vec<ProbeRecord>,
    /// Merge index: record key -> position in `records`
    index: HashMap<ProbeKey, usize>,
}

/// Concurrent-safe accumulator of probe records.
///
/// The critical section covers only a local append or merge — `collect` never
/// waits on the sender, serialization, or the network. Intended to be shared
/// as an `Arc<ProbeBuffer>` and injected where needed, never held as ambient
/// global state.
#[derive(Default)]
pub struct ProbeBuffer {
    inner: Mutex<BufferInner>,
}

impl ProbeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records, merging any that share a key with an already-buffered
    /// record. Safe to call concurrently from many producers.
    pub fn collect<I>(&self, records: I)
    where
        I: IntoIterator<Item = ProbeRecord>,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            let key = record.key();
            if let Some(&position) = inner.index.get(&key) {
                inner.records[position].merge_from(&record);
            } else {
                let position = inner.records.len();
                inner.index.insert(key, position);
                inner.records.push(record);
            }
        }
    }

    /// Atomically swap out the accumulated records and return them.
    ///
    /// Each record is returned by exactly one `flush` call; an immediately
    /// repeated `flush` returns empty.
    pub fn flush(&self) -> Vec<ProbeRecord> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *inner).records
    }

    /// Number of distinct records currently buffered.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
