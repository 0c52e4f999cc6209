//! Index of writes awaiting confirmation

use crate::error::StorageError;
use crate::link::WriterId;
use std::collections::{HashMap, VecDeque};
use storyline_async::Deferred;

/// Completion handle of a write
pub(crate) type WriteDone = Deferred<Result<(), StorageError>>;

/// Id of one registered pending write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PendingId(u64);

#[derive(Debug)]
struct Entry {
    id: PendingId,
    done: WriteDone,
    writer: Option<WriterId>,
}

/// Entry released by a matching change notification
#[derive(Debug)]
pub(crate) struct Resolved {
    pub(crate) done: WriteDone,
    pub(crate) writer: Option<WriterId>,
}

/// `(key, expected value)` to FIFO list of outstanding writes
///
/// Only a notification carrying exactly the expected value releases an
/// entry; an expected value of `None` waits for the key's deletion.
/// Identical writes issued back to back share a slot and are all released
/// by the one notification the store emits for them.
#[derive(Debug, Default)]
pub(crate) struct PendingWrites {
    entries: HashMap<(String, Option<Vec<u8>>), VecDeque<Entry>>,
    next_id: u64,
}

impl PendingWrites {
    pub(crate) fn register(
        &mut self,
        key: String,
        value: Option<Vec<u8>>,
        done: WriteDone,
        writer: Option<WriterId>,
    ) -> PendingId {
        let id = PendingId(self.next_id);
        self.next_id += 1;
        self.entries
            .entry((key, value))
            .or_default()
            .push_back(Entry { id, done, writer });
        id
    }

    /// Release every entry waiting for `value` at `key`, oldest first
    pub(crate) fn resolve(&mut self, key: &str, value: Option<&[u8]>) -> Vec<Resolved> {
        let slot = (key.to_string(), value.map(<[u8]>::to_vec));
        self.entries
            .remove(&slot)
            .map(|entries| {
                entries
                    .into_iter()
                    .map(|entry| Resolved {
                        done: entry.done,
                        writer: entry.writer,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop entry `id`; false if it was already resolved
    pub(crate) fn remove(&mut self, id: PendingId) -> bool {
        let mut found = None;
        for (slot, entries) in &mut self.entries {
            if let Some(pos) = entries.iter().position(|e| e.id == id) {
                entries.remove(pos);
                found = Some((slot.clone(), entries.is_empty()));
                break;
            }
        }
        match found {
            Some((slot, true)) => {
                self.entries.remove(&slot);
                true
            }
            Some((_, false)) => true,
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(VecDeque::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_only_exact_value() {
        let mut pending = PendingWrites::default();
        pending.register("k".into(), Some(b"new".to_vec()), Deferred::new(), None);

        assert!(pending.resolve("k", Some(&b"other"[..])).is_empty());
        assert!(pending.resolve("k", None).is_empty());
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.resolve("k", Some(&b"new"[..])).len(), 1);
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn identical_writes_resolve_together_in_order() {
        let mut pending = PendingWrites::default();
        let first = WriterId::new();
        let second = WriterId::new();
        pending.register("k".into(), Some(b"v".to_vec()), Deferred::new(), Some(first));
        pending.register("k".into(), Some(b"v".to_vec()), Deferred::new(), Some(second));

        let resolved = pending.resolve("k", Some(&b"v"[..]));
        let writers: Vec<_> = resolved.iter().map(|r| r.writer).collect();
        assert_eq!(writers, vec![Some(first), Some(second)]);
    }

    #[test]
    fn remove_reports_whether_entry_was_live() {
        let mut pending = PendingWrites::default();
        let id = pending.register("k".into(), None, Deferred::new(), None);

        assert!(pending.remove(id));
        assert!(!pending.remove(id));
        assert_eq!(pending.len(), 0);
    }
}
