//! Descriptor-to-key map with per-round dedup counters.

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Arc;

use crate::selector::SelectionKey;

/// One fd map entry.
///
/// `update_count` records the round in which this key was last counted
/// as updated; `cleared_count` records the round in which its ready set
/// was last reset. Together they give set-then-merge semantics when a
/// key surfaces in more than one result list of a single round, and
/// at-most-once counting per round. The invariant
/// `update_count <= cleared_count <= round` holds between rounds.
#[derive(Debug)]
pub(crate) struct MapEntry {
    pub(crate) key: Arc<SelectionKey>,
    pub(crate) update_count: u64,
    pub(crate) cleared_count: u64,
}

impl MapEntry {
    fn new(key: Arc<SelectionKey>) -> Self {
        Self {
            key,
            update_count: 0,
            cleared_count: 0,
        }
    }
}

/// Maps descriptors to the key registered for them.
#[derive(Debug, Default)]
pub(crate) struct FdMap {
    map: HashMap<RawFd, MapEntry>,
}

impl FdMap {
    pub(crate) fn insert(&mut self, key: &Arc<SelectionKey>) {
        self.map.insert(key.channel().fd(), MapEntry::new(key.clone()));
    }

    /// Removes the entry for `key`, but only if the entry still belongs
    /// to the same key. A recycled descriptor already re-registered by a
    /// newer key must not lose its fresh entry to the old key's
    /// deregistration.
    pub(crate) fn remove(&mut self, key: &Arc<SelectionKey>) {
        let fd = key.channel().fd();
        if let Some(entry) = self.map.get(&fd) {
            if Arc::ptr_eq(&entry.key, key) {
                self.map.remove(&fd);
            }
        }
    }

    pub(crate) fn get_mut(&mut self, fd: RawFd) -> Option<&mut MapEntry> {
        self.map.get_mut(&fd)
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}
