//! Registry of active sources
//!
//! A source is inserted before its loop starts and removed when it reaches
//! end of stream (or its loop dies). The pipeline stops on its own once the
//! set is empty.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::ids::SourceId;

#[derive(Debug, Default)]
pub(crate) struct SourceSet {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u32,
    active: BTreeMap<SourceId, String>,
}

impl SourceSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a source under a fresh id
    pub(crate) fn insert(&self, name: impl Into<String>) -> SourceId {
        let mut inner = self.inner.lock();
        let id = SourceId::new(inner.next_id);
        inner.next_id = inner.next_id.wrapping_add(1);
        inner.active.insert(id, name.into());
        id
    }

    /// Remove a source; returns false if it was already gone
    pub(crate) fn remove(&self, id: SourceId) -> bool {
        self.inner.lock().active.remove(&id).is_some()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().active.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().active.len()
    }

    /// Names of the sources still running
    pub(crate) fn names(&self) -> Vec<String> {
        self.inner.lock().active.values().cloned().collect()
    }
}
