//! Process-wide interning tables keyed by canonical string.
//!
//! The table only holds [`Weak`] handles. Owners remove their own entry from
//! `Drop`, and the removal is skipped when the key has meanwhile been
//! re-interned by a newer live instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

pub(crate) struct Registry<T> {
    table: Mutex<HashMap<String, Weak<T>>>,
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Return the live instance for `key`, or build and register a new one.
    ///
    /// `build` runs under the table lock, so it must not intern into the same registry.
    pub(crate) fn intern<E>(
        &self,
        key: &str,
        build: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let mut table = self.table.lock().expect("endpoint registry poisoned");
        if let Some(existing) = table.get(key).and_then(Weak::upgrade) {
            return Ok(existing);
        }
        let fresh = Arc::new(build()?);
        table.insert(key.to_string(), Arc::downgrade(&fresh));
        Ok(fresh)
    }

    /// Drop the entry for `key` unless it refers to a still-live instance.
    pub(crate) fn release(&self, key: &str) {
        let mut table = self.table.lock().expect("endpoint registry poisoned");
        if table.get(key).is_some_and(|weak| weak.strong_count() == 0) {
            table.remove(key);
        }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        let table = self.table.lock().expect("endpoint registry poisoned");
        table.get(key).is_some_and(|weak| weak.strong_count() > 0)
    }
}
