// Append-only, copy-on-write list shared across contexts
//
// Writers (wiring at startup) swap in a new list inside a critical
// section. Readers (emit, timer polling) take a snapshot, an Arc clone,
// and iterate outside the critical section, so handlers never run with
// interrupts masked and a handler may subscribe without deadlocking.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;

use critical_section::Mutex;

pub(crate) struct Registry<E> {
    entries: Mutex<RefCell<Arc<Vec<E>>>>,
}

impl<E: Clone> Registry<E> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(RefCell::new(Arc::new(Vec::new()))),
        }
    }

    pub(crate) fn push(&self, entry: E) {
        critical_section::with(|cs| {
            let mut entries = self.entries.borrow_ref_mut(cs);
            // clones only while a reader holds the old snapshot
            Arc::make_mut(&mut *entries).push(entry);
        });
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<E>> {
        critical_section::with(|cs| self.entries.borrow_ref(cs).clone())
    }

    pub(crate) fn retain(&self, keep: impl FnMut(&E) -> bool) {
        critical_section::with(|cs| {
            let mut entries = self.entries.borrow_ref_mut(cs);
            Arc::make_mut(&mut *entries).retain(keep);
        });
    }

    pub(crate) fn len(&self) -> usize {
        critical_section::with(|cs| self.entries.borrow_ref(cs).len())
    }
}

impl<E: Clone> Default for Registry<E> {
    fn default() -> Self {
        Self::new()
    }
}
