use std::cell::{Cell, Ref, RefCell};

use crate::event::{Broadcast, ListenerKey};


/// A value published by [`StateCell`] together with its change number.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Holds the last settled value and notifies only when it actually changes.
pub(crate) struct StateCell<T: 'static> {
    value: RefCell<T>,
    version: Cell<u64>,
    changes: Broadcast<Versioned<T>>,
}

impl<T> StateCell<T>
where
    T: Clone + PartialEq + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            version: Cell::new(0),
            changes: Broadcast::new(),
        }
    }

    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }
    pub fn try_borrow(&self) -> Option<Ref<'_, T>> {
        self.value.try_borrow().ok()
    }
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    /// Stores `value` and notifies listeners only if the current value is different.
    ///
    /// Returns `true` if the value changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut this_value = self.value.borrow_mut();
            if *this_value == value {
                return false;
            }
            *this_value = value.clone();
        }
        let version = self.version.get() + 1;
        self.version.set(version);
        self.changes.send(Versioned { version, value });
        true
    }

    pub fn listen(&self, f: impl Fn(&Versioned<T>) + 'static) -> ListenerKey {
        self.changes.listen(f)
    }
    pub fn unlisten(&self, key: ListenerKey) -> bool {
        self.changes.unlisten(key)
    }
}
