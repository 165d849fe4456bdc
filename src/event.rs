use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    thread::panicking,
};


#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct ListenerKey(usize);

struct Listener<T: ?Sized> {
    key: ListenerKey,
    is_alive: Cell<bool>,
    f: Box<dyn Fn(&T)>,
}

/// Listeners in registration order.
pub(crate) struct Listeners<T: ?Sized>(RefCell<ListenersData<T>>);

struct ListenersData<T: ?Sized> {
    items: Vec<Rc<Listener<T>>>,
    key_next: usize,
}

impl<T: ?Sized + 'static> Listeners<T> {
    pub fn new() -> Self {
        Self(RefCell::new(ListenersData {
            items: Vec::new(),
            key_next: 0,
        }))
    }
    pub fn insert(&self, f: impl Fn(&T) + 'static) -> ListenerKey {
        let mut d = self.0.borrow_mut();
        let key = ListenerKey(d.key_next);
        d.key_next += 1;
        d.items.push(Rc::new(Listener {
            key,
            is_alive: Cell::new(true),
            f: Box::new(f),
        }));
        key
    }
    pub fn remove(&self, key: ListenerKey) -> bool {
        let mut d = self.0.borrow_mut();
        let Some(index) = d.items.iter().position(|l| l.key == key) else {
            return false;
        };
        d.items.remove(index).is_alive.set(false);
        true
    }
    pub fn len(&self) -> usize {
        self.0.borrow().items.len()
    }

    /// Calls every listener registered at the start of the call.
    ///
    /// A listener removed by an earlier listener is skipped.
    pub fn notify(&self, value: &T) {
        let items = self.0.borrow().items.clone();
        for l in items {
            if l.is_alive.get() {
                (l.f)(value);
            }
        }
    }
}

/// Multicast channel that never delivers re-entrantly.
///
/// A value sent while a round is in progress is queued and delivered after that round.
pub(crate) struct Broadcast<T: 'static> {
    listeners: Listeners<T>,
    pending: RefCell<VecDeque<T>>,
    is_delivering: Cell<bool>,
}

impl<T: 'static> Broadcast<T> {
    pub fn new() -> Self {
        Self {
            listeners: Listeners::new(),
            pending: RefCell::new(VecDeque::new()),
            is_delivering: Cell::new(false),
        }
    }
    pub fn listen(&self, f: impl Fn(&T) + 'static) -> ListenerKey {
        self.listeners.insert(f)
    }
    pub fn unlisten(&self, key: ListenerKey) -> bool {
        self.listeners.remove(key)
    }
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
    #[cfg(test)]
    pub fn is_delivering(&self) -> bool {
        self.is_delivering.get()
    }

    pub fn send(&self, value: T) {
        self.pending.borrow_mut().push_back(value);
        if self.is_delivering.get() {
            return;
        }
        let _guard = DeliveringGuard::new(self);
        loop {
            let Some(value) = self.pending.borrow_mut().pop_front() else {
                break;
            };
            self.listeners.notify(&value);
        }
    }
}

struct DeliveringGuard<'a, T: 'static>(&'a Broadcast<T>);

impl<'a, T: 'static> DeliveringGuard<'a, T> {
    fn new(b: &'a Broadcast<T>) -> Self {
        b.is_delivering.set(true);
        Self(b)
    }
}
impl<T: 'static> Drop for DeliveringGuard<'_, T> {
    fn drop(&mut self) {
        self.0.is_delivering.set(false);
        if panicking() {
            self.0.pending.borrow_mut().clear();
        }
    }
}
