use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    thread::panicking,
};

use parse_display::Display;

use crate::Dependencies;


/// Why a trigger was admitted.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
#[display(style = "snake_case")]
pub(crate) enum TriggerKind {
    Startup,
    Action,
    Dependencies,
}

/// One admitted cause for invoking the store function.
///
/// The action and `deps` are taken at admission. The state is read when the trigger is processed.
pub(crate) struct Trigger<A, D> {
    pub kind: TriggerKind,
    pub action: Option<A>,
    pub deps: Dependencies<D>,
}

/// Orders triggers into one sequence processed one at a time.
///
/// A trigger admitted while another is being processed runs after it, never inside it.
pub(crate) struct Sequencer<T> {
    queue: RefCell<VecDeque<T>>,
    is_running: Cell<bool>,
}

impl<T> Sequencer<T> {
    pub fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            is_running: Cell::new(false),
        }
    }
    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.is_running.get()
    }

    pub fn admit(&self, item: T, mut run: impl FnMut(T)) {
        self.queue.borrow_mut().push_back(item);
        if self.is_running.get() {
            return;
        }
        let _guard = RunningGuard::new(self);
        loop {
            let Some(item) = self.queue.borrow_mut().pop_front() else {
                break;
            };
            run(item);
        }
    }
}

struct RunningGuard<'a, T>(&'a Sequencer<T>);

impl<'a, T> RunningGuard<'a, T> {
    fn new(s: &'a Sequencer<T>) -> Self {
        s.is_running.set(true);
        Self(s)
    }
}
impl<T> Drop for RunningGuard<'_, T> {
    fn drop(&mut self) {
        self.0.is_running.set(false);
        if panicking() {
            self.0.queue.borrow_mut().clear();
        }
    }
}
