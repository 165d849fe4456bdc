use crate::event::{ListenerKey, Listeners};


/// Collapses positional dispatch values into one action.
///
/// No value is the absent action, one value is used as is, more values become one ordered sequence.
pub fn collapse<A: From<Vec<A>>>(values: impl IntoIterator<Item = A>) -> Option<A> {
    let mut values: Vec<A> = values.into_iter().collect();
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(A::from(values)),
    }
}

/// Multicast, non-buffering channel of dispatched actions.
///
/// Delivery is immediate, also for an action dispatched from a listener.
/// Listeners registered after a dispatch never see it.
pub(crate) struct ActionChannel<A: 'static>(Listeners<Option<A>>);

impl<A: 'static> ActionChannel<A> {
    pub fn new() -> Self {
        Self(Listeners::new())
    }
    pub fn dispatch(&self, action: Option<A>) {
        self.0.notify(&action);
    }
    pub fn listen(&self, f: impl Fn(&Option<A>) + 'static) -> ListenerKey {
        self.0.insert(f)
    }
}
