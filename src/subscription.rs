use std::{
    any::Any,
    cell::RefCell,
    mem::take,
    rc::{Rc, Weak},
};


/// Handle that detaches a listener from a store.
///
/// Detaching happens on [`unsubscribe`](Self::unsubscribe), on calling the function returned by
/// [`into_fn`](Self::into_fn), or on drop, whichever comes first. Further calls do nothing.
#[derive(Default)]
#[must_use]
pub struct Subscription(RefCell<RawSubscription>);

impl Subscription {
    pub fn empty() -> Self {
        Self::from_raw(RawSubscription::Empty)
    }
    pub fn from_fn(f: impl FnOnce() + 'static) -> Self {
        Self::from_raw(RawSubscription::Fn(Box::new(f)))
    }
    pub fn from_weak_fn<T: 'static>(
        this: Weak<T>,
        unsubscribe: impl Fn(Rc<T>) + 'static,
    ) -> Self {
        Self::from_raw(RawSubscription::WeakFn {
            this,
            unsubscribe: Box::new(move |this| {
                if let Some(this) = this.upgrade() {
                    if let Ok(this) = this.downcast() {
                        unsubscribe(this)
                    }
                }
            }),
        })
    }
    fn from_raw(raw: RawSubscription) -> Self {
        Self(RefCell::new(raw))
    }

    pub fn is_active(&self) -> bool {
        !matches!(*self.0.borrow(), RawSubscription::Empty)
    }

    pub fn unsubscribe(&self) {
        let raw = take(&mut *self.0.borrow_mut());
        match raw {
            RawSubscription::Empty => {}
            RawSubscription::Fn(f) => f(),
            RawSubscription::WeakFn { this, unsubscribe } => unsubscribe(this),
        }
    }

    /// Converts this handle into a function that unsubscribes when called.
    ///
    /// Dropping the function also unsubscribes.
    pub fn into_fn(self) -> impl Fn() + 'static {
        move || self.unsubscribe()
    }
}
impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[derive(Default)]
enum RawSubscription {
    #[default]
    Empty,
    Fn(Box<dyn FnOnce() + 'static>),
    WeakFn {
        this: Weak<dyn Any>,
        unsubscribe: Box<dyn Fn(Weak<dyn Any>)>,
    },
}
