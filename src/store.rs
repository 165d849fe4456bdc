use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    ops::ControlFlow,
    rc::Rc,
};

use derive_ex::derive_ex;

use crate::{
    action::{collapse, ActionChannel},
    deps::DepsCell,
    event::{Broadcast, ListenerKey},
    invoke::{Invoker, Plan},
    sequencer::{Sequencer, Trigger, TriggerKind},
    state::{StateCell, Versioned},
    stream::StoreStream,
    BoxError, Dependencies, FailureKind, Outcome, Resolve, StoreError, Subscription,
};

pub use builder::{Activation, StoreBuilder};

mod builder;
#[cfg(test)]
mod tests;

pub(crate) type BoxStoreFn<S, A, D> = Box<
    dyn Fn(Option<S>, Option<A>, &Dependencies<D>, &Resolve<S>) -> Result<Outcome<S>, BoxError>,
>;

/// A reactive state container.
///
/// The store function is called once per dispatched action and once per change of dependencies.
/// Whatever it returns (a value, a future or a stream) is written into the store's state, which all
/// subscribers share.
///
/// Cloning a `Store` yields another handle to the same instance.
#[derive_ex(Clone, bound())]
pub struct Store<S: 'static, A: 'static, D: 'static = ()>(Rc<StoreNode<S, A, D>>);

impl<S, A, D> Store<S, A, D>
where
    S: Clone + PartialEq + 'static,
    A: Clone + 'static,
    D: Clone + PartialEq + 'static,
{
    /// Creates a store with no dependencies and the default configuration.
    pub fn new(
        store_fn: impl Fn(Option<S>, Option<A>, &Dependencies<D>, &Resolve<S>) -> Result<Outcome<S>, BoxError>
            + 'static,
    ) -> Self {
        StoreBuilder::new(store_fn).build()
    }

    /// Creates a store whose dependencies are `overrides`.
    pub fn with_dependencies<K: Into<String>>(
        store_fn: impl Fn(Option<S>, Option<A>, &Dependencies<D>, &Resolve<S>) -> Result<Outcome<S>, BoxError>
            + 'static,
        overrides: impl IntoIterator<Item = (K, D)>,
    ) -> Self {
        StoreBuilder::new(store_fn).dependencies(overrides).build()
    }

    pub fn builder(
        store_fn: impl Fn(Option<S>, Option<A>, &Dependencies<D>, &Resolve<S>) -> Result<Outcome<S>, BoxError>
            + 'static,
    ) -> StoreBuilder<S, A, D> {
        StoreBuilder::new(store_fn)
    }

    /// Returns the current state. `None` until a state has been produced.
    pub fn state(&self) -> Option<S> {
        self.0.state.get()
    }

    /// Overwrites the state without calling the store function.
    ///
    /// Subscribers are notified only if `state` differs from the current state.
    pub fn set_state(&self, state: S) {
        self.0.state.set(Some(state));
    }

    pub fn dispatch(&self, action: A) {
        self.0.actions.dispatch(Some(action));
    }

    /// Dispatches positional values as one action.
    ///
    /// No value dispatches the absent action, one value is dispatched as is,
    /// more values are dispatched as `A::from(values)`.
    pub fn dispatch_many(&self, values: impl IntoIterator<Item = A>)
    where
        A: From<Vec<A>>,
    {
        self.0.actions.dispatch(collapse(values));
    }

    pub fn dependencies(&self) -> Dependencies<D> {
        self.0.deps.get()
    }

    /// Replaces the caller-supplied dependencies.
    ///
    /// If the merged mapping changed, the store function is called with no action and the new dependencies.
    pub fn set_dependencies<K: Into<String>>(&self, overrides: impl IntoIterator<Item = (K, D)>) {
        self.0.deps.set(overrides);
    }

    /// Returns `true` while the asynchronous part of the latest invocation is running.
    pub fn is_pending(&self) -> bool {
        self.0.invoker.is_live()
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subscriber_count.get()
    }

    /// Calls `on_next` with the current state and then with every distinct state,
    /// and `on_error` with every failure.
    pub fn subscribe(
        &self,
        on_next: impl FnMut(Option<S>) + 'static,
        on_error: impl FnMut(StoreError) + 'static,
    ) -> Subscription {
        self.subscribe_with(on_next, on_error, |state: &Option<S>| state.clone())
    }

    /// Like [`subscribe`](Self::subscribe), but `on_next` receives `filter(state)` and is called only
    /// when that value changes.
    pub fn subscribe_with<T>(
        &self,
        on_next: impl FnMut(T) + 'static,
        on_error: impl FnMut(StoreError) + 'static,
        filter: impl Fn(&Option<S>) -> T + 'static,
    ) -> Subscription
    where
        T: Clone + PartialEq + 'static,
    {
        self.0.subscribe(Rc::new(Subscriber {
            filter: Box::new(filter),
            on_next: RefCell::new(Box::new(on_next)),
            on_error: RefCell::new(Box::new(on_error)),
            last: RefCell::new(None),
            pending: RefCell::new(VecDeque::new()),
            since: Cell::new(0),
        }))
    }

    /// Returns a stream of the current state followed by every distinct state.
    ///
    /// The stream never ends. Failures are yielded as `Err` and do not end it either.
    pub fn to_stream(&self) -> StoreStream<Option<S>> {
        self.to_stream_with(|state: &Option<S>| state.clone())
    }

    pub fn to_stream_with<T>(&self, filter: impl Fn(&Option<S>) -> T + 'static) -> StoreStream<T>
    where
        T: Clone + PartialEq + 'static,
    {
        StoreStream::new(|on_next, on_error| self.subscribe_with(on_next, on_error, filter))
    }
}

impl<S, A, D> std::fmt::Debug for Store<S, A, D>
where
    S: std::fmt::Debug + Clone + PartialEq + 'static,
    A: 'static,
    D: 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.state.try_borrow() {
            Some(state) => f.debug_tuple("Store").field(&*state).finish(),
            None => write!(f, "Store(<borrowed>)"),
        }
    }
}

pub(crate) struct StoreNode<S: 'static, A: 'static, D: 'static> {
    store_fn: BoxStoreFn<S, A, D>,
    state: StateCell<Option<S>>,
    deps: DepsCell<D>,
    actions: ActionChannel<A>,
    errors: Broadcast<StoreError>,
    sequencer: Sequencer<Trigger<A, D>>,
    invoker: Invoker,
    activation: Activation,
    subscriber_count: Cell<usize>,
}

impl<S, A, D> StoreNode<S, A, D>
where
    S: Clone + PartialEq + 'static,
    A: Clone + 'static,
    D: Clone + PartialEq + 'static,
{
    pub(crate) fn new(
        store_fn: BoxStoreFn<S, A, D>,
        deps: DepsCell<D>,
        activation: Activation,
    ) -> Rc<Self> {
        let this = Rc::new(Self {
            store_fn,
            state: StateCell::new(None),
            deps,
            actions: ActionChannel::new(),
            errors: Broadcast::new(),
            sequencer: Sequencer::new(),
            invoker: Invoker::new(),
            activation,
            subscriber_count: Cell::new(0),
        });
        let node = Rc::downgrade(&this);
        this.actions.listen(move |action| {
            if let Some(node) = node.upgrade() {
                let deps = node.deps.get();
                node.admit(TriggerKind::Action, action.clone(), deps);
            }
        });
        let node = Rc::downgrade(&this);
        this.deps.listen(move |deps| {
            if let Some(node) = node.upgrade() {
                node.admit(TriggerKind::Dependencies, None, deps.clone());
            }
        });
        if activation == Activation::Eager {
            this.admit_startup();
        }
        this
    }

    fn is_attached(&self) -> bool {
        match self.activation {
            Activation::Eager => true,
            Activation::OnSubscribe => self.subscriber_count.get() > 0,
        }
    }

    fn admit_startup(self: &Rc<Self>) {
        let deps = self.deps.get();
        self.admit(TriggerKind::Startup, None, deps);
    }

    fn admit(self: &Rc<Self>, kind: TriggerKind, action: Option<A>, deps: Dependencies<D>) {
        if !self.is_attached() {
            log::trace!("{kind} trigger dropped: no subscribers");
            return;
        }
        let trigger = Trigger {
            kind,
            action,
            deps,
        };
        self.sequencer.admit(trigger, |t| self.invoke(t));
    }

    fn invoke(self: &Rc<Self>, t: Trigger<A, D>) {
        let generation = self.invoker.supersede();
        log::trace!("invocation {generation} for {} trigger", t.kind);
        let resolve = Resolve::new();
        let result = (self.store_fn)(self.state.get(), t.action, &t.deps, &resolve);
        let resolved = resolve.close();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail(StoreError::new(FailureKind::Invoke, e));
                return;
            }
        };
        let plan = Plan::new(outcome, resolved);
        for state in plan.now {
            if !self.invoker.is_current(generation) {
                return;
            }
            self.state.set(state);
        }
        if let Some(tail) = plan.later {
            let node = Rc::downgrade(self);
            self.invoker.spawn(generation, async move {
                tail.run(|item| match node.upgrade() {
                    Some(node) => node.emit(generation, item),
                    None => ControlFlow::Break(()),
                })
                .await;
                if let Some(node) = node.upgrade() {
                    node.invoker.finish(generation);
                }
            });
        }
    }

    fn emit(&self, generation: u64, item: Result<S, StoreError>) -> ControlFlow<()> {
        if !self.invoker.is_current(generation) {
            return ControlFlow::Break(());
        }
        match item {
            Ok(state) => {
                self.state.set(Some(state));
            }
            Err(e) => self.fail(e),
        }
        if self.invoker.is_current(generation) {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    }

    fn fail(&self, e: StoreError) {
        if self.errors.listener_count() == 0 {
            log::warn!("{e} (no subscribers)");
        } else {
            self.errors.send(e);
        }
    }

    fn subscribe<T>(self: &Rc<Self>, sub: Rc<Subscriber<S, T>>) -> Subscription
    where
        T: Clone + PartialEq + 'static,
    {
        let state_key = self.state.listen({
            let sub = sub.clone();
            move |change| sub.on_change(change)
        });
        let error_key = self.errors.listen({
            let sub = sub.clone();
            move |e| sub.on_error(e)
        });
        sub.replay(&self.state);
        let count = self.subscriber_count.get() + 1;
        self.subscriber_count.set(count);
        if count == 1 && self.activation == Activation::OnSubscribe {
            self.admit_startup();
        }
        Subscription::from_weak_fn(Rc::downgrade(self), move |node: Rc<Self>| {
            node.unsubscribe(state_key, error_key)
        })
    }

    fn unsubscribe(&self, state_key: ListenerKey, error_key: ListenerKey) {
        if !self.state.unlisten(state_key) {
            return;
        }
        self.errors.unlisten(error_key);
        let count = self.subscriber_count.get() - 1;
        self.subscriber_count.set(count);
        if count == 0 && self.activation == Activation::OnSubscribe {
            self.invoker.supersede();
        }
    }
}

struct Subscriber<S, T> {
    filter: Box<dyn Fn(&Option<S>) -> T>,
    on_next: RefCell<Box<dyn FnMut(T)>>,
    on_error: RefCell<Box<dyn FnMut(StoreError)>>,
    last: RefCell<Option<T>>,
    pending: RefCell<VecDeque<T>>,
    since: Cell<u64>,
}

impl<S, T> Subscriber<S, T>
where
    S: Clone + PartialEq + 'static,
    T: Clone + PartialEq + 'static,
{
    fn on_change(&self, change: &Versioned<Option<S>>) {
        if change.version <= self.since.get() {
            return;
        }
        self.since.set(change.version);
        self.deliver(&change.value);
    }
    fn replay(&self, state: &StateCell<Option<S>>) {
        self.since.set(state.version());
        let value = state.get();
        self.deliver(&value);
    }
    fn deliver(&self, state: &Option<S>) {
        let value = (self.filter)(state);
        {
            let mut last = self.last.borrow_mut();
            if last.as_ref() == Some(&value) {
                return;
            }
            *last = Some(value.clone());
        }
        self.pending.borrow_mut().push_back(value);
        // Busy when `on_next` dispatches during the replay in `subscribe`, outside any state delivery round.
        let Ok(mut on_next) = self.on_next.try_borrow_mut() else {
            return;
        };
        loop {
            let Some(value) = self.pending.borrow_mut().pop_front() else {
                break;
            };
            (&mut *on_next)(value);
        }
    }
    fn on_error(&self, e: &StoreError) {
        (&mut *self.on_error.borrow_mut())(e.clone());
    }
}
