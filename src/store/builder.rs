use parse_display::Display;

use crate::{deps::DepsCell, BoxError, Dependencies, Outcome, Resolve};

use super::{BoxStoreFn, Store, StoreNode};

/// When a store's pipeline is attached.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[display(style = "snake_case")]
pub enum Activation {
    /// Attached for the whole life of the store.
    ///
    /// The store function is called once during construction with no action.
    #[default]
    Eager,

    /// Attached only while at least one subscriber exists.
    ///
    /// The first subscriber causes a call with no action, and the last unsubscribe cancels the
    /// running invocation. Actions dispatched and dependencies set while detached do not reach the
    /// store function.
    OnSubscribe,
}

/// A builder for creating a [`Store`].
pub struct StoreBuilder<S: 'static, A: 'static, D: 'static = ()> {
    store_fn: BoxStoreFn<S, A, D>,
    defaults: Dependencies<D>,
    overrides: Vec<(String, D)>,
    activation: Activation,
}

impl<S, A, D> StoreBuilder<S, A, D>
where
    S: Clone + PartialEq + 'static,
    A: Clone + 'static,
    D: Clone + PartialEq + 'static,
{
    pub fn new(
        store_fn: impl Fn(Option<S>, Option<A>, &Dependencies<D>, &Resolve<S>) -> Result<Outcome<S>, BoxError>
            + 'static,
    ) -> Self {
        Self {
            store_fn: Box::new(store_fn),
            defaults: Dependencies::new(),
            overrides: Vec::new(),
            activation: Activation::default(),
        }
    }

    /// Sets the dependencies used where the caller supplies none.
    pub fn defaults<K: Into<String>>(mut self, defaults: impl IntoIterator<Item = (K, D)>) -> Self {
        self.defaults = defaults.into_iter().collect();
        self
    }

    /// Sets the initial caller-supplied dependencies, merged over the defaults.
    pub fn dependencies<K: Into<String>>(
        mut self,
        overrides: impl IntoIterator<Item = (K, D)>,
    ) -> Self {
        self.overrides = overrides.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self
    }

    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn build(self) -> Store<S, A, D> {
        let deps = DepsCell::new(self.defaults, self.overrides);
        Store(StoreNode::new(self.store_fn, deps, self.activation))
    }
}
