use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt,
    rc::Rc,
};

use derive_ex::derive_ex;

use crate::event::{ListenerKey, Listeners};


/// An immutable mapping from dependency name to value.
///
/// Cloning is cheap. Two mappings are equal when they hold equal values under the same names.
#[derive_ex(Clone, bound())]
pub struct Dependencies<D>(Rc<BTreeMap<String, D>>);

impl<D> Dependencies<D> {
    pub fn new() -> Self {
        Self(Rc::new(BTreeMap::new()))
    }
    pub fn get(&self, name: &str) -> Option<&D> {
        self.0.get(name)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &D)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}
impl<D: Clone> Dependencies<D> {
    /// Returns `self` shallowly overridden by `overrides`. For each name, the override wins.
    pub fn merged<K: Into<String>>(&self, overrides: impl IntoIterator<Item = (K, D)>) -> Self {
        let mut map = (*self.0).clone();
        for (name, value) in overrides {
            map.insert(name.into(), value);
        }
        Self(Rc::new(map))
    }
}
impl<D> Default for Dependencies<D> {
    fn default() -> Self {
        Self::new()
    }
}
impl<D: PartialEq> PartialEq for Dependencies<D> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}
impl<D: fmt::Debug> fmt::Debug for Dependencies<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}
impl<K: Into<String>, D> FromIterator<(K, D)> for Dependencies<D> {
    fn from_iter<I: IntoIterator<Item = (K, D)>>(iter: I) -> Self {
        Self(Rc::new(
            iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }
}

/// A callable dependency value.
///
/// Equality is identity: clones of the same `DepFn` are equal, separately created ones are not.
#[derive_ex(Clone, bound())]
pub struct DepFn<Args, R>(Rc<dyn Fn(Args) -> R>);

impl<Args, R> DepFn<Args, R> {
    pub fn new(f: impl Fn(Args) -> R + 'static) -> Self {
        Self(Rc::new(f))
    }
    pub fn call(&self, args: Args) -> R {
        (self.0)(args)
    }
}
impl<Args, R> PartialEq for DepFn<Args, R> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}
impl<Args, R> fmt::Debug for DepFn<Args, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DepFn({:p})", Rc::as_ptr(&self.0))
    }
}

/// Holds `defaults ⊕ overrides` and publishes each distinct mapping.
pub(crate) struct DepsCell<D: 'static> {
    defaults: Dependencies<D>,
    current: RefCell<Dependencies<D>>,
    changes: Listeners<Dependencies<D>>,
}

impl<D> DepsCell<D>
where
    D: Clone + PartialEq + 'static,
{
    pub fn new<K: Into<String>>(
        defaults: Dependencies<D>,
        overrides: impl IntoIterator<Item = (K, D)>,
    ) -> Self {
        let current = defaults.merged(overrides);
        Self {
            defaults,
            current: RefCell::new(current),
            changes: Listeners::new(),
        }
    }

    pub fn get(&self) -> Dependencies<D> {
        self.current.borrow().clone()
    }

    /// Recomputes the mapping from the defaults and `overrides`.
    ///
    /// An empty `overrides` resets to the defaults. Listeners are notified immediately and only if the
    /// result differs from the current mapping. Returns `true` in that case.
    pub fn set<K: Into<String>>(&self, overrides: impl IntoIterator<Item = (K, D)>) -> bool {
        let deps = self.defaults.merged(overrides);
        {
            let mut current = self.current.borrow_mut();
            if *current == deps {
                return false;
            }
            *current = deps.clone();
        }
        self.changes.notify(&deps);
        true
    }

    pub fn listen(&self, f: impl Fn(&Dependencies<D>) + 'static) -> ListenerKey {
        self.changes.insert(f)
    }
}
