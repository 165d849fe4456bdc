//! A reactive state container driven by a store function.
//!
//! A [`Store`] calls its store function with the current state, a dispatched action and the current
//! [`Dependencies`], and writes whatever the function produces into its state. The function may
//! produce the new state directly, as a future, or as a stream (see [`Outcome`]). A newer action or
//! dependency change cancels the asynchronous part of the previous call.
//!
//! ```
//! use simple_store::{Outcome, Store};
//!
//! let store = Store::<i32, &str>::new(|state, action, _, _| {
//!     let state = state.unwrap_or(-1);
//!     Ok(Outcome::value(match action {
//!         Some("inc") => state + 1,
//!         _ => state.max(0),
//!     }))
//! });
//! assert_eq!(store.state(), Some(0));
//!
//! store.dispatch("inc");
//! store.dispatch("inc");
//! assert_eq!(store.state(), Some(2));
//! ```

mod action;
mod deps;
mod error;
mod event;
pub mod helpers;
mod invoke;
mod sequencer;
mod state;
mod store;
mod stream;
mod subscription;

#[cfg(test)]
mod utils;

pub use action::collapse;
pub use deps::{DepFn, Dependencies};
pub use error::{BoxError, FailureKind, StoreError};
pub use invoke::{Outcome, Resolve};
pub use store::{Activation, Store, StoreBuilder};
pub use stream::StoreStream;
pub use subscription::Subscription;

/// Dispatches any number of values to a store as one action.
///
/// `dispatch!(store)` dispatches the absent action, `dispatch!(store, a)` dispatches `a`,
/// and `dispatch!(store, a, b, ...)` dispatches `A::from(vec![a, b, ...])`.
#[macro_export]
macro_rules! dispatch {
    ($store:expr $(, $value:expr)* $(,)?) => {
        $store.dispatch_many(::std::vec![$($value),*])
    };
}
