//! Stream shapes for dependency values.
//!
//! A dependency usually wraps some request that completes later. Returning its result as
//! "nothing yet, then the result" lets the store publish a placeholder state right away.

use std::future::{ready, Future};

use futures::{
    future::LocalBoxFuture,
    stream::{self, LocalBoxStream},
    FutureExt, Stream, StreamExt,
};


/// Yields `None`, then `Some` with the output of `future`.
pub fn pending_then<T: 'static>(
    future: impl Future<Output = T> + 'static,
) -> impl Stream<Item = Option<T>> + 'static {
    stream::once(ready(None)).chain(future.map(Some).into_stream())
}

/// One part of a [`sequence`].
pub enum Step<T> {
    Value(T),
    Future(LocalBoxFuture<'static, T>),
    Stream(LocalBoxStream<'static, T>),
}

impl<T: 'static> Step<T> {
    pub fn value(value: T) -> Self {
        Self::Value(value)
    }
    pub fn future(future: impl Future<Output = T> + 'static) -> Self {
        Self::Future(future.boxed_local())
    }
    pub fn stream(stream: impl Stream<Item = T> + 'static) -> Self {
        Self::Stream(stream.boxed_local())
    }
}
impl<T> From<T> for Step<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

/// Yields the values of `steps` in order.
///
/// A future step yields its output, a stream step yields all of its items before the next step starts.
pub fn sequence<T: 'static>(
    steps: impl IntoIterator<Item = Step<T>>,
) -> impl Stream<Item = T> + 'static {
    let steps: Vec<_> = steps.into_iter().collect();
    stream::iter(steps).flat_map(|step| match step {
        Step::Value(value) => stream::once(ready(value)).boxed_local(),
        Step::Future(future) => future.into_stream().boxed_local(),
        Step::Stream(stream) => stream,
    })
}
