use std::{
    cell::{Cell, RefCell},
    fmt,
    future::Future,
    ops::ControlFlow,
    rc::Rc,
};

use futures::{
    future::{AbortHandle, Abortable, LocalBoxFuture},
    stream::LocalBoxStream,
    FutureExt, Stream, StreamExt, TryFutureExt, TryStreamExt,
};

use crate::{BoxError, FailureKind, StoreError};


/// What a store function returned.
pub enum Outcome<S> {
    /// A state available now.
    Value(S),
    /// A state available once the future settles.
    Deferred(LocalBoxFuture<'static, Result<S, BoxError>>),
    /// States produced over time. Each item is one whole state.
    Stream(LocalBoxStream<'static, Result<S, BoxError>>),
}

impl<S: 'static> Outcome<S> {
    pub fn value(value: S) -> Self {
        Self::Value(value)
    }
    pub fn deferred(future: impl Future<Output = S> + 'static) -> Self {
        Self::Deferred(future.map(Ok).boxed_local())
    }
    pub fn try_deferred<E: Into<BoxError>>(
        future: impl Future<Output = Result<S, E>> + 'static,
    ) -> Self {
        Self::Deferred(future.map_err(|e| -> BoxError { e.into() }).boxed_local())
    }
    pub fn stream(stream: impl Stream<Item = S> + 'static) -> Self {
        Self::Stream(stream.map(Ok).boxed_local())
    }
    pub fn try_stream<E: Into<BoxError>>(
        stream: impl Stream<Item = Result<S, E>> + 'static,
    ) -> Self {
        Self::Stream(stream.map_err(|e| -> BoxError { e.into() }).boxed_local())
    }
}
impl<S> From<S> for Outcome<S> {
    fn from(value: S) -> Self {
        Self::Value(value)
    }
}
impl<S: fmt::Debug> fmt::Debug for Outcome<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Deferred(_) => write!(f, "Deferred(..)"),
            Self::Stream(_) => write!(f, "Stream(..)"),
        }
    }
}

/// Lets a store function publish an interim state before its asynchronous result settles.
///
/// Only the last value passed while the store function runs is used.
pub struct Resolve<S>(Rc<ResolveSlot<S>>);

struct ResolveSlot<S> {
    value: RefCell<Option<S>>,
    is_closed: Cell<bool>,
}

impl<S> Resolve<S> {
    pub(crate) fn new() -> Self {
        Self(Rc::new(ResolveSlot {
            value: RefCell::new(None),
            is_closed: Cell::new(false),
        }))
    }
    pub fn resolve(&self, value: S) {
        if self.0.is_closed.get() {
            log::debug!("`resolve` called after the store function returned; ignored");
            return;
        }
        *self.0.value.borrow_mut() = Some(value);
    }
    pub(crate) fn close(&self) -> Option<S> {
        self.0.is_closed.set(true);
        self.0.value.borrow_mut().take()
    }
}
impl<S> Clone for Resolve<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
impl<S> fmt::Debug for Resolve<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resolve")
    }
}

/// The asynchronous part of an invocation.
pub(crate) enum Tail<S> {
    Deferred(LocalBoxFuture<'static, Result<S, BoxError>>),
    Stream(LocalBoxStream<'static, Result<S, BoxError>>),
}

impl<S: 'static> Tail<S> {
    /// Feeds every value of the tail to `emit` until it completes, fails, or `emit` breaks.
    pub async fn run(self, mut emit: impl FnMut(Result<S, StoreError>) -> ControlFlow<()>) {
        match self {
            Tail::Deferred(future) => {
                let value = future
                    .await
                    .map_err(|e| StoreError::new(FailureKind::Deferred, e));
                let _ = emit(value);
            }
            Tail::Stream(mut stream) => {
                while let Some(item) = stream.next().await {
                    let item = item.map_err(|e| StoreError::new(FailureKind::Stream, e));
                    let is_err = item.is_err();
                    if emit(item).is_break() || is_err {
                        return;
                    }
                }
                log::debug!("invocation stream completed");
            }
        }
    }
}

/// An invocation result normalized into "emit these now, then follow this".
pub(crate) struct Plan<S> {
    pub now: Vec<Option<S>>,
    pub later: Option<Tail<S>>,
}

impl<S> Plan<S> {
    pub fn new(outcome: Outcome<S>, resolved: Option<S>) -> Self {
        match outcome {
            Outcome::Value(value) => {
                let mut now = Vec::with_capacity(2);
                if let Some(resolved) = resolved {
                    now.push(Some(resolved));
                }
                now.push(Some(value));
                Self { now, later: None }
            }
            Outcome::Deferred(future) => Self {
                now: vec![resolved],
                later: Some(Tail::Deferred(future)),
            },
            Outcome::Stream(stream) => Self {
                now: resolved.into_iter().map(Some).collect(),
                later: Some(Tail::Stream(stream)),
            },
        }
    }
}

/// Keeps at most one invocation live.
pub(crate) struct Invoker {
    generation: Cell<u64>,
    live: RefCell<Option<AbortHandle>>,
}

impl Invoker {
    pub fn new() -> Self {
        Self {
            generation: Cell::new(0),
            live: RefCell::new(None),
        }
    }

    /// Invalidates the current invocation and returns the generation of the next one.
    pub fn supersede(&self) -> u64 {
        if let Some(handle) = self.live.borrow_mut().take() {
            log::debug!("superseding invocation {}", self.generation.get());
            handle.abort();
        }
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.get() == generation
    }

    pub fn is_live(&self) -> bool {
        self.live.borrow().is_some()
    }

    /// Runs `future` as the live invocation's asynchronous part.
    pub fn spawn(&self, generation: u64, future: impl Future<Output = ()> + 'static) {
        if !self.is_current(generation) {
            return;
        }
        let (handle, registration) = AbortHandle::new_pair();
        *self.live.borrow_mut() = Some(handle);
        rt_local::spawn_local(Abortable::new(future, registration).map(|_| ())).detach();
    }

    /// Marks the asynchronous part of `generation` as finished.
    pub fn finish(&self, generation: u64) {
        if self.is_current(generation) {
            self.live.borrow_mut().take();
        }
    }
}
impl Drop for Invoker {
    fn drop(&mut self) {
        if let Some(handle) = self.live.get_mut().take() {
            handle.abort();
        }
    }
}
