use std::{error::Error, rc::Rc};

use parse_display::Display;


/// Error type returned by store functions and the computations they start.
pub type BoxError = Box<dyn Error>;

/// Where a failure happened.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The store function returned `Err`.
    #[display("store function failed")]
    Invoke,
    /// The deferred computation returned by the store function failed.
    #[display("deferred computation failed")]
    Deferred,
    /// The stream returned by the store function yielded an error.
    #[display("stream failed")]
    Stream,
}

/// A failure delivered to subscribers.
///
/// Cloning shares the underlying error.
#[derive(Display, Debug, Clone)]
#[display("{kind}: {source}")]
pub struct StoreError {
    kind: FailureKind,
    source: Rc<dyn Error>,
}

impl StoreError {
    pub fn new(kind: FailureKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: Rc::from(source.into()),
        }
    }
    pub fn kind(&self) -> FailureKind {
        self.kind
    }
    pub fn get_ref(&self) -> &(dyn Error + 'static) {
        &*self.source
    }
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref()
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.source)
    }
}
