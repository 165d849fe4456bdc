use std::{
    cell::RefCell,
    collections::VecDeque,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use futures::Stream;

use crate::{StoreError, Subscription};


/// A [`Stream`] of the values delivered to one subscriber.
///
/// Never yields `None`. Dropping the stream unsubscribes.
pub struct StoreStream<T: 'static> {
    data: Rc<RefCell<Data<T>>>,
    _subscription: Subscription,
}

struct Data<T> {
    items: VecDeque<Result<T, StoreError>>,
    waker: Option<Waker>,
}

impl<T> Data<T> {
    fn push(&mut self, item: Result<T, StoreError>) -> Option<Waker> {
        self.items.push_back(item);
        self.waker.take()
    }
}

impl<T: 'static> StoreStream<T> {
    pub(crate) fn new(
        subscribe: impl FnOnce(Box<dyn FnMut(T)>, Box<dyn FnMut(StoreError)>) -> Subscription,
    ) -> Self {
        let data = Rc::new(RefCell::new(Data {
            items: VecDeque::new(),
            waker: None,
        }));
        let on_next = {
            let data = data.clone();
            Box::new(move |value: T| push(&data, Ok(value))) as Box<dyn FnMut(T)>
        };
        let on_error = {
            let data = data.clone();
            Box::new(move |e: StoreError| push(&data, Err(e))) as Box<dyn FnMut(StoreError)>
        };
        let subscription = subscribe(on_next, on_error);
        Self {
            data,
            _subscription: subscription,
        }
    }
}

fn push<T>(data: &RefCell<Data<T>>, item: Result<T, StoreError>) {
    let waker = data.borrow_mut().push(item);
    if let Some(waker) = waker {
        waker.wake();
    }
}

impl<T: 'static> Stream for StoreStream<T> {
    type Item = Result<T, StoreError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut d = self.data.borrow_mut();
        match d.items.pop_front() {
            Some(item) => Poll::Ready(Some(item)),
            None => {
                d.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
