//! Bridges a promise into `std::future`. The future side shares only a
//! value slot and a waker with the reactive side, so it can be awaited from
//! another thread while the promise stays on its own.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::{Error, Promise};

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

struct Shared<A> {
    value: Option<A>,
    waker: Result<Waker, WakerState>,
}

/// Resolves with the promise's value, or with [`Error::Dropped`] if the
/// promise is torn down before ever resolving.
pub struct PromiseFuture<A> {
    shared: Arc<Mutex<Shared<A>>>,
}

/// Lives inside the delivery registration. Dropped without a delivery means
/// the promise graph went away unresolved; taint the waker so the future
/// stops pending.
struct SettleGuard<A> {
    shared: Arc<Mutex<Shared<A>>>,
}

impl<A> Drop for SettleGuard<A> {
    fn drop(&mut self) {
        let mut shared = self.shared.lock().unwrap();
        if shared.value.is_none() {
            if let Ok(waker) = std::mem::replace(&mut shared.waker, Err(WakerState::Tainted)) {
                waker.wake();
            }
        }
    }
}

impl<A: Clone + 'static> Promise<A> {
    /// A future for this promise's value. Each call yields an independent
    /// future; the future is `Send` for `Send` values, so the awaiting side
    /// may live on another thread.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::executor::block_on;
    /// use promise_cell::Promise;
    ///
    /// let (promise, resolver) = Promise::pending();
    /// let value = promise.future();
    /// resolver.resolve(7);
    /// assert_eq!(block_on(value), Ok(7));
    /// ```
    pub fn future(&self) -> PromiseFuture<A> {
        let shared = Arc::new(Mutex::new(Shared {
            value: None,
            waker: Err(WakerState::Fresh),
        }));
        let guard = SettleGuard {
            shared: shared.clone(),
        };
        self.then_do(move |a: &A| {
            let mut shared = guard.shared.lock().unwrap();
            shared.value = Some(a.clone());
            if let Ok(waker) = std::mem::replace(&mut shared.waker, Err(WakerState::Tainted)) {
                waker.wake();
            }
        });
        PromiseFuture { shared }
    }
}

impl<A> Future for PromiseFuture<A> {
    type Output = Result<A, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut shared = self.shared.lock().unwrap();
        match shared.value.take() {
            Some(value) => Poll::Ready(Ok(value)),
            None => match std::mem::replace(&mut shared.waker, Ok(cx.waker().clone())) {
                Err(WakerState::Tainted) => Poll::Ready(Err(Error::Dropped)),
                _ => Poll::Pending,
            },
        }
    }
}
