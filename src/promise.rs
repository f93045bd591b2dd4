//! The one-shot resolution primitive. A [`Promise`] pairs a delivery stream
//! that fires at most once with a cell holding the resolved value once it is
//! known, and both views agree at every instant.

use crate::cell::Cell;
use crate::stream::{Stream, StreamSink};
use crate::transaction::Transaction;

/// A value delivered at most once. Observers may query before or after
/// delivery with identical semantics; an unresolved promise is a valid
/// permanent state.
pub struct Promise<A> {
    s_deliver: Stream<A>,
    o_value: Cell<Option<A>>,
}

impl<A> Clone for Promise<A> {
    fn clone(&self) -> Self {
        Promise {
            s_deliver: self.s_deliver.clone(),
            o_value: self.o_value.clone(),
        }
    }
}

impl<A: Clone + 'static> Promise<A> {
    /// Builds a promise from a delivery stream. Only the first firing
    /// resolves it; later firings are dropped silently.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::{Promise, StreamSink};
    ///
    /// let sink = StreamSink::new();
    /// let promise = Promise::new(&sink.stream());
    /// sink.send(1);
    /// sink.send(2); // already resolved, ignored
    /// assert_eq!(promise.resolution().sample(), Some(1));
    /// ```
    pub fn new(deliveries: &Stream<A>) -> Promise<A> {
        Transaction::run(|| {
            let s_deliver = deliveries.once();
            let o_value = s_deliver.map(|a: &A| Some(a.clone())).hold(None);
            Promise { s_deliver, o_value }
        })
    }

    /// Builds a promise around a resolution cell that is already monotonic
    /// and once-only, deriving the delivery stream from its transitions
    /// into the present state. Used by [`Promise::lift`].
    fn from_cell(o_value: Cell<Option<A>>) -> Promise<A> {
        Transaction::run(|| Promise {
            s_deliver: o_value.updates().filter_some(),
            o_value,
        })
    }

    /// A fresh unresolved promise together with the handle that resolves it.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::Promise;
    ///
    /// let (promise, resolver) = Promise::pending();
    /// resolver.resolve(7);
    /// assert_eq!(promise.resolution().sample(), Some(7));
    /// ```
    pub fn pending() -> (Promise<A>, Resolver<A>) {
        Transaction::run(|| {
            let sink = StreamSink::new();
            let promise = Promise::new(&sink.stream());
            (promise, Resolver { sink })
        })
    }

    /// The delivery stream: fires the resolved value at the instant of
    /// resolution, and never again.
    pub fn deliveries(&self) -> Stream<A> {
        self.s_deliver.clone()
    }

    /// The resolution so far: `None` until delivery, then forever
    /// `Some(value)`.
    pub fn resolution(&self) -> Cell<Option<A>> {
        self.o_value.clone()
    }

    /// A stream that emits the resolved value exactly once, whether
    /// resolution already happened or is still to come. Each call yields an
    /// independent one-shot stream.
    ///
    /// Subscribe within the same transaction as the call, or the
    /// already-resolved emission happens before anyone is listening:
    ///
    /// ```
    /// use promise_cell::{Promise, Transaction};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let (promise, resolver) = Promise::pending();
    /// resolver.resolve("ready");
    ///
    /// let seen = Rc::new(RefCell::new(Vec::new()));
    /// let out = seen.clone();
    /// let _listener = Transaction::run(|| {
    ///     promise
    ///         .then()
    ///         .listen(move |v: &&str| out.borrow_mut().push(*v))
    /// });
    /// assert_eq!(*seen.borrow(), vec!["ready"]);
    /// ```
    pub fn then(&self) -> Stream<A> {
        Transaction::run(|| {
            self.o_value
                .value()
                .filter_some()
                .or_else(&self.s_deliver)
                .once()
        })
    }

    /// Runs `f` exactly once with the resolved value: immediately if the
    /// promise is already resolved, at delivery otherwise. The registration
    /// retires itself; nothing to unsubscribe. If the promise never
    /// resolves, `f` is never invoked.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::Promise;
    ///
    /// let (promise, resolver) = Promise::pending();
    /// promise.then_do(|v: &i32| println!("resolved to {v}"));
    /// resolver.resolve(7);
    /// ```
    pub fn then_do(&self, f: impl FnMut(&A) + 'static) {
        Transaction::run(|| self.then().listen_once(f));
    }

    /// Derives a promise that resolves with `f` of both inputs' values,
    /// exactly when both have resolved, with no ordering dependency between
    /// which input arrives first. Repeated pairwise application generalizes
    /// this to any number of inputs.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::Promise;
    ///
    /// let (pa, ra) = Promise::pending();
    /// let (pb, rb) = Promise::pending();
    /// let sum = Promise::lift(|a: &i32, b: &i32| a + b, &pa, &pb);
    /// ra.resolve(3);
    /// rb.resolve(4);
    /// assert_eq!(sum.resolution().sample(), Some(7));
    /// ```
    pub fn lift<B, C>(f: impl Fn(&A, &B) -> C + 'static, pa: &Promise<A>, pb: &Promise<B>) -> Promise<C>
    where
        B: Clone + 'static,
        C: Clone + 'static,
    {
        Transaction::run(|| {
            let combined = pa.o_value.lift2(&pb.o_value, move |oa, ob| match (oa, ob) {
                (Some(a), Some(b)) => Some(f(a, b)),
                _ => None,
            });
            Promise::from_cell(combined)
        })
    }
}

/// Resolves a promise made with [`Promise::pending`]. Resolving more than
/// once is not an error; every delivery after the first is dropped.
pub struct Resolver<A> {
    sink: StreamSink<A>,
}

impl<A> Clone for Resolver<A> {
    fn clone(&self) -> Self {
        Resolver {
            sink: self.sink.clone(),
        }
    }
}

impl<A: Clone + 'static> Resolver<A> {
    pub fn resolve(&self, a: A) {
        self.sink.send(a);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::Promise;
    use crate::stream::StreamSink;
    use crate::transaction::Transaction;

    #[test]
    fn resolves_once_with_the_first_delivery() {
        let sink = StreamSink::new();
        let promise = Promise::new(&sink.stream());
        let deliveries = Rc::new(RefCell::new(Vec::new()));
        let out = deliveries.clone();
        let _listener = promise
            .deliveries()
            .listen(move |a: &i32| out.borrow_mut().push(*a));

        assert_eq!(promise.resolution().sample(), None);
        sink.send(4);
        sink.send(5);
        assert_eq!(*deliveries.borrow(), vec![4]);
        assert_eq!(promise.resolution().sample(), Some(4));
    }

    #[test]
    fn constructed_in_the_delivery_transaction_still_resolves() {
        let sink = StreamSink::new();
        let promise = Transaction::run(|| {
            sink.send(9);
            Promise::new(&sink.stream())
        });
        assert_eq!(promise.resolution().sample(), Some(9));
    }

    #[test]
    fn resolver_is_cloneable_and_extra_resolutions_are_ignored() {
        let (promise, resolver) = Promise::pending();
        let resolver2 = resolver.clone();
        resolver.resolve(1);
        resolver2.resolve(2);
        assert_eq!(promise.resolution().sample(), Some(1));
    }
}
