//! Discrete event streams. A `Stream` fires values inside transactions;
//! registrations are owned by the source, so a combinator chain stays live
//! as long as whatever delivers into it.

use std::cell::{Cell as StdCell, RefCell};
use std::rc::{Rc, Weak};

use crate::cell::Cell;
use crate::transaction::Transaction;

/// A registered callback. `spent` is the single-assignment guard for
/// once-only registrations: after the first delivery further ones are no-ops.
pub(crate) struct Entry<A> {
    cb: RefCell<Box<dyn FnMut(&A)>>,
    once: bool,
    spent: StdCell<bool>,
}

impl<A> Entry<A> {
    pub(crate) fn new(f: impl FnMut(&A) + 'static, once: bool) -> Rc<Entry<A>> {
        Rc::new(Entry {
            cb: RefCell::new(Box::new(f)),
            once,
            spent: StdCell::new(false),
        })
    }
}

pub(crate) struct StreamCore<A> {
    entries: Vec<Rc<Entry<A>>>,
    /// Most recent firing and the transaction it happened in. Replayed to
    /// listeners that attach later in the same transaction.
    firing: Option<(u64, A)>,
}

/// A stream of discrete events carrying values of type `A`.
pub struct Stream<A> {
    core: Rc<RefCell<StreamCore<A>>>,
}

impl<A> Clone for Stream<A> {
    fn clone(&self) -> Self {
        Stream {
            core: self.core.clone(),
        }
    }
}

/// Handle for a registration made with [`Stream::listen`]. The registration
/// stays live until `unlisten` is called; dropping the handle does not
/// remove it.
pub struct Listener {
    remove: Option<Box<dyn FnOnce()>>,
}

impl Listener {
    pub fn unlisten(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl<A: Clone + 'static> Stream<A> {
    pub(crate) fn new() -> Stream<A> {
        Stream {
            core: Rc::new(RefCell::new(StreamCore {
                entries: Vec::new(),
                firing: None,
            })),
        }
    }

    /// A stream that never fires.
    pub fn never() -> Stream<A> {
        Stream::new()
    }

    pub(crate) fn from_core(core: Rc<RefCell<StreamCore<A>>>) -> Stream<A> {
        Stream { core }
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<StreamCore<A>>> {
        Rc::downgrade(&self.core)
    }

    pub(crate) fn fired_this_txn(&self) -> bool {
        matches!(self.core.borrow().firing, Some((txn, _)) if txn == Transaction::id())
    }

    /// Fires `a` to every registration. Must run inside a transaction.
    pub(crate) fn fire(&self, a: A) {
        let entries = {
            let mut core = self.core.borrow_mut();
            core.firing = Some((Transaction::id(), a.clone()));
            core.entries.clone()
        };
        for entry in &entries {
            Self::deliver(&self.core, entry, &a);
        }
    }

    /// Registers `entry`, replaying the current transaction's firing to it
    /// if one already happened.
    pub(crate) fn add(&self, entry: Rc<Entry<A>>) {
        let replay = {
            let mut core = self.core.borrow_mut();
            core.entries.push(entry.clone());
            match &core.firing {
                Some((txn, a)) if *txn == Transaction::id() => Some(a.clone()),
                _ => None,
            }
        };
        if let Some(a) = replay {
            Self::deliver(&self.core, &entry, &a);
        }
    }

    fn deliver(core: &Rc<RefCell<StreamCore<A>>>, entry: &Rc<Entry<A>>, a: &A) {
        if entry.spent.get() {
            return;
        }
        if entry.once {
            entry.spent.set(true);
        }
        (entry.cb.borrow_mut())(a);
        if entry.once {
            core.borrow_mut().entries.retain(|e| !Rc::ptr_eq(e, entry));
        }
    }

    /// Registers `f` to run on every firing. The registration is owned by
    /// this stream; remove it with [`Listener::unlisten`].
    pub fn listen(&self, f: impl FnMut(&A) + 'static) -> Listener {
        Transaction::run(|| {
            let entry = Entry::new(f, false);
            self.add(entry.clone());
            let weak = Rc::downgrade(&self.core);
            Listener {
                remove: Some(Box::new(move || {
                    if let Some(core) = weak.upgrade() {
                        core.borrow_mut().entries.retain(|e| !Rc::ptr_eq(e, &entry));
                    }
                })),
            }
        })
    }

    /// Registers `f` to run on the next firing only, then retires itself.
    /// No handle is needed; if the stream never fires again, `f` is simply
    /// never invoked.
    pub fn listen_once(&self, f: impl FnMut(&A) + 'static) {
        Transaction::run(|| self.add(Entry::new(f, true)));
    }

    /// Stream of `f` applied to every firing.
    pub fn map<B: Clone + 'static>(&self, f: impl Fn(&A) -> B + 'static) -> Stream<B> {
        Transaction::run(|| {
            let out = Stream::new();
            let target = out.clone();
            self.add(Entry::new(move |a: &A| target.fire(f(a)), false));
            out
        })
    }

    /// Stream of the firings for which `pred` holds.
    pub fn filter(&self, pred: impl Fn(&A) -> bool + 'static) -> Stream<A> {
        Transaction::run(|| {
            let out = Stream::new();
            let target = out.clone();
            self.add(Entry::new(
                move |a: &A| {
                    if pred(a) {
                        target.fire(a.clone());
                    }
                },
                false,
            ));
            out
        })
    }

    /// Restricts this stream to its first occurrence: the returned stream
    /// fires at most once over its whole lifetime, and later firings of the
    /// source are dropped silently.
    pub fn once(&self) -> Stream<A> {
        Transaction::run(|| {
            let out = Stream::new();
            let target = out.clone();
            self.add(Entry::new(move |a: &A| target.fire(a.clone()), true));
            out
        })
    }

    /// Merges two streams. When both fire in the same transaction the
    /// result fires exactly once, with the left (`self`) value.
    pub fn or_else(&self, other: &Stream<A>) -> Stream<A> {
        Transaction::run(|| {
            let out = Stream::new();
            let state = Rc::new(RefCell::new(MergeState {
                txn: 0,
                pending: None,
                left_fired: false,
            }));
            self.add(Entry::new(merge_arm(&state, &out, true), false));
            other.add(Entry::new(merge_arm(&state, &out, false), false));
            out
        })
    }

    /// Holds the most recent firing as a continuous value, starting at
    /// `init`. The held value commits at the close of the transaction.
    pub fn hold(&self, init: A) -> Cell<A> {
        Cell::hold(self, init)
    }
}

impl<A: Clone + 'static> Stream<Option<A>> {
    /// Keeps only the present values, unwrapped.
    pub fn filter_some(&self) -> Stream<A> {
        Transaction::run(|| {
            let out = Stream::new();
            let target = out.clone();
            self.add(Entry::new(
                move |a: &Option<A>| {
                    if let Some(v) = a {
                        target.fire(v.clone());
                    }
                },
                false,
            ));
            out
        })
    }
}

struct MergeState<A> {
    txn: u64,
    pending: Option<A>,
    left_fired: bool,
}

/// One input arm of [`Stream::or_else`]. The first arm to fire in a
/// transaction schedules a single deferred emission; the left arm's value
/// wins if both fire before the emission runs.
fn merge_arm<A: Clone + 'static>(
    state: &Rc<RefCell<MergeState<A>>>,
    out: &Stream<A>,
    left: bool,
) -> impl FnMut(&A) + 'static {
    let state = state.clone();
    let out = out.clone();
    move |a: &A| {
        let mut s = state.borrow_mut();
        let txn = Transaction::id();
        if s.txn != txn {
            s.txn = txn;
            s.pending = None;
            s.left_fired = false;
            let state = state.clone();
            let out = out.clone();
            Transaction::defer(move || {
                let pending = state.borrow_mut().pending.take();
                if let Some(v) = pending {
                    out.fire(v);
                }
            });
        }
        if left {
            if !s.left_fired {
                s.pending = Some(a.clone());
                s.left_fired = true;
            }
        } else if s.pending.is_none() {
            s.pending = Some(a.clone());
        }
    }
}

/// The push end of a stream. Sending runs in a transaction, joining an open
/// one, so several sends across several sinks form one atomic batch.
pub struct StreamSink<A> {
    stream: Stream<A>,
}

impl<A> Clone for StreamSink<A> {
    fn clone(&self) -> Self {
        StreamSink {
            stream: self.stream.clone(),
        }
    }
}

impl<A: Clone + 'static> StreamSink<A> {
    pub fn new() -> StreamSink<A> {
        StreamSink {
            stream: Stream::new(),
        }
    }

    pub fn stream(&self) -> Stream<A> {
        self.stream.clone()
    }

    pub fn send(&self, a: A) {
        Transaction::run(|| self.stream.fire(a));
    }
}

impl<A: Clone + 'static> Default for StreamSink<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{Stream, StreamSink};
    use crate::transaction::Transaction;

    fn record<A: Clone + 'static>(s: &Stream<A>) -> Rc<RefCell<Vec<A>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let out = seen.clone();
        let _listener = s.listen(move |a: &A| out.borrow_mut().push(a.clone()));
        seen
    }

    #[test]
    fn once_keeps_the_first_firing_only() {
        let sink = StreamSink::new();
        let seen = record(&sink.stream().once());
        sink.send(1);
        sink.send(2);
        sink.send(3);
        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn map_and_filter_compose() {
        let sink = StreamSink::new();
        let seen = record(&sink.stream().map(|n: &i32| n * 2).filter(|n| *n > 2));
        sink.send(1);
        sink.send(2);
        assert_eq!(*seen.borrow(), vec![4]);
    }

    #[test]
    fn filter_some_unwraps_present_values() {
        let sink = StreamSink::new();
        let seen = record(&sink.stream().filter_some());
        sink.send(None);
        sink.send(Some(7));
        sink.send(None);
        assert_eq!(*seen.borrow(), vec![7]);
    }

    #[test]
    fn merge_prefers_left_when_simultaneous() {
        let left = StreamSink::new();
        let right = StreamSink::new();
        let merged = Transaction::run(|| left.stream().or_else(&right.stream()));
        let seen = record(&merged);
        // the right side fires first within the transaction; left still wins
        Transaction::run(|| {
            right.send(2);
            left.send(1);
        });
        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn merge_passes_either_side_alone() {
        let left = StreamSink::new();
        let right = StreamSink::new();
        let merged = Transaction::run(|| left.stream().or_else(&right.stream()));
        let seen = record(&merged);
        right.send(2);
        left.send(1);
        assert_eq!(*seen.borrow(), vec![2, 1]);
    }

    #[test]
    fn late_listener_in_same_transaction_receives_the_firing() {
        let sink = StreamSink::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let out = seen.clone();
        Transaction::run(|| {
            sink.send(5);
            sink.stream()
                .listen(move |a: &i32| out.borrow_mut().push(*a));
        });
        assert_eq!(*seen.borrow(), vec![5]);
    }

    #[test]
    fn unlisten_removes_the_registration() {
        let sink = StreamSink::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let out = seen.clone();
        let listener = sink
            .stream()
            .listen(move |a: &i32| out.borrow_mut().push(*a));
        sink.send(1);
        listener.unlisten();
        sink.send(2);
        assert_eq!(*seen.borrow(), vec![1]);
    }
}
