//! Continuous value cells. A `Cell` always has a current value; `sample` is
//! steady for the whole of a transaction and updates commit when it closes.

use std::any::Any;
use std::cell::{Cell as StdCell, RefCell};
use std::rc::{Rc, Weak};

use crate::stream::{Entry, Stream, StreamCore};
use crate::transaction::Transaction;

struct CellCore<A> {
    value: A,
    /// Update waiting to commit at the close of the tagged transaction.
    pending: Option<(u64, A)>,
    updates: Stream<A>,
    /// Inputs a derived cell keeps alive on behalf of its observers.
    keep: Vec<Box<dyn Any>>,
}

/// A continuous value of type `A`.
pub struct Cell<A> {
    core: Rc<RefCell<CellCore<A>>>,
}

impl<A> Clone for Cell<A> {
    fn clone(&self) -> Self {
        Cell {
            core: self.core.clone(),
        }
    }
}

impl<A: Clone + 'static> Cell<A> {
    /// Holds the most recent firing of `src`, starting at `init`. The cell
    /// observes `src` weakly: when every handle to the cell is gone the
    /// registration goes with it.
    pub(crate) fn hold(src: &Stream<A>, init: A) -> Cell<A> {
        Transaction::run(|| {
            let core = Rc::new(RefCell::new(CellCore {
                value: init,
                pending: None,
                updates: src.clone(),
                keep: Vec::new(),
            }));
            let weak = Rc::downgrade(&core);
            src.add(Entry::new(
                move |a: &A| {
                    if let Some(core) = weak.upgrade() {
                        let schedule = {
                            let mut c = core.borrow_mut();
                            let txn = Transaction::id();
                            let fresh = !matches!(c.pending, Some((t, _)) if t == txn);
                            c.pending = Some((txn, a.clone()));
                            fresh
                        };
                        if schedule {
                            let weak = weak.clone();
                            Transaction::last(move || {
                                if let Some(core) = weak.upgrade() {
                                    let mut c = core.borrow_mut();
                                    if let Some((_, v)) = c.pending.take() {
                                        c.value = v;
                                    }
                                }
                            });
                        }
                    }
                },
                false,
            ));
            Cell { core }
        })
    }

    /// The value as of the start of the current transaction (or simply the
    /// current value outside one).
    pub fn sample(&self) -> A {
        self.core.borrow().value.clone()
    }

    /// The value this cell will hold once the current transaction commits.
    fn sample_new(core: &Rc<RefCell<CellCore<A>>>) -> A {
        let c = core.borrow();
        match &c.pending {
            Some((txn, v)) if *txn == Transaction::id() => v.clone(),
            _ => c.value.clone(),
        }
    }

    /// The stream of this cell's updates: fires the new value in the
    /// transaction that changes it.
    pub fn updates(&self) -> Stream<A> {
        self.core.borrow().updates.clone()
    }

    /// The updates, preceded by the current value delivered once in the
    /// transaction in which `value` is called. If the cell updates in that
    /// same transaction, only the new value is delivered.
    pub fn value(&self) -> Stream<A> {
        Transaction::run(|| {
            let out = Stream::new();
            let target = out.clone();
            self.updates()
                .add(Entry::new(move |a: &A| target.fire(a.clone()), false));
            let weak = Rc::downgrade(&self.core);
            let out_initial = out.clone();
            Transaction::defer(move || {
                if out_initial.fired_this_txn() {
                    return;
                }
                if let Some(core) = weak.upgrade() {
                    let v = core.borrow().value.clone();
                    out_initial.fire(v);
                }
            });
            out
        })
    }

    /// Combines two cells through the pure function `f`. When both inputs
    /// change in one transaction the result recomputes and updates exactly
    /// once, with both new values.
    pub fn lift2<B, C>(&self, other: &Cell<B>, f: impl Fn(&A, &B) -> C + 'static) -> Cell<C>
    where
        B: Clone + 'static,
        C: Clone + 'static,
    {
        Transaction::run(|| {
            let updates: Stream<C> = Stream::new();
            let out = Cell::hold(&updates, f(&self.sample(), &other.sample()));
            out.keep(Box::new(self.clone()));
            out.keep(Box::new(other.clone()));

            let f: Rc<dyn Fn(&A, &B) -> C> = Rc::new(f);
            let scheduled = Rc::new(StdCell::new(0u64));
            let wa = Rc::downgrade(&self.core);
            let wb = Rc::downgrade(&other.core);
            let wout: Weak<RefCell<StreamCore<C>>> = updates.downgrade();

            let recompute = move || {
                let txn = Transaction::id();
                if scheduled.get() == txn {
                    return;
                }
                scheduled.set(txn);
                let wa = wa.clone();
                let wb = wb.clone();
                let wout = wout.clone();
                let f = f.clone();
                Transaction::defer(move || {
                    let (Some(a), Some(b), Some(out)) = (wa.upgrade(), wb.upgrade(), wout.upgrade())
                    else {
                        return;
                    };
                    let va = Cell::sample_new(&a);
                    let vb = Cell::sample_new(&b);
                    let c = f(&va, &vb);
                    Stream::from_core(out).fire(c);
                });
            };
            {
                let recompute = recompute.clone();
                self.updates().add(Entry::new(move |_: &A| recompute(), false));
            }
            other.updates().add(Entry::new(move |_: &B| recompute(), false));
            out
        })
    }

    fn keep(&self, input: Box<dyn Any>) {
        self.core.borrow_mut().keep.push(input);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::stream::StreamSink;
    use crate::transaction::Transaction;

    #[test]
    fn hold_commits_at_the_close_of_the_transaction() {
        let sink = StreamSink::new();
        let held = sink.stream().hold(0);
        Transaction::run(|| {
            sink.send(3);
            assert_eq!(held.sample(), 0);
        });
        assert_eq!(held.sample(), 3);
    }

    #[test]
    fn hold_picks_up_an_earlier_firing_in_the_same_transaction() {
        let sink = StreamSink::new();
        let held = Transaction::run(|| {
            sink.send(3);
            sink.stream().hold(0)
        });
        assert_eq!(held.sample(), 3);
    }

    #[test]
    fn value_fires_current_then_updates() {
        let sink = StreamSink::new();
        let held = sink.stream().hold(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let out = seen.clone();
        let _listener =
            Transaction::run(|| held.value().listen(move |a: &i32| out.borrow_mut().push(*a)));
        sink.send(2);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn updates_skip_the_initial_value() {
        let sink = StreamSink::new();
        let held = sink.stream().hold(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let out = seen.clone();
        let _listener = held.updates().listen(move |a: &i32| out.borrow_mut().push(*a));
        sink.send(2);
        sink.send(3);
        assert_eq!(*seen.borrow(), vec![2, 3]);
    }

    #[test]
    fn lift2_updates_once_for_a_simultaneous_change() {
        let a = StreamSink::new();
        let b = StreamSink::new();
        let ca = a.stream().hold(0);
        let cb = b.stream().hold(0);
        let sum = ca.lift2(&cb, |x, y| x + y);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let out = seen.clone();
        let _listener = sum.updates().listen(move |a: &i32| out.borrow_mut().push(*a));
        Transaction::run(|| {
            a.send(2);
            b.send(3);
        });
        assert_eq!(*seen.borrow(), vec![5]);
        assert_eq!(sum.sample(), 5);
    }

    #[test]
    fn lift2_sees_one_side_changing_alone() {
        let a = StreamSink::new();
        let b = StreamSink::new();
        let sum = a.stream().hold(10).lift2(&b.stream().hold(20), |x, y| x + y);
        assert_eq!(sum.sample(), 30);
        a.send(11);
        assert_eq!(sum.sample(), 31);
        b.send(21);
        assert_eq!(sum.sample(), 32);
    }
}
