//! Atomic transaction context. Every state-affecting operation in this crate
//! runs inside a transaction so a batch of sends across several streams is
//! observed as one indivisible step.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

type Action = Box<dyn FnOnce()>;

struct TxnState {
    id: u64,
    depth: usize,
    deferred: VecDeque<Action>,
    last: Vec<Action>,
}

thread_local! {
    static CURRENT: RefCell<Option<TxnState>> = const { RefCell::new(None) };
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

/// Entry point to the transaction machinery. Transactions are confined to the
/// thread that opened them.
pub struct Transaction;

impl Transaction {
    /// Runs `f` inside the current transaction, opening one if none is active
    /// on this thread. The transaction closes when the outermost `run`
    /// returns: pending emissions are drained, then cell values commit.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::{StreamSink, Transaction};
    ///
    /// let sink = StreamSink::new();
    /// let count = sink.stream().hold(0);
    /// Transaction::run(|| {
    ///     sink.send(10);
    ///     // the held value is steady until the transaction closes
    ///     assert_eq!(count.sample(), 0);
    /// });
    /// assert_eq!(count.sample(), 10);
    /// ```
    pub fn run<R>(f: impl FnOnce() -> R) -> R {
        let outermost = CURRENT.with(|c| {
            let mut current = c.borrow_mut();
            match current.as_mut() {
                Some(state) => {
                    state.depth += 1;
                    false
                }
                None => {
                    let id = NEXT_ID.with(|n| {
                        let id = n.get() + 1;
                        n.set(id);
                        id
                    });
                    *current = Some(TxnState {
                        id,
                        depth: 0,
                        deferred: VecDeque::new(),
                        last: Vec::new(),
                    });
                    true
                }
            }
        });
        let result = f();
        if outermost {
            Self::close();
        } else {
            CURRENT.with(|c| c.borrow_mut().as_mut().unwrap().depth -= 1);
        }
        result
    }

    /// Identifier of the open transaction; 0 when none is active (real ids
    /// start at 1, so a stored id of a past transaction never matches).
    pub(crate) fn id() -> u64 {
        CURRENT.with(|c| c.borrow().as_ref().map(|s| s.id)).unwrap_or(0)
    }

    /// Queues `action` to run after the current propagation settles, still
    /// inside the transaction. Deferred actions may defer further actions;
    /// the queue drains to quiescence before values commit.
    pub(crate) fn defer(action: impl FnOnce() + 'static) {
        CURRENT.with(|c| {
            c.borrow_mut()
                .as_mut()
                .expect("defer outside transaction")
                .deferred
                .push_back(Box::new(action))
        });
    }

    /// Queues `action` for the commit phase at the close of the transaction.
    pub(crate) fn last(action: impl FnOnce() + 'static) {
        CURRENT.with(|c| {
            c.borrow_mut()
                .as_mut()
                .expect("last outside transaction")
                .last
                .push(Box::new(action))
        });
    }

    fn close() {
        loop {
            let action = CURRENT.with(|c| c.borrow_mut().as_mut().unwrap().deferred.pop_front());
            match action {
                Some(action) => action(),
                None => break,
            }
        }
        let commits = CURRENT.with(|c| std::mem::take(&mut c.borrow_mut().as_mut().unwrap().last));
        for commit in commits {
            commit();
        }
        CURRENT.with(|c| *c.borrow_mut() = None);
    }
}
