//! One-shot promises built on a small reactive substrate: discrete event
//! [`Stream`]s, continuous value [`Cell`]s and atomic [`Transaction`]s.
//!
//! A [`Promise`] resolves at most once. Whether an observer arrives before
//! or after resolution makes no difference: [`Promise::then`] collapses
//! "already resolved" and "resolves later" into a single one-shot event,
//! [`Promise::then_do`] runs a callback exactly once, and [`Promise::lift`]
//! combines two promises into one that resolves exactly when both inputs
//! have, atomically even against simultaneous deliveries.
//!
//! # Examples
//!
//! ```
//! use promise_cell::{Promise, Transaction};
//!
//! let (pa, ra) = Promise::pending();
//! let (pb, rb) = Promise::pending();
//! let sum = Promise::lift(|a: &i32, b: &i32| a + b, &pa, &pb);
//! sum.then_do(|v: &i32| println!("both arrived: {v}"));
//!
//! // one atomic batch resolving both inputs
//! Transaction::run(|| {
//!     ra.resolve(3);
//!     rb.resolve(4);
//! });
//! assert_eq!(sum.resolution().sample(), Some(7));
//! ```

use thiserror::Error;

mod cell;
mod future;
mod promise;
mod stream;
mod transaction;

pub use cell::Cell;
pub use future::PromiseFuture;
pub use promise::{Promise, Resolver};
pub use stream::{Listener, Stream, StreamSink};
pub use transaction::Transaction;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The promise was torn down before it ever resolved.
    #[error("promise dropped before resolving")]
    Dropped,
}
