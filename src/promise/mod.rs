// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Promise style asynchronous APIs
//!
//! A settlement cell is shared between a `Deferred`, which settles it exactly
//! once, and any number of `Promise` views, which observe it. Observers are
//! always called on the owning thread of the scheduler that was current when
//! they registered, however and wherever the cell was settled.

mod bridge;

pub use self::bridge::{CompletionBridge, Observer};

use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use crate::sync::Spinlock;

enum State<T, E> {
    Pending(Vec<CompletionBridge<T, E>>),
    Fulfilled(T),
    Rejected(E),
}

struct Cell<T, E> {
    state: Spinlock<State<T, E>>,
}

// Queue the bridge built by `$bridge` and return `$ret` while the cell is
// pending, otherwise evaluate to a copy of the settled outcome.
macro_rules! queue_or_outcome {
    ($cell:expr, $bridge:expr, $ret:expr) => {{
        let mut state = $cell.state.lock();

        match *state {
            State::Pending(ref mut listeners) => {
                listeners.push($bridge);
                return $ret;
            }
            State::Fulfilled(ref value) => Ok(value.clone()),
            State::Rejected(ref failure) => Err(failure.clone()),
        }
    }}
}

/// The resolving side of a promise
pub struct Deferred<T, E> {
    cell: Arc<Cell<T, E>>,
}

/// The observing side of a promise
pub struct Promise<T, E> {
    cell: Arc<Cell<T, E>>,
}

impl<T, E> Deferred<T, E>
    where T: Clone + Send + 'static,
          E: Clone + Send + 'static
{
    pub fn new() -> Deferred<T, E> {
        Deferred {
            cell: Arc::new(Cell { state: Spinlock::new(State::Pending(Vec::new())) }),
        }
    }

    /// The promise settled by this deferred
    pub fn promise(&self) -> Promise<T, E> {
        Promise { cell: self.cell.clone() }
    }

    /// Fulfil the promise with `value`.
    ///
    /// Fails with `Error::AlreadySettled` if the promise was resolved or rejected before.
    pub fn resolve(&self, value: T) -> Result<&Deferred<T, E>> {
        self.settle(Ok(value))?;
        Ok(self)
    }

    /// Reject the promise with `failure`.
    ///
    /// Fails with `Error::AlreadySettled` if the promise was resolved or rejected before.
    pub fn reject(&self, failure: E) -> Result<&Deferred<T, E>> {
        self.settle(Err(failure))?;
        Ok(self)
    }

    /// Settle with `outcome` where a lost race is expected and harmless
    pub(crate) fn complete(&self, outcome: ::std::result::Result<T, E>) {
        if let Err(err) = self.settle(outcome) {
            debug!("Dropped a settlement: {}", err);
        }
    }

    fn settle(&self, outcome: ::std::result::Result<T, E>) -> Result<()> {
        let listeners = {
            let mut state = self.cell.state.lock();

            let listeners = match *state {
                State::Pending(ref mut listeners) => mem::replace(listeners, Vec::new()),
                _ => return Err(Error::AlreadySettled),
            };

            *state = match outcome {
                Ok(ref value) => State::Fulfilled(value.clone()),
                Err(ref failure) => State::Rejected(failure.clone()),
            };

            listeners
        };

        // Notified outside of the lock, an observer may register on this cell again
        for bridge in listeners {
            bridge.complete(outcome.clone());
        }

        Ok(())
    }
}

impl<T, E> Promise<T, E>
    where T: Clone + Send + 'static,
          E: Clone + Send + 'static
{
    /// Whether the promise is neither resolved nor rejected yet
    pub fn is_pending(&self) -> bool {
        match *self.cell.state.lock() {
            State::Pending(..) => true,
            _ => false,
        }
    }

    /// Call `cb` with the value once the promise is resolved
    pub fn on_value<F>(&self, cb: F) -> &Promise<T, E>
        where F: FnOnce(T) + Send + 'static
    {
        self.observe(Observer::value(cb));
        self
    }

    /// Call `cb` with the failure once the promise is rejected
    pub fn on_error<F>(&self, cb: F) -> &Promise<T, E>
        where F: FnOnce(E) + Send + 'static
    {
        self.observe(Observer::error(cb));
        self
    }

    /// Call `on_value` or `on_error`, whichever matches the settlement
    pub fn on_settled<FV, FE>(&self, on_value: FV, on_error: FE) -> &Promise<T, E>
        where FV: FnOnce(T) + Send + 'static,
              FE: FnOnce(E) + Send + 'static
    {
        self.observe(Observer::new(on_value, on_error));
        self
    }

    /// A promise for `filter` applied to this promise's value.
    ///
    /// A rejection is passed through unchanged and `filter` never sees it.
    pub fn then<U, F>(&self, filter: F) -> Promise<U, E>
        where U: Clone + Send + 'static,
              F: FnOnce(T) -> U + Send + 'static
    {
        let child = Deferred::new();
        let promise = child.promise();
        let scheduler = Scheduler::current();

        let outcome = queue_or_outcome!(self.cell,
                                        {
                                            let failed = child.clone();
                                            let observer = Observer::new(move |value| child.complete(Ok(filter(value))),
                                                                         move |failure| failed.complete(Err(failure)));
                                            CompletionBridge::new(&scheduler, observer)
                                        },
                                        promise);

        match outcome {
            Ok(value) => scheduler.ready(move || child.complete(Ok(filter(value)))),
            Err(failure) => child.complete(Err(failure)),
        }

        promise
    }

    /// A promise adopting the settlement of the promise `filter` returns for
    /// this promise's value.
    ///
    /// A rejection is passed through unchanged and `filter` never sees it.
    pub fn then_promise<U, F>(&self, filter: F) -> Promise<U, E>
        where U: Clone + Send + 'static,
              F: FnOnce(T) -> Promise<U, E> + Send + 'static
    {
        let child = Deferred::new();
        let promise = child.promise();
        let scheduler = Scheduler::current();

        let outcome = queue_or_outcome!(self.cell,
                                        {
                                            let failed = child.clone();
                                            let observer = Observer::new(move |value| adopt(child, filter(value)),
                                                                         move |failure| failed.complete(Err(failure)));
                                            CompletionBridge::new(&scheduler, observer)
                                        },
                                        promise);

        match outcome {
            Ok(value) => scheduler.ready(move || adopt(child, filter(value))),
            Err(failure) => child.complete(Err(failure)),
        }

        promise
    }

    fn observe(&self, observer: Observer<T, E>) {
        let bridge = CompletionBridge::new(&Scheduler::current(), observer);
        let outcome = queue_or_outcome!(self.cell, bridge, ());

        // Settled already; still delivered through the owning thread
        bridge.complete(outcome);
    }
}

// Settle `child` the way `nested` settles
fn adopt<U, E>(child: Deferred<U, E>, nested: Promise<U, E>)
    where U: Clone + Send + 'static,
          E: Clone + Send + 'static
{
    let failed = child.clone();
    nested.on_settled(move |value| child.complete(Ok(value)),
                      move |failure| failed.complete(Err(failure)));
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Deferred<T, E> {
        Deferred { cell: self.cell.clone() }
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Promise<T, E> {
        Promise { cell: self.cell.clone() }
    }
}

impl<T, E> Default for Deferred<T, E>
    where T: Clone + Send + 'static,
          E: Clone + Send + 'static
{
    fn default() -> Deferred<T, E> {
        Deferred::new()
    }
}

impl<T, E> fmt::Debug for Cell<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.state.try_lock() {
            Some(state) => {
                match *state {
                    State::Pending(ref listeners) => write!(f, "Pending({} listeners)", listeners.len()),
                    State::Fulfilled(..) => write!(f, "Fulfilled"),
                    State::Rejected(..) => write!(f, "Rejected"),
                }
            }
            None => write!(f, "<locked>"),
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Deferred({:?})", self.cell)
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Promise({:?})", self.cell)
    }
}
