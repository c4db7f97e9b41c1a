// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Delivery of a settlement on the owning thread
//!
//! A `CompletionBridge` parks a placeholder on the scheduler that is current
//! when an observer registers. Completing the bridge, from whatever thread
//! settled the promise, swaps the placeholder for a unit dispatching the
//! outcome and moves it to the owning thread's run queue.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::error::panic_message;
use crate::scheduler::{Rescheduler, Scheduler};

type ValueCallback<T> = Box<dyn FnOnce(T) + Send + 'static>;
type ErrorCallback<E> = Box<dyn FnOnce(E) + Send + 'static>;

/// A pair of optional handlers, one per kind of settlement
pub struct Observer<T, E> {
    on_value: Option<ValueCallback<T>>,
    on_error: Option<ErrorCallback<E>>,
}

impl<T, E> Observer<T, E> {
    pub fn new<FV, FE>(on_value: FV, on_error: FE) -> Observer<T, E>
        where FV: FnOnce(T) + Send + 'static,
              FE: FnOnce(E) + Send + 'static
    {
        Observer {
            on_value: Some(Box::new(on_value)),
            on_error: Some(Box::new(on_error)),
        }
    }

    pub fn value<F>(on_value: F) -> Observer<T, E>
        where F: FnOnce(T) + Send + 'static
    {
        Observer {
            on_value: Some(Box::new(on_value)),
            on_error: None,
        }
    }

    pub fn error<F>(on_error: F) -> Observer<T, E>
        where F: FnOnce(E) + Send + 'static
    {
        Observer {
            on_value: None,
            on_error: Some(Box::new(on_error)),
        }
    }

    /// Hand the outcome to the matching handler.
    ///
    /// A panicking handler is reported and swallowed here, it never unwinds
    /// into the run loop or the resolver.
    pub fn dispatch(self, outcome: Result<T, E>) {
        let Observer { on_value, on_error } = self;

        let ret = panic::catch_unwind(AssertUnwindSafe(move || match outcome {
            Ok(value) => {
                if let Some(cb) = on_value {
                    cb(value);
                }
            }
            Err(failure) => {
                if let Some(cb) = on_error {
                    cb(failure);
                }
            }
        }));

        if let Err(payload) = ret {
            error!("Promise observer panicked: {}", panic_message(&*payload));
        }
    }
}

impl<T, E> fmt::Debug for Observer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Observer")
            .field("on_value", &self.on_value.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// An observer bound to the owning thread of a scheduler
pub struct CompletionBridge<T, E> {
    rescheduler: Rescheduler,
    observer: Observer<T, E>,
}

impl<T, E> CompletionBridge<T, E>
    where T: Send + 'static,
          E: Send + 'static
{
    pub fn new(scheduler: &Scheduler, observer: Observer<T, E>) -> CompletionBridge<T, E> {
        CompletionBridge {
            rescheduler: scheduler.park(),
            observer: observer,
        }
    }

    /// Record the outcome and replay it on the owning thread. Callable from any thread.
    pub fn complete(self, outcome: Result<T, E>) {
        let CompletionBridge { rescheduler, observer } = self;
        rescheduler.resume_with(move || observer.dispatch(outcome));
    }
}

impl<T, E> fmt::Debug for CompletionBridge<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CompletionBridge")
            .field("rescheduler", &self.rescheduler)
            .field("observer", &self.observer)
            .finish()
    }
}
