// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Entry points binding promises to the calling thread
//!
//! `call` and `run` are the only way to get a running loop on a thread, and
//! therefore the only way to satisfy the precondition of `when`:
//!
//! ```
//! use coio_promise::{context, Error};
//!
//! let answer = context::call(|| {
//!     let doubled = context::when(|| Ok::<i32, Error>(21)).unwrap().then(|x| x * 2);
//!     doubled.on_value(|x| assert_eq!(x, 42));
//!     "done"
//! });
//! assert_eq!(answer, "done");
//! ```

use std::panic::{self, AssertUnwindSafe};

use crate::error::{Error, Result};
use crate::options::Options;
use crate::promise::{Deferred, Promise};
use crate::scheduler::{Directive, Scheduler};

/// A fresh unsettled promise
pub fn deferred<T, E>() -> Deferred<T, E>
    where T: Clone + Send + 'static,
          E: Clone + Send + 'static
{
    Deferred::new()
}

/// A promise already resolved with `value`
pub fn resolved<T, E>(value: T) -> Promise<T, E>
    where T: Clone + Send + 'static,
          E: Clone + Send + 'static
{
    let deferred = Deferred::new();
    deferred.complete(Ok(value));
    deferred.promise()
}

/// A promise already rejected with `failure`
pub fn rejected<T, E>(failure: E) -> Promise<T, E>
    where T: Clone + Send + 'static,
          E: Clone + Send + 'static
{
    let deferred = Deferred::new();
    deferred.complete(Err(failure));
    deferred.promise()
}

/// Run `unit` on a worker thread of the running scheduler.
///
/// `Ok` resolves and `Err` rejects the returned promise. A panicking `unit`
/// rejects it with `Error::Panicked`. Fails with `Error::SchedulerNotActive`
/// before `unit` runs if the calling thread is not inside `call` or `run`.
pub fn when<F, T, E>(unit: F) -> Result<Promise<T, E>>
    where F: FnOnce() -> ::std::result::Result<T, E> + Send + 'static,
          T: Clone + Send + 'static,
          E: From<Error> + Clone + Send + 'static
{
    let scheduler = Scheduler::current();
    if !scheduler.is_running() {
        return Err(Error::SchedulerNotActive);
    }

    let deferred = Deferred::new();
    let promise = deferred.promise();

    scheduler.schedule(move || {
                           let outcome = panic::catch_unwind(AssertUnwindSafe(unit)).unwrap_or_else(|payload| {
                               let err = Error::from_panic(&*payload);
                               error!("Asynchronous unit panicked: {}", err);
                               Err(E::from(err))
                           });
                           deferred.complete(outcome);
                       },
                       Directive::Async)?;
    Ok(promise)
}

/// Run `unit` on a private scheduler, then drive it until no work is left.
///
/// The previous scheduler of the calling thread is restored afterwards. A
/// panic in `unit`, or in a unit handed to the scheduler directly, is resumed
/// here.
pub fn call<F, R>(unit: F) -> R
    where F: FnOnce() -> R
{
    call_with(Options::default(), unit)
}

/// Same as `call`, with explicit configurations for the private scheduler
pub fn call_with<F, R>(opts: Options, unit: F) -> R
    where F: FnOnce() -> R
{
    Scheduler::run_new(opts, unit)
}

/// Alias of `call`
#[inline]
pub fn run<F, R>(unit: F) -> R
    where F: FnOnce() -> R
{
    call(unit)
}

/// Release the calling thread's scheduler binding.
///
/// Call this before handing the thread back to a shared pool.
#[inline]
pub fn reset() {
    Scheduler::reset()
}

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;

    #[derive(Debug, Clone, PartialEq)]
    enum Lookup {
        Unreachable(String),
        Failed(Error),
    }

    impl From<Error> for Lookup {
        fn from(err: Error) -> Lookup {
            Lookup::Failed(err)
        }
    }

    #[test]
    fn test_when_then_on_owner() {
        let (tx, rx) = mpsc::channel();

        call(|| {
            when(|| Ok::<i32, Error>(21))
                .unwrap()
                .then(|x| x * 2)
                .on_value(move |x| tx.send((x, thread::current().id())).unwrap());
        });

        assert_eq!(rx.try_iter().collect::<Vec<_>>(),
                   vec![(42, thread::current().id())]);
    }

    #[test]
    fn test_when_err_rejects() {
        let (tx, rx) = mpsc::channel();

        run(|| {
            when(|| Err::<(), _>(Lookup::Unreachable("example.invalid".to_owned())))
                .unwrap()
                .on_error(move |e| tx.send(e).unwrap());
        });

        assert_eq!(rx.try_recv().unwrap(), Lookup::Unreachable("example.invalid".to_owned()));
    }

    #[test]
    fn test_when_without_loop_fails_before_running() {
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        let ret = when(move || {
            flag.store(true, Ordering::SeqCst);
            Ok::<(), Error>(())
        });

        assert_eq!(ret.unwrap_err(), Error::SchedulerNotActive);
        assert!(!ran.load(Ordering::SeqCst));
        reset();
    }

    #[test]
    fn test_when_without_observers_completes() {
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        call(|| {
            when(move || {
                    flag.store(true, Ordering::SeqCst);
                    Ok::<(), Error>(())
                })
                .unwrap();
        });

        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_call_uses_private_scheduler() {
        let outer = Scheduler::current();

        let inner = call(|| {
            let inner = Scheduler::current();
            assert!(inner.is_running());
            inner
        });

        assert_ne!(inner, outer);
        assert!(!inner.is_running());
        assert_eq!(Scheduler::current(), outer);
        reset();
    }

    #[test]
    fn test_call_with_options() {
        let mut opts = Options::new();
        opts.workers(1).name("single".to_owned());

        let (tx, rx) = mpsc::channel();
        call_with(opts, || {
            when(move || {
                    tx.send(thread::current().name().map(str::to_owned)).unwrap();
                    Ok::<(), Error>(())
                })
                .unwrap();
        });

        assert_eq!(rx.try_recv().unwrap(), Some("single #0".to_owned()));
    }

    #[test]
    fn test_factories() {
        let (tx, rx) = mpsc::channel();

        let value_tx = tx.clone();
        resolved::<i32, i32>(1).on_value(move |v| value_tx.send(v).unwrap());
        rejected::<i32, i32>(2).on_error(move |e| tx.send(e).unwrap());

        let deferred = deferred::<i32, i32>();
        assert!(deferred.promise().is_pending());

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2]);
        reset();
    }

    #[test]
    fn test_when_panic_rejects() {
        let (tx, rx) = mpsc::channel();

        let ret = call(|| {
            let value_tx = tx.clone();
            when(|| -> ::std::result::Result<i32, Lookup> { panic!("unit boom") })
                .unwrap()
                .on_settled(move |v| value_tx.send(Ok(v)).unwrap(),
                            move |e| tx.send(Err((e, thread::current().id()))).unwrap());
            "returned"
        });

        assert_eq!(ret, "returned");
        assert_eq!(rx.try_iter().collect::<Vec<_>>(),
                   vec![Err((Lookup::Failed(Error::Panicked("unit boom".to_owned())), thread::current().id()))]);
    }
}
