// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Errors reported by promises and the scheduler

use std::any::Any;

use thiserror::Error;

/// Errors returned synchronously to the caller that caused them
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// `resolve` or `reject` was called on a promise that has already settled.
    ///
    /// The first settlement and the observers that received it are left untouched.
    #[error("illegal state: promise already resolved or rejected")]
    AlreadySettled,

    /// Asynchronous work was requested while no run loop is active on the calling thread.
    ///
    /// Wrap the call site in `coio_promise::call` or `coio_promise::run`.
    #[error("scheduler is not running on this thread")]
    SchedulerNotActive,

    /// `Scheduler::run` was entered again while its run loop is active.
    #[error("scheduler is already running")]
    AlreadyRunning,

    /// No worker thread could be spawned or reached to run an asynchronous unit.
    #[error("no worker thread is available")]
    WorkerUnavailable,

    /// An asynchronous unit or a call phase panicked; carries the panic message.
    #[error("unit panicked: {0}")]
    Panicked(String),
}

impl Error {
    /// Capture a panic payload as returned by `catch_unwind`
    pub fn from_panic(payload: &(dyn Any + Send)) -> Error {
        Error::Panicked(panic_message(payload).to_owned())
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "Box<Any>"
    }
}

/// Result type used throughout this crate
pub type Result<T> = ::std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    use std::panic;

    #[test]
    fn test_from_panic_keeps_message() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(Error::from_panic(&*payload), Error::Panicked("boom 1".to_owned()));

        let payload = panic::catch_unwind(|| panic!("static boom")).unwrap_err();
        assert_eq!(Error::from_panic(&*payload).to_string(), "unit panicked: static boom");
    }
}
