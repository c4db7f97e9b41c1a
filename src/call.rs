// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Four phase remote calls
//!
//! A call is built on the caller's thread, sent from a worker thread, and its
//! response is received back on the owning thread of the current scheduler:
//!
//! ```text
//! build ──> send (worker) ──> receive (owner) ──> resolved
//!   │            │                 │
//!   └────────────┴─────────────────┴──> handle ──> rejected
//! ```
//!
//! Exactly one settlement happens per invocation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::Error;
use crate::promise::{Deferred, Promise};
use crate::scheduler::{Directive, Scheduler};

/// A call carried out in four phases
pub trait Call: Send + Sync + 'static {
    /// The promised value
    type Value: Clone + Send + 'static;
    /// The failure observers see on rejection
    type Failure: Clone + Send + 'static;
    /// What `build` prepares for `send`
    type Request: Send + 'static;
    /// What `send` hands over to `receive`
    type Response: Send + 'static;
    /// Anything that may go wrong on the way; scheduling errors included
    type Fault: From<Error> + Send + 'static;

    /// Prepare the request, on the caller's thread
    fn build(&self) -> Result<Self::Request, Self::Fault>;

    /// Carry out the request, on a worker thread
    fn send(&self, request: Self::Request) -> Result<Self::Response, Self::Fault>;

    /// Turn the response into the promised value, on the owning thread
    fn receive(&self, response: Self::Response) -> Result<Self::Value, Self::Fault>;

    /// Turn a fault into the failure the promise is rejected with
    fn handle(&self, fault: Self::Fault) -> Self::Failure;
}

/// Start `call` on the current scheduler.
///
/// The returned promise settles on the owning thread once the response was
/// received, or as soon as any phase failed. A phase that panics fails with
/// `Error::Panicked`, converted into the call's fault.
pub fn invoke<C: Call>(call: C) -> Promise<C::Value, C::Failure> {
    let deferred = Deferred::new();
    let promise = deferred.promise();

    let request = match phase(|| call.build()) {
        Ok(request) => request,
        Err(fault) => {
            deferred.complete(Err(call.handle(fault)));
            return promise;
        }
    };

    let call = Arc::new(call);
    let scheduler = Scheduler::current();

    // Keeps the run loop alive until the response made its way back
    let rescheduler = scheduler.park();

    let sender = call.clone();
    let resolver = deferred.clone();
    let sent = scheduler.schedule(move || {
                                      let response = phase(|| sender.send(request));
                                      rescheduler.resume_with(move || {
                                          let outcome = response.and_then(|rsp| phase(|| sender.receive(rsp)))
                                              .map_err(|fault| sender.handle(fault));
                                          resolver.complete(outcome);
                                      });
                                  },
                                  Directive::Async);

    if let Err(err) = sent {
        warn!("Call could not be sent: {}", err);
        deferred.complete(Err(call.handle(C::Fault::from(err))));
    }

    promise
}

// Run one phase, turning a panic into a fault
fn phase<F, R, E>(f: F) -> Result<R, E>
    where F: FnOnce() -> Result<R, E>,
          E: From<Error>
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(ret) => ret,
        Err(payload) => {
            let err = Error::from_panic(&*payload);
            error!("Call phase panicked: {}", err);
            Err(E::from(err))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Mutex};
    use std::thread::{self, ThreadId};

    use crate::context;

    #[derive(Debug, Clone, PartialEq)]
    enum Fault {
        Build,
        Send(String),
        Scheduler(Error),
    }

    impl From<Error> for Fault {
        fn from(err: Error) -> Fault {
            Fault::Scheduler(err)
        }
    }

    struct Square {
        input: i32,
        fail_build: bool,
        fail_send: bool,
        panic_in: Option<&'static str>,
        sent_on: Mutex<mpsc::Sender<ThreadId>>,
        received: Arc<AtomicBool>,
    }

    impl Square {
        fn new(input: i32, sent_on: mpsc::Sender<ThreadId>) -> Square {
            Square {
                input: input,
                fail_build: false,
                fail_send: false,
                panic_in: None,
                sent_on: Mutex::new(sent_on),
                received: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl Call for Square {
        type Value = i32;
        type Failure = String;
        type Request = i32;
        type Response = i32;
        type Fault = Fault;

        fn build(&self) -> Result<i32, Fault> {
            if self.panic_in == Some("build") {
                panic!("build exploded");
            }
            if self.fail_build {
                Err(Fault::Build)
            } else {
                Ok(self.input + 1)
            }
        }

        fn send(&self, request: i32) -> Result<i32, Fault> {
            self.sent_on.lock().unwrap().send(thread::current().id()).unwrap();
            if self.panic_in == Some("send") {
                panic!("send exploded");
            }
            if self.fail_send {
                Err(Fault::Send("connection refused".to_owned()))
            } else {
                Ok(request * request)
            }
        }

        fn receive(&self, response: i32) -> Result<i32, Fault> {
            self.received.store(true, Ordering::SeqCst);
            if self.panic_in == Some("receive") {
                panic!("receive exploded");
            }
            Ok(response)
        }

        fn handle(&self, fault: Fault) -> String {
            format!("handled {:?}", fault)
        }
    }

    #[test]
    fn test_call_resolves_on_owner() {
        let (sent_tx, sent_rx) = mpsc::channel();
        let (tx, rx) = mpsc::channel();

        context::call(|| {
            invoke(Square::new(1, sent_tx)).on_value(move |v| tx.send((v, thread::current().id())).unwrap());
        });

        assert_ne!(sent_rx.try_recv().unwrap(), thread::current().id());
        assert_eq!(rx.try_recv().unwrap(), (4, thread::current().id()));
    }

    #[test]
    fn test_send_fault_is_handled() {
        let (sent_tx, _sent_rx) = mpsc::channel();
        let (tx, rx) = mpsc::channel();

        let mut square = Square::new(1, sent_tx);
        square.fail_send = true;
        let received = square.received.clone();

        context::call(|| {
            let value_tx = tx.clone();
            invoke(square).on_settled(move |v| value_tx.send(Ok(v)).unwrap(),
                                      move |e| tx.send(Err(e)).unwrap());
        });

        assert_eq!(rx.try_iter().collect::<Vec<_>>(),
                   vec![Err("handled Send(\"connection refused\")".to_owned())]);
        assert!(!received.load(Ordering::SeqCst));
    }

    #[test]
    fn test_build_fault_never_sends() {
        let (sent_tx, sent_rx) = mpsc::channel();
        let (tx, rx) = mpsc::channel();

        let mut square = Square::new(1, sent_tx);
        square.fail_build = true;

        context::call(|| {
            invoke(square).on_error(move |e| tx.send(e).unwrap());
        });

        assert!(sent_rx.try_recv().is_err());
        assert_eq!(rx.try_recv().unwrap(), "handled Build");
    }

    #[test]
    fn test_call_without_running_loop_is_handled() {
        let (sent_tx, sent_rx) = mpsc::channel();
        let (tx, rx) = mpsc::channel();

        invoke(Square::new(1, sent_tx)).on_error(move |e| tx.send(e).unwrap());

        assert!(sent_rx.try_recv().is_err());
        assert_eq!(rx.try_recv().unwrap(),
                   format!("handled {:?}", Fault::Scheduler(Error::SchedulerNotActive)));
        context::reset();
    }

    fn rejection_of(square: Square) -> Vec<::std::result::Result<i32, String>> {
        let (tx, rx) = mpsc::channel();

        context::call(|| {
            let value_tx = tx.clone();
            invoke(square).on_settled(move |v| value_tx.send(Ok(v)).unwrap(),
                                      move |e| tx.send(Err(e)).unwrap());
        });

        rx.try_iter().collect()
    }

    #[test]
    fn test_panicking_phases_are_handled() {
        let stages = [("build", "build exploded"), ("send", "send exploded"), ("receive", "receive exploded")];

        for &(stage, message) in stages.iter() {
            let (sent_tx, _sent_rx) = mpsc::channel();
            let mut square = Square::new(1, sent_tx);
            square.panic_in = Some(stage);

            let fault = Fault::Scheduler(Error::Panicked(message.to_owned()));
            assert_eq!(rejection_of(square), vec![Err(format!("handled {:?}", fault))]);
        }
    }
}
