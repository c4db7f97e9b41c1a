// The MIT License (MIT)

// Copyright (c) 2015 Y. T. Chung <zonyitoo@gmail.com>

//  Permission is hereby granted, free of charge, to any person obtaining a
//  copy of this software and associated documentation files (the "Software"),
//  to deal in the Software without restriction, including without limitation
//  the rights to use, copy, modify, merge, publish, distribute, sublicense,
//  and/or sell copies of the Software, and to permit persons to whom the
//  Software is furnished to do so, subject to the following conditions:
//
//  The above copyright notice and this permission notice shall be included in
//  all copies or substantial portions of the Software.
//
//  THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
//  OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//  FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//  AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//  LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
//  FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
//  DEALINGS IN THE SOFTWARE.

//! Thread-affine promises on a cooperative scheduler
//!
//! Observers registered on a promise are always called on the thread owning
//! the scheduler that was current when they registered, whichever thread
//! settles the promise. Asynchronous units run on the scheduler's worker
//! threads and hand their outcome back to the owning thread.

#[macro_use]
extern crate log;

pub use crate::call::{invoke, Call};
pub use crate::context::{call, call_with, deferred, rejected, reset, resolved, run, when};
pub use crate::error::{Error, Result};
pub use crate::options::Options;
pub use crate::promise::{Deferred, Promise};
pub use crate::scheduler::{Directive, Scheduler};

pub mod call;
pub mod context;
pub mod error;
pub mod options;
pub mod promise;
pub mod scheduler;
pub mod sync;
mod runtime;

/// Scheduler configuration. Provides detailed control over the worker threads backing a scheduler.
#[derive(Debug, Clone, Default)]
pub struct Builder {
    opts: Options,
}

impl Builder {
    /// Generates the base configuration, from which configuration methods can be chained.
    pub fn new() -> Builder {
        Builder { opts: Options::new() }
    }

    /// Sets the number of worker threads running asynchronous units.
    #[inline]
    pub fn workers(mut self, workers: usize) -> Builder {
        self.opts.workers(workers);
        self
    }

    /// Names the worker threads. Each thread is called `"{name} #{index}"`.
    #[inline]
    pub fn name(mut self, name: String) -> Builder {
        self.opts.name(name);
        self
    }

    /// Create a scheduler owned by the calling thread
    #[inline]
    pub fn build(self) -> Scheduler {
        Scheduler::with_options(self.opts)
    }

    /// Run `unit` on a private scheduler with these configurations
    #[inline]
    pub fn call<F, R>(self, unit: F) -> R
        where F: FnOnce() -> R
    {
        context::call_with(self.opts, unit)
    }
}
