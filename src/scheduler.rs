// The MIT License (MIT)

// Copyright (c) 2015 Rustcc Developers

// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:

// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Cooperative scheduler
//!
//! Every thread has a current scheduler. A scheduler is owned by exactly one
//! thread at a time: the thread driving its run loop, or the thread that
//! created it while no run loop is active. `Sync` units always execute on the
//! owning thread, `Async` units execute on the scheduler's worker threads.
//!
//! Parked units (see `Scheduler::suspend`) keep a run loop alive until they are
//! resumed from any thread, or until their `Rescheduler` is dropped.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use slab::Slab;

use crate::error::{Error, Result};
use crate::options::Options;
use crate::runtime::WorkerPool;

/// A unit of work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

type Panic = Box<dyn Any + Send + 'static>;

thread_local!(static CURRENT: RefCell<Option<Scheduler>> = RefCell::new(None));

// Id of the scheduler the current thread is a worker of
thread_local!(static WORKER_OF: Cell<Option<usize>> = Cell::new(None));

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Where a scheduled unit runs.
///
/// There is no directive for registering presence without running anything:
/// that is `Scheduler::park`, whose slot keeps the run loop alive until its
/// `Rescheduler` is resumed or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// On the owning thread, at the next opportunity
    Sync,
    /// On a worker thread
    Async,
}

struct State {
    owner: ThreadId,
    running: bool,
    ready: VecDeque<Task>,
    parked: Slab<Task>,
    in_flight: usize,
    panics: VecDeque<Panic>,
    pool: Option<WorkerPool>,
}

struct Inner {
    id: usize,
    opts: Options,
    state: Mutex<State>,
    cond: Condvar,
}

/// Cooperative scheduler
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Create a scheduler with default configurations
    pub fn new() -> Scheduler {
        Scheduler::with_options(Options::default())
    }

    /// Create a scheduler owned by the calling thread
    pub fn with_options(opts: Options) -> Scheduler {
        Scheduler {
            inner: Arc::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                opts: opts,
                state: Mutex::new(State {
                    owner: thread::current().id(),
                    running: false,
                    ready: VecDeque::new(),
                    parked: Slab::new(),
                    in_flight: 0,
                    panics: VecDeque::new(),
                    pool: None,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Get the current thread's scheduler, creating one if there is none
    pub fn current() -> Scheduler {
        CURRENT.with(|cur| {
            cur.borrow_mut()
                .get_or_insert_with(Scheduler::new)
                .clone()
        })
    }

    /// Make `self` the current thread's scheduler until the guard is dropped
    pub fn enter(&self) -> EnterGuard {
        let prev = CURRENT.with(|cur| cur.borrow_mut().replace(self.clone()));
        EnterGuard { prev: prev }
    }

    /// Release the current thread's scheduler binding.
    ///
    /// Call this before handing a thread back to a shared pool.
    pub fn reset() {
        let prev = CURRENT.with(|cur| cur.borrow_mut().take());
        WORKER_OF.with(|w| w.set(None));
        drop(prev);
    }

    /// Whether the calling thread is a worker thread of its current scheduler
    pub fn is_async() -> bool {
        let current = CURRENT.with(|cur| cur.borrow().as_ref().map(|s| s.inner.id));
        current.is_some() && WORKER_OF.with(|w| w.get()) == current
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.inner.id
    }

    #[inline]
    pub fn options(&self) -> &Options {
        &self.inner.opts
    }

    /// Whether a thread is driving the run loop
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Ready, parked and in-flight units
    pub fn work_count(&self) -> usize {
        let state = self.lock();
        state.ready.len() + state.parked.len() + state.in_flight
    }

    /// Schedule a unit with the given directive.
    ///
    /// `Async` fails with `Error::SchedulerNotActive` while no run loop is active.
    pub fn schedule<F>(&self, task: F, directive: Directive) -> Result<()>
        where F: FnOnce() + Send + 'static
    {
        match directive {
            Directive::Sync => {
                self.ready(task);
                Ok(())
            }
            Directive::Async => self.spawn(Box::new(task)),
        }
    }

    /// A unit is ready to run on the owning thread.
    ///
    /// Runs inline when called on the owning thread while no run loop is active.
    pub fn ready<F>(&self, task: F)
        where F: FnOnce() + Send + 'static
    {
        self.dispatch(self.lock(), Box::new(task));
    }

    /// Take a unit out of the run queue into the parked table.
    ///
    /// The parked unit counts as pending work until it is resumed.
    pub fn suspend<F>(&self, task: F) -> Rescheduler
        where F: FnOnce() + Send + 'static
    {
        let key = self.lock().parked.insert(Box::new(task));
        Rescheduler {
            scheduler: self.clone(),
            key: Some(key),
        }
    }

    /// Park a placeholder, registering pending work to be supplied on resume
    pub fn park(&self) -> Rescheduler {
        self.suspend(|| {})
    }

    /// Drive the run loop on the calling thread until no work remains
    pub fn run(&self) -> Result<()> {
        self.run_with(|| ())
    }

    /// Run `f` inline as the first unit of the run loop, then drive the loop
    /// until no work remains.
    ///
    /// A panic raised by `f` is resumed after the loop has drained. A panic
    /// raised by any other unit is resumed as soon as it reaches this thread.
    pub fn run_with<F, R>(&self, f: F) -> Result<R>
        where F: FnOnce() -> R
    {
        let state = self.lock();
        if state.running {
            return Err(Error::AlreadyRunning);
        }

        Ok(self.start(state).drive(f))
    }

    /// Run `f` on a fresh scheduler installed as the current one
    pub(crate) fn run_new<F, R>(opts: Options, f: F) -> R
        where F: FnOnce() -> R
    {
        let scheduler = Scheduler::with_options(opts);
        let _enter = scheduler.enter();

        // Nobody else holds a fresh scheduler, it cannot be running yet
        let running = scheduler.start(scheduler.lock());
        running.drive(f)
    }

    /// Bind the calling worker thread to this scheduler
    pub(crate) fn bind_worker(&self) {
        let prev = CURRENT.with(|cur| cur.borrow_mut().replace(self.clone()));
        WORKER_OF.with(|w| w.set(Some(self.inner.id)));
        drop(prev);
    }

    fn lock(&self) -> MutexGuard<State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self, mut state: MutexGuard<State>) -> Running {
        state.running = true;
        state.owner = thread::current().id();
        debug!("Scheduler #{} is running on {:?}", self.inner.id, thread::current().name());
        Running { scheduler: self }
    }

    fn dispatch(&self, mut state: MutexGuard<State>, task: Task) {
        if !state.running && state.owner == thread::current().id() {
            drop(state);
            task();
        } else {
            state.ready.push_back(task);
            self.inner.cond.notify_one();
        }
    }

    fn spawn(&self, task: Task) -> Result<()> {
        let mut state = self.lock();
        if !state.running {
            return Err(Error::SchedulerNotActive);
        }

        if state.pool.is_none() {
            let pool = WorkerPool::spawn(self, &self.inner.opts).map_err(|err| {
                error!("Scheduler #{} failed to spawn workers: {}", self.inner.id, err);
                Error::WorkerUnavailable
            })?;
            state.pool = Some(pool);
        }

        let scheduler = self.clone();
        let wrapper: Task = Box::new(move || {
            let ret = panic::catch_unwind(AssertUnwindSafe(task));
            scheduler.finish(ret.err());
        });

        let rejected = match state.pool {
            Some(ref pool) => pool.submit(wrapper).err(),
            None => None,
        };

        match rejected {
            None => {
                state.in_flight += 1;
                Ok(())
            }
            Some(msg) => {
                drop(state);
                drop(msg);
                Err(Error::WorkerUnavailable)
            }
        }
    }

    // An async unit has returned on a worker thread
    fn finish(&self, panicked: Option<Panic>) {
        let mut state = self.lock();
        state.in_flight -= 1;

        if let Some(payload) = panicked {
            error!("Scheduler #{}: asynchronous unit panicked", self.inner.id);
            state.panics.push_back(payload);
        }

        self.inner.cond.notify_one();
    }

    fn drain(&self) {
        let mut state = self.lock();

        loop {
            if let Some(payload) = state.panics.pop_front() {
                drop(state);
                panic::resume_unwind(payload);
            }

            if let Some(task) = state.ready.pop_front() {
                drop(state);
                task();
                state = self.lock();
                continue;
            }

            if state.parked.is_empty() && state.in_flight == 0 {
                break;
            }

            state = self.inner.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Scheduler {
        Scheduler::new()
    }
}

impl PartialEq for Scheduler {
    fn eq(&self, other: &Scheduler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Scheduler {}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Scheduler #{}", self.inner.id)
    }
}

// Marks the run loop active; shuts the workers down when dropped
struct Running<'a> {
    scheduler: &'a Scheduler,
}

impl<'a> Running<'a> {
    fn drive<F, R>(self, f: F) -> R
        where F: FnOnce() -> R
    {
        let ret = panic::catch_unwind(AssertUnwindSafe(f));
        self.scheduler.drain();

        match ret {
            Ok(ret) => ret,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

impl<'a> Drop for Running<'a> {
    fn drop(&mut self) {
        let pool = {
            let mut state = self.scheduler.lock();
            state.running = false;
            state.pool.take()
        };

        if let Some(pool) = pool {
            pool.shutdown();
        }

        debug!("Scheduler #{} stopped", self.scheduler.inner.id);
    }
}

/// Restores the previous current scheduler when dropped
pub struct EnterGuard {
    prev: Option<Scheduler>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        let replaced = CURRENT.try_with(|cur| mem::replace(&mut *cur.borrow_mut(), prev));
        drop(replaced);
    }
}

/// Handle to a parked unit, resumable from any thread
pub struct Rescheduler {
    scheduler: Scheduler,
    key: Option<usize>,
}

impl Rescheduler {
    /// Move the parked unit back to the owning thread's run queue
    pub fn resume(mut self) {
        self.unpark(None);
    }

    /// Replace the parked unit with `task` and move it to the owning thread's run queue
    pub fn resume_with<F>(mut self, task: F)
        where F: FnOnce() + Send + 'static
    {
        self.unpark(Some(Box::new(task)));
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn unpark(&mut self, replacement: Option<Task>) {
        let key = match self.key.take() {
            Some(key) => key,
            None => return,
        };

        // The unit leaves the parked table and enters the run queue under one
        // lock, so a run loop never sees it in neither.
        let mut state = self.scheduler.lock();
        let parked = state.parked.remove(key);

        match replacement {
            Some(task) => {
                self.scheduler.dispatch(state, task);
                drop(parked);
            }
            None => self.scheduler.dispatch(state, parked),
        }
    }
}

impl Drop for Rescheduler {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let discarded = {
                let mut state = self.scheduler.lock();
                let task = state.parked.remove(key);
                self.scheduler.inner.cond.notify_one();
                task
            };

            debug!("Scheduler #{} discarded parked unit {}", self.scheduler.inner.id, key);
            drop(discarded);
        }
    }
}

impl fmt::Debug for Rescheduler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Rescheduler({:?}, {:?})", self.scheduler, self.key)
    }
}
