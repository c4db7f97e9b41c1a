// The MIT License (MIT)

// Copyright (c) 2015 Y. T. Chung <zonyitoo@gmail.com>

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

//! Worker threads running asynchronous units

use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{Builder, JoinHandle};

use rand::Rng;

use crate::options::Options;
use crate::scheduler::{Scheduler, Task};

pub enum WorkerMessage {
    Run(Task),
    Shutdown,
}

struct Worker {
    sender: Sender<WorkerMessage>,
    handle: JoinHandle<()>,
}

/// Worker threads each serving their own queue of asynchronous units
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// Start `opts.workers` threads serving `scheduler`
    pub fn spawn(scheduler: &Scheduler, opts: &Options) -> io::Result<WorkerPool> {
        let mut pool = WorkerPool { workers: Vec::with_capacity(opts.workers) };

        for worker_id in 0..opts.workers {
            let (tx, rx) = mpsc::channel();
            let scheduler = scheduler.clone();

            let spawned = Builder::new()
                .name(format!("{} #{}", opts.name, worker_id))
                .spawn(move || {
                    scheduler.bind_worker();
                    WorkerPool::serve(rx);
                    Scheduler::reset();
                });

            match spawned {
                Ok(hdl) => {
                    pool.workers.push(Worker {
                        sender: tx,
                        handle: hdl,
                    })
                }
                Err(err) => {
                    pool.shutdown();
                    return Err(err);
                }
            }
        }

        debug!("Spawned {} workers for {:?}", pool.workers.len(), scheduler);
        Ok(pool)
    }

    fn serve(rx: Receiver<WorkerMessage>) {
        while let Ok(WorkerMessage::Run(task)) = rx.recv() {
            task();
        }
    }

    /// Queue a unit on a randomly chosen worker, handing the message back if no worker is left
    pub fn submit(&self, task: Task) -> Result<(), WorkerMessage> {
        let mut msg = WorkerMessage::Run(task);

        if self.workers.is_empty() {
            return Err(msg);
        }

        let start = rand::thread_rng().gen_range(0..self.workers.len());
        for offset in 0..self.workers.len() {
            let worker = &self.workers[(start + offset) % self.workers.len()];
            match worker.sender.send(msg) {
                Ok(..) => return Ok(()),
                Err(mpsc::SendError(back)) => msg = back,
            }
        }

        Err(msg)
    }

    /// Stop every worker once it has finished its queued units, and join them
    pub fn shutdown(self) {
        for worker in self.workers.iter() {
            let _ = worker.sender.send(WorkerMessage::Shutdown);
        }

        for worker in self.workers {
            if let Err(err) = worker.handle.join() {
                error!("Worker exited with a panic: {:?}", err);
            }
        }
    }
}
