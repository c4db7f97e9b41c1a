// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Scheduler options

use std::default::Default;

/// Default prefix of worker thread names
pub const DEFAULT_NAME: &str = "coio-promise-worker";

/// Scheduler options
#[derive(Debug, Clone)]
pub struct Options {
    pub workers: usize,
    pub name: String,
}

impl Options {
    pub fn new() -> Options {
        Options {
            workers: num_cpus::get(),
            name: DEFAULT_NAME.to_owned(),
        }
    }

    pub fn workers(&mut self, workers: usize) -> &mut Options {
        assert!(workers >= 1, "Must have at least one worker");
        self.workers = workers;
        self
    }

    pub fn name(&mut self, name: String) -> &mut Options {
        self.name = name;
        self
    }
}

impl Default for Options {
    fn default() -> Options {
        Options::new()
    }
}
