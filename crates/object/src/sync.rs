// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Wait primitives for the object state draining protocol

use parking_lot::{Condvar, Mutex};

/// Auto-reset event: one `wait` consumes one `signal`
#[derive(Debug, Default)]
pub(crate) struct Event {
    signaled: Mutex<bool>,
    cv: Condvar,
}

impl Event {
    pub(crate) fn signal(&self) {
        *self.signaled.lock() = true;
        self.cv.notify_one();
    }

    pub(crate) fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cv.wait(&mut signaled);
        }
        *signaled = false;
    }
}

/// Event releasing every waiter at once
///
/// Waiters take a generation before dropping the lock that protects the
/// condition and wait for it to move on; a signal in between is not lost.
#[derive(Debug, Default)]
pub(crate) struct MultiEvent {
    generation: Mutex<u64>,
    cv: Condvar,
}

impl MultiEvent {
    pub(crate) fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    pub(crate) fn signal(&self) {
        *self.generation.lock() += 1;
        self.cv.notify_all();
    }

    pub(crate) fn wait_past(&self, seen: u64) {
        let mut generation = self.generation.lock();
        while *generation == seen {
            self.cv.wait(&mut generation);
        }
    }
}
