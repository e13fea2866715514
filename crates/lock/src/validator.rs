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

//! Per-thread held lock tracking
//!
//! Each thread keeps the stack of locks it currently holds. Before blocking on
//! a new lock the classes on that stack are checked against the class being
//! acquired.

use crate::assertion::assert_lock;
use crate::class::{LockClass, validation_class};
use crate::config::global_config;
use crate::error::LockError;
use smallvec::SmallVec;
use std::cell::RefCell;

/// Access mode of a held lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy)]
struct HeldLock {
    /// Address of the handle, identity only
    handle: usize,
    class: LockClass,
    access: Access,
}

thread_local! {
    static HELD_LOCKS: RefCell<SmallVec<[HeldLock; 8]>> = RefCell::new(SmallVec::new());
}

/// Check the acquisition of `handle` against the locks this thread holds
///
/// Re-entering a handle already held by the thread skips the class checks.
pub(crate) fn check_order(handle: usize, class: LockClass) {
    let Some(acquiring) = validation_class(class) else {
        return;
    };

    let violation = HELD_LOCKS.with(|held| {
        let held = held.borrow();
        if held.iter().any(|lock| lock.handle == handle) {
            return None;
        }
        held.iter().find_map(|lock| {
            let held_class = validation_class(lock.class)?;
            (!acquiring.may_be_acquired_while_holding(&held_class)).then_some(lock.class)
        })
    });

    if let Some(held) = violation {
        assert_lock(LockError::order_violation(class, held));
    }
}

/// Record a lock that has just been obtained
pub(crate) fn record_acquire(handle: usize, class: LockClass, access: Access) {
    if !global_config().validation {
        return;
    }
    HELD_LOCKS.with(|held| held.borrow_mut().push(HeldLock { handle, class, access }));
}

/// Forget the most recent record of `handle`
pub(crate) fn record_release(handle: usize) {
    if !global_config().validation {
        return;
    }
    HELD_LOCKS.with(|held| {
        let mut held = held.borrow_mut();
        if let Some(pos) = held.iter().rposition(|lock| lock.handle == handle) {
            held.remove(pos);
        }
    });
}

/// Number of lock records held by the calling thread
pub fn held_lock_count() -> usize {
    HELD_LOCKS.with(|held| held.borrow().len())
}

/// Classes and access modes held by the calling thread, oldest first
pub fn held_locks() -> Vec<(LockClass, Access)> {
    HELD_LOCKS.with(|held| held.borrow().iter().map(|lock| (lock.class, lock.access)).collect())
}
