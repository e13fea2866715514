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

//! Lock handles
//!
//! A [`LockHandle`] is the lock an object owns. Callers normally never touch
//! it directly; the automatic lock scopes in [`crate::auto_lock`] drive it.
//! Both implementations are recursive for the owning writer, and every
//! acquisition is checked by the lock-order validator before it blocks.

use crate::assertion::assert_lock;
use crate::class::LockClass;
use crate::error::LockError;
use crate::validator::{self, Access};
use parking_lot::{Condvar, Mutex, MutexGuard};
use smallvec::SmallVec;
use std::fmt;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::trace;

/// Abstract lock interface used by the automatic lock scopes
///
/// The `lock_*` methods block until access is granted. Unlocking is only
/// valid from the thread that locked.
pub trait LockHandle: Send + Sync {
    fn lock_write(&self);
    fn unlock_write(&self);
    fn lock_read(&self);
    fn unlock_read(&self);

    /// Bounded write acquisition; `false` if `timeout` expired
    fn try_lock_write_for(&self, timeout: Duration) -> bool;

    /// Bounded read acquisition; `false` if `timeout` expired
    fn try_lock_read_for(&self, timeout: Duration) -> bool;

    /// Whether the calling thread holds write access
    fn is_write_lock_on_current_thread(&self) -> bool;

    /// Whether the calling thread holds at least read access
    ///
    /// `wanna_hear` is the answer an implementation gives when it cannot
    /// tell. Implementations that track readers exactly, like both handles in
    /// this crate, never consult it.
    fn is_read_locked_on_current_thread(&self, wanna_hear: bool) -> bool;

    /// Write recursion depth of the calling thread, 0 if it is not the writer
    fn write_lock_level(&self) -> u32;

    fn lock_class(&self) -> LockClass;

    /// Short description for diagnostics
    fn describe(&self) -> String;
}

/// Identity of a handle for validator bookkeeping
fn handle_id<T>(handle: &T) -> usize {
    handle as *const T as usize
}

fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

#[derive(Debug, Default)]
struct RwState {
    writer: Option<ThreadId>,
    write_recursion: u32,
    /// Read locks taken by the writer on top of its write lock
    writer_reads: u32,
    readers: SmallVec<[(ThreadId, u32); 4]>,
    waiting_writers: u32,
}

impl RwState {
    fn reader_slot(&mut self, me: ThreadId) -> Option<&mut (ThreadId, u32)> {
        self.readers.iter_mut().find(|(id, _)| *id == me)
    }

    fn is_reader(&self, me: ThreadId) -> bool {
        self.readers.iter().any(|(id, _)| *id == me)
    }

    fn write_blocked(&self) -> bool {
        self.writer.is_some() || !self.readers.is_empty()
    }

    /// New readers yield to queued writers
    fn read_blocked(&self) -> bool {
        self.writer.is_some() || self.waiting_writers > 0
    }
}

/// Reader/writer lock handle
///
/// Any number of threads may share read access; write access is exclusive
/// and recursive for the owning thread. The writer may also take read locks,
/// which it must drop before its last write unlock. New readers queue behind
/// waiting writers so writers cannot be starved. Upgrading a read lock to a
/// write lock is not supported and is reported as a deadlock.
pub struct RWLockHandle {
    state: Mutex<RwState>,
    read_cv: Condvar,
    write_cv: Condvar,
    class: LockClass,
}

impl RWLockHandle {
    pub fn new(class: LockClass) -> Self {
        Self {
            state: Mutex::new(RwState::default()),
            read_cv: Condvar::new(),
            write_cv: Condvar::new(),
            class,
        }
    }

    /// Take write access, waiting until `deadline` (forever if `None`)
    fn write_until(&self, deadline: Option<Instant>) -> bool {
        let me = thread::current().id();
        let mut st = self.state.lock();

        if st.writer == Some(me) {
            st.write_recursion += 1;
            trace!(lock = %self.class, level = st.write_recursion, "write lock re-entered");
            drop(st);
            validator::record_acquire(handle_id(self), self.class, Access::Write);
            return true;
        }
        if st.is_reader(me) {
            drop(st);
            assert_lock(LockError::upgrade_deadlock(self.describe()));
            st = self.state.lock();
        }
        validator::check_order(handle_id(self), self.class);

        st.waiting_writers += 1;
        while st.write_blocked() {
            if !wait(&self.write_cv, &mut st, deadline) {
                st.waiting_writers -= 1;
                // readers held back by this writer may proceed now
                self.read_cv.notify_all();
                return false;
            }
        }
        st.waiting_writers -= 1;
        st.writer = Some(me);
        st.write_recursion = 1;
        drop(st);

        validator::record_acquire(handle_id(self), self.class, Access::Write);
        trace!(lock = %self.class, "write lock acquired");
        true
    }

    fn read_until(&self, deadline: Option<Instant>) -> bool {
        let me = thread::current().id();
        let mut st = self.state.lock();

        if st.writer == Some(me) {
            st.writer_reads += 1;
            drop(st);
            validator::record_acquire(handle_id(self), self.class, Access::Read);
            return true;
        }
        if let Some(slot) = st.reader_slot(me) {
            // recursive readers must not queue behind writers waiting for them
            slot.1 += 1;
            drop(st);
            validator::record_acquire(handle_id(self), self.class, Access::Read);
            return true;
        }
        validator::check_order(handle_id(self), self.class);

        while st.read_blocked() {
            if !wait(&self.read_cv, &mut st, deadline) {
                return false;
            }
        }
        st.readers.push((me, 1));
        drop(st);

        validator::record_acquire(handle_id(self), self.class, Access::Read);
        trace!(lock = %self.class, "read lock acquired");
        true
    }
}

/// Wait on `cv`; `false` once `deadline` has passed
fn wait<T>(cv: &Condvar, guard: &mut MutexGuard<'_, T>, deadline: Option<Instant>) -> bool {
    match deadline {
        None => {
            cv.wait(guard);
            true
        }
        Some(deadline) => !cv.wait_until(guard, deadline).timed_out() || Instant::now() < deadline,
    }
}

impl LockHandle for RWLockHandle {
    fn lock_write(&self) {
        self.write_until(None);
    }

    fn unlock_write(&self) {
        let me = thread::current().id();
        let mut st = self.state.lock();
        if st.writer != Some(me) {
            drop(st);
            assert_lock(LockError::not_owner(self.describe()));
            return;
        }

        st.write_recursion -= 1;
        if st.write_recursion == 0 {
            if st.writer_reads > 0 {
                drop(st);
                assert_lock(LockError::not_owner(format!(
                    "{} (write released with read locks outstanding)",
                    self.describe()
                )));
                st = self.state.lock();
                st.writer_reads = 0;
            }
            st.writer = None;
            if st.waiting_writers > 0 {
                self.write_cv.notify_one();
            }
            self.read_cv.notify_all();
        }
        drop(st);

        validator::record_release(handle_id(self));
        trace!(lock = %self.class, "write lock released");
    }

    fn lock_read(&self) {
        self.read_until(None);
    }

    fn unlock_read(&self) {
        let me = thread::current().id();
        let mut st = self.state.lock();

        if st.writer == Some(me) && st.writer_reads > 0 {
            st.writer_reads -= 1;
        } else if let Some(pos) = st.readers.iter().position(|(id, _)| *id == me) {
            st.readers[pos].1 -= 1;
            if st.readers[pos].1 == 0 {
                st.readers.swap_remove(pos);
                if st.readers.is_empty() && st.waiting_writers > 0 {
                    self.write_cv.notify_one();
                }
            }
        } else {
            drop(st);
            assert_lock(LockError::not_owner(self.describe()));
            return;
        }
        drop(st);

        validator::record_release(handle_id(self));
        trace!(lock = %self.class, "read lock released");
    }

    fn try_lock_write_for(&self, timeout: Duration) -> bool {
        self.write_until(deadline_after(timeout))
    }

    fn try_lock_read_for(&self, timeout: Duration) -> bool {
        self.read_until(deadline_after(timeout))
    }

    fn is_write_lock_on_current_thread(&self) -> bool {
        self.state.lock().writer == Some(thread::current().id())
    }

    fn is_read_locked_on_current_thread(&self, _wanna_hear: bool) -> bool {
        let me = thread::current().id();
        let st = self.state.lock();
        st.writer == Some(me) || st.is_reader(me)
    }

    fn write_lock_level(&self) -> u32 {
        let st = self.state.lock();
        if st.writer == Some(thread::current().id()) {
            st.write_recursion
        } else {
            0
        }
    }

    fn lock_class(&self) -> LockClass {
        self.class
    }

    fn describe(&self) -> String {
        format!("RWLockHandle({})@{:#x}", self.class, handle_id(self))
    }
}

impl fmt::Debug for RWLockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.lock();
        f.debug_struct("RWLockHandle")
            .field("class", &self.class)
            .field("writer", &st.writer)
            .field("write_recursion", &st.write_recursion)
            .field("readers", &st.readers.len())
            .field("waiting_writers", &st.waiting_writers)
            .finish()
    }
}

#[derive(Debug, Default)]
struct ExclusiveState {
    owner: Option<ThreadId>,
    recursion: u32,
}

/// Exclusive-only lock handle
///
/// Read requests are plain write requests, so readers exclude each other as
/// well as writers. Meant for objects where shared access buys nothing.
pub struct WriteLockHandle {
    state: Mutex<ExclusiveState>,
    cv: Condvar,
    class: LockClass,
}

impl WriteLockHandle {
    pub fn new(class: LockClass) -> Self {
        Self {
            state: Mutex::new(ExclusiveState::default()),
            cv: Condvar::new(),
            class,
        }
    }

    fn enter_until(&self, deadline: Option<Instant>) -> bool {
        let me = thread::current().id();
        let mut st = self.state.lock();

        if st.owner == Some(me) {
            st.recursion += 1;
            drop(st);
            validator::record_acquire(handle_id(self), self.class, Access::Write);
            return true;
        }
        validator::check_order(handle_id(self), self.class);

        while st.owner.is_some() {
            if !wait(&self.cv, &mut st, deadline) {
                return false;
            }
        }
        st.owner = Some(me);
        st.recursion = 1;
        drop(st);

        validator::record_acquire(handle_id(self), self.class, Access::Write);
        trace!(lock = %self.class, "exclusive lock acquired");
        true
    }

    fn leave(&self) {
        let mut st = self.state.lock();
        if st.owner != Some(thread::current().id()) {
            drop(st);
            assert_lock(LockError::not_owner(self.describe()));
            return;
        }

        st.recursion -= 1;
        if st.recursion == 0 {
            st.owner = None;
            self.cv.notify_one();
        }
        drop(st);

        validator::record_release(handle_id(self));
        trace!(lock = %self.class, "exclusive lock released");
    }
}

impl LockHandle for WriteLockHandle {
    fn lock_write(&self) {
        self.enter_until(None);
    }

    fn unlock_write(&self) {
        self.leave();
    }

    fn lock_read(&self) {
        self.enter_until(None);
    }

    fn unlock_read(&self) {
        self.leave();
    }

    fn try_lock_write_for(&self, timeout: Duration) -> bool {
        self.enter_until(deadline_after(timeout))
    }

    fn try_lock_read_for(&self, timeout: Duration) -> bool {
        self.enter_until(deadline_after(timeout))
    }

    fn is_write_lock_on_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Same as [`LockHandle::is_write_lock_on_current_thread`]; ownership is
    /// always known here, so `wanna_hear` is not used.
    fn is_read_locked_on_current_thread(&self, _wanna_hear: bool) -> bool {
        self.is_write_lock_on_current_thread()
    }

    fn write_lock_level(&self) -> u32 {
        let st = self.state.lock();
        if st.owner == Some(thread::current().id()) { st.recursion } else { 0 }
    }

    fn lock_class(&self) -> LockClass {
        self.class
    }

    fn describe(&self) -> String {
        format!("WriteLockHandle({})@{:#x}", self.class, handle_id(self))
    }
}

impl fmt::Debug for WriteLockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.lock();
        f.debug_struct("WriteLockHandle")
            .field("class", &self.class)
            .field("owner", &st.owner)
            .field("recursion", &st.recursion)
            .finish()
    }
}
