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

//! Data that can only be reached through a lock scope
//!
//! [`Guarded`] pairs a private [`RWLockHandle`] with the data it protects.
//! Shared access lives as long as an [`AutoReadLock`], mutable access as long
//! as an [`AutoWriteLock`]. The handle never leaves the cell, so nobody can
//! unlock it behind a guard's back.

#![allow(unsafe_code)]

use crate::auto_lock::{AutoReadLock, AutoWriteLock};
use crate::class::LockClass;
use crate::handle::{LockHandle, RWLockHandle};
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};

pub struct Guarded<T> {
    handle: RWLockHandle,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `handle`: `&mut T` only exists
// under the exclusive write lock, `&T` only under read locks.
unsafe impl<T: Send> Send for Guarded<T> {}
unsafe impl<T: Send + Sync> Sync for Guarded<T> {}

impl<T> Guarded<T> {
    pub fn new(class: LockClass, data: T) -> Self {
        Self {
            handle: RWLockHandle::new(class),
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock_class(&self) -> LockClass {
        self.handle.lock_class()
    }

    /// Shared access
    ///
    /// # Panics
    ///
    /// If the calling thread already holds mutable access.
    #[track_caller]
    pub fn read(&self) -> GuardedRead<'_, T> {
        if self.handle.is_write_lock_on_current_thread() {
            panic!("Guarded data read while this thread holds it for writing");
        }
        let lock = AutoReadLock::new(&self.handle);
        // SAFETY: read lock held and no writer on this thread
        let data = unsafe { &*self.data.get() };
        GuardedRead { data, _lock: lock }
    }

    /// Exclusive access
    ///
    /// # Panics
    ///
    /// If the calling thread already holds any access; the handle recursion
    /// would otherwise hand out aliasing references.
    #[track_caller]
    pub fn write(&self) -> GuardedWrite<'_, T> {
        if self.handle.is_read_locked_on_current_thread(false) {
            panic!("Guarded data borrowed again on the thread that already holds it");
        }
        let lock = AutoWriteLock::new(&self.handle);
        // SAFETY: exclusive write lock held and no other borrow on this thread
        let data = unsafe { &mut *self.data.get() };
        GuardedWrite { data, _lock: lock }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: fmt::Debug> fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded").field("handle", &self.handle).finish_non_exhaustive()
    }
}

pub struct GuardedRead<'a, T> {
    data: &'a T,
    _lock: AutoReadLock<'a>,
}

impl<T> Deref for GuardedRead<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.data
    }
}

pub struct GuardedWrite<'a, T> {
    data: &'a mut T,
    _lock: AutoWriteLock<'a>,
}

impl<T> Deref for GuardedWrite<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.data
    }
}

impl<T> DerefMut for GuardedWrite<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.data
    }
}
