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

//! Automatic lock scopes
//!
//! A scope borrows one or more lock handles, locks them (usually right away)
//! and releases whatever it still holds when dropped, including during
//! unwinding. Handles are locked in the order given and unlocked in reverse.
//! Empty slots are skipped, so a scope over objects that need no locking
//! does nothing at all.

use crate::assertion::assert_lock;
use crate::error::{LockError, Result};
use crate::handle::LockHandle;
use crate::lockable::Lockable;
use smallvec::SmallVec;
use std::marker::PhantomData;
use std::panic::Location;
use std::ptr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Access a scope requests from its handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Read,
    Write,
}

pub(crate) type HandleSlots<'a> = SmallVec<[Option<&'a dyn LockHandle>; 4]>;

/// Acquire/release engine shared by all scope types
///
/// `locked` tracks whether this scope owns its locks. `obtained` counts the
/// slots actually locked so far, which lets a panic in the middle of
/// [`AutoLockBase::acquire`] release exactly the locks already taken.
pub struct AutoLockBase<'a> {
    handles: HandleSlots<'a>,
    kind: ScopeKind,
    locked: bool,
    obtained: usize,
    location: &'static Location<'static>,
    // lock ownership is per thread
    _not_send: PhantomData<*const ()>,
}

impl<'a> AutoLockBase<'a> {
    pub(crate) fn new(kind: ScopeKind, handles: HandleSlots<'a>, location: &'static Location<'static>) -> Self {
        Self {
            handles,
            kind,
            locked: false,
            obtained: 0,
            location,
            _not_send: PhantomData,
        }
    }

    /// Lock all handles in order
    pub fn acquire(&mut self) {
        if self.locked {
            assert_lock(LockError::double_acquire(self.location));
            return;
        }

        self.obtained = 0;
        for i in 0..self.handles.len() {
            if let Some(handle) = self.handles[i] {
                self.call_lock(handle);
            }
            self.obtained = i + 1;
        }
        self.locked = true;
    }

    /// Lock all handles in order, giving up once `timeout` has elapsed
    ///
    /// On timeout the handles locked so far are released again and the scope
    /// stays unlocked.
    pub fn try_acquire_for(&mut self, timeout: Duration) -> Result<()> {
        if self.locked {
            let err = LockError::double_acquire(self.location);
            assert_lock(err.clone());
            return Err(err);
        }

        let deadline = Instant::now().checked_add(timeout);
        self.obtained = 0;
        for i in 0..self.handles.len() {
            if let Some(handle) = self.handles[i] {
                let remaining = deadline.map_or(timeout, |d| d.saturating_duration_since(Instant::now()));
                let granted = match self.kind {
                    ScopeKind::Read => handle.try_lock_read_for(remaining),
                    ScopeKind::Write => handle.try_lock_write_for(remaining),
                };
                if !granted {
                    self.cleanup();
                    return Err(LockError::timeout(handle.describe(), timeout));
                }
            }
            self.obtained = i + 1;
        }
        self.locked = true;
        Ok(())
    }

    /// Unlock all handles in reverse order
    pub fn release(&mut self) {
        if !self.locked {
            assert_lock(LockError::unbalanced_release(self.location));
            return;
        }
        self.cleanup();
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Number of slots, including empty ones
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Where the scope was created
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    fn call_lock(&self, handle: &dyn LockHandle) {
        match self.kind {
            ScopeKind::Read => handle.lock_read(),
            ScopeKind::Write => handle.lock_write(),
        }
    }

    fn call_unlock(&self, handle: &dyn LockHandle) {
        match self.kind {
            ScopeKind::Read => handle.unlock_read(),
            ScopeKind::Write => handle.unlock_write(),
        }
    }

    fn cleanup(&mut self) {
        for i in (0..self.obtained).rev() {
            if let Some(handle) = self.handles[i] {
                self.call_unlock(handle);
            }
        }
        self.obtained = 0;
        self.locked = false;
    }

    fn first_handle(&self) -> Option<&'a dyn LockHandle> {
        self.handles.first().copied().flatten()
    }
}

impl Drop for AutoLockBase<'_> {
    fn drop(&mut self) {
        if self.obtained > 0 {
            self.cleanup();
        }
    }
}

impl std::fmt::Debug for AutoLockBase<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoLockBase")
            .field("kind", &self.kind)
            .field("handles", &self.handles.iter().map(|h| h.map(|h| h.describe())).collect::<Vec<_>>())
            .field("locked", &self.locked)
            .field("location", &format_args!("{}", self.location))
            .finish()
    }
}

fn single(handle: Option<&dyn LockHandle>) -> HandleSlots<'_> {
    let mut slots = HandleSlots::new();
    slots.push(handle);
    slots
}

fn same_handle(a: Option<&dyn LockHandle>, b: Option<&dyn LockHandle>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => ptr::addr_eq(a as *const dyn LockHandle, b as *const dyn LockHandle),
        (None, None) => true,
        _ => false,
    }
}

/// Read lock scope over a single handle
#[derive(Debug)]
pub struct AutoReadLock<'a> {
    base: AutoLockBase<'a>,
}

impl<'a> AutoReadLock<'a> {
    /// Scope without a handle; locks nothing
    #[track_caller]
    pub fn null() -> Self {
        Self::deferred(None)
    }

    /// Read-lock `handle` immediately
    #[track_caller]
    pub fn new(handle: &'a dyn LockHandle) -> Self {
        Self::locked(Some(handle), Location::caller())
    }

    /// Read-lock the handle of `object` immediately
    #[track_caller]
    pub fn from_lockable(object: &'a dyn Lockable) -> Self {
        Self::locked(object.lock_handle(), Location::caller())
    }

    /// Read-lock the handle of `object`, if any, immediately
    #[track_caller]
    pub fn from_opt(object: Option<&'a dyn Lockable>) -> Self {
        Self::locked(object.and_then(|o| o.lock_handle()), Location::caller())
    }

    /// Scope over `handle` that stays unlocked until [`Self::acquire`]
    #[track_caller]
    pub fn deferred(handle: Option<&'a dyn LockHandle>) -> Self {
        Self {
            base: AutoLockBase::new(ScopeKind::Read, single(handle), Location::caller()),
        }
    }

    fn locked(handle: Option<&'a dyn LockHandle>, location: &'static Location<'static>) -> Self {
        let mut base = AutoLockBase::new(ScopeKind::Read, single(handle), location);
        base.acquire();
        Self { base }
    }

    pub fn acquire(&mut self) {
        self.base.acquire();
    }

    pub fn try_acquire_for(&mut self, timeout: Duration) -> Result<()> {
        self.base.try_acquire_for(timeout)
    }

    pub fn release(&mut self) {
        self.base.release();
    }

    pub fn is_locked(&self) -> bool {
        self.base.is_locked()
    }
}

/// Write lock scope over one or more handles
#[derive(Debug)]
pub struct AutoWriteLock<'a> {
    base: AutoLockBase<'a>,
}

impl<'a> AutoWriteLock<'a> {
    /// Scope without a handle; locks nothing
    #[track_caller]
    pub fn null() -> Self {
        Self::deferred(None)
    }

    /// Write-lock `handle` immediately
    #[track_caller]
    pub fn new(handle: &'a dyn LockHandle) -> Self {
        Self::locked(single(Some(handle)), Location::caller())
    }

    /// Write-lock the handle of `object` immediately
    #[track_caller]
    pub fn from_lockable(object: &'a dyn Lockable) -> Self {
        Self::locked(single(object.lock_handle()), Location::caller())
    }

    /// Write-lock the handle of `object`, if any, immediately
    #[track_caller]
    pub fn from_opt(object: Option<&'a dyn Lockable>) -> Self {
        Self::locked(single(object.and_then(|o| o.lock_handle())), Location::caller())
    }

    /// Write-lock all `handles` immediately, in slice order
    #[track_caller]
    pub fn new_multi(handles: &[&'a dyn LockHandle]) -> Self {
        Self::locked(handles.iter().map(|h| Some(*h)).collect(), Location::caller())
    }

    /// Scope over `handle` that stays unlocked until [`Self::acquire`]
    #[track_caller]
    pub fn deferred(handle: Option<&'a dyn LockHandle>) -> Self {
        Self {
            base: AutoLockBase::new(ScopeKind::Write, single(handle), Location::caller()),
        }
    }

    /// Scope over `handles` that stays unlocked until [`Self::acquire`]
    #[track_caller]
    pub fn deferred_multi(handles: &[&'a dyn LockHandle]) -> Self {
        Self {
            base: AutoLockBase::new(ScopeKind::Write, handles.iter().map(|h| Some(*h)).collect(), Location::caller()),
        }
    }

    fn locked(slots: HandleSlots<'a>, location: &'static Location<'static>) -> Self {
        let mut base = AutoLockBase::new(ScopeKind::Write, slots, location);
        base.acquire();
        Self { base }
    }

    pub fn acquire(&mut self) {
        self.base.acquire();
    }

    pub fn try_acquire_for(&mut self, timeout: Duration) -> Result<()> {
        self.base.try_acquire_for(timeout)
    }

    pub fn release(&mut self) {
        self.base.release();
    }

    pub fn is_locked(&self) -> bool {
        self.base.is_locked()
    }

    /// Switch the scope to another handle, keeping its locked state
    ///
    /// When locked, the old handle is released before the new one is
    /// write-locked. Attaching the handle already managed does nothing.
    /// Only valid for single-handle scopes.
    pub fn attach(&mut self, handle: Option<&'a dyn LockHandle>) {
        if self.base.handles.len() != 1 {
            assert_lock(LockError::configuration(format!(
                "attach() on a scope managing {} handles",
                self.base.handles.len()
            )));
            return;
        }
        if same_handle(self.base.first_handle(), handle) {
            return;
        }

        let was_locked = self.base.locked;
        self.base.cleanup();
        self.base.handles[0] = handle;
        if was_locked {
            if let Some(new_handle) = handle {
                new_handle.lock_write();
            }
            self.base.obtained = 1;
            self.base.locked = true;
        }
        debug!(
            locked = was_locked,
            handle = ?handle.map(|h| h.describe()),
            "write lock scope attached to new handle"
        );
    }

    /// Switch the scope to the handle of `object`
    pub fn attach_lockable(&mut self, object: Option<&'a dyn Lockable>) {
        self.attach(object.and_then(|o| o.lock_handle()));
    }

    /// Write recursion level on the managed handle, 0 without a handle
    pub fn write_lock_level(&self) -> u32 {
        self.base.first_handle().map_or(0, |h| h.write_lock_level())
    }

    pub fn is_write_lock_on_current_thread(&self) -> bool {
        self.base
            .first_handle()
            .is_some_and(|h| h.is_write_lock_on_current_thread())
    }

    pub fn is_read_locked_on_current_thread(&self, wanna_hear: bool) -> bool {
        self.base
            .first_handle()
            .is_some_and(|h| h.is_read_locked_on_current_thread(wanna_hear))
    }
}
