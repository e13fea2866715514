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

//! Lock-order validated automatic locking
//!
//! Objects own a [`LockHandle`] tagged with a [`LockClass`] and expose it
//! through [`Lockable`]. Code that touches an object's state takes an
//! [`AutoReadLock`], [`AutoWriteLock`] or one of the `AutoMultiWriteLock`
//! scopes on the stack; the scope unlocks on every exit path.
//!
//! Call [`init_auto_lock_system`] once at startup so acquisitions are checked
//! against the global lock class order.

// ============================================================================
// Core Module Declarations
// ============================================================================

pub mod assertion;
pub mod auto_lock;
pub mod cell;
pub mod class;
pub mod config;
pub mod error;
pub mod handle;
pub mod lockable;
pub mod multi;
pub mod validator;

#[cfg(test)]
mod testing;

// ============================================================================
// Public API Exports
// ============================================================================

pub use crate::{
    assertion::{assert_lock, assertion_failed},
    auto_lock::{AutoLockBase, AutoReadLock, AutoWriteLock, ScopeKind},
    cell::{Guarded, GuardedRead, GuardedWrite},
    class::{LockClass, ValidationClass, init_auto_lock_system, is_lock_system_initialized, validation_class},
    config::{LockSystemConfig, global_config, set_global_config},
    error::{LockError, Result},
    handle::{LockHandle, RWLockHandle, WriteLockHandle},
    lockable::Lockable,
    multi::{AutoMultiWriteLock2, AutoMultiWriteLock3, AutoMultiWriteLock4},
    validator::{Access, held_lock_count, held_locks},
};

/// Current version of the lock crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
