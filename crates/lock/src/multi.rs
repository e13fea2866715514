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

//! Fixed-arity write lock scopes
//!
//! Locks are taken in argument order and released in reverse. Callers pass
//! the master object first and its dependents after it, e.g. a machine
//! before its peer.

use crate::auto_lock::{AutoLockBase, HandleSlots, ScopeKind};
use crate::handle::LockHandle;
use crate::lockable::Lockable;
use std::panic::Location;

macro_rules! multi_write_lock {
    ($(#[$doc:meta])* $name:ident, $($obj:ident),+) => {
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name<'a> {
            base: AutoLockBase<'a>,
        }

        impl<'a> $name<'a> {
            /// Write-lock the handles of the given objects; `None` slots are skipped
            #[track_caller]
            pub fn new($($obj: Option<&'a dyn Lockable>),+) -> Self {
                let slots: HandleSlots<'a> = [$($obj.and_then(|o| o.lock_handle())),+].into_iter().collect();
                Self::locked(slots, Location::caller())
            }

            /// Write-lock the given handles
            #[track_caller]
            pub fn from_handles($($obj: &'a dyn LockHandle),+) -> Self {
                let slots: HandleSlots<'a> = [$(Some($obj)),+].into_iter().collect();
                Self::locked(slots, Location::caller())
            }

            fn locked(slots: HandleSlots<'a>, location: &'static Location<'static>) -> Self {
                let mut base = AutoLockBase::new(ScopeKind::Write, slots, location);
                base.acquire();
                Self { base }
            }

            pub fn acquire(&mut self) {
                self.base.acquire();
            }

            pub fn release(&mut self) {
                self.base.release();
            }

            pub fn is_locked(&self) -> bool {
                self.base.is_locked()
            }
        }
    };
}

multi_write_lock!(
    /// Write lock scope over two objects
    AutoMultiWriteLock2, l1, l2
);

multi_write_lock!(
    /// Write lock scope over three objects
    AutoMultiWriteLock3, l1, l2, l3
);

multi_write_lock!(
    /// Write lock scope over four objects
    AutoMultiWriteLock4, l1, l2, l3, l4
);
