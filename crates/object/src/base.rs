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

//! Common core embedded by every managed object

use crate::caller::{AutoCaller, AutoLimitedCaller};
use crate::state::ObjectState;
use once_cell::sync::OnceCell;
use std::fmt;
use vboxglue_lock::{LockClass, LockHandle, Lockable, RWLockHandle};

/// Lifecycle state plus the object's own lock
///
/// The lock is created on first use with the class given at construction.
pub struct ObjectBase {
    state: ObjectState,
    class: LockClass,
    lock: OnceCell<RWLockHandle>,
}

impl ObjectBase {
    pub fn new(class: LockClass) -> Self {
        Self {
            state: ObjectState::new(),
            class,
            lock: OnceCell::new(),
        }
    }

    pub fn state(&self) -> &ObjectState {
        &self.state
    }

    pub fn lock_class(&self) -> LockClass {
        self.class
    }

    pub fn caller(&self) -> AutoCaller<'_> {
        AutoCaller::new(&self.state)
    }

    pub fn limited_caller(&self) -> AutoLimitedCaller<'_> {
        AutoLimitedCaller::new(&self.state)
    }
}

impl Lockable for ObjectBase {
    fn lock_handle(&self) -> Option<&dyn LockHandle> {
        Some(self.lock.get_or_init(|| RWLockHandle::new(self.class)))
    }
}

impl fmt::Debug for ObjectBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBase")
            .field("class", &self.class)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::AutoInitSpan;
    use std::ptr;
    use vboxglue_lock::{AutoWriteLock, init_auto_lock_system};

    #[test]
    fn test_lock_handle_is_created_once() {
        init_auto_lock_system();
        let base = ObjectBase::new(LockClass::MachineObject);
        let first = base.lock_handle().expect("lock handle");
        let second = base.lock_handle().expect("lock handle");
        assert!(ptr::addr_eq(first, second));
        assert_eq!(first.lock_class(), LockClass::MachineObject);
    }

    #[test]
    fn test_state_lock_nests_below_object_lock() {
        init_auto_lock_system();
        let base = ObjectBase::new(LockClass::SnapshotObject);
        AutoInitSpan::new(base.state()).set_succeeded();

        let caller = base.caller();
        assert!(caller.is_ok());
        let lock = AutoWriteLock::from_lockable(&base);
        assert!(lock.is_write_lock_on_current_thread());
        assert_eq!(base.state().callers(), 1);
    }
}
