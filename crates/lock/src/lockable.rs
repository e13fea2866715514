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

use crate::handle::{LockHandle, RWLockHandle, WriteLockHandle};

/// An object that can hand out the lock protecting its state
///
/// Returning `None` means the object needs no locking; every scope built on
/// it becomes a no-op.
pub trait Lockable {
    fn lock_handle(&self) -> Option<&dyn LockHandle>;
}

impl Lockable for RWLockHandle {
    fn lock_handle(&self) -> Option<&dyn LockHandle> {
        Some(self)
    }
}

impl Lockable for WriteLockHandle {
    fn lock_handle(&self) -> Option<&dyn LockHandle> {
        Some(self)
    }
}
