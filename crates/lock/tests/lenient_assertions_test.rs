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

//! Lock misuse with validation on and strict mode off: every misuse is
//! logged and the caller carries on with balanced handles.

use vboxglue_lock::{
    AutoMultiWriteLock2, AutoWriteLock, LockClass, LockHandle, LockSystemConfig, RWLockHandle, global_config,
    held_lock_count, init_auto_lock_system, set_global_config,
};

const LENIENT: LockSystemConfig = LockSystemConfig {
    validation: true,
    strict: false,
};

fn lenient() {
    // every test installs the same value, whichever runs first wins
    let _ = set_global_config(LENIENT);
    assert_eq!(*global_config(), LENIENT);
    init_auto_lock_system();
}

#[test]
fn test_double_acquire_is_logged_and_ignored() {
    lenient();
    let handle = RWLockHandle::new(LockClass::MachineObject);
    {
        let mut lock = AutoWriteLock::new(&handle);
        lock.acquire();
        assert!(lock.is_locked());
        assert_eq!(handle.write_lock_level(), 1);
        assert_eq!(held_lock_count(), 1);
    }
    assert_eq!(handle.write_lock_level(), 0);
    assert_eq!(held_lock_count(), 0);
}

#[test]
fn test_unbalanced_release_is_logged_and_ignored() {
    lenient();
    let handle = RWLockHandle::new(LockClass::HostObject);
    {
        let mut lock = AutoWriteLock::new(&handle);
        lock.release();
        lock.release();
        assert!(!lock.is_locked());
        assert_eq!(handle.write_lock_level(), 0);
    }
    assert_eq!(handle.write_lock_level(), 0);
    assert_eq!(held_lock_count(), 0);

    let mut idle = AutoWriteLock::deferred(Some(&handle));
    idle.release();
    assert!(!idle.is_locked());
}

#[test]
fn test_inverted_order_is_logged_and_still_locks() {
    lenient();
    let machine = RWLockHandle::new(LockClass::MachineObject);
    let snapshot = RWLockHandle::new(LockClass::SnapshotObject);
    {
        let lock = AutoMultiWriteLock2::from_handles(&snapshot, &machine);
        assert!(lock.is_locked());
        assert_eq!(snapshot.write_lock_level(), 1);
        assert_eq!(machine.write_lock_level(), 1);
        assert_eq!(held_lock_count(), 2);
    }
    assert_eq!(snapshot.write_lock_level(), 0);
    assert_eq!(machine.write_lock_level(), 0);
    assert_eq!(held_lock_count(), 0);
}

#[test]
fn test_unlock_by_non_owner_is_ignored() {
    lenient();
    let handle = RWLockHandle::new(LockClass::OtherObject);
    handle.unlock_write();
    handle.unlock_read();
    assert_eq!(handle.write_lock_level(), 0);
    assert_eq!(held_lock_count(), 0);

    let lock = AutoWriteLock::new(&handle);
    assert_eq!(handle.write_lock_level(), 1);
    drop(lock);
    assert_eq!(handle.write_lock_level(), 0);
}
