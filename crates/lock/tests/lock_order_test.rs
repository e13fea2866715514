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

//! End-to-end locking scenarios across real handles and threads

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::Duration;
use vboxglue_lock::{
    AutoMultiWriteLock2, AutoReadLock, AutoWriteLock, LockClass, LockHandle, Lockable, RWLockHandle, WriteLockHandle,
    held_lock_count, init_auto_lock_system,
};

/// Real handle that also logs every lock call
struct Traced {
    name: &'static str,
    inner: RWLockHandle,
    log: Arc<Mutex<Vec<String>>>,
}

impl Traced {
    fn new(name: &'static str, class: LockClass, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            inner: RWLockHandle::new(class),
            log: log.clone(),
        }
    }

    fn note(&self, op: &str) {
        self.log.lock().push(format!("{op} {}", self.name));
    }
}

impl LockHandle for Traced {
    fn lock_write(&self) {
        self.inner.lock_write();
        self.note("lock");
    }

    fn unlock_write(&self) {
        self.note("unlock");
        self.inner.unlock_write();
    }

    fn lock_read(&self) {
        self.inner.lock_read();
        self.note("lock_read");
    }

    fn unlock_read(&self) {
        self.note("unlock_read");
        self.inner.unlock_read();
    }

    fn try_lock_write_for(&self, timeout: Duration) -> bool {
        self.inner.try_lock_write_for(timeout)
    }

    fn try_lock_read_for(&self, timeout: Duration) -> bool {
        self.inner.try_lock_read_for(timeout)
    }

    fn is_write_lock_on_current_thread(&self) -> bool {
        self.inner.is_write_lock_on_current_thread()
    }

    fn is_read_locked_on_current_thread(&self, wanna_hear: bool) -> bool {
        self.inner.is_read_locked_on_current_thread(wanna_hear)
    }

    fn write_lock_level(&self) -> u32 {
        self.inner.write_lock_level()
    }

    fn lock_class(&self) -> LockClass {
        self.inner.lock_class()
    }

    fn describe(&self) -> String {
        self.name.to_string()
    }
}

/// Minimal object owning its lock, like a machine and its peer
struct Object {
    lock: RWLockHandle,
}

impl Lockable for Object {
    fn lock_handle(&self) -> Option<&dyn LockHandle> {
        Some(&self.lock)
    }
}

#[test]
fn test_multi_write_lock_in_class_order() {
    init_auto_lock_system();
    let log = Arc::new(Mutex::new(Vec::new()));
    let h1 = Traced::new("h1", LockClass::VirtualBoxObject, &log);
    let h2 = Traced::new("h2", LockClass::MachineObject, &log);

    {
        let lock = AutoMultiWriteLock2::from_handles(&h1, &h2);
        assert!(lock.is_locked());
        assert!(h1.is_write_lock_on_current_thread());
        assert!(h2.is_write_lock_on_current_thread());
    }

    assert_eq!(*log.lock(), vec!["lock h1", "lock h2", "unlock h2", "unlock h1"]);
    assert_eq!(held_lock_count(), 0);
}

#[test]
fn test_object_state_lock_nests_below_object_lock() {
    init_auto_lock_system();
    let machine = Object {
        lock: RWLockHandle::new(LockClass::MachineObject),
    };
    let state = RWLockHandle::new(LockClass::ObjectState);

    let _object = AutoWriteLock::from_lockable(&machine);
    let _state = AutoReadLock::new(&state);
    assert_eq!(held_lock_count(), 2);
}

#[test]
fn test_master_then_peer_objects() {
    init_auto_lock_system();
    let master = Object {
        lock: RWLockHandle::new(LockClass::MachineObject),
    };
    let peer = Object {
        lock: RWLockHandle::new(LockClass::MachineObject),
    };

    let lock = AutoMultiWriteLock2::new(Some(&master), Some(&peer));
    assert!(master.lock.is_write_lock_on_current_thread());
    assert!(peer.lock.is_write_lock_on_current_thread());
    drop(lock);
    assert!(!master.lock.is_write_lock_on_current_thread());
}

#[test]
fn test_scope_reattached_to_new_parent() {
    init_auto_lock_system();
    let old_parent = Object {
        lock: RWLockHandle::new(LockClass::OtherObject),
    };
    let new_parent = Arc::new(Object {
        lock: RWLockHandle::new(LockClass::OtherObject),
    });

    let mut lock = AutoWriteLock::from_lockable(&old_parent);
    lock.attach_lockable(Some(&*new_parent));
    assert!(lock.is_locked());

    // another thread can take the old parent now, but not the new one
    let (tx, rx) = mpsc::channel();
    thread::scope(|s| {
        s.spawn(|| {
            let _old = AutoWriteLock::from_lockable(&old_parent);
            tx.send("old").expect("send");
        });
    });
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).expect("old parent free"), "old");

    let contender = {
        let new_parent = new_parent.clone();
        thread::spawn(move || new_parent.lock.try_lock_write_for(Duration::from_millis(50)))
    };
    assert!(!contender.join().expect("contender"));
}

#[test]
fn test_read_scopes_share_and_exclude_writers() {
    init_auto_lock_system();
    let handle = Arc::new(RWLockHandle::new(LockClass::ListOfMachines));
    let reading = Arc::new(Barrier::new(3));
    let done = Arc::new(Barrier::new(3));
    let written = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let (handle, reading, done) = (handle.clone(), reading.clone(), done.clone());
            thread::spawn(move || {
                let _lock = AutoReadLock::new(&*handle);
                reading.wait();
                done.wait();
            })
        })
        .collect();

    reading.wait();
    let writer = {
        let (handle, written) = (handle.clone(), written.clone());
        thread::spawn(move || {
            let _lock = AutoWriteLock::new(&*handle);
            written.store(true, Ordering::SeqCst);
        })
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!written.load(Ordering::SeqCst));

    done.wait();
    for reader in readers {
        reader.join().expect("reader");
    }
    writer.join().expect("writer");
    assert!(written.load(Ordering::SeqCst));
}

#[test]
fn test_write_lock_handle_serializes_read_scopes() {
    init_auto_lock_system();
    let handle = Arc::new(WriteLockHandle::new(LockClass::ProgressList));
    let _held = AutoReadLock::new(&*handle);

    let other = handle.clone();
    let blocked = thread::spawn(move || {
        let mut lock = AutoReadLock::deferred(Some(&*other));
        lock.try_acquire_for(Duration::from_millis(50)).is_err()
    });
    assert!(blocked.join().expect("second reader"));
}
