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

//! Cross-thread lifecycle scenarios: draining callers and waiting on init

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};
use vboxglue_lock::{AutoWriteLock, LockClass, init_auto_lock_system};
use vboxglue_object::{
    AutoCaller, AutoInitSpan, AutoUninitSpan, ErrorInfo, ObjectBase, ObjectError, ResultCode, State,
};

fn ready_object(class: LockClass) -> Arc<ObjectBase> {
    init_auto_lock_system();
    let object = Arc::new(ObjectBase::new(class));
    AutoInitSpan::new(object.state()).set_succeeded();
    object
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_uninit_waits_for_every_caller() {
    let object = ready_object(LockClass::MachineObject);
    object.state().add_caller(false).expect("first caller");
    object.state().add_caller(false).expect("second caller");

    let (done_tx, done_rx) = mpsc::channel();
    let uninit = {
        let object = object.clone();
        thread::spawn(move || {
            let span = AutoUninitSpan::new(object.state());
            done_tx.send(span.uninit_done()).expect("report");
        })
    };

    wait_until("uninit to start", || object.state().state() == State::InUninit);
    assert_eq!(object.state().add_caller(false), Err(ObjectError::NotReady));

    object.state().release_caller();
    assert!(
        done_rx.recv_timeout(Duration::from_millis(100)).is_err(),
        "uninit returned with a caller still inside"
    );

    object.state().release_caller();
    let already_done = done_rx.recv_timeout(Duration::from_secs(5)).expect("uninit finished");
    assert!(!already_done);
    uninit.join().expect("uninit thread");

    assert_eq!(object.state().state(), State::NotReady);
    assert_eq!(object.state().callers(), 0);
}

#[test]
fn test_waiting_caller_admitted_after_init() {
    init_auto_lock_system();
    let object = Arc::new(ObjectBase::new(LockClass::HostObject));
    let mut span = AutoInitSpan::new(object.state());

    let waiter = {
        let object = object.clone();
        thread::spawn(move || {
            let caller = AutoCaller::new_waiting(object.state());
            (caller.is_ok(), object.state().callers())
        })
    };

    wait_until("waiter to be counted", || object.state().callers() == 1);
    assert_eq!(object.state().state(), State::InInit);
    span.set_succeeded();
    drop(span);

    let (admitted, callers) = waiter.join().expect("waiter thread");
    assert!(admitted);
    assert_eq!(callers, 1);
    assert_eq!(object.state().callers(), 0);
}

#[test]
fn test_failed_init_drains_waiting_caller() {
    init_auto_lock_system();
    let object = Arc::new(ObjectBase::new(LockClass::MediumQuery));

    let waiter = {
        let state = object.state();
        let mut span = AutoInitSpan::new(state).on_failure(|| {
            let uninit = AutoUninitSpan::new(state);
            assert!(uninit.init_failed());
        });
        let waiter = {
            let object = object.clone();
            thread::spawn(move || AutoCaller::new_waiting(object.state()).check())
        };
        wait_until("waiter to be counted", || state.callers() == 1);
        span.set_failed_with(ErrorInfo::new(ResultCode::E_FAIL, "Medium", "unknown format"));
        waiter
    };

    let err = waiter.join().expect("waiter thread").unwrap_err();
    assert_eq!(err.result_code(), ResultCode::E_FAIL);
    assert_eq!(object.state().state(), State::NotReady);
    assert_eq!(object.state().callers(), 0);
}

#[test]
fn test_method_prologue_under_object_lock() {
    let object = ready_object(LockClass::VirtualBoxObject);
    let child = ready_object(LockClass::MachineObject);

    let caller = AutoCaller::new(object.state());
    caller.check().expect("parent ready");
    let _parent = AutoWriteLock::from_lockable(&*object);

    let child_caller = AutoCaller::new(child.state());
    assert!(child_caller.is_ok());
    let child_lock = AutoWriteLock::from_lockable(&*child);
    assert!(child_lock.is_locked());
    assert_eq!(child.state().callers(), 1);
}
