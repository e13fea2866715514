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

//! Object lifecycle state and caller accounting
//!
//! ```text
//! NotReady --init span--> InInit --> Ready | Limited | InitFailed
//! Limited  --reinit span--> InInit --> Ready | Limited | InitFailed
//! Ready | Limited | InitFailed --uninit span--> InUninit --> NotReady
//! ```
//!
//! Public methods of an object enter through [`ObjectState::add_caller`] and
//! leave through [`ObjectState::release_caller`]. An uninit span waits until
//! every counted caller has left before the object is torn down.

use crate::error::{ErrorInfo, ObjectError, ResultCode};
use crate::sync::{Event, MultiEvent};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, warn};
use vboxglue_lock::{Guarded, GuardedWrite, LockClass, assertion_failed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    NotReady,
    InInit,
    Ready,
    Limited,
    InUninit,
    InitFailed,
}

impl State {
    /// True for the transient states owned by an open span
    pub fn is_transitional(self) -> bool {
        matches!(self, State::InInit | State::InUninit)
    }
}

/// Outcome of opening an uninit span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninitBegin {
    /// State is now `InUninit` and every caller has left
    Proceed {
        /// The object was `InitFailed` when the span took it over
        was_init_failed: bool,
    },
    /// Object is already uninitialized
    AlreadyDone,
    /// Try mode only: callers are present or another span is open
    Busy { reason: &'static str },
}

#[derive(Debug)]
struct StateData {
    state: State,
    callers: u32,
    /// Thread that opened the current init, reinit or uninit span
    state_change_thread: Option<ThreadId>,
    /// Set while an uninit span waits for `callers` to reach zero
    zero_callers_waiting: bool,
    failed: Option<Arc<ErrorInfo>>,
}

impl StateData {
    fn set_state(&mut self, state: State) {
        debug!(from = ?self.state, to = ?state, callers = self.callers, "object state transition");
        self.state = state;
    }

    fn owns_span(&self) -> bool {
        self.state.is_transitional() && self.state_change_thread == Some(thread::current().id())
    }

    fn rejection(&self) -> ObjectError {
        if self.state == State::Limited {
            return ObjectError::Limited;
        }
        match &self.failed {
            Some(info) if info.result != ResultCode::E_ACCESSDENIED => ObjectError::InitFailed(info.clone()),
            _ => ObjectError::NotReady,
        }
    }

    fn admits(&self, limited: bool) -> bool {
        self.state == State::Ready || (limited && self.state == State::Limited)
    }
}

pub struct ObjectState {
    data: Guarded<StateData>,
    zero_callers: Event,
    init_uninit: MultiEvent,
}

impl Default for ObjectState {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectState {
    pub fn new() -> Self {
        Self {
            data: Guarded::new(
                LockClass::ObjectState,
                StateData {
                    state: State::NotReady,
                    callers: 0,
                    state_change_thread: None,
                    zero_callers_waiting: false,
                    failed: None,
                },
            ),
            zero_callers: Event::default(),
            init_uninit: MultiEvent::default(),
        }
    }

    pub fn state(&self) -> State {
        self.data.read().state
    }

    /// Number of callers currently inside the object
    pub fn callers(&self) -> u32 {
        self.data.read().callers
    }

    /// Failure recorded by the last init span that failed
    pub fn failure(&self) -> Option<Arc<ErrorInfo>> {
        self.data.read().failed.clone()
    }

    /// Admit a caller without waiting
    ///
    /// Succeeds when the object is `Ready`, or `Limited` and `limited` is
    /// set. Any other state is rejected and the count is left untouched.
    pub fn add_caller(&self, limited: bool) -> Result<(), ObjectError> {
        let mut data = self.data.write();
        if data.admits(limited) {
            data.callers += 1;
            return Ok(());
        }
        Err(data.rejection())
    }

    /// Admit a caller, waiting out an init span open on another thread
    ///
    /// The thread that owns an open span is admitted without being counted.
    pub fn add_caller_wait(&self, limited: bool) -> Result<(), ObjectError> {
        let mut data = self.data.write();
        if data.admits(limited) {
            data.callers += 1;
            return Ok(());
        }
        if data.owns_span() {
            return Ok(());
        }
        if data.state != State::InInit {
            return Err(data.rejection());
        }

        // Counted while waiting so a failing init must drain us before uninit.
        data.callers += 1;
        let seen = self.init_uninit.generation();
        drop(data);
        self.init_uninit.wait_past(seen);

        let mut data = self.data.write();
        if data.admits(limited) {
            return Ok(());
        }
        let err = data.rejection();
        self.leave(&mut data);
        Err(err)
    }

    pub fn release_caller(&self) {
        let mut data = self.data.write();
        if data.owns_span() {
            return;
        }
        if data.callers == 0 {
            assertion_failed(&format_args!(
                "release_caller in state {:?} without a matching add_caller",
                data.state
            ));
            return;
        }
        // A caller admitted earlier may leave after the state has moved on.
        self.leave(&mut data);
    }

    fn leave(&self, data: &mut GuardedWrite<'_, StateData>) {
        data.callers -= 1;
        if data.callers == 0 && data.zero_callers_waiting {
            data.zero_callers_waiting = false;
            self.zero_callers.signal();
        }
    }

    /// Enter `InInit` from `expected` (`NotReady` or `Limited`)
    ///
    /// Returns false, changing nothing, when the object is in another state.
    /// A failure stored by an earlier init is dropped.
    pub fn auto_init_span_constructor(&self, expected: State) -> bool {
        let mut data = self.data.write();
        if data.state != expected {
            return false;
        }
        data.failed = None;
        data.set_state(State::InInit);
        data.state_change_thread = Some(thread::current().id());
        true
    }

    /// Leave `InInit` for `new_state` and wake threads waiting on the span
    ///
    /// `failure` is stored only when `new_state` is `InitFailed`. Returns
    /// true when the init failed and the object must now be uninitialized.
    #[track_caller]
    pub fn auto_init_span_destructor(&self, new_state: State, failure: Option<ErrorInfo>) -> bool {
        if !matches!(new_state, State::Ready | State::Limited | State::InitFailed) {
            assertion_failed(&format_args!("init span cannot end in state {new_state:?}"));
            return false;
        }
        let mut data = self.data.write();
        if data.state != State::InInit {
            assertion_failed(&ObjectError::UnexpectedState {
                expected: State::InInit,
                actual: data.state,
            });
            return false;
        }
        data.failed = if new_state == State::InitFailed {
            let info = failure.unwrap_or_else(ErrorInfo::unspecified);
            warn!(error = %info, "object initialization failed");
            Some(Arc::new(info))
        } else {
            None
        };
        data.set_state(new_state);
        data.state_change_thread = None;
        drop(data);
        self.init_uninit.signal();
        new_state == State::InitFailed
    }

    /// Enter `InUninit` and wait for every caller to leave
    ///
    /// Waits for an init or uninit span open on another thread to end first.
    /// In try mode nothing waits: [`UninitBegin::Busy`] is returned instead.
    pub fn auto_uninit_span_constructor(&self, try_only: bool) -> UninitBegin {
        let was_init_failed = loop {
            let mut data = self.data.write();
            match data.state {
                State::NotReady => return UninitBegin::AlreadyDone,
                State::InInit | State::InUninit => {
                    if data.owns_span() {
                        assertion_failed(&"uninit span opened inside a span owned by the same thread");
                        return UninitBegin::Busy {
                            reason: "span owned by the calling thread",
                        };
                    }
                    if try_only {
                        warn!(state = ?data.state, "try-uninit while another span is in progress");
                        return UninitBegin::Busy {
                            reason: "another span is in progress",
                        };
                    }
                    let seen = self.init_uninit.generation();
                    drop(data);
                    self.init_uninit.wait_past(seen);
                }
                State::Ready | State::Limited | State::InitFailed => {
                    if try_only && data.callers > 0 {
                        warn!(callers = data.callers, "try-uninit while callers are active");
                        return UninitBegin::Busy {
                            reason: "callers are active",
                        };
                    }
                    let was_init_failed = data.state == State::InitFailed;
                    data.set_state(State::InUninit);
                    data.state_change_thread = Some(thread::current().id());
                    break was_init_failed;
                }
            }
        };

        loop {
            let mut data = self.data.write();
            if data.callers == 0 {
                data.zero_callers_waiting = false;
                return UninitBegin::Proceed { was_init_failed };
            }
            debug!(callers = data.callers, "uninit waiting for callers to leave");
            data.zero_callers_waiting = true;
            drop(data);
            self.zero_callers.wait();
        }
    }

    /// Leave `InUninit` for `NotReady`, or for `InitFailed` when `failed`
    #[track_caller]
    pub fn auto_uninit_span_destructor(&self, failed: bool) {
        let mut data = self.data.write();
        if data.state != State::InUninit {
            assertion_failed(&ObjectError::UnexpectedState {
                expected: State::InUninit,
                actual: data.state,
            });
            return;
        }
        data.set_state(if failed { State::InitFailed } else { State::NotReady });
        data.state_change_thread = None;
        drop(data);
        self.init_uninit.signal();
    }
}

impl fmt::Debug for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectState").field("data", &self.data).finish_non_exhaustive()
    }
}
