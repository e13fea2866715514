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

//! Scoped init, reinit and uninit spans
//!
//! An object's `init` opens an [`AutoInitSpan`] first and marks it succeeded
//! once everything is set up; dropping the span publishes the new state.
//! `uninit` opens an [`AutoUninitSpan`], which returns only after every
//! caller has left.

use crate::error::{ErrorInfo, ObjectError};
use crate::state::{ObjectState, State, UninitBegin};
use std::fmt;
use std::marker::PhantomData;
use vboxglue_lock::assertion_failed;

/// Outcome an init or reinit span publishes when dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpanResult {
    #[default]
    Failed,
    Succeeded,
    Limited,
}

type FailureHook<'a> = Box<dyn FnOnce() + 'a>;

struct InitSpanCore<'a> {
    state: &'a ObjectState,
    ok: bool,
    result: SpanResult,
    failure: Option<ErrorInfo>,
    _not_send: PhantomData<*const ()>,
}

impl<'a> InitSpanCore<'a> {
    #[track_caller]
    fn open(state: &'a ObjectState, expected: State, result: SpanResult) -> Self {
        let ok = state.auto_init_span_constructor(expected);
        if !ok {
            assertion_failed(&ObjectError::UnexpectedState {
                expected,
                actual: state.state(),
            });
        }
        Self {
            state,
            ok,
            result,
            failure: None,
            _not_send: PhantomData,
        }
    }

    fn close(&mut self, new_state: State) -> bool {
        if !self.ok {
            return false;
        }
        self.ok = false;
        self.state.auto_init_span_destructor(new_state, self.failure.take())
    }
}

/// Init span: `NotReady` -> `InInit` -> `Ready` | `Limited` | `InitFailed`
pub struct AutoInitSpan<'a> {
    core: InitSpanCore<'a>,
    on_failure: Option<FailureHook<'a>>,
}

impl<'a> AutoInitSpan<'a> {
    #[track_caller]
    pub fn new(state: &'a ObjectState) -> Self {
        Self::with_result(state, SpanResult::Failed)
    }

    /// Open a span whose outcome defaults to `result`
    #[track_caller]
    pub fn with_result(state: &'a ObjectState, result: SpanResult) -> Self {
        Self {
            core: InitSpanCore::open(state, State::NotReady, result),
            on_failure: None,
        }
    }

    /// Run `hook` once the span has published `InitFailed`
    ///
    /// The hook is where the object uninitializes itself.
    pub fn on_failure(mut self, hook: impl FnOnce() + 'a) -> Self {
        self.on_failure = Some(Box::new(hook));
        self
    }

    /// False when the object was not `NotReady`; `init` must not proceed
    pub fn is_ok(&self) -> bool {
        self.core.ok
    }

    pub fn result(&self) -> SpanResult {
        self.core.result
    }

    pub fn set_succeeded(&mut self) {
        self.core.result = SpanResult::Succeeded;
    }

    pub fn set_limited(&mut self) {
        self.core.result = SpanResult::Limited;
    }

    pub fn set_failed(&mut self) {
        self.core.result = SpanResult::Failed;
        self.core.failure = None;
    }

    /// Fail with details replayed to later callers
    pub fn set_failed_with(&mut self, info: ErrorInfo) {
        self.core.result = SpanResult::Failed;
        self.core.failure = Some(info);
    }
}

impl Drop for AutoInitSpan<'_> {
    fn drop(&mut self) {
        let new_state = match self.core.result {
            SpanResult::Succeeded => State::Ready,
            SpanResult::Limited => State::Limited,
            SpanResult::Failed => State::InitFailed,
        };
        if self.core.close(new_state) {
            if let Some(hook) = self.on_failure.take() {
                hook();
            }
        }
    }
}

impl fmt::Debug for AutoInitSpan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoInitSpan")
            .field("ok", &self.core.ok)
            .field("result", &self.core.result)
            .finish_non_exhaustive()
    }
}

/// Reinit span: `Limited` -> `InInit` -> `Ready` | `Limited` | `InitFailed`
///
/// A failure without details returns the object to `Limited`.
pub struct AutoReinitSpan<'a> {
    core: InitSpanCore<'a>,
}

impl<'a> AutoReinitSpan<'a> {
    #[track_caller]
    pub fn new(state: &'a ObjectState) -> Self {
        Self {
            core: InitSpanCore::open(state, State::Limited, SpanResult::Failed),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.core.ok
    }

    pub fn result(&self) -> SpanResult {
        self.core.result
    }

    pub fn set_succeeded(&mut self) {
        self.core.result = SpanResult::Succeeded;
    }

    pub fn set_limited(&mut self) {
        self.core.result = SpanResult::Limited;
    }

    pub fn set_failed(&mut self) {
        self.core.result = SpanResult::Failed;
        self.core.failure = None;
    }

    pub fn set_failed_with(&mut self, info: ErrorInfo) {
        self.core.result = SpanResult::Failed;
        self.core.failure = Some(info);
    }
}

impl Drop for AutoReinitSpan<'_> {
    fn drop(&mut self) {
        let new_state = match (self.core.result, &self.core.failure) {
            (SpanResult::Succeeded, _) => State::Ready,
            (SpanResult::Failed, Some(_)) => State::InitFailed,
            (SpanResult::Limited | SpanResult::Failed, _) => State::Limited,
        };
        self.core.close(new_state);
    }
}

impl fmt::Debug for AutoReinitSpan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoReinitSpan")
            .field("ok", &self.core.ok)
            .field("result", &self.core.result)
            .finish_non_exhaustive()
    }
}

/// Uninit span: `Ready` | `Limited` | `InitFailed` -> `InUninit` -> `NotReady`
pub struct AutoUninitSpan<'a> {
    state: &'a ObjectState,
    /// Set when this span owns the `InUninit` state
    active: bool,
    init_failed: bool,
    failed: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a> AutoUninitSpan<'a> {
    /// Open the span, waiting for callers and other spans
    pub fn new(state: &'a ObjectState) -> Self {
        let begin = state.auto_uninit_span_constructor(false);
        Self::from_begin(state, begin)
    }

    /// Open the span only if that needs no waiting
    pub fn try_new(state: &'a ObjectState) -> Result<Self, ObjectError> {
        match state.auto_uninit_span_constructor(true) {
            UninitBegin::Busy { reason } => Err(ObjectError::Busy { reason }),
            begin => Ok(Self::from_begin(state, begin)),
        }
    }

    fn from_begin(state: &'a ObjectState, begin: UninitBegin) -> Self {
        let (active, init_failed) = match begin {
            UninitBegin::Proceed { was_init_failed } => (true, was_init_failed),
            UninitBegin::AlreadyDone | UninitBegin::Busy { .. } => (false, false),
        };
        Self {
            state,
            active,
            init_failed,
            failed: false,
            _not_send: PhantomData,
        }
    }

    /// True when the object was already uninitialized; `uninit` returns early
    pub fn uninit_done(&self) -> bool {
        !self.active
    }

    /// True when the span tears down an object whose init failed
    pub fn init_failed(&self) -> bool {
        self.init_failed
    }

    /// Leave the object in `InitFailed` instead of `NotReady`
    pub fn uninit_failed(&mut self) {
        self.failed = true;
    }
}

impl Drop for AutoUninitSpan<'_> {
    fn drop(&mut self) {
        if self.active {
            self.state.auto_uninit_span_destructor(self.failed);
        }
    }
}

impl fmt::Debug for AutoUninitSpan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoUninitSpan")
            .field("active", &self.active)
            .field("init_failed", &self.init_failed)
            .finish_non_exhaustive()
    }
}
