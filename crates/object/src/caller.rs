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

use crate::error::{ObjectError, Result};
use crate::state::ObjectState;
use std::fmt;
use std::marker::PhantomData;

/// Scoped caller registration
///
/// ```ignore
/// let caller = AutoCaller::new(&self.state);
/// caller.check()?;
/// ```
pub struct AutoCallerBase<'a, const LIMITED: bool> {
    state: &'a ObjectState,
    result: Result<()>,
    added: bool,
    _not_send: PhantomData<*const ()>,
}

/// Caller admitted only while the object is `Ready`
pub type AutoCaller<'a> = AutoCallerBase<'a, false>;

/// Caller also admitted while the object is `Limited`
pub type AutoLimitedCaller<'a> = AutoCallerBase<'a, true>;

impl<'a, const LIMITED: bool> AutoCallerBase<'a, LIMITED> {
    pub fn new(state: &'a ObjectState) -> Self {
        Self::register(state, state.add_caller(LIMITED))
    }

    /// Like `new`, but waits for an init span open on another thread
    pub fn new_waiting(state: &'a ObjectState) -> Self {
        Self::register(state, state.add_caller_wait(LIMITED))
    }

    fn register(state: &'a ObjectState, result: Result<()>) -> Self {
        Self {
            state,
            added: result.is_ok(),
            result,
            _not_send: PhantomData,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Outcome of the last registration attempt
    pub fn check(&self) -> Result<()> {
        self.result.clone()
    }

    pub fn error(&self) -> Option<&ObjectError> {
        self.result.as_ref().err()
    }

    /// Register again after `release`
    pub fn add(&mut self) -> Result<()> {
        if !self.added {
            self.result = self.state.add_caller(LIMITED);
            self.added = self.result.is_ok();
        }
        self.check()
    }

    /// Leave the object before the scope ends
    pub fn release(&mut self) {
        if self.added {
            self.state.release_caller();
            self.added = false;
            self.result = Err(ObjectError::NotReady);
        }
    }
}

impl<const LIMITED: bool> Drop for AutoCallerBase<'_, LIMITED> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<const LIMITED: bool> fmt::Debug for AutoCallerBase<'_, LIMITED> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoCaller")
            .field("limited", &LIMITED)
            .field("added", &self.added)
            .field("result", &self.result)
            .finish()
    }
}
