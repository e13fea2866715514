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

//! Assertion policy for lock misuse
//!
//! Strict builds halt on the first misuse. Otherwise the failure is logged
//! and execution continues best-effort.

use crate::config::global_config;
use crate::error::LockError;
use std::fmt::Display;
use std::panic::Location;
use tracing::error;

/// Report a lock programming error
#[track_caller]
pub fn assert_lock(err: LockError) {
    assertion_failed(&err);
}

/// Report any failed assertion in the lock or object layers
#[track_caller]
pub fn assertion_failed(what: &dyn Display) {
    let location = Location::caller();
    // Never panic while already unwinding, that would abort the process.
    if global_config().strict && !std::thread::panicking() {
        panic!("assertion failed at {location}: {what}");
    }
    error!(%location, "assertion failed: {}", what);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::LockClass;

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Lock order violation")]
    fn test_strict_mode_panics() {
        assert_lock(LockError::order_violation(LockClass::HostObject, LockClass::Translator));
    }
}
