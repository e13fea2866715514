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

//! Test doubles shared by the unit tests

use crate::class::LockClass;
use crate::handle::LockHandle;
use crate::lockable::Lockable;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

/// Lock handle that only records the calls made on it
pub(crate) struct RecordingHandle {
    name: &'static str,
    log: CallLog,
    /// Answer given by the bounded-wait entry points
    grant_try: bool,
}

impl RecordingHandle {
    pub(crate) fn new(name: &'static str, log: &CallLog) -> Self {
        Self {
            name,
            log: log.clone(),
            grant_try: true,
        }
    }

    pub(crate) fn refusing(name: &'static str, log: &CallLog) -> Self {
        Self {
            grant_try: false,
            ..Self::new(name, log)
        }
    }

    fn record(&self, op: &str) {
        self.log.lock().push(format!("{op}:{}", self.name));
    }
}

pub(crate) fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn calls(log: &CallLog) -> Vec<String> {
    log.lock().clone()
}

impl LockHandle for RecordingHandle {
    fn lock_write(&self) {
        self.record("lock_write");
    }

    fn unlock_write(&self) {
        self.record("unlock_write");
    }

    fn lock_read(&self) {
        self.record("lock_read");
    }

    fn unlock_read(&self) {
        self.record("unlock_read");
    }

    fn try_lock_write_for(&self, _timeout: Duration) -> bool {
        if self.grant_try {
            self.record("lock_write");
        }
        self.grant_try
    }

    fn try_lock_read_for(&self, _timeout: Duration) -> bool {
        if self.grant_try {
            self.record("lock_read");
        }
        self.grant_try
    }

    fn is_write_lock_on_current_thread(&self) -> bool {
        false
    }

    fn is_read_locked_on_current_thread(&self, wanna_hear: bool) -> bool {
        wanna_hear
    }

    fn write_lock_level(&self) -> u32 {
        0
    }

    fn lock_class(&self) -> LockClass {
        LockClass::None
    }

    fn describe(&self) -> String {
        self.name.to_string()
    }
}

impl Lockable for RecordingHandle {
    fn lock_handle(&self) -> Option<&dyn LockHandle> {
        Some(self)
    }
}
