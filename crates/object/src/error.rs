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

use crate::state::State;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// COM-style result code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub i32);

impl ResultCode {
    pub const S_OK: ResultCode = ResultCode(0);
    pub const S_FALSE: ResultCode = ResultCode(1);
    pub const E_FAIL: ResultCode = ResultCode(0x8000_4005_u32 as i32);
    pub const E_ACCESSDENIED: ResultCode = ResultCode(0x8007_0005_u32 as i32);
    pub const VBOX_E_INVALID_OBJECT_STATE: ResultCode = ResultCode(0x80BB_0007_u32 as i32);

    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    pub fn is_failure(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0 as u32)
    }
}

/// Error details recorded when an object fails to initialize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub result: ResultCode,
    pub component: String,
    pub text: String,
}

impl ErrorInfo {
    pub fn new(result: ResultCode, component: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            result,
            component: component.into(),
            text: text.into(),
        }
    }

    /// Generic failure used when a span fails without details
    pub fn unspecified() -> Self {
        Self::new(ResultCode::E_FAIL, "", "Object initialization failed")
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.component.is_empty() {
            write!(f, "{} ({})", self.text, self.result)
        } else {
            write!(f, "{}: {} ({})", self.component, self.text, self.result)
        }
    }
}

/// Object lifecycle errors
///
/// The caller-rejection variants never allocate: the stored failure is
/// shared through an `Arc`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// Object is not ready for calls
    #[error("The object is not ready")]
    NotReady,

    /// Only limited calls are accepted
    #[error("The object functionality is limited")]
    Limited,

    /// Initialization failed earlier; the stored error is replayed
    #[error("Object initialization failed: {0}")]
    InitFailed(Arc<ErrorInfo>),

    /// A try-uninit could not proceed
    #[error("Object is busy: {reason}")]
    Busy { reason: &'static str },

    /// A span was opened in the wrong state
    #[error("Unexpected object state {actual:?}, expected {expected:?}")]
    UnexpectedState { expected: State, actual: State },
}

impl ObjectError {
    /// Result code reported to API clients
    pub fn result_code(&self) -> ResultCode {
        match self {
            ObjectError::NotReady | ObjectError::Limited => ResultCode::E_ACCESSDENIED,
            ObjectError::InitFailed(info) => info.result,
            ObjectError::Busy { .. } | ObjectError::UnexpectedState { .. } => ResultCode::VBOX_E_INVALID_OBJECT_STATE,
        }
    }

    /// Stored error details, if any
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match self {
            ObjectError::InitFailed(info) => Some(info),
            _ => None,
        }
    }
}

/// Object operation Result type
pub type Result<T> = std::result::Result<T, ObjectError>;
