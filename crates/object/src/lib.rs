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

//! Managed object lifecycle
//!
//! [`ObjectState`] tracks whether an object may serve calls and how many
//! calls are in flight. Constructors open an [`AutoInitSpan`], destructors an
//! [`AutoUninitSpan`], and every public method holds an [`AutoCaller`] for
//! its duration.

pub mod base;
pub mod caller;
pub mod error;
pub mod span;
pub mod state;

mod sync;

pub use crate::{
    base::ObjectBase,
    caller::{AutoCaller, AutoCallerBase, AutoLimitedCaller},
    error::{ErrorInfo, ObjectError, Result, ResultCode},
    span::{AutoInitSpan, AutoReinitSpan, AutoUninitSpan, SpanResult},
    state::{ObjectState, State, UninitBegin},
};
