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

use crate::class::LockClass;
use std::panic::Location;
use std::time::Duration;
use thiserror::Error;

/// Lock system error types
///
/// Apart from `Timeout` and `Configuration`, every variant describes a
/// programming error. Those are not returned from the scope API but routed
/// through [`crate::assertion::assert_lock`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// A scope tried to lock while it already holds its handles
    #[error("Attempting to lock twice (scope created at {location})")]
    DoubleAcquire { location: &'static Location<'static> },

    /// A scope tried to unlock while it holds nothing
    #[error("Attempting to unlock while not locked (scope created at {location})")]
    UnbalancedRelease { location: &'static Location<'static> },

    /// The validator rejected the acquisition order
    #[error("Lock order violation: acquiring {acquiring} while holding {held}")]
    OrderViolation { acquiring: LockClass, held: LockClass },

    /// A reader asked for write access on the same handle
    #[error("Read-to-write upgrade on {resource} would deadlock the calling thread")]
    UpgradeDeadlock { resource: String },

    /// Unlock from a thread that does not own the lock
    #[error("Unlock of {resource} by a thread that does not own it")]
    NotOwner { resource: String },

    /// Bounded wait expired
    #[error("Lock acquisition timeout for '{resource}' after {timeout:?}")]
    Timeout { resource: String, timeout: Duration },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl LockError {
    pub fn double_acquire(location: &'static Location<'static>) -> Self {
        Self::DoubleAcquire { location }
    }

    pub fn unbalanced_release(location: &'static Location<'static>) -> Self {
        Self::UnbalancedRelease { location }
    }

    pub fn order_violation(acquiring: LockClass, held: LockClass) -> Self {
        Self::OrderViolation { acquiring, held }
    }

    pub fn upgrade_deadlock(resource: impl Into<String>) -> Self {
        Self::UpgradeDeadlock {
            resource: resource.into(),
        }
    }

    pub fn not_owner(resource: impl Into<String>) -> Self {
        Self::NotOwner {
            resource: resource.into(),
        }
    }

    /// Create timeout error
    pub fn timeout(resource: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            resource: resource.into(),
            timeout,
        }
    }

    /// Create configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Check if the error is a caller bug rather than a runtime condition
    pub fn is_programming_error(&self) -> bool {
        !matches!(self, Self::Timeout { .. } | Self::Configuration { .. })
    }

    /// Check if it is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Lock operation Result type
pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let timeout_err = LockError::timeout("RWLockHandle(MAIN-10-OTHEROBJECT)", Duration::from_millis(5));
        assert!(matches!(timeout_err, LockError::Timeout { .. }));
        assert!(timeout_err.is_retryable());
        assert!(!timeout_err.is_programming_error());

        let order_err = LockError::order_violation(LockClass::MachineObject, LockClass::OtherObject);
        assert!(order_err.is_programming_error());
        assert!(!order_err.is_retryable());
    }

    #[test]
    fn test_error_messages_name_the_classes() {
        let err = LockError::order_violation(LockClass::VirtualBoxObject, LockClass::MachineObject);
        let msg = err.to_string();
        assert!(msg.contains("VIRTUALBOXOBJECT"), "{msg}");
        assert!(msg.contains("MACHINEOBJECT"), "{msg}");
    }

    #[test]
    fn test_scope_errors_carry_location() {
        let err = LockError::double_acquire(Location::caller());
        assert!(err.to_string().contains(file!()));
    }
}
