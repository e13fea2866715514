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

//! Lock classes and the process-wide validation class registry
//!
//! Every lock handle is tagged with a [`LockClass`]. At process start
//! [`init_auto_lock_system`] registers the classes in a fixed order, and each
//! newly registered class learns that all classes registered before it may be
//! held while it is being acquired. That registration order is the global
//! lock order the validator checks against.

use crate::config::global_config;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Symbolic lock class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockClass {
    /// Not validated
    None = 0,
    WebService,
    VirtualBoxObject,
    HostObject,
    ListOfMachines,
    MachineObject,
    SnapshotObject,
    MediumQuery,
    ListOfMedia,
    ListOfOtherObjects,
    OtherObject,
    ProgressList,
    /// Internal lock of an object's lifecycle state
    ObjectState,
    Translator,
}

impl LockClass {
    /// Number of lock classes
    pub const COUNT: usize = 14;

    /// All classes in declaration order
    pub const ALL: [LockClass; Self::COUNT] = [
        LockClass::None,
        LockClass::WebService,
        LockClass::VirtualBoxObject,
        LockClass::HostObject,
        LockClass::ListOfMachines,
        LockClass::MachineObject,
        LockClass::SnapshotObject,
        LockClass::MediumQuery,
        LockClass::ListOfMedia,
        LockClass::ListOfOtherObjects,
        LockClass::OtherObject,
        LockClass::ProgressList,
        LockClass::ObjectState,
        LockClass::Translator,
    ];

    /// Diagnostic name used for validator classes
    pub fn name(self) -> &'static str {
        match self {
            LockClass::None => "MAIN-NONE",
            LockClass::WebService => "MAIN-WEBSERVICE",
            LockClass::VirtualBoxObject => "MAIN-1-VIRTUALBOXOBJECT",
            LockClass::HostObject => "MAIN-3-HOSTOBJECT",
            LockClass::ListOfMachines => "MAIN-4-LISTOFMACHINES",
            LockClass::MachineObject => "MAIN-5-MACHINEOBJECT",
            LockClass::SnapshotObject => "MAIN-6-SNAPSHOTOBJECT",
            LockClass::MediumQuery => "MAIN-7-MEDIUMQUERY",
            LockClass::ListOfMedia => "MAIN-8-LISTOFMEDIA",
            LockClass::ListOfOtherObjects => "MAIN-9-LISTOFOTHEROBJECTS",
            LockClass::OtherObject => "MAIN-10-OTHEROBJECT",
            LockClass::ProgressList => "MAIN-11-PROGRESSLIST",
            LockClass::ObjectState => "MAIN-0-OBJECTSTATE",
            LockClass::Translator => "MAIN-12-TRANSLATOR",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LockClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Order in which classes are registered; `None` is never registered.
const REGISTRATION_ORDER: [LockClass; LockClass::COUNT - 1] = [
    LockClass::WebService,
    LockClass::VirtualBoxObject,
    LockClass::HostObject,
    LockClass::ListOfMachines,
    LockClass::MachineObject,
    LockClass::SnapshotObject,
    LockClass::MediumQuery,
    LockClass::ListOfMedia,
    LockClass::ListOfOtherObjects,
    LockClass::OtherObject,
    LockClass::ProgressList,
    LockClass::ObjectState,
    LockClass::Translator,
];

/// Runtime validator handle for a registered lock class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationClass {
    class: LockClass,
    /// Position in the registration order
    rank: u8,
    /// Bit per [`LockClass`] index that may be held while acquiring `class`
    prior: u16,
}

impl ValidationClass {
    pub fn class(&self) -> LockClass {
        self.class
    }

    pub fn rank(&self) -> u8 {
        self.rank
    }

    /// Whether a lock of `held` may already be held when acquiring this class
    ///
    /// Distinct locks of the same class may nest; no order is defined
    /// between them.
    pub fn may_be_acquired_while_holding(&self, held: &ValidationClass) -> bool {
        held.class == self.class || self.prior & (1 << held.class.index()) != 0
    }

    fn add_prior(&mut self, prior: &ValidationClass) {
        self.prior |= 1 << prior.class.index();
    }
}

#[derive(Debug)]
struct ClassRegistry {
    classes: [Option<ValidationClass>; LockClass::COUNT],
}

impl ClassRegistry {
    fn build() -> Self {
        let mut classes = [None; LockClass::COUNT];
        let mut registered: Vec<ValidationClass> = Vec::with_capacity(REGISTRATION_ORDER.len());

        for (rank, class) in REGISTRATION_ORDER.iter().copied().enumerate() {
            let mut validation = ValidationClass {
                class,
                rank: rank as u8,
                prior: 0,
            };
            // everything registered so far may be held while acquiring the new class
            for can_be_held in &registered {
                validation.add_prior(can_be_held);
            }
            debug!("Registered lock validation class {} (rank {})", class, rank);
            registered.push(validation);
            classes[class.index()] = Some(validation);
        }

        Self { classes }
    }
}

static REGISTRY: OnceCell<ClassRegistry> = OnceCell::new();

/// Initialize the lock validation class registry
///
/// Call once on the main thread before any lock is used. Returns `true` if
/// this call built the registry, `false` if validation is disabled or the
/// registry already exists.
pub fn init_auto_lock_system() -> bool {
    if !global_config().validation {
        debug!("Lock validation disabled, skipping lock class registration");
        return false;
    }

    let mut built = false;
    REGISTRY.get_or_init(|| {
        built = true;
        ClassRegistry::build()
    });
    built
}

/// Check whether the registry has been built
pub fn is_lock_system_initialized() -> bool {
    REGISTRY.get().is_some()
}

/// Resolve a lock class to its validator class
///
/// Returns `None` when validation is off, the class is [`LockClass::None`] or
/// the registry has not been initialized yet.
pub fn validation_class(class: LockClass) -> Option<ValidationClass> {
    if !global_config().validation {
        return None;
    }
    REGISTRY.get()?.classes[class.index()]
}
