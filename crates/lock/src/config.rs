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

use crate::error::{LockError, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variable toggling runtime lock-order validation
pub const ENV_LOCK_VALIDATION: &str = "VBOXGLUE_LOCK_VALIDATION";

/// Environment variable toggling panics on lock assertions
pub const ENV_LOCK_STRICT: &str = "VBOXGLUE_LOCK_STRICT";

static GLOBAL_CONFIG: OnceCell<LockSystemConfig> = OnceCell::new();

/// Lock system configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSystemConfig {
    /// Check lock acquisition order against the lock class registry
    #[serde(default = "default_validation")]
    pub validation: bool,

    /// Panic on failed lock assertions instead of logging them
    #[serde(default = "default_strict")]
    pub strict: bool,
}

impl Default for LockSystemConfig {
    fn default() -> Self {
        Self {
            validation: default_validation(),
            strict: default_strict(),
        }
    }
}

// Default value functions
fn default_validation() -> bool {
    true
}

fn default_strict() -> bool {
    cfg!(debug_assertions)
}

impl LockSystemConfig {
    /// Configuration with validation off and assertions only logged
    pub fn permissive() -> Self {
        Self {
            validation: false,
            strict: false,
        }
    }

    /// Build the configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    ///
    /// Unset keys keep their defaults; unparsable values are reported and
    /// also fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            validation: read_flag(&lookup, ENV_LOCK_VALIDATION, defaults.validation),
            strict: read_flag(&lookup, ENV_LOCK_STRICT, defaults.strict),
        }
    }
}

fn read_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key) {
        None => default,
        Some(raw) => parse_flag(&raw).unwrap_or_else(|| {
            warn!("Ignoring invalid value '{}' for {}, using {}", raw, key, default);
            default
        }),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get the process-wide configuration, reading the environment on first use
pub fn global_config() -> &'static LockSystemConfig {
    GLOBAL_CONFIG.get_or_init(LockSystemConfig::from_env)
}

/// Seed the process-wide configuration
///
/// Must run before the first lock is taken; once the configuration has been
/// read it cannot change.
pub fn set_global_config(config: LockSystemConfig) -> Result<()> {
    GLOBAL_CONFIG.set(config).map_err(|rejected| {
        LockError::configuration(format!(
            "lock system configuration already initialized, rejected {rejected:?}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = LockSystemConfig::default();
        assert!(config.validation);
        assert_eq!(config.strict, cfg!(debug_assertions));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = LockSystemConfig::from_lookup(lookup(&[(ENV_LOCK_VALIDATION, "off"), (ENV_LOCK_STRICT, "YES")]));
        assert!(!config.validation);
        assert!(config.strict);
    }

    #[test]
    fn test_from_lookup_invalid_value_keeps_default() {
        let config = LockSystemConfig::from_lookup(lookup(&[(ENV_LOCK_VALIDATION, "sometimes")]));
        assert_eq!(config.validation, LockSystemConfig::default().validation);
    }

    #[test]
    fn test_serde_defaults() {
        let config: LockSystemConfig = serde_json::from_str("{}").expect("empty object should use defaults");
        assert_eq!(config, LockSystemConfig::default());

        let config: LockSystemConfig = serde_json::from_str(r#"{"validation": false}"#).expect("partial object");
        assert!(!config.validation);
        assert_eq!(config.strict, default_strict());
    }

    #[test]
    fn test_set_global_config_after_init_is_rejected() {
        let _ = global_config();
        let err = set_global_config(LockSystemConfig::permissive()).unwrap_err();
        assert!(matches!(err, LockError::Configuration { .. }));
    }
}
