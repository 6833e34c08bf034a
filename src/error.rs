// Copyright 2024 Saptak Santra
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

//! Error types

use std::fmt;

/// Asset lifecycle error type
///
/// Errors are `Clone` because a terminal state is observed by every waiter of
/// a handle or group, not only the first one.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetError {
    /// The content store reported a failure for this key or label
    LoadFailed { key: String, reason: String },

    /// The request was cancelled before it resolved
    Cancelled(String),

    /// No resource, label or instance is registered under this key
    NotFound(String),

    /// The resource exists but holds a different type than requested
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The instantiated template does not carry the requested component
    MissingComponent {
        key: String,
        component: &'static str,
    },

    /// The handle or group was already released
    Released(String),

    /// Invalid configuration
    Config(String),
}

impl AssetError {
    /// Build a load failure for `key`
    pub fn load_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        AssetError::LoadFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// True for the cancellation terminal state
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AssetError::Cancelled(_))
    }
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::LoadFailed { key, reason } => write!(f, "Load failed for '{key}': {reason}"),
            AssetError::Cancelled(key) => write!(f, "Load cancelled: {key}"),
            AssetError::NotFound(key) => write!(f, "Asset not found: {key}"),
            AssetError::TypeMismatch {
                key,
                expected,
                actual,
            } => write!(f, "Type mismatch for '{key}': expected {expected}, found {actual}"),
            AssetError::MissingComponent { key, component } => {
                write!(f, "{key}: component {component} not found")
            }
            AssetError::Released(key) => write!(f, "Already released: {key}"),
            AssetError::Config(msg) => write!(f, "Config error: {msg}"),
        }
    }
}

impl std::error::Error for AssetError {}

impl From<serde_json::Error> for AssetError {
    fn from(err: serde_json::Error) -> Self {
        AssetError::Config(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AssetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_key() {
        let err = AssetError::load_failed("ui/icon", "disk offline");
        assert_eq!(err.to_string(), "Load failed for 'ui/icon': disk offline");
    }

    #[test]
    fn test_cancelled_flag() {
        assert!(AssetError::Cancelled("k".into()).is_cancelled());
        assert!(!AssetError::NotFound("k".into()).is_cancelled());
    }
}
