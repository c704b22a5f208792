//! Uniform result value for file manager mutations.

use serde::{Deserialize, Serialize};

/// Classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A directory or file name contained forbidden characters.
    InvalidName,
    /// The underlying filesystem call failed.
    Io,
    /// The operation is not supported by this file manager.
    Unsupported,
    /// An upload destination is not an existing directory.
    InvalidDestination,
    /// One or more uploaded files could not be stored.
    Upload,
}

/// Outcome of a mutating operation.
///
/// Expected failures (bad names, IO errors) are reported through this value
/// rather than as errors, so callers can show `message` to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable failure message (empty on success).
    pub message: String,
    /// Failure classification (absent on success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl OperationResult {
    /// A successful result.
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
            kind: None,
        }
    }

    /// A failed result with the given kind and message.
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            kind: Some(kind),
        }
    }

    /// Whether this result is a failure of the given kind.
    pub fn is_failure_of(&self, kind: FailureKind) -> bool {
        !self.success && self.kind == Some(kind)
    }
}

impl Default for OperationResult {
    fn default() -> Self {
        Self::ok()
    }
}
