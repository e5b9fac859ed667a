use alloc::string::String;

use thiserror::Error;

// -----------------------------------------------------------------------------
// AccessError

/// The error an accessor reports when it cannot produce a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AccessError {
    #[error("{0}")]
    Failed(String),

    #[error("accessor expects an instance of `{expected}`")]
    TypeMismatch { expected: &'static str },
}

impl AccessError {
    /// Creates a [`AccessError::Failed`] from any displayable message.
    #[inline]
    pub fn failed(msg: impl core::fmt::Display) -> Self {
        use alloc::string::ToString;
        Self::Failed(msg.to_string())
    }
}
