//! Signing Error Types

use thiserror::Error;

/// Errors raised while preparing signing material.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningError {
    /// The shared secret is empty or whitespace only.
    #[error("Signing secret must not be empty")]
    EmptySecret,
}

pub type Result<T> = std::result::Result<T, SigningError>;
