//! Error types for reference operations.

use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The reference was not found.
    #[error("ref not found: {name}")]
    NotFound { name: String },

    /// The ref name is invalid.
    #[error("invalid ref name: {name}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Following symbolic refs did not reach a direct ref.
    #[error("symbolic ref chain too deep or cyclic at {name}")]
    SymbolicLoop { name: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock guarding the ref store was poisoned.
    #[error("ref store lock poisoned")]
    LockPoisoned,
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
