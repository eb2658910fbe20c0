//! Errors raised while constructing type descriptors.

use thiserror::Error;

/// Result alias for type construction.
pub type Result<T> = std::result::Result<T, Error>;

/// Type construction failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A struct was declared with the same field name twice.
    #[error("duplicate field name '{0}' in struct type")]
    DuplicateField(String),

    /// A fixed-size type was declared with a zero or otherwise invalid size.
    #[error("invalid size {size} for {what}")]
    InvalidSize {
        /// The type family being constructed.
        what: &'static str,
        /// The rejected size.
        size: usize,
    },

    /// An alignment that is not a power of two, or exceeds eight bytes.
    #[error("invalid alignment {0}; must be a power of two no greater than 8")]
    InvalidAlignment(usize),

    /// An adapt type whose value and storage types cannot be paired.
    #[error("cannot adapt {value} from storage {storage}: {reason}")]
    InvalidAdapt {
        /// Value type name.
        value: String,
        /// Storage type name.
        storage: String,
        /// Why the pairing was rejected.
        reason: &'static str,
    },
}
