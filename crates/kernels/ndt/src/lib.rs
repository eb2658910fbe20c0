//! Continuum NDT
//!
//! Dynamic type descriptors consumed by the assignment kernels: exact type
//! ids and coarse kinds, immutable [`Type`] handles, per-type layout
//! metadata ([`Arrmeta`]), string element storage and the assignment
//! [`ErrorMode`].
//!
//! This crate only describes values. Converting between them lives in
//! `continuum-assign`.

pub mod arrmeta;
pub mod error;
pub mod error_mode;
pub mod ids;
pub mod string;
pub mod types;

pub use arrmeta::Arrmeta;
pub use error::{Error, Result};
pub use error_mode::ErrorMode;
pub use ids::{TypeId, TypeKind};
pub use string::StringData;
pub use types::{Adapt, AdaptOp, Field, Timezone, Type};

/// Missing-value markers for the date and time storage types.
pub mod na {
    /// `date` NA: the smallest `i32`.
    pub const DATE: i32 = i32::MIN;
    /// `time` and `datetime` NA: the smallest `i64`.
    pub const TICKS: i64 = i64::MIN;
}

/// 100ns ticks per second, the resolution of `time` and `datetime`.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// 100ns ticks per day.
pub const TICKS_PER_DAY: i64 = 86_400 * TICKS_PER_SECOND;
