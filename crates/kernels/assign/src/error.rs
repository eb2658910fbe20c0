//! Errors raised while building or running assignment kernels.
//!
//! # Error Categories
//!
//! - **Construction errors**: [`Error::TypeMismatch`], [`Error::Unsupported`],
//!   [`Error::Field`], [`Error::DispatchCycle`]. Raised by the dispatch engine
//!   before any data is touched.
//! - **Value errors**: [`Error::Overflow`], [`Error::Fractional`],
//!   [`Error::Inexact`], [`Error::ImaginaryLoss`], [`Error::MissingValue`],
//!   [`Error::StringTooLarge`], [`Error::Parse`]. Raised per element while a
//!   kernel runs.
//! - **Arena errors**: [`Error::AllocationFailed`], [`Error::InvalidOffset`],
//!   [`Error::RecordMismatch`], [`Error::RequestMismatch`], [`Error::Arity`],
//!   [`Error::OperandMismatch`], [`Error::LengthMismatch`].
//! - **Scratch errors**: [`Error::ScratchUnavailable`].
//!
//! # Error Handling Policy
//!
//! A strided call stops at the first failing element. Elements before it are
//! written, elements after it are untouched. Only `nocheck` accepts loss, and
//! it does so by not checking rather than by suppressing an error.

use thiserror::Error;

use crate::builder::KernelRequest;

/// Assignment result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from kernel construction and execution.
#[derive(Debug, Error)]
pub enum Error {
    /// No dispatch rule matches the type pair, or container shapes differ.
    #[error("cannot assign from {src} to {dst}")]
    TypeMismatch {
        /// Destination type.
        dst: String,
        /// Source type.
        src: String,
    },

    /// The type pair is known but deliberately not implemented.
    #[error("unsupported assignment from {src} to {dst}: {reason}")]
    Unsupported {
        /// Destination type.
        dst: String,
        /// Source type.
        src: String,
        /// What is missing.
        reason: &'static str,
    },

    /// Building the kernel for one container member failed.
    #[error("field '{field}': {source}")]
    Field {
        /// Destination member name.
        field: String,
        /// The member's construction error.
        #[source]
        source: Box<Error>,
    },

    /// Alias entries in the dispatch table form a loop.
    #[error("dispatch aliases for {entry} do not terminate")]
    DispatchCycle {
        /// The looping entry, rendered as `dst <- src (mode)`.
        entry: String,
    },

    /// The value does not fit the destination's range.
    #[error("overflow while assigning {src_tp} value {value} to {dst_tp}")]
    Overflow {
        src_tp: String,
        value: String,
        dst_tp: String,
    },

    /// A non-integral value was assigned to an integer.
    #[error("fractional part lost while assigning {src_tp} value {value} to {dst_tp}")]
    Fractional {
        src_tp: String,
        value: String,
        dst_tp: String,
    },

    /// The value changes when converted and converted back.
    #[error("inexact value while assigning {src_tp} value {value} to {dst_tp}")]
    Inexact {
        src_tp: String,
        value: String,
        dst_tp: String,
    },

    /// A complex value with a nonzero imaginary part was assigned to a real.
    #[error("loss of imaginary component while assigning {src_tp} value {value} to {dst_tp}")]
    ImaginaryLoss {
        src_tp: String,
        value: String,
        dst_tp: String,
    },

    /// A missing value was assigned to a non-option destination.
    #[error("cannot assign an NA value to non-option type {dst_tp}")]
    MissingValue {
        /// Destination type.
        dst_tp: String,
    },

    /// Text does not fit a fixed-size string destination.
    #[error(
        "input string of {len} bytes is too large to convert to destination \
         fixed-size string of {size} bytes"
    )]
    StringTooLarge {
        /// Destination capacity.
        size: usize,
        /// Source length in bytes.
        len: usize,
    },

    /// Text could not be parsed as the destination type.
    #[error("cannot parse {input:?} as {tp}: {reason}")]
    Parse {
        /// Destination type.
        tp: String,
        /// The offending text.
        input: String,
        /// What went wrong.
        reason: String,
    },

    /// The arena could not grow.
    #[error("kernel arena allocation of {bytes} bytes failed")]
    AllocationFailed {
        /// Requested capacity.
        bytes: usize,
    },

    /// An offset that does not start a kernel record.
    #[error("no kernel record at offset {offset}")]
    InvalidOffset {
        /// Absolute arena offset.
        offset: usize,
    },

    /// A record was accessed as the wrong kernel type.
    #[error("kernel record at offset {offset} is not a {expected}")]
    RecordMismatch {
        /// Absolute arena offset.
        offset: usize,
        /// Requested kernel type name.
        expected: &'static str,
    },

    /// A kernel was invoked with the other calling convention.
    #[error("kernel at offset {offset} was built for {built:?} calls, invoked as {called:?}")]
    RequestMismatch {
        /// Absolute arena offset.
        offset: usize,
        /// Convention the kernel was built for.
        built: KernelRequest,
        /// Convention used by the caller.
        called: KernelRequest,
    },

    /// A kernel was invoked with the wrong number of source operands.
    #[error("kernel expects {expected} source operand(s), got {got}")]
    Arity {
        /// Operands the kernel reads.
        expected: usize,
        /// Operands supplied.
        got: usize,
    },

    /// A typed call does not match the types the kernel was built for.
    #[error("kernel built for {expected}, called with {got}")]
    OperandMismatch {
        /// Type pair the kernel was built for, as `dst <- src`.
        expected: String,
        /// Type pair of the call.
        got: String,
    },

    /// Destination and source buffers hold different element counts.
    #[error("destination holds {dst} elements, source holds {src}")]
    LengthMismatch {
        dst: usize,
        src: usize,
    },

    /// A buffered kernel's scratch space is poisoned by an earlier panic.
    #[error("buffered kernel scratch space is unavailable")]
    ScratchUnavailable,
}

impl Error {
    /// Shorthand for [`Error::TypeMismatch`] from anything printable.
    pub fn mismatch(dst: impl ToString, src: impl ToString) -> Self {
        Error::TypeMismatch {
            dst: dst.to_string(),
            src: src.to_string(),
        }
    }

    /// Shorthand for [`Error::Unsupported`].
    pub fn unsupported(dst: impl ToString, src: impl ToString, reason: &'static str) -> Self {
        Error::Unsupported {
            dst: dst.to_string(),
            src: src.to_string(),
            reason,
        }
    }

    /// Shorthand for [`Error::Parse`].
    pub fn parse(tp: impl ToString, input: &[u8], reason: impl ToString) -> Self {
        Error::Parse {
            tp: tp.to_string(),
            input: String::from_utf8_lossy(input).into_owned(),
            reason: reason.to_string(),
        }
    }

    /// Wrap a member construction error with the member's name.
    pub fn in_field(self, field: impl Into<String>) -> Self {
        Error::Field {
            field: field.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error was raised by a running kernel rather than during
    /// construction.
    pub fn is_value_error(&self) -> bool {
        matches!(
            self,
            Error::Overflow { .. }
                | Error::Fractional { .. }
                | Error::Inexact { .. }
                | Error::ImaginaryLoss { .. }
                | Error::MissingValue { .. }
                | Error::StringTooLarge { .. }
                | Error::Parse { .. }
        )
    }
}
