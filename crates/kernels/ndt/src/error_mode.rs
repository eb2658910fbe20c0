//! Assignment error modes.
//!
//! The error mode decides how much information loss an assignment tolerates.
//! Modes are ordered by strictness: `nocheck < overflow < fractional < inexact`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Validation strictness for a value conversion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Truncate silently, no validation.
    NoCheck,
    /// Reject range violations only.
    Overflow,
    /// Reject range violations and lost fractional parts.
    #[default]
    Fractional,
    /// Reject any loss of information, including rounding.
    Inexact,
    /// Resolve to the evaluation context's configured mode.
    Default,
}

impl ErrorMode {
    /// The four concrete modes, in strictness order.
    pub const CONCRETE: [ErrorMode; 4] = [
        ErrorMode::NoCheck,
        ErrorMode::Overflow,
        ErrorMode::Fractional,
        ErrorMode::Inexact,
    ];

    /// Replace [`ErrorMode::Default`] with `fallback`.
    ///
    /// A `fallback` of `Default` resolves to [`ErrorMode::Fractional`].
    pub fn resolve(self, fallback: ErrorMode) -> ErrorMode {
        match (self, fallback) {
            (ErrorMode::Default, ErrorMode::Default) => ErrorMode::Fractional,
            (ErrorMode::Default, mode) => mode,
            (mode, _) => mode,
        }
    }

    /// Range violations are rejected.
    pub fn checks_overflow(self) -> bool {
        !matches!(self, ErrorMode::NoCheck)
    }

    /// Non-integral values are rejected when the destination is integral.
    pub fn checks_fractional(self) -> bool {
        matches!(self, ErrorMode::Fractional | ErrorMode::Inexact)
    }

    /// Any value that does not round-trip is rejected.
    pub fn checks_inexact(self) -> bool {
        matches!(self, ErrorMode::Inexact)
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorMode::NoCheck => "nocheck",
            ErrorMode::Overflow => "overflow",
            ErrorMode::Fractional => "fractional",
            ErrorMode::Inexact => "inexact",
            ErrorMode::Default => "default",
        }
    }
}

impl fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
