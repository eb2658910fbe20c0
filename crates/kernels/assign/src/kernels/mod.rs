//! Built-in assignment kernels
//!
//! Leaf kernels (copy, numeric, string, datetime) register themselves in the
//! dispatch table. Composite kernels (option, field-wise, buffered) are
//! reached by the engine's structural rules and recurse for their children.

pub mod adapt;
pub mod buffered;
pub mod copy;
pub mod datetime;
pub mod fieldwise;
pub mod missing;
pub mod numeric;
pub mod option;
pub mod string;

use crate::table::DispatchTable;

/// Register every leaf conversion.
pub(crate) fn register_all(table: &mut DispatchTable) {
    copy::register(table);
    numeric::register(table);
    string::register(table);
    datetime::register(table);
}
