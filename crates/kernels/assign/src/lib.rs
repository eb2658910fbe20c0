//! Continuum Assign
//!
//! Typed value-conversion kernels. An [`AssignEngine`] selects and builds the
//! kernel tree converting one type into another under an
//! [`ErrorMode`](continuum_ndt::ErrorMode); the tree lives in a
//! [`KernelBuilder`] arena and is invoked one element at a time or over
//! strided batches.

pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod kernels;
pub mod scalar;
pub mod table;

pub use builder::{KernelBuilder, KernelRequest, Node};
pub use config::{ChunkConfig, DateParseOrder, EvalContext};
pub use engine::{AssignEngine, AssignKernel, AssignRequest, Operand};
pub use error::{Error, Result};
pub use kernel::Kernel;
pub use kernels::missing::{MissingValues, SentinelMissing};
pub use scalar::{Scalar, Value};
pub use table::DispatchTable;
