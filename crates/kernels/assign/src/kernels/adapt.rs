//! Direct evaluation of adapt (expression) types.
//!
//! An `adapt[value <- storage, op]` element is stored as `storage` and read
//! as `value`. The two directions:
//!
//! - evaluate: `value <- storage`
//! - store: `storage <- value`
//!
//! For `byteswap` both directions reverse the bytes of each numeric part.
//! For `convert(mode)` both dispatch an ordinary assignment between the two
//! types under the adapt's own mode.

use continuum_ndt::{Adapt, AdaptOp, Arrmeta, Type, TypeKind};

use crate::builder::{KernelBuilder, KernelRequest, Node};
use crate::engine::{AssignEngine, Operand};
use crate::error::{Error, Result};
use crate::kernel::{Kernel, unary};

/// Reverses the byte order of each `part`-byte lane of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSwap {
    pub part: usize,
    pub parts: usize,
}

impl ByteSwap {
    /// Swap layout for values of `tp`; complex values swap each half.
    pub fn for_value(tp: &Type) -> ByteSwap {
        let size = tp.data_size();
        if tp.kind() == TypeKind::Complex {
            ByteSwap { part: size / 2, parts: 2 }
        } else {
            ByteSwap { part: size, parts: 1 }
        }
    }
}

impl Kernel for ByteSwap {
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        let mut buf = [0u8; 16];
        for p in 0..self.parts {
            let base = p * self.part;
            let lane = &mut buf[..self.part];
            unsafe { std::ptr::copy_nonoverlapping(src.add(base), lane.as_mut_ptr(), self.part) };
            lane.reverse();
            unsafe { std::ptr::copy_nonoverlapping(lane.as_ptr(), dst.add(base), self.part) };
        }
        Ok(())
    }
}

fn adapt_of(tp: &Type) -> Result<&Adapt> {
    tp.adapt().ok_or_else(|| Error::mismatch(tp, "expression"))
}

/// Append the kernel reading `src` (an adapt type) into its value type.
pub fn append_evaluate(
    engine: &AssignEngine,
    builder: &mut KernelBuilder,
    dst: Operand<'_>,
    src: &Type,
    request: KernelRequest,
) -> Result<()> {
    let adapt = adapt_of(src)?;
    match adapt.op {
        AdaptOp::ByteSwap => {
            builder.append(ByteSwap::for_value(&adapt.value), request)?;
            Ok(())
        }
        AdaptOp::Convert(mode) => {
            let meta = Arrmeta::default_for(&adapt.storage);
            let storage = Operand::new(&adapt.storage, &meta);
            engine.instantiate(builder, dst, storage, mode, request).map(drop)
        }
    }
}

/// Append the kernel writing a value-type `src` into `dst` (an adapt type).
pub fn append_store(
    engine: &AssignEngine,
    builder: &mut KernelBuilder,
    dst: &Type,
    src: Operand<'_>,
    request: KernelRequest,
) -> Result<()> {
    let adapt = adapt_of(dst)?;
    match adapt.op {
        AdaptOp::ByteSwap => {
            builder.append(ByteSwap::for_value(&adapt.value), request)?;
            Ok(())
        }
        AdaptOp::Convert(mode) => {
            let meta = Arrmeta::default_for(&adapt.storage);
            let storage = Operand::new(&adapt.storage, &meta);
            engine.instantiate(builder, storage, src, mode, request).map(drop)
        }
    }
}
