//! Buffered expression kernels.
//!
//! Assigning through an adapt type whose value type is not the other side's
//! type takes two steps joined by a scratch buffer typed as the value type:
//!
//! - source expression: evaluate `src` into scratch, then `dst <- scratch`
//! - destination expression: `scratch <- src`, then store scratch into `dst`
//!
//! When the other side already is the value type the buffer is skipped and
//! the evaluate or store kernel is used directly.
//!
//! # Scratch
//!
//! Each [`BufferedAssign`] owns its scratch behind a mutex, so concurrent
//! calls on one kernel serialize. Strided calls run in chunks of the
//! configured size. Strings held in scratch are released after every chunk.

use std::sync::Mutex;

use tracing::trace;

use continuum_ndt::{Arrmeta, StringData, Type, TypeId};

use super::adapt;
use crate::builder::{KernelBuilder, KernelRequest, Node, align_offset};
use crate::engine::{AssignEngine, AssignRequest, Operand};
use crate::error::{Error, Result};
use crate::kernel::{Kernel, element, element_const, unary};

/// Byte offsets of every [`StringData`] inside one element of `tp`.
fn string_offsets(tp: &Type, base: usize, out: &mut Vec<usize>) {
    if tp.id() == TypeId::String {
        out.push(base);
    } else if let Some(value) = tp.option_value() {
        string_offsets(value, base, out);
    } else if let (Some(fields), Some(offsets)) = (tp.fields(), tp.default_offsets()) {
        for (field, offset) in fields.iter().zip(offsets) {
            string_offsets(&field.tp, base + offset, out);
        }
    }
}

/// Two-step assignment through owned scratch space.
///
/// Child 0 fills the scratch; the child at `second_offset` drains it.
#[derive(Debug)]
pub struct BufferedAssign {
    scratch: Mutex<Vec<u64>>,
    stride: usize,
    chunk: usize,
    strings: Vec<usize>,
    second_offset: usize,
}

impl BufferedAssign {
    fn new(scratch_tp: &Type, chunk: usize) -> Self {
        let stride = align_offset(scratch_tp.data_size().max(1));
        let chunk = chunk.max(1);
        let mut strings = Vec::new();
        string_offsets(scratch_tp, 0, &mut strings);
        Self {
            scratch: Mutex::new(vec![0u64; (stride * chunk).div_ceil(8)]),
            stride,
            chunk,
            strings,
            second_offset: 0,
        }
    }

    /// Elements per strided pass.
    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// # Safety
    ///
    /// `scratch` must hold `count` scratch elements.
    unsafe fn release(&self, scratch: *mut u8, count: usize) {
        for i in 0..count {
            for offset in &self.strings {
                unsafe { (*scratch.add(i * self.stride + offset).cast::<StringData>()).reset() };
            }
        }
    }
}

impl Kernel for BufferedAssign {
    unsafe fn single(&self, node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let mut scratch = self.scratch.lock().map_err(|_| Error::ScratchUnavailable)?;
        let (fill, drain) = (node.first_child()?, node.child(self.second_offset)?);
        let buf = scratch.as_mut_ptr().cast::<u8>();
        let result = unsafe {
            fill.single(buf, src) }.and_then(|()| unsafe { drain.single(dst, &[buf.cast_const()])
        });
        unsafe { self.release(buf, 1) };
        result
    }

    unsafe fn strided(
        &self,
        node: Node<'_>,
        dst: *mut u8,
        dst_stride: isize,
        src: &[*const u8],
        src_stride: &[isize],
        count: usize,
    ) -> Result<()> {
        let (src, src_stride) = (unary(src)?, unary(src_stride)?);
        let mut scratch = self.scratch.lock().map_err(|_| Error::ScratchUnavailable)?;
        let (fill, drain) = (node.first_child()?, node.child(self.second_offset)?);
        let buf = scratch.as_mut_ptr().cast::<u8>();
        let stride = self.stride as isize;

        let mut done = 0;
        while done < count {
            let len = (count - done).min(self.chunk);
            let chunk_src = element_const(src, src_stride, done);
            let chunk_dst = element(dst, dst_stride, done);
            let result = unsafe { fill.strided(buf, stride, &[chunk_src], &[src_stride], len) }
                .and_then(|()| unsafe {
                    drain.strided(chunk_dst, dst_stride, &[buf.cast_const()], &[stride], len)
                });
            unsafe { self.release(buf, len) };
            result?;
            done += len;
        }
        Ok(())
    }
}

fn append_buffered(
    engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
    scratch_tp: &Type,
    source_expression: bool,
) -> Result<()> {
    let scratch_meta = Arrmeta::default_for(scratch_tp);
    let scratch = Operand::new(scratch_tp, &scratch_meta);
    let chunk = match req.request {
        KernelRequest::Single => 1,
        KernelRequest::Strided => engine.context().chunk.effective_size(),
    };
    trace!(step = "buffered", scratch = %scratch_tp, chunk);

    let root = builder.append(BufferedAssign::new(scratch_tp, chunk), req.request)?;
    let second = if source_expression {
        adapt::append_evaluate(engine, builder, scratch, req.src.tp, req.request)?;
        engine.instantiate_child(builder, req.dst, scratch, req.mode, req.request)?
    } else {
        engine.instantiate(builder, scratch, req.src, req.mode, req.request)?;
        let second = builder.next_offset();
        adapt::append_store(engine, builder, req.dst.tp, scratch, req.request)?;
        second
    };
    builder.get_at::<BufferedAssign>(root)?.second_offset = second - root;
    Ok(())
}

/// Build the kernel for a pair with an expression type on either side.
pub fn build(
    engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let (dst, src) = (req.dst.tp, req.src.tp);
    if src.is_expression() {
        let value = src.value_type();
        if dst == value {
            trace!(step = "evaluate");
            return adapt::append_evaluate(engine, builder, req.dst, src, req.request);
        }
        return append_buffered(engine, builder, req, value, true);
    }
    if dst.is_expression() {
        let value = dst.value_type();
        if src == value {
            trace!(step = "store");
            return adapt::append_store(engine, builder, dst, req.src, req.request);
        }
        return append_buffered(engine, builder, req, value, false);
    }
    Err(Error::mismatch(dst, src))
}
