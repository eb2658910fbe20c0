//! Bytewise copy kernels for identical POD layouts.

use std::ptr;

use continuum_ndt::{ErrorMode, TypeId};

use crate::builder::{KernelBuilder, KernelRequest, Node};
use crate::engine::{AssignEngine, AssignRequest};
use crate::error::{Error, Result};
use crate::kernel::{Kernel, element, element_const, unary};
use crate::table::DispatchTable;

/// Copy of a fixed power-of-two width.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyBytes<const N: usize>;

impl<const N: usize> Kernel for CopyBytes<N> {
    #[inline]
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        unsafe { ptr::copy(src, dst, N) };
        Ok(())
    }

    unsafe fn strided(
        &self,
        _node: Node<'_>,
        dst: *mut u8,
        dst_stride: isize,
        src: &[*const u8],
        src_stride: &[isize],
        count: usize,
    ) -> Result<()> {
        unsafe { copy_strided(N, dst, dst_stride, unary(src)?, unary(src_stride)?, count) };
        Ok(())
    }
}

/// Copy of an arbitrary width.
#[derive(Debug, Clone, Copy)]
pub struct CopyMem {
    pub size: usize,
}

impl Kernel for CopyMem {
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        unsafe { ptr::copy(src, dst, self.size) };
        Ok(())
    }

    unsafe fn strided(
        &self,
        _node: Node<'_>,
        dst: *mut u8,
        dst_stride: isize,
        src: &[*const u8],
        src_stride: &[isize],
        count: usize,
    ) -> Result<()> {
        unsafe { copy_strided(self.size, dst, dst_stride, unary(src)?, unary(src_stride)?, count) };
        Ok(())
    }
}

/// # Safety
///
/// Every addressed element must be valid for `size` bytes.
unsafe fn copy_strided(
    size: usize,
    dst: *mut u8,
    dst_stride: isize,
    src: *const u8,
    src_stride: isize,
    count: usize,
) {
    if dst_stride == size as isize && src_stride == size as isize {
        unsafe { ptr::copy(src, dst, size * count) };
        return;
    }
    for i in 0..count {
        unsafe { ptr::copy(element_const(src, src_stride, i), element(dst, dst_stride, i), size) };
    }
}

/// Append the copy kernel for `size` bytes.
pub fn append_copy(builder: &mut KernelBuilder, size: usize, request: KernelRequest) -> Result<()> {
    match size {
        1 => builder.append(CopyBytes::<1>, request),
        2 => builder.append(CopyBytes::<2>, request),
        4 => builder.append(CopyBytes::<4>, request),
        8 => builder.append(CopyBytes::<8>, request),
        _ => builder.append(CopyMem { size }, request),
    }?;
    Ok(())
}

fn bytes_to_bytes(
    _engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let (dst, src) = (req.dst.tp, req.src.tp);
    if dst.data_size() != src.data_size() {
        return Err(Error::mismatch(dst, src));
    }
    append_copy(builder, dst.data_size(), req.request)
}

pub(crate) fn register(table: &mut DispatchTable) {
    let all = &ErrorMode::CONCRETE;
    table.register_exact(TypeId::FixedBytes, TypeId::FixedBytes, all, bytes_to_bytes);
}
