//! The kernel trait.
//!
//! A kernel is one finished conversion step living inside a
//! [`KernelBuilder`](crate::builder::KernelBuilder). It is invoked through one
//! of two calling conventions on raw byte pointers:
//!
//! - `single(dst, src)`: convert one element
//! - `strided(dst, dst_stride, src, src_stride, count)`: convert `count`
//!   elements spaced by byte strides
//!
//! Kernels release their own state through `Drop`; the builder runs it.
//!
//! # Key Properties
//!
//! - **No self-pointers**: kernel state is moved by plain byte copies when
//!   the arena grows. Children are reached through [`Node::child`] using
//!   offsets stored at construction time.
//! - **Read-only execution**: methods take `&self`. A finished kernel tree
//!   can be invoked from several threads on disjoint data.
//!
//! # Thread Safety
//!
//! Kernels must be `Send + Sync`. State that changes per call (scratch
//! buffers) sits behind a lock owned by the kernel.

use std::ptr;

use crate::builder::Node;
use crate::error::{Error, Result};

/// Most source operands any kernel in this crate reads.
pub const MAX_ARITY: usize = 2;

/// One conversion step.
pub trait Kernel: Send + Sync + 'static {
    /// Convert one element.
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of one destination element and each
    /// pointer in `src` valid for reads of one source element, laid out as
    /// described by the types this kernel was built for. String destinations
    /// must hold a valid (possibly zeroed) `StringData`.
    unsafe fn single(&self, node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()>;

    /// Convert `count` elements.
    ///
    /// The default calls [`Kernel::single`] once per element.
    ///
    /// # Safety
    ///
    /// As for [`Kernel::single`], for every element `i < count` at
    /// `dst + i * dst_stride` and `src[j] + i * src_stride[j]`.
    unsafe fn strided(
        &self,
        node: Node<'_>,
        dst: *mut u8,
        dst_stride: isize,
        src: &[*const u8],
        src_stride: &[isize],
        count: usize,
    ) -> Result<()> {
        unsafe { strided_by_single(self, node, dst, dst_stride, src, src_stride, count) }
    }
}

/// Drive `kernel.single` across a strided batch.
///
/// # Safety
///
/// See [`Kernel::strided`].
pub unsafe fn strided_by_single<K: Kernel + ?Sized>(
    kernel: &K,
    node: Node<'_>,
    dst: *mut u8,
    dst_stride: isize,
    src: &[*const u8],
    src_stride: &[isize],
    count: usize,
) -> Result<()> {
    if src.len() > MAX_ARITY || src_stride.len() != src.len() {
        return Err(Error::Arity {
            expected: src_stride.len().min(MAX_ARITY),
            got: src.len(),
        });
    }
    let mut cursor = [ptr::null::<u8>(); MAX_ARITY];
    cursor[..src.len()].copy_from_slice(src);
    let cursor = &mut cursor[..src.len()];

    let mut dst = dst;
    for _ in 0..count {
        unsafe { kernel.single(node, dst, cursor)? };
        dst = dst.wrapping_offset(dst_stride);
        for (p, stride) in cursor.iter_mut().zip(src_stride) {
            *p = p.wrapping_offset(*stride);
        }
    }
    Ok(())
}

/// The only operand of a unary kernel.
#[inline]
pub fn unary<T: Copy>(operands: &[T]) -> Result<T> {
    match operands {
        [only] => Ok(*only),
        _ => Err(Error::Arity {
            expected: 1,
            got: operands.len(),
        }),
    }
}

/// Address of element `index` in a strided run.
#[inline]
pub(crate) fn element<T>(base: *mut T, stride: isize, index: usize) -> *mut T {
    base.cast::<u8>()
        .wrapping_offset(stride.wrapping_mul(index as isize))
        .cast::<T>()
}

/// Read-only variant of [`element`].
#[inline]
pub(crate) fn element_const<T>(base: *const T, stride: isize, index: usize) -> *const T {
    base.cast::<u8>()
        .wrapping_offset(stride.wrapping_mul(index as isize))
        .cast::<T>()
}
