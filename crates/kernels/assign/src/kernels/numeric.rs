//! Numeric and boolean conversion kernels.
//!
//! One generic kernel, [`ScalarAssign<D, S>`], covers every pairing of the
//! builtin scalars; the dispatch handler picks the monomorphization from the
//! runtime type ids. The kind table maps every mode of every numeric pair to
//! that handler and then redirects modes whose checks are implied by a
//! cheaper one.

use std::marker::PhantomData;

use continuum_ndt::{ErrorMode, TypeId, TypeKind};

use crate::builder::{KernelBuilder, Node};
use crate::engine::{AssignEngine, AssignRequest};
use crate::error::{Error, Result};
use crate::kernel::{Kernel, element, element_const, unary};
use crate::scalar::{Scalar, convert};
use crate::table::DispatchTable;

/// Converts one builtin scalar type to another under a fixed mode.
pub struct ScalarAssign<D, S> {
    mode: ErrorMode,
    _types: PhantomData<fn(S) -> D>,
}

impl<D: Scalar, S: Scalar> ScalarAssign<D, S> {
    pub fn new(mode: ErrorMode) -> Self {
        Self {
            mode,
            _types: PhantomData,
        }
    }

    pub fn mode(&self) -> ErrorMode {
        self.mode
    }
}

impl<D: Scalar, S: Scalar> Kernel for ScalarAssign<D, S> {
    #[inline]
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        let value = unsafe { S::load(src) };
        let out: D = convert(value, self.mode)?;
        unsafe { out.store(dst) };
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
        let (src, src_stride) = (unary(src)?, unary(src_stride)?);
        for i in 0..count {
            let value = unsafe { S::load(element_const(src, src_stride, i)) };
            let out: D = convert(value, self.mode)?;
            unsafe { out.store(element(dst, dst_stride, i)) };
        }
        Ok(())
    }
}

/// Run `$body` with `$T` bound to the Rust type of builtin scalar `$id`.
macro_rules! with_scalar {
    ($id:expr, $T:ident => $body:expr, else $fallback:expr) => {
        match $id {
            ::continuum_ndt::TypeId::Bool => {
                type $T = bool;
                $body
            }
            ::continuum_ndt::TypeId::Int8 => {
                type $T = i8;
                $body
            }
            ::continuum_ndt::TypeId::Int16 => {
                type $T = i16;
                $body
            }
            ::continuum_ndt::TypeId::Int32 => {
                type $T = i32;
                $body
            }
            ::continuum_ndt::TypeId::Int64 => {
                type $T = i64;
                $body
            }
            ::continuum_ndt::TypeId::UInt8 => {
                type $T = u8;
                $body
            }
            ::continuum_ndt::TypeId::UInt16 => {
                type $T = u16;
                $body
            }
            ::continuum_ndt::TypeId::UInt32 => {
                type $T = u32;
                $body
            }
            ::continuum_ndt::TypeId::UInt64 => {
                type $T = u64;
                $body
            }
            ::continuum_ndt::TypeId::Float32 => {
                type $T = f32;
                $body
            }
            ::continuum_ndt::TypeId::Float64 => {
                type $T = f64;
                $body
            }
            ::continuum_ndt::TypeId::Complex64 => {
                type $T = ::num_complex::Complex<f32>;
                $body
            }
            ::continuum_ndt::TypeId::Complex128 => {
                type $T = ::num_complex::Complex<f64>;
                $body
            }
            _ => $fallback,
        }
    };
}

pub(crate) use with_scalar;

fn append_scalar<D: Scalar, S: Scalar>(
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    builder.append(ScalarAssign::<D, S>::new(req.mode), req.request)?;
    Ok(())
}

fn is_unsized_float(id: TypeId) -> bool {
    matches!(id, TypeId::Float16 | TypeId::Float128)
}

fn scalar_to_scalar(
    _engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let (dst, src) = (req.dst.tp, req.src.tp);
    if is_unsized_float(dst.id()) || is_unsized_float(src.id()) {
        tracing::debug!(%dst, %src, "float16/float128 conversion requested");
        return Err(Error::unsupported(dst, src, "float16 and float128 values cannot be converted"));
    }
    with_scalar!(dst.id(), D => with_scalar!(src.id(), S => append_scalar::<D, S>(builder, req),
        else Err(Error::mismatch(dst, src))),
        else Err(Error::mismatch(dst, src)))
}

const SCALAR_KINDS: [TypeKind; 5] = [
    TypeKind::Bool,
    TypeKind::SInt,
    TypeKind::UInt,
    TypeKind::Real,
    TypeKind::Complex,
];

const INTEGER_KINDS: [TypeKind; 2] = [TypeKind::SInt, TypeKind::UInt];

pub(crate) fn register(table: &mut DispatchTable) {
    use ErrorMode::{Fractional, Inexact, NoCheck, Overflow};

    for dst in SCALAR_KINDS {
        for src in SCALAR_KINDS {
            table.register_kind(dst, src, &ErrorMode::CONCRETE, scalar_to_scalar);
        }
    }

    for dst in INTEGER_KINDS {
        for src in INTEGER_KINDS {
            table.alias_kind(dst, src, &[Fractional, Inexact], Overflow);
        }
        table.alias_kind(dst, TypeKind::Real, &[Inexact], Fractional);
        table.alias_kind(dst, TypeKind::Complex, &[Inexact], Fractional);
    }

    for src in INTEGER_KINDS {
        table.alias_kind(TypeKind::Real, src, &[Overflow, Fractional], NoCheck);
        table.alias_kind(TypeKind::Complex, src, &[Overflow, Fractional], NoCheck);
    }

    for (dst, src) in [
        (TypeKind::Real, TypeKind::Real),
        (TypeKind::Complex, TypeKind::Real),
        (TypeKind::Real, TypeKind::Complex),
        (TypeKind::Complex, TypeKind::Complex),
    ] {
        table.alias_kind(dst, src, &[Fractional], Overflow);
    }

    for src in SCALAR_KINDS {
        table.alias_kind(TypeKind::Bool, src, &[Fractional, Inexact], Overflow);
    }
    for dst in SCALAR_KINDS {
        table.alias_kind(dst, TypeKind::Bool, &[Overflow, Fractional, Inexact], NoCheck);
    }
}
