//! Missing-value (NA) providers.
//!
//! Option kernels never decide what NA looks like. They ask a
//! [`MissingValues`] provider for two child kernels per payload type:
//!
//! - `assign_na(value_tp)`: writes NA into one element, reading no source
//! - `is_missing(value_tp)`: writes one byte, `1` when the source is NA
//!
//! [`SentinelMissing`] is the default provider. It reserves one bit pattern
//! per type:
//!
//! | type | NA |
//! |---|---|
//! | `bool` | byte `2` |
//! | signed ints | `MIN` |
//! | unsigned ints | `MAX` |
//! | `float32` | bits `0x7f8007a2` |
//! | `float64` | bits `0x7ff00000000007a2` |
//! | complex | both parts the float NA |
//! | `string` | [`StringData::na`] |
//! | `date` | `i32::MIN` |
//! | `time`, `datetime` | `i64::MIN` |
//!
//! When testing, any float NaN counts as missing, and a complex value is
//! missing when either part is NaN.

use std::slice;

use tracing::debug;

use continuum_ndt::{StringData, Type, TypeId, na};

use crate::builder::{KernelBuilder, KernelRequest, Node};
use crate::error::{Error, Result};
use crate::kernel::{Kernel, unary};

/// `float32` NA bit pattern.
pub const F32_NA_BITS: u32 = 0x7f80_07a2;
/// `float64` NA bit pattern.
pub const F64_NA_BITS: u64 = 0x7ff0_0000_0000_07a2;

/// Source of the NA child kernels used by option composition.
pub trait MissingValues: Send + Sync {
    /// Append a kernel that writes NA into one `value_tp` element.
    ///
    /// The kernel is invoked with an empty source list.
    fn instantiate_assign_na(
        &self,
        builder: &mut KernelBuilder,
        value_tp: &Type,
        request: KernelRequest,
    ) -> Result<()>;

    /// Append a kernel that reads one `value_tp` element and writes a byte:
    /// `1` if it is NA, `0` otherwise.
    fn instantiate_is_missing(
        &self,
        builder: &mut KernelBuilder,
        value_tp: &Type,
        request: KernelRequest,
    ) -> Result<()>;
}

/// Up to 16 bytes of NA bit pattern.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    bytes: [u8; 16],
    len: usize,
}

impl Pattern {
    fn new(parts: &[&[u8]]) -> Pattern {
        let mut bytes = [0u8; 16];
        let mut len = 0;
        for part in parts {
            bytes[len..len + part.len()].copy_from_slice(part);
            len += part.len();
        }
        Pattern { bytes, len }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pattern({:02x?})", self.as_bytes())
    }
}

/// How NA is written for one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Bytes(Pattern),
    String,
}

/// How NA is recognized for one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaCheck {
    Bytes(Pattern),
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
}

/// The sentinel NA marker of `tp`, if it has one.
pub fn marker_of(tp: &Type) -> Option<Marker> {
    let f32_na = F32_NA_BITS.to_ne_bytes();
    let f64_na = F64_NA_BITS.to_ne_bytes();
    let pattern = |parts: &[&[u8]]| Some(Marker::Bytes(Pattern::new(parts)));
    match tp.id() {
        TypeId::Bool => pattern(&[&[2u8][..]]),
        TypeId::Int8 => pattern(&[&i8::MIN.to_ne_bytes()[..]]),
        TypeId::Int16 => pattern(&[&i16::MIN.to_ne_bytes()[..]]),
        TypeId::Int32 => pattern(&[&i32::MIN.to_ne_bytes()[..]]),
        TypeId::Int64 => pattern(&[&i64::MIN.to_ne_bytes()[..]]),
        TypeId::UInt8 => pattern(&[&u8::MAX.to_ne_bytes()[..]]),
        TypeId::UInt16 => pattern(&[&u16::MAX.to_ne_bytes()[..]]),
        TypeId::UInt32 => pattern(&[&u32::MAX.to_ne_bytes()[..]]),
        TypeId::UInt64 => pattern(&[&u64::MAX.to_ne_bytes()[..]]),
        TypeId::Float32 => pattern(&[&f32_na[..]]),
        TypeId::Float64 => pattern(&[&f64_na[..]]),
        TypeId::Complex64 => pattern(&[&f32_na[..], &f32_na[..]]),
        TypeId::Complex128 => pattern(&[&f64_na[..], &f64_na[..]]),
        TypeId::Date => pattern(&[&na::DATE.to_ne_bytes()[..]]),
        TypeId::Time | TypeId::DateTime => pattern(&[&na::TICKS.to_ne_bytes()[..]]),
        TypeId::String => Some(Marker::String),
        _ => None,
    }
}

fn check_of(tp: &Type) -> Option<NaCheck> {
    match tp.id() {
        TypeId::Float32 => Some(NaCheck::Float32),
        TypeId::Float64 => Some(NaCheck::Float64),
        TypeId::Complex64 => Some(NaCheck::Complex64),
        TypeId::Complex128 => Some(NaCheck::Complex128),
        _ => match marker_of(tp)? {
            Marker::Bytes(pattern) => Some(NaCheck::Bytes(pattern)),
            Marker::String => Some(NaCheck::String),
        },
    }
}

/// Writes NA.
#[derive(Debug, Clone, Copy)]
pub struct AssignNa {
    pub marker: Marker,
}

impl Kernel for AssignNa {
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, _src: &[*const u8]) -> Result<()> {
        match self.marker {
            Marker::Bytes(pattern) => unsafe {
                std::ptr::copy_nonoverlapping(pattern.bytes.as_ptr(), dst, pattern.len);
            },
            Marker::String => unsafe { (*dst.cast::<StringData>()).set_na() },
        }
        Ok(())
    }
}

/// Tests for NA.
#[derive(Debug, Clone, Copy)]
pub struct IsMissing {
    pub check: NaCheck,
}

impl IsMissing {
    /// # Safety
    ///
    /// `src` must point at one element of the checked type.
    unsafe fn test(&self, src: *const u8) -> bool {
        unsafe {
            match self.check {
                NaCheck::Bytes(pattern) => {
                    slice::from_raw_parts(src, pattern.len) == pattern.as_bytes()
                }
                NaCheck::Float32 => src.cast::<f32>().read_unaligned().is_nan(),
                NaCheck::Float64 => src.cast::<f64>().read_unaligned().is_nan(),
                NaCheck::Complex64 => {
                    let parts = src.cast::<[f32; 2]>().read_unaligned();
                    parts[0].is_nan() || parts[1].is_nan()
                }
                NaCheck::Complex128 => {
                    let parts = src.cast::<[f64; 2]>().read_unaligned();
                    parts[0].is_nan() || parts[1].is_nan()
                }
                NaCheck::String => (*src.cast::<StringData>()).is_na(),
            }
        }
    }
}

impl Kernel for IsMissing {
    #[inline]
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        unsafe { *dst = self.test(src) as u8 };
        Ok(())
    }
}

/// The default provider: one reserved bit pattern per type.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentinelMissing;

fn no_na(value_tp: &Type) -> Error {
    debug!(tp = %value_tp, "no missing-value representation");
    Error::unsupported(
        format!("?{value_tp}"),
        value_tp,
        "type has no missing-value representation",
    )
}

impl MissingValues for SentinelMissing {
    fn instantiate_assign_na(
        &self,
        builder: &mut KernelBuilder,
        value_tp: &Type,
        request: KernelRequest,
    ) -> Result<()> {
        let marker = marker_of(value_tp).ok_or_else(|| no_na(value_tp))?;
        builder.append(AssignNa { marker }, request)?;
        Ok(())
    }

    fn instantiate_is_missing(
        &self,
        builder: &mut KernelBuilder,
        value_tp: &Type,
        request: KernelRequest,
    ) -> Result<()> {
        let check = check_of(value_tp).ok_or_else(|| no_na(value_tp))?;
        builder.append(IsMissing { check }, request)?;
        Ok(())
    }
}
