//! String conversion kernels.
//!
//! Text lives in two layouts: `string` elements are [`StringData`] handles,
//! `fixed_string[N]` elements are `N` null-padded bytes. [`Text`] reads and
//! writes either layout so each kernel is written once.
//!
//! Writing into a fixed string that is too short raises
//! [`Error::StringTooLarge`], except under `nocheck`, which truncates at the
//! last whole UTF-8 character that fits.

use std::marker::PhantomData;
use std::{ptr, slice};

use continuum_ndt::{ErrorMode, StringData, Type, TypeId, TypeKind};

use super::numeric::with_scalar;
use crate::builder::{KernelBuilder, Node};
use crate::engine::{AssignEngine, AssignRequest};
use crate::error::{Error, Result};
use crate::kernel::{Kernel, unary};
use crate::scalar::{Scalar, Value};
use crate::table::DispatchTable;

/// Storage layout of a text element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text {
    /// A [`StringData`] handle.
    Variable,
    /// Null-padded bytes of the given capacity.
    Fixed(usize),
}

impl Text {
    /// The layout of `tp`, if it is a string type.
    pub fn of(tp: &Type) -> Option<Text> {
        match tp.id() {
            TypeId::String => Some(Text::Variable),
            TypeId::FixedString => tp.fixed_string_size().map(Text::Fixed),
            _ => None,
        }
    }

    /// Bytes of the element at `ptr`. Fixed strings stop at the first null.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a valid element of this layout that outlives `'a`.
    pub unsafe fn read<'a>(self, ptr: *const u8) -> &'a [u8] {
        match self {
            Text::Variable => unsafe { (*ptr.cast::<StringData>()).as_bytes() },
            Text::Fixed(size) => {
                let bytes = unsafe { slice::from_raw_parts(ptr, size) };
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(size);
                &bytes[..end]
            }
        }
    }

    /// Store `bytes` into the element at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a valid element of this layout; a variable string
    /// destination must hold an initialized (possibly zeroed) [`StringData`].
    /// `bytes` must not borrow from the destination.
    pub unsafe fn write(self, ptr: *mut u8, bytes: &[u8], mode: ErrorMode) -> Result<()> {
        match self {
            Text::Variable => {
                unsafe { (*ptr.cast::<StringData>()).set(bytes) };
                Ok(())
            }
            Text::Fixed(size) => {
                let bytes = fit(bytes, size, mode)?;
                unsafe {
                    ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
                    ptr::write_bytes(ptr.add(bytes.len()), 0, size - bytes.len());
                }
                Ok(())
            }
        }
    }
}

/// The prefix of `bytes` stored into a fixed string of `size` bytes.
fn fit(bytes: &[u8], size: usize, mode: ErrorMode) -> Result<&[u8]> {
    if bytes.len() <= size {
        return Ok(bytes);
    }
    if mode.checks_overflow() {
        return Err(Error::StringTooLarge {
            size,
            len: bytes.len(),
        });
    }
    let mut end = size;
    while end > 0 && (bytes[end] & 0xC0) == 0x80 {
        end -= 1;
    }
    Ok(&bytes[..end])
}

// ============================================================================
// Parsing
// ============================================================================

/// Tokens that read as a missing value when assigning into an option.
pub const NA_TOKENS: [&str; 8] = ["", "NA", "N/A", "null", "NULL", "None", "none", "nan"];

/// Whether trimmed `text` is one of [`NA_TOKENS`].
pub fn is_na_token(text: &[u8]) -> bool {
    let text = text.trim_ascii();
    NA_TOKENS.iter().any(|token| token.as_bytes() == text)
}

fn parse_bool(text: &str) -> Option<bool> {
    const TRUE: [&str; 6] = ["true", "t", "yes", "y", "on", "1"];
    const FALSE: [&str; 6] = ["false", "f", "no", "n", "off", "0"];
    if TRUE.iter().any(|t| t.eq_ignore_ascii_case(text)) {
        Some(true)
    } else if FALSE.iter().any(|f| f.eq_ignore_ascii_case(text)) {
        Some(false)
    } else {
        None
    }
}

fn parse_integer(text: &str) -> Option<i128> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let magnitude = digits
        .parse::<u128>()
        .map_or(i128::MAX, |m| m.min(i128::MAX as u128) as i128);
    Some(if negative { -magnitude } else { magnitude })
}

/// Parse text as a `D`, checking the result under `mode`.
///
/// Leading and trailing whitespace is ignored. Decimal text into a real type
/// is checked for range only.
pub fn parse_scalar<D: Scalar>(bytes: &[u8], mode: ErrorMode) -> Result<D> {
    let reject = |reason: &str| Error::parse(D::ID.name(), bytes, reason);
    let text = std::str::from_utf8(bytes)
        .map_err(|_| reject("invalid UTF-8"))?
        .trim();
    let (value, mode) = match D::ID.kind() {
        TypeKind::Bool => (parse_bool(text).map(Value::Bool), mode),
        TypeKind::SInt | TypeKind::UInt => (parse_integer(text).map(Value::Int), mode),
        TypeKind::Real => {
            let mode = if mode.checks_overflow() {
                ErrorMode::Overflow
            } else {
                ErrorMode::NoCheck
            };
            (text.parse::<f64>().ok().map(Value::Real), mode)
        }
        _ => return Err(reject("no text form")),
    };
    let value = value.ok_or_else(|| reject("not a valid value"))?;
    D::from_value(value, mode).map_err(|loss| loss.into_error("string", text, D::ID.name()))
}

// ============================================================================
// Kernels
// ============================================================================

/// Copies text between any two string layouts.
#[derive(Debug, Clone, Copy)]
pub struct TextAssign {
    pub dst: Text,
    pub src: Text,
    pub mode: ErrorMode,
}

impl Kernel for TextAssign {
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        if self.dst == self.src && ptr::eq(dst.cast_const(), src) {
            return Ok(());
        }
        let bytes = unsafe { self.src.read(src) };
        unsafe { self.dst.write(dst, bytes, self.mode) }
    }
}

/// Parses text into a builtin scalar.
pub struct TextToScalar<D> {
    text: Text,
    mode: ErrorMode,
    _dst: PhantomData<fn() -> D>,
}

impl<D: Scalar> Kernel for TextToScalar<D> {
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        let bytes = unsafe { self.text.read(src) };
        let value: D = parse_scalar(bytes, self.mode)?;
        unsafe { value.store(dst) };
        Ok(())
    }
}

/// Formats a builtin scalar as text.
pub struct ScalarToText<S> {
    text: Text,
    mode: ErrorMode,
    _src: PhantomData<fn(S)>,
}

impl<S: Scalar> Kernel for ScalarToText<S> {
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        let value = unsafe { S::load(src) };
        unsafe { self.text.write(dst, value.to_text().as_bytes(), self.mode) }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

fn text_of(tp: &Type) -> Result<Text> {
    Text::of(tp).ok_or_else(|| Error::mismatch(tp, "string"))
}

fn text_to_text(
    _engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let kernel = TextAssign {
        dst: text_of(req.dst.tp)?,
        src: text_of(req.src.tp)?,
        mode: req.mode,
    };
    builder.append(kernel, req.request)?;
    Ok(())
}

fn append_parse<D: Scalar>(
    builder: &mut KernelBuilder,
    text: Text,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let kernel = TextToScalar::<D> {
        text,
        mode: req.mode,
        _dst: PhantomData,
    };
    builder.append(kernel, req.request)?;
    Ok(())
}

fn text_to_scalar(
    _engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let (dst, src) = (req.dst.tp, req.src.tp);
    let text = text_of(src)?;
    match dst.kind() {
        TypeKind::Bool | TypeKind::SInt | TypeKind::UInt | TypeKind::Real => {}
        _ => return Err(Error::mismatch(dst, src)),
    }
    with_scalar!(dst.id(), D => append_parse::<D>(builder, text, req), else unparsable(dst, src))
}

fn append_format<S: Scalar>(
    builder: &mut KernelBuilder,
    text: Text,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let kernel = ScalarToText::<S> {
        text,
        mode: req.mode,
        _src: PhantomData,
    };
    builder.append(kernel, req.request)?;
    Ok(())
}

fn scalar_to_text(
    _engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let (dst, src) = (req.dst.tp, req.src.tp);
    let text = text_of(dst)?;
    if matches!(src.id(), TypeId::Float16 | TypeId::Float128) {
        tracing::debug!(%dst, %src, "float16/float128 formatting requested");
        return Err(Error::unsupported(dst, src, "float16 and float128 values cannot be formatted"));
    }
    with_scalar!(
        src.id(),
        S => append_format::<S>(builder, text, req),
        else Err(Error::mismatch(dst, src))
    )
}

fn unparsable(dst: &Type, src: &Type) -> Result<()> {
    tracing::debug!(%dst, %src, "text parsing not available");
    Err(Error::unsupported(dst, src, "parsing this type from text is not implemented"))
}

fn text_to_unparsable(
    _engine: &AssignEngine,
    _builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    unparsable(req.dst.tp, req.src.tp)
}

fn complex_to_text(
    _engine: &AssignEngine,
    _builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let (dst, src) = (req.dst.tp, req.src.tp);
    tracing::debug!(%dst, %src, "complex formatting requested");
    Err(Error::unsupported(dst, src, "complex values cannot be formatted"))
}

const TEXT_IDS: [TypeId; 2] = [TypeId::String, TypeId::FixedString];

pub(crate) fn register(table: &mut DispatchTable) {
    let all = &ErrorMode::CONCRETE;

    for dst in TEXT_IDS {
        for src in TEXT_IDS {
            table.register_exact(dst, src, all, text_to_text);
        }
    }

    for src in TEXT_IDS {
        for dst in [TypeId::Bool, TypeId::Float32, TypeId::Float64] {
            table.register_exact(dst, src, all, text_to_scalar);
        }
        for dst in [
            TypeId::Float16,
            TypeId::Float128,
            TypeId::Complex64,
            TypeId::Complex128,
        ] {
            table.register_exact(dst, src, all, text_to_unparsable);
        }
    }

    for kind in [TypeKind::SInt, TypeKind::UInt] {
        table.register_kind(kind, TypeKind::String, all, text_to_scalar);
    }
    for kind in [TypeKind::Bool, TypeKind::SInt, TypeKind::UInt, TypeKind::Real] {
        table.register_kind(TypeKind::String, kind, all, scalar_to_text);
    }
    table.register_kind(TypeKind::String, TypeKind::Complex, all, complex_to_text);
}
