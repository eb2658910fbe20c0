//! Option composition kernels.
//!
//! An option `?T` stores a `T` and reserves one of its values as NA. Option
//! kernels are composites over three kinds of children:
//!
//! - `is_missing(src)` and `assign_na(dst)` from the engine's
//!   [`MissingValues`](super::missing::MissingValues) provider
//! - the value assignment between the payload types, built by recursive
//!   dispatch
//!
//! # Dispatch
//!
//! | dst | src | kernel |
//! |---|---|---|
//! | `?T` | `?S` | [`OptionAssign`] |
//! | `T` | `?S` | [`OptionToValue`] (NA raises [`Error::MissingValue`]) |
//! | `?T` | real | re-typed as `?real`, so NaN becomes NA |
//! | `?bool`, `?int*`, `?uint*`, `?float32`, `?float64` | text | [`TextToOptionScalar`] |
//! | `?string` | text | plain text copy |
//! | `?T` | text | [`TextToOption`] |
//! | `?T` | `S` | value assignment into the payload |

use std::marker::PhantomData;

use continuum_ndt::{Arrmeta, ErrorMode, Type, TypeId, TypeKind};

use super::numeric::with_scalar;
use super::string::{Text, is_na_token, parse_scalar};
use crate::builder::{KernelBuilder, KernelRequest, Node};
use crate::config::ChunkConfig;
use crate::engine::{AssignEngine, AssignRequest, Operand};
use crate::error::{Error, Result};
use crate::kernel::{Kernel, element, element_const, unary};
use crate::scalar::Scalar;

/// Run `body` over `count` strided elements in chunks, with the NA flags of
/// each chunk computed by `is_missing` into stack scratch.
///
/// `body(start, len, missing)` receives maximal runs of equal flags.
///
/// # Safety
///
/// Every addressed source element must be valid for `is_missing`.
unsafe fn for_each_run(
    is_missing: Node<'_>,
    chunk: usize,
    src: *const u8,
    src_stride: isize,
    count: usize,
    mut body: impl FnMut(usize, usize, bool) -> Result<()>,
) -> Result<()> {
    let mut flags = [0u8; ChunkConfig::LIMIT];
    let chunk = chunk.clamp(1, ChunkConfig::LIMIT);
    let mut done = 0;
    while done < count {
        let len = (count - done).min(chunk);
        let chunk_src = element_const(src, src_stride, done);
        unsafe { is_missing.strided(flags.as_mut_ptr(), 1, &[chunk_src], &[src_stride], len)? };
        let mut i = 0;
        while i < len {
            let missing = flags[i] != 0;
            let run = flags[i..len].iter().take_while(|f| (**f != 0) == missing).count();
            body(done + i, run, missing)?;
            i += run;
        }
        done += len;
    }
    Ok(())
}

// ============================================================================
// Option to Option
// ============================================================================

/// `?T <- ?S`.
///
/// Child 0 is `is_missing(S)`; the NA writer and the value assignment sit at
/// the stored offsets relative to this record.
#[derive(Debug, Clone, Copy)]
pub struct OptionAssign {
    pub na_offset: usize,
    pub value_offset: usize,
    pub chunk: usize,
}

impl Kernel for OptionAssign {
    unsafe fn single(&self, node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src_ptr = unary(src)?;
        let mut missing = 0u8;
        unsafe { node.first_child()?.single(&mut missing, &[src_ptr])? };
        if missing != 0 {
            unsafe { node.child(self.na_offset)?.single(dst, &[]) }
        } else {
            unsafe { node.child(self.value_offset)?.single(dst, src) }
        }
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
        let assign_na = node.child(self.na_offset)?;
        let value = node.child(self.value_offset)?;
        unsafe {
            let is_missing = node.first_child()?;
            for_each_run(is_missing, self.chunk, src, src_stride, count, |start, run, missing| {
                let dst = element(dst, dst_stride, start);
                if missing {
                    assign_na.strided(dst, dst_stride, &[], &[], run)
                } else {
                    let src = element_const(src, src_stride, start);
                    value.strided(dst, dst_stride, &[src], &[src_stride], run)
                }
            })
        }
    }
}

// ============================================================================
// Option to Value
// ============================================================================

/// `T <- ?S`. Child 0 is `is_missing(S)`, the value assignment sits at the
/// stored offset.
#[derive(Debug, Clone)]
pub struct OptionToValue {
    pub value_offset: usize,
    pub chunk: usize,
    pub dst_tp: String,
}

impl OptionToValue {
    fn missing(&self) -> Error {
        Error::MissingValue {
            dst_tp: self.dst_tp.clone(),
        }
    }
}

impl Kernel for OptionToValue {
    unsafe fn single(&self, node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src_ptr = unary(src)?;
        let mut missing = 0u8;
        unsafe { node.first_child()?.single(&mut missing, &[src_ptr])? };
        if missing != 0 {
            return Err(self.missing());
        }
        unsafe { node.child(self.value_offset)?.single(dst, src) }
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
        let value = node.child(self.value_offset)?;
        unsafe {
            let is_missing = node.first_child()?;
            for_each_run(is_missing, self.chunk, src, src_stride, count, |start, run, missing| {
                if missing {
                    return Err(self.missing());
                }
                let dst = element(dst, dst_stride, start);
                let src = element_const(src, src_stride, start);
                value.strided(dst, dst_stride, &[src], &[src_stride], run)
            })
        }
    }
}

// ============================================================================
// Text to Option
// ============================================================================

/// `?D <- text` for builtin scalars: NA tokens write NA through child 0,
/// everything else is parsed under the stored mode.
pub struct TextToOptionScalar<D> {
    text: Text,
    mode: ErrorMode,
    _dst: PhantomData<fn() -> D>,
}

impl<D: Scalar> Kernel for TextToOptionScalar<D> {
    unsafe fn single(&self, node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        let bytes = unsafe { self.text.read(src) };
        if is_na_token(bytes) {
            return unsafe { node.first_child()?.single(dst, &[]) };
        }
        let value: D = parse_scalar(bytes, self.mode)?;
        unsafe { value.store(dst) };
        Ok(())
    }
}

/// `?T <- text` for any other payload.
///
/// Child 0 assigns the text to the payload; the NA writer sits at the stored
/// offset. The text is inspected first to pick between them.
#[derive(Debug, Clone, Copy)]
pub struct TextToOption {
    pub text: Text,
    pub na_offset: usize,
}

impl Kernel for TextToOption {
    unsafe fn single(&self, node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src_ptr = unary(src)?;
        let bytes = unsafe { self.text.read(src_ptr) };
        if is_na_token(bytes) {
            unsafe { node.child(self.na_offset)?.single(dst, &[]) }
        } else {
            unsafe { node.first_child()?.single(dst, src) }
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

fn payload<'a>(op: Operand<'a>) -> Result<Operand<'a>> {
    let tp = op.tp.option_value().ok_or_else(|| Error::mismatch(op.tp, "option"))?;
    Ok(Operand::new(tp, op.arrmeta.option_value()))
}

fn chunk_of(engine: &AssignEngine) -> usize {
    engine.context().chunk.effective_size()
}

fn option_to_option(
    engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let (dst, src) = (payload(req.dst)?, payload(req.src)?);
    let kernel = OptionAssign {
        na_offset: 0,
        value_offset: 0,
        chunk: chunk_of(engine),
    };
    let root = builder.append(kernel, req.request)?;
    engine.missing().instantiate_is_missing(builder, src.tp, req.request)?;
    let na = builder.next_offset();
    engine.missing().instantiate_assign_na(builder, dst.tp, req.request)?;
    let value = engine.instantiate_child(builder, dst, src, req.mode, req.request)?;

    let kernel = builder.get_at::<OptionAssign>(root)?;
    kernel.na_offset = na - root;
    kernel.value_offset = value - root;
    Ok(())
}

fn option_to_value(
    engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let src = payload(req.src)?;
    let kernel = OptionToValue {
        value_offset: 0,
        chunk: chunk_of(engine),
        dst_tp: req.dst.tp.to_string(),
    };
    let root = builder.append(kernel, req.request)?;
    engine.missing().instantiate_is_missing(builder, src.tp, req.request)?;
    let value = engine.instantiate_child(builder, req.dst, src, req.mode, req.request)?;
    builder.get_at::<OptionToValue>(root)?.value_offset = value - root;
    Ok(())
}

fn append_text_scalar<D: Scalar>(
    engine: &AssignEngine,
    builder: &mut KernelBuilder,
    text: Text,
    dst: &Type,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let kernel = TextToOptionScalar::<D> {
        text,
        mode: req.mode,
        _dst: PhantomData,
    };
    builder.append(kernel, req.request)?;
    // Reached through per-element calls only.
    engine.missing().instantiate_assign_na(builder, dst, KernelRequest::Single)
}

fn text_to_option(
    engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
    text: Text,
) -> Result<()> {
    let dst = payload(req.dst)?;
    let id = dst.tp.id();

    if id == TypeId::String {
        return engine.instantiate(builder, dst, req.src, req.mode, req.request).map(drop);
    }

    if matches!(id.kind(), TypeKind::Bool | TypeKind::SInt | TypeKind::UInt)
        || matches!(id, TypeId::Float32 | TypeId::Float64)
    {
        return with_scalar!(id, D => append_text_scalar::<D>(engine, builder, text, dst.tp, req),
            else Err(Error::mismatch(req.dst.tp, req.src.tp)));
    }

    let root = builder.append(TextToOption { text, na_offset: 0 }, req.request)?;
    engine.instantiate(builder, dst, req.src, req.mode, KernelRequest::Single)?;
    let na = builder.next_offset();
    engine.missing().instantiate_assign_na(builder, dst.tp, KernelRequest::Single)?;
    builder.get_at::<TextToOption>(root)?.na_offset = na - root;
    Ok(())
}

fn value_to_option(
    engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let src = req.src;

    if src.tp.kind() == TypeKind::Real {
        let retyped = Type::option(src.tp.clone());
        let meta = Arrmeta::Option(Box::new(src.arrmeta.clone()));
        return option_to_option(
            engine,
            builder,
            &AssignRequest {
                src: Operand::new(&retyped, &meta),
                ..*req
            },
        );
    }

    if let Some(text) = Text::of(src.tp) {
        return text_to_option(engine, builder, req, text);
    }

    let dst = payload(req.dst)?;
    engine.instantiate(builder, dst, src, req.mode, req.request).map(drop)
}

/// Build the option kernel for a pair with an option on either side.
pub fn build(
    engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    match (req.dst.tp.is_option(), req.src.tp.is_option()) {
        (true, true) => option_to_option(engine, builder, req),
        (false, true) => option_to_value(engine, builder, req),
        (true, false) => value_to_option(engine, builder, req),
        (false, false) => Err(Error::mismatch(req.dst.tp, req.src.tp)),
    }
}
