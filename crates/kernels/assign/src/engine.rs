//! Assignment kernel selection.
//!
//! [`AssignEngine::instantiate`] appends the kernel tree converting one
//! source operand into one destination operand. Selection runs in a fixed
//! order and stops at the first rule that applies:
//!
//! 1. identical POD types with identical arrmeta: bytewise copy
//! 2. exact `(dst id, src id, mode)` table entry
//! 3. `(dst kind, src kind, mode)` table entry
//! 4. tuple or struct on either side: field-wise kernel
//! 5. option on either side: option composition
//! 6. expression on either side: direct or buffered evaluation
//! 7. otherwise [`Error::TypeMismatch`]
//!
//! Table entries may alias to another mode; the handler receives the mode
//! the alias chain ended at. Composite handlers recurse into
//! [`AssignEngine::instantiate`] for their children.
//!
//! # Example
//!
//! ```
//! use continuum_assign::{AssignEngine, EvalContext, KernelRequest};
//! use continuum_ndt::{ErrorMode, Type};
//!
//! let engine = AssignEngine::new(EvalContext::default());
//! let kernel = engine
//!     .build(&Type::int8(), &Type::float64(), ErrorMode::Overflow, KernelRequest::Single)
//!     .unwrap();
//! let mut out = 0i8;
//! kernel.assign(&mut out, &42.0f64).unwrap();
//! assert_eq!(out, 42);
//! ```

use std::sync::Arc;

use tracing::{debug, instrument, trace};

use continuum_ndt::{Arrmeta, ErrorMode, Type};

use crate::builder::{KernelBuilder, KernelRequest};
use crate::config::EvalContext;
use crate::error::{Error, Result};
use crate::kernels::missing::{MissingValues, SentinelMissing};
use crate::kernels::{buffered, copy, fieldwise, option};
use crate::scalar::Scalar;
use crate::table::DispatchTable;

/// A type together with its layout metadata.
#[derive(Debug, Clone, Copy)]
pub struct Operand<'a> {
    pub tp: &'a Type,
    pub arrmeta: &'a Arrmeta,
}

impl<'a> Operand<'a> {
    pub fn new(tp: &'a Type, arrmeta: &'a Arrmeta) -> Self {
        Self { tp, arrmeta }
    }
}

/// Everything a dispatch handler needs to build one kernel.
#[derive(Debug, Clone, Copy)]
pub struct AssignRequest<'a> {
    pub dst: Operand<'a>,
    pub src: Operand<'a>,
    /// Concrete error mode (never [`ErrorMode::Default`]).
    pub mode: ErrorMode,
    pub request: KernelRequest,
}

/// Builds assignment kernels into a [`KernelBuilder`].
pub struct AssignEngine {
    ctx: EvalContext,
    table: DispatchTable,
    missing: Arc<dyn MissingValues>,
}

impl AssignEngine {
    /// Engine with the default dispatch table and sentinel NA values.
    pub fn new(ctx: EvalContext) -> Self {
        Self {
            ctx,
            table: DispatchTable::with_defaults(),
            missing: Arc::new(SentinelMissing),
        }
    }

    /// Replace the missing-value provider.
    pub fn with_missing(mut self, missing: Arc<dyn MissingValues>) -> Self {
        self.missing = missing;
        self
    }

    pub fn context(&self) -> &EvalContext {
        &self.ctx
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Mutable table access for registering extra conversions.
    pub fn table_mut(&mut self) -> &mut DispatchTable {
        &mut self.table
    }

    /// The missing-value provider used by option kernels.
    pub fn missing(&self) -> &dyn MissingValues {
        self.missing.as_ref()
    }

    /// Append the kernel converting `src` into `dst`.
    ///
    /// The root record starts at `builder.next_offset()`. Returns the
    /// builder length after the whole subtree has been appended.
    #[instrument(level = "trace", skip_all, fields(dst = %dst.tp, src = %src.tp, mode = %mode))]
    pub fn instantiate(
        &self,
        builder: &mut KernelBuilder,
        dst: Operand<'_>,
        src: Operand<'_>,
        mode: ErrorMode,
        request: KernelRequest,
    ) -> Result<usize> {
        let req = AssignRequest {
            dst,
            src,
            mode: mode.resolve(self.ctx.errmode),
            request,
        };
        self.dispatch(builder, &req)?;
        Ok(builder.len())
    }

    /// Append a child kernel and return the offset of its root record.
    pub fn instantiate_child(
        &self,
        builder: &mut KernelBuilder,
        dst: Operand<'_>,
        src: Operand<'_>,
        mode: ErrorMode,
        request: KernelRequest,
    ) -> Result<usize> {
        let offset = builder.next_offset();
        self.instantiate(builder, dst, src, mode, request)?;
        Ok(offset)
    }

    fn dispatch(&self, builder: &mut KernelBuilder, req: &AssignRequest<'_>) -> Result<()> {
        let (dst, src) = (req.dst.tp, req.src.tp);

        if dst == src && req.dst.arrmeta == req.src.arrmeta && dst.is_pod() {
            trace!(step = "copy", size = dst.data_size());
            return copy::append_copy(builder, dst.data_size(), req.request);
        }

        if let Some(resolved) = self.table.lookup_exact(dst.id(), src.id(), req.mode)? {
            trace!(step = "exact", resolved = %resolved.mode);
            let req = AssignRequest {
                mode: resolved.mode,
                ..*req
            };
            return (resolved.handler)(self, builder, &req);
        }

        if let Some(resolved) = self.table.lookup_kind(dst.kind(), src.kind(), req.mode)? {
            trace!(step = "kind", resolved = %resolved.mode);
            let req = AssignRequest {
                mode: resolved.mode,
                ..*req
            };
            return (resolved.handler)(self, builder, &req);
        }

        let plain = |tp: &Type| !tp.is_option() && !tp.is_expression();
        if (dst.is_container() || src.is_container()) && plain(dst) && plain(src) {
            trace!(step = "fieldwise");
            return fieldwise::build(self, builder, req);
        }

        if dst.is_option() || src.is_option() {
            trace!(step = "option");
            return option::build(self, builder, req);
        }

        if dst.is_expression() || src.is_expression() {
            trace!(step = "expression");
            return buffered::build(self, builder, req);
        }

        debug!(%dst, %src, mode = %req.mode, "no assignment rule");
        Err(Error::mismatch(dst, src))
    }

    /// Build a standalone kernel for `dst <- src` with default layouts.
    pub fn build(
        &self,
        dst: &Type,
        src: &Type,
        mode: ErrorMode,
        request: KernelRequest,
    ) -> Result<AssignKernel> {
        let dst_meta = Arrmeta::default_for(dst);
        let src_meta = Arrmeta::default_for(src);
        self.build_with(
            Operand::new(dst, &dst_meta),
            Operand::new(src, &src_meta),
            mode,
            request,
        )
    }

    /// Build a standalone kernel for operands with explicit arrmeta.
    pub fn build_with(
        &self,
        dst: Operand<'_>,
        src: Operand<'_>,
        mode: ErrorMode,
        request: KernelRequest,
    ) -> Result<AssignKernel> {
        let mut builder = KernelBuilder::new();
        self.instantiate(&mut builder, dst, src, mode, request)?;
        debug!(
            dst = %dst.tp,
            src = %src.tp,
            records = builder.record_count(),
            bytes = builder.len(),
            "assignment kernel built"
        );
        Ok(AssignKernel {
            builder,
            dst: dst.tp.clone(),
            src: src.tp.clone(),
            request,
        })
    }
}

impl Default for AssignEngine {
    fn default() -> Self {
        Self::new(EvalContext::default())
    }
}

impl std::fmt::Debug for AssignEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignEngine")
            .field("ctx", &self.ctx)
            .field("entries", &self.table.len())
            .finish()
    }
}

// ============================================================================
// Owned Kernel
// ============================================================================

/// A finished kernel tree with its root at offset 0.
#[derive(Debug)]
pub struct AssignKernel {
    builder: KernelBuilder,
    dst: Type,
    src: Type,
    request: KernelRequest,
}

impl AssignKernel {
    pub fn dst_type(&self) -> &Type {
        &self.dst
    }

    pub fn src_type(&self) -> &Type {
        &self.src
    }

    pub fn request(&self) -> KernelRequest {
        self.request
    }

    /// The arena holding the kernel tree.
    pub fn builder(&self) -> &KernelBuilder {
        &self.builder
    }

    /// Convert one element.
    ///
    /// # Safety
    ///
    /// `dst` and `src` must point at one valid element of the destination
    /// and source types.
    pub unsafe fn single(&self, dst: *mut u8, src: *const u8) -> Result<()> {
        unsafe { self.builder.single(0, dst, &[src]) }
    }

    /// Convert `count` strided elements.
    ///
    /// # Safety
    ///
    /// Every addressed element must be valid for the destination and source
    /// types.
    pub unsafe fn strided(
        &self,
        dst: *mut u8,
        dst_stride: isize,
        src: *const u8,
        src_stride: isize,
        count: usize,
    ) -> Result<()> {
        unsafe {
            self.builder
                .strided(0, dst, dst_stride, &[src], &[src_stride], count)
        }
    }

    /// Run on `count` contiguous elements with whichever convention the
    /// kernel was built for.
    unsafe fn run(
        &self,
        dst: *mut u8,
        dst_size: usize,
        src: *const u8,
        src_size: usize,
        count: usize,
    ) -> Result<()> {
        match self.request {
            KernelRequest::Strided => unsafe {
                self.strided(dst, dst_size as isize, src, src_size as isize, count)
            },
            KernelRequest::Single => {
                for i in 0..count {
                    unsafe { self.single(dst.add(i * dst_size), src.add(i * src_size))? };
                }
                Ok(())
            }
        }
    }

    fn check_scalars<D: Scalar, S: Scalar>(&self) -> Result<()> {
        if self.dst.id() != D::ID
            || !self.dst.is_builtin()
            || self.src.id() != S::ID
            || !self.src.is_builtin()
        {
            return Err(Error::OperandMismatch {
                expected: format!("{} <- {}", self.dst, self.src),
                got: format!("{} <- {}", D::ID, S::ID),
            });
        }
        Ok(())
    }

    /// Convert one typed scalar.
    pub fn assign<D: Scalar, S: Scalar>(&self, dst: &mut D, src: &S) -> Result<()> {
        self.check_scalars::<D, S>()?;
        // SAFETY: both types were checked to be the builtins the kernel was
        // built for.
        unsafe {
            self.run(
                (dst as *mut D).cast::<u8>(),
                size_of::<D>(),
                (src as *const S).cast::<u8>(),
                size_of::<S>(),
                1,
            )
        }
    }

    /// Convert a slice of typed scalars element by element.
    pub fn assign_slice<D: Scalar, S: Scalar>(&self, dst: &mut [D], src: &[S]) -> Result<()> {
        self.check_scalars::<D, S>()?;
        if dst.len() != src.len() {
            return Err(Error::LengthMismatch {
                dst: dst.len(),
                src: src.len(),
            });
        }
        // SAFETY: checked types, equal lengths, contiguous slices.
        unsafe {
            self.run(
                dst.as_mut_ptr().cast::<u8>(),
                size_of::<D>(),
                src.as_ptr().cast::<u8>(),
                size_of::<S>(),
                src.len(),
            )
        }
    }

    /// Convert packed elements of POD types held in byte buffers.
    ///
    /// Returns the number of elements converted. Buffers need no particular
    /// alignment.
    pub fn assign_bytes(&self, dst: &mut [u8], src: &[u8]) -> Result<usize> {
        let (dst_size, src_size) = (self.dst.data_size(), self.src.data_size());
        if !self.dst.is_pod() || !self.src.is_pod() || dst_size == 0 || src_size == 0 {
            return Err(Error::OperandMismatch {
                expected: format!("{} <- {}", self.dst, self.src),
                got: "raw bytes".into(),
            });
        }
        if dst.len() % dst_size != 0
            || src.len() % src_size != 0
            || dst.len() / dst_size != src.len() / src_size
        {
            return Err(Error::LengthMismatch {
                dst: dst.len() / dst_size,
                src: src.len() / src_size,
            });
        }
        let count = src.len() / src_size;
        // SAFETY: POD types accept any bytes; lengths checked above.
        unsafe { self.run(dst.as_mut_ptr(), dst_size, src.as_ptr(), src_size, count)? };
        Ok(count)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use continuum_ndt::{StringData, TypeId};

    use super::*;

    #[test]
    fn test_identical_types_copy() {
        let engine = AssignEngine::default();
        let kernel = engine
            .build(&Type::int32(), &Type::int32(), ErrorMode::Inexact, KernelRequest::Single)
            .unwrap();
        assert_eq!(kernel.builder().record_count(), 1);
        let mut out = 0i32;
        kernel.assign(&mut out, &-17i32).unwrap();
        assert_eq!(out, -17);
    }

    #[test]
    fn test_default_mode_resolves_to_context() {
        let ctx = EvalContext {
            errmode: ErrorMode::NoCheck,
            ..EvalContext::default()
        };
        let engine = AssignEngine::new(ctx);
        let kernel = engine
            .build(&Type::int8(), &Type::int64(), ErrorMode::Default, KernelRequest::Single)
            .unwrap();
        let mut out = 0i8;
        kernel.assign(&mut out, &300i64).unwrap();
        assert_eq!(out, 44);

        let strict = AssignEngine::default();
        let kernel = strict
            .build(&Type::int8(), &Type::int64(), ErrorMode::Default, KernelRequest::Single)
            .unwrap();
        assert!(matches!(
            kernel.assign(&mut out, &300i64),
            Err(Error::Overflow { .. })
        ));
    }

    #[test]
    fn test_strided_slice_stops_at_first_error() {
        let engine = AssignEngine::default();
        let kernel = engine
            .build(&Type::uint8(), &Type::int32(), ErrorMode::Overflow, KernelRequest::Strided)
            .unwrap();
        let src = [1i32, 2, 300, 4];
        let mut dst = [0u8; 4];
        assert!(kernel.assign_slice(&mut dst, &src).is_err());
        assert_eq!(dst, [1, 2, 0, 0]);
    }

    #[test]
    fn test_type_mismatch() {
        let engine = AssignEngine::default();
        let err = engine
            .build(
                &Type::fixed_bytes(4, 4).unwrap(),
                &Type::int32(),
                ErrorMode::NoCheck,
                KernelRequest::Single,
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot assign from int32 to bytes[4, align=4]");
    }

    #[test]
    fn test_typed_call_checks_operands() {
        let engine = AssignEngine::default();
        let kernel = engine
            .build(&Type::int16(), &Type::float32(), ErrorMode::NoCheck, KernelRequest::Single)
            .unwrap();
        let mut out = 0i32;
        assert!(matches!(
            kernel.assign(&mut out, &1.0f32),
            Err(Error::OperandMismatch { .. })
        ));
        let mut short = [0i16; 2];
        assert!(matches!(
            kernel.assign_slice(&mut short, &[1.0f32]),
            Err(Error::LengthMismatch { dst: 2, src: 1 })
        ));
    }

    #[test]
    fn test_assign_bytes_packed() {
        let engine = AssignEngine::default();
        let kernel = engine
            .build(&Type::int64(), &Type::int16(), ErrorMode::Overflow, KernelRequest::Strided)
            .unwrap();
        let src: Vec<u8> = [-2i16, 7].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let mut dst = vec![0u8; 16];
        assert_eq!(kernel.assign_bytes(&mut dst, &src).unwrap(), 2);
        assert_eq!(i64::from_ne_bytes(dst[..8].try_into().unwrap()), -2);
        assert_eq!(i64::from_ne_bytes(dst[8..].try_into().unwrap()), 7);

        let strings = engine
            .build(&Type::string(), &Type::string(), ErrorMode::NoCheck, KernelRequest::Single)
            .unwrap();
        let mut raw = [0u8; 16];
        assert!(strings.assign_bytes(&mut raw, &[0u8; 16]).is_err());
        assert_eq!(size_of::<StringData>(), 16);
        assert_eq!(strings.dst_type().id(), TypeId::String);
    }
}
