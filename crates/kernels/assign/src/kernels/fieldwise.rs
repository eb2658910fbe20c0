//! Field-wise kernels for tuples and structs.
//!
//! One child kernel per destination member, each invoked with the member's
//! byte displacement on both sides:
//!
//! - struct ← struct pairs members by name
//! - any other container pairing pairs members by position
//! - a scalar, string or date/time source is broadcast to every member
//!
//! Member counts must agree. Construction errors from a member are reported
//! as [`Error::Field`] naming it.

use continuum_ndt::{Type, TypeId, TypeKind};

use crate::builder::{KernelBuilder, Node};
use crate::engine::{AssignEngine, AssignRequest, Operand};
use crate::error::{Error, Result};
use crate::kernel::{Kernel, unary};

/// One member of a field-wise assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldStep {
    /// Byte offset of the member in the destination element.
    pub dst_offset: usize,
    /// Byte offset of the member in the source element; 0 when broadcasting.
    pub src_offset: usize,
    /// Child kernel offset relative to the field-wise record.
    pub child: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FieldwiseAssign {
    pub steps: Vec<FieldStep>,
}

impl Kernel for FieldwiseAssign {
    unsafe fn single(&self, node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let src = unary(src)?;
        for step in &self.steps {
            let child = node.child(step.child)?;
            let (dst, src) = (dst.wrapping_add(step.dst_offset), src.wrapping_add(step.src_offset));
            unsafe { child.single(dst, &[src])? };
        }
        Ok(())
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
        let src = unary(src)?;
        for step in &self.steps {
            let child = node.child(step.child)?;
            unsafe {
                child.strided(
                    dst.wrapping_add(step.dst_offset),
                    dst_stride,
                    &[src.wrapping_add(step.src_offset)],
                    src_stride,
                    count,
                )?
            };
        }
        Ok(())
    }
}

/// Where a destination member reads from.
enum Source {
    Member(usize),
    Broadcast,
}

fn offsets<'a>(op: &Operand<'a>) -> &'a [usize] {
    op.arrmeta
        .field_offsets()
        .or_else(|| op.tp.default_offsets())
        .unwrap_or(&[])
}

fn broadcastable(tp: &Type) -> bool {
    tp.is_builtin() || matches!(tp.kind(), TypeKind::String | TypeKind::DateTime)
}

fn pairing(dst: &Type, src: &Type) -> Result<Vec<Source>> {
    let dst_fields = dst.fields().ok_or_else(|| Error::mismatch(dst, src))?;
    let Some(src_fields) = src.fields() else {
        if broadcastable(src) {
            return Ok(dst_fields.iter().map(|_| Source::Broadcast).collect());
        }
        return Err(Error::mismatch(dst, src));
    };
    if dst_fields.len() != src_fields.len() {
        return Err(Error::mismatch(dst, src));
    }
    if dst.id() == TypeId::Struct && src.id() == TypeId::Struct {
        dst_fields
            .iter()
            .map(|field| {
                src.field_index(&field.name)
                    .map(Source::Member)
                    .ok_or_else(|| Error::mismatch(dst, src))
            })
            .collect()
    } else {
        Ok((0..dst_fields.len()).map(Source::Member).collect())
    }
}

/// Build the field-wise kernel for a pair with a container on either side.
pub fn build(
    engine: &AssignEngine,
    builder: &mut KernelBuilder,
    req: &AssignRequest<'_>,
) -> Result<()> {
    let (dst, src) = (req.dst.tp, req.src.tp);
    let sources = pairing(dst, src)?;
    let dst_fields = dst.fields().unwrap_or(&[]);
    let src_fields = src.fields().unwrap_or(&[]);
    let (dst_offsets, src_offsets) = (offsets(&req.dst), offsets(&req.src));

    let root = builder.append(FieldwiseAssign::default(), req.request)?;
    let mut steps = Vec::with_capacity(dst_fields.len());
    for (i, (field, source)) in dst_fields.iter().zip(sources).enumerate() {
        let dst_op = Operand::new(&field.tp, req.dst.arrmeta.field(i));
        let (src_op, src_offset) = match source {
            Source::Member(j) => (
                Operand::new(&src_fields[j].tp, req.src.arrmeta.field(j)),
                src_offsets.get(j).copied().ok_or_else(|| Error::mismatch(dst, src))?,
            ),
            Source::Broadcast => (req.src, 0),
        };
        let dst_offset = dst_offsets.get(i).copied().ok_or_else(|| Error::mismatch(dst, src))?;
        let child = engine
            .instantiate_child(builder, dst_op, src_op, req.mode, req.request)
            .map_err(|err| err.in_field(field.name.as_str()))?;
        steps.push(FieldStep {
            dst_offset,
            src_offset,
            child: child - root,
        });
    }
    builder.get_at::<FieldwiseAssign>(root)?.steps = steps;
    Ok(())
}
