//! Kernel arena relocation.
//!
//! Random mixes of kernel records are appended until the arena spills to the
//! heap and grows several times. Every record must still produce the same
//! checksum afterwards, composite records must still reach their children by
//! relative offset, and every record must be destroyed exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;

use continuum_assign::{Kernel, KernelBuilder, KernelRequest, Node, Result};

/// Eight bytes of state.
#[repr(C)]
struct Small {
    seed: u64,
}

/// State wider than the inline area's remaining space.
#[repr(C)]
struct Wide {
    words: [u64; 12],
}

/// State owning a heap allocation.
struct Owning {
    data: Vec<u64>,
    drops: Arc<AtomicUsize>,
}

impl Drop for Owning {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sums its children.
struct Sum {
    children: Vec<usize>,
}

/// # Safety
///
/// `dst` must be valid for an 8-byte write.
unsafe fn write(dst: *mut u8, value: u64) {
    unsafe { dst.cast::<u64>().write_unaligned(value) };
}

impl Kernel for Small {
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, _src: &[*const u8]) -> Result<()> {
        unsafe { write(dst, self.seed) };
        Ok(())
    }
}

impl Kernel for Wide {
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, _src: &[*const u8]) -> Result<()> {
        unsafe { write(dst, self.words.iter().fold(0u64, |acc, w| acc.wrapping_add(*w))) };
        Ok(())
    }
}

impl Kernel for Owning {
    unsafe fn single(&self, _node: Node<'_>, dst: *mut u8, _src: &[*const u8]) -> Result<()> {
        unsafe { write(dst, self.data.iter().fold(0u64, |acc, w| acc.wrapping_add(*w))) };
        Ok(())
    }
}

impl Kernel for Sum {
    unsafe fn single(&self, node: Node<'_>, dst: *mut u8, _src: &[*const u8]) -> Result<()> {
        let mut total = 0u64;
        for relative in &self.children {
            let mut part = 0u64;
            unsafe { node.child(*relative)?.single((&mut part as *mut u64).cast(), &[])? };
            total = total.wrapping_add(part);
        }
        unsafe { write(dst, total) };
        Ok(())
    }
}

fn words(seed: u64) -> [u64; 12] {
    std::array::from_fn(|i| seed.wrapping_mul(i as u64 + 1))
}

fn checksum(kind: u8, seed: u64) -> u64 {
    match kind {
        0 => seed,
        1 => words(seed).iter().fold(0u64, |acc, w| acc.wrapping_add(*w)),
        _ => (0..(seed % 16)).fold(0u64, |acc, i| acc.wrapping_add(seed ^ i)),
    }
}

fn append(builder: &mut KernelBuilder, kind: u8, seed: u64, drops: &Arc<AtomicUsize>) -> usize {
    let request = KernelRequest::Single;
    match kind {
        0 => builder.append(Small { seed }, request),
        1 => builder.append(Wide { words: words(seed) }, request),
        _ => builder.append(
            Owning {
                data: (0..(seed % 16)).map(|i| seed ^ i).collect(),
                drops: drops.clone(),
            },
            request,
        ),
    }
    .unwrap()
}

fn invoke(builder: &KernelBuilder, offset: usize) -> u64 {
    let mut out = 0u64;
    unsafe { builder.single(offset, (&mut out as *mut u64).cast(), &[]).unwrap() };
    out
}

/// The state bytes of the record at `offset`, read in place.
fn state_bytes<K: Kernel>(builder: &KernelBuilder, offset: usize) -> Vec<u8> {
    let state = builder.get::<K>(offset).unwrap();
    let bytes = unsafe {
        std::slice::from_raw_parts((state as *const K).cast::<u8>(), size_of::<K>())
    };
    bytes.to_vec()
}

fn snapshot(builder: &KernelBuilder, records: &[(u8, usize)]) -> Vec<Vec<u8>> {
    records
        .iter()
        .map(|(kind, offset)| match kind {
            0 => state_bytes::<Small>(builder, *offset),
            _ => state_bytes::<Wide>(builder, *offset),
        })
        .collect()
}

proptest! {
    /// Checksums recorded right after each append survive every later growth.
    #[test]
    fn test_records_survive_growth(specs in prop::collection::vec((0u8..3, any::<u64>()), 1..64)) {
        let drops = Arc::new(AtomicUsize::new(0));
        let owning = specs.iter().filter(|(kind, _)| *kind == 2).count();
        {
            let mut builder = KernelBuilder::new();
            let mut built = Vec::with_capacity(specs.len());
            for (kind, seed) in &specs {
                let capacity = builder.capacity();
                let offset = append(&mut builder, *kind, *seed, &drops);
                prop_assert_eq!(invoke(&builder, offset), checksum(*kind, *seed));
                built.push((offset, checksum(*kind, *seed)));
                if builder.capacity() != capacity {
                    for (offset, expected) in &built {
                        prop_assert_eq!(invoke(&builder, *offset), *expected);
                    }
                }
            }
            prop_assert!(builder.capacity() >= builder.len());
            prop_assert_eq!(builder.record_count(), specs.len());
            for (offset, expected) in &built {
                prop_assert_eq!(invoke(&builder, *offset), *expected);
            }
        }
        prop_assert_eq!(drops.load(Ordering::SeqCst), owning);
    }

    /// A composite appended before its children still reaches them after the
    /// children force the arena to grow.
    #[test]
    fn test_composite_reaches_children_after_growth(
        specs in prop::collection::vec((0u8..3, any::<u64>()), 1..48),
    ) {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut builder = KernelBuilder::new();
        let root = builder.append(Sum { children: Vec::new() }, KernelRequest::Single).unwrap();
        let mut children = Vec::with_capacity(specs.len());
        let mut expected = 0u64;
        for (kind, seed) in &specs {
            children.push(append(&mut builder, *kind, *seed, &drops) - root);
            expected = expected.wrapping_add(checksum(*kind, *seed));
        }
        builder.get_at::<Sum>(root).unwrap().children = children;
        prop_assert_eq!(invoke(&builder, root), expected);

        builder.reset();
        prop_assert!(builder.is_empty());
        prop_assert!(!builder.is_spilled());
        let owning = specs.iter().filter(|(kind, _)| *kind == 2).count();
        prop_assert_eq!(drops.load(Ordering::SeqCst), owning);
    }

    /// Plain-data records keep their exact state bytes when `reserve` moves
    /// the arena, whether it spills from the inline area or regrows the heap.
    #[test]
    fn test_reserve_preserves_record_bytes(
        specs in prop::collection::vec((0u8..2, any::<u64>()), 1..24),
    ) {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut builder = KernelBuilder::new();
        let mut records = Vec::with_capacity(specs.len());
        for (kind, seed) in &specs {
            records.push((*kind, append(&mut builder, *kind, *seed, &drops)));
        }
        let before = snapshot(&builder, &records);

        for _ in 0..2 {
            let capacity = builder.capacity();
            builder.reserve(capacity * 4).unwrap();
            prop_assert!(builder.is_spilled());
            prop_assert!(builder.capacity() >= capacity * 4);
            prop_assert_eq!(&snapshot(&builder, &records), &before);
        }
        for ((kind, offset), (_, seed)) in records.iter().zip(&specs) {
            prop_assert_eq!(invoke(&builder, *offset), checksum(*kind, *seed));
        }
    }
}
