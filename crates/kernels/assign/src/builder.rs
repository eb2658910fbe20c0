//! Kernel builder arena.
//!
//! A [`KernelBuilder`] is a growable byte buffer holding kernel records back
//! to back at 8-byte aligned offsets. Each record is a [`Header`] (call
//! thunks, destructor, record size, request kind) followed by the kernel's
//! own state. Composite kernels find their children by offset, never by
//! pointer, so the buffer can be reallocated while a kernel tree is still
//! being built.
//!
//! # Key Properties
//!
//! - **Stable offsets**: growth copies the bytes; every offset returned by
//!   [`KernelBuilder::append`] stays valid until [`KernelBuilder::reset`].
//! - **No stale references**: [`KernelBuilder::get_at`] borrows the builder
//!   mutably, so a record reference cannot be held across the next append.
//! - **Inline start**: the first 128 bytes live inside the builder itself;
//!   small kernels never allocate.
//! - **Ordered teardown**: records are destroyed in reverse construction
//!   order, exactly once.
//!
//! # Thread Safety
//!
//! Building needs `&mut self`. A finished builder is `Send + Sync`; its
//! kernels are invoked through `&self`.

use std::alloc::{self, Layout};
use std::any::type_name;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ptr::{self, NonNull};

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::kernel::Kernel;

/// Alignment of every record offset.
pub const KERNEL_ALIGNMENT: usize = 8;

const INLINE_WORDS: usize = 16;

/// Bytes available before the first heap allocation.
pub const INLINE_CAPACITY: usize = INLINE_WORDS * mem::size_of::<u64>();

/// Round `offset` up to the record alignment.
///
/// `offset` must not exceed `isize::MAX`; arena lengths never do.
#[inline]
pub const fn align_offset(offset: usize) -> usize {
    (offset + KERNEL_ALIGNMENT - 1) & !(KERNEL_ALIGNMENT - 1)
}

/// Round `offset` up to the record alignment, or `None` on overflow.
#[inline]
pub const fn checked_align_offset(offset: usize) -> Option<usize> {
    match offset.checked_add(KERNEL_ALIGNMENT - 1) {
        Some(end) => Some(end & !(KERNEL_ALIGNMENT - 1)),
        None => None,
    }
}

/// Calling convention a kernel is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelRequest {
    /// One element per call.
    Single,
    /// `count` elements per call, addressed by byte strides.
    Strided,
}

// ============================================================================
// Record Layout
// ============================================================================

type SingleFn = for<'a, 'b> unsafe fn(Node<'a>, *mut u8, &'b [*const u8]) -> Result<()>;

type StridedFn = for<'a, 'b, 'c> unsafe fn(
    Node<'a>,
    *mut u8,
    isize,
    &'b [*const u8],
    &'c [isize],
    usize,
) -> Result<()>;

/// Common prefix of every kernel record.
#[repr(C)]
struct Header {
    single: SingleFn,
    strided: StridedFn,
    destroy: unsafe fn(*mut u8),
    record_type: fn() -> std::any::TypeId,
    /// Aligned size of the whole record.
    size: usize,
    request: KernelRequest,
}

#[repr(C)]
struct Record<K> {
    header: Header,
    kernel: K,
}

struct RecordAlign<K>(PhantomData<K>);

impl<K> RecordAlign<K> {
    const CHECK: () = assert!(
        mem::align_of::<Record<K>>() <= KERNEL_ALIGNMENT,
        "kernel state must not require more than 8-byte alignment"
    );
}

unsafe fn single_thunk<K: Kernel>(node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
    // SAFETY: nodes are only created for recorded offsets, and the thunk
    // stored at this offset was instantiated for K.
    let kernel = unsafe { node.builder.kernel_at::<K>(node.offset) };
    unsafe { kernel.single(node, dst, src) }
}

unsafe fn strided_thunk<K: Kernel>(
    node: Node<'_>,
    dst: *mut u8,
    dst_stride: isize,
    src: &[*const u8],
    src_stride: &[isize],
    count: usize,
) -> Result<()> {
    // SAFETY: as in single_thunk.
    let kernel = unsafe { node.builder.kernel_at::<K>(node.offset) };
    unsafe { kernel.strided(node, dst, dst_stride, src, src_stride, count) }
}

unsafe fn destroy_thunk<K>(record: *mut u8) {
    // SAFETY: caller passes the start of a live Record<K> and never touches
    // it again.
    unsafe { ptr::drop_in_place(record.cast::<Record<K>>()) }
}

impl Header {
    fn of<K: Kernel>(size: usize, request: KernelRequest) -> Self {
        Self {
            single: single_thunk::<K>,
            strided: strided_thunk::<K>,
            destroy: destroy_thunk::<K>,
            record_type: std::any::TypeId::of::<K>,
            size,
            request,
        }
    }
}

// ============================================================================
// Kernel Builder
// ============================================================================

/// Relocatable arena of kernel records.
pub struct KernelBuilder {
    /// Storage used until the first growth past [`INLINE_CAPACITY`].
    inline: UnsafeCell<[MaybeUninit<u64>; INLINE_WORDS]>,
    /// Heap storage once grown (None while inline)
    heap: Option<NonNull<u8>>,
    /// Capacity in bytes of whichever storage is active
    capacity: usize,
    /// Used length in bytes
    len: usize,
    /// Start offset of every record, in construction order
    records: Vec<usize>,
}

// SAFETY: the builder owns its storage exclusively, and every record holds a
// `Kernel`, which is Send + Sync.
unsafe impl Send for KernelBuilder {}
// SAFETY: shared access only invokes kernels through `&K`; mutation requires
// `&mut self`.
unsafe impl Sync for KernelBuilder {}

impl KernelBuilder {
    /// Create an empty builder backed by its inline storage.
    pub fn new() -> Self {
        Self {
            inline: UnsafeCell::new([MaybeUninit::zeroed(); INLINE_WORDS]),
            heap: None,
            capacity: INLINE_CAPACITY,
            len: 0,
            records: Vec::new(),
        }
    }

    /// Create a builder with at least `bytes` of capacity.
    pub fn with_capacity(bytes: usize) -> Result<Self> {
        let mut builder = Self::new();
        builder.reserve(bytes)?;
        Ok(builder)
    }

    /// Bytes in use, including alignment padding.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of records appended.
    #[inline]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Offset the next [`append`](Self::append) will place its record at.
    #[inline]
    pub fn next_offset(&self) -> usize {
        align_offset(self.len)
    }

    /// Whether the records have moved to the heap.
    pub fn is_spilled(&self) -> bool {
        self.heap.is_some()
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        match self.heap {
            Some(ptr) => ptr.as_ptr(),
            None => self.inline.get().cast::<u8>(),
        }
    }

    /// Ensure capacity for at least `requested` bytes.
    ///
    /// Grows by at least half the current capacity. New space is zeroed.
    /// Offsets and record bytes are preserved.
    pub fn reserve(&mut self, requested: usize) -> Result<()> {
        if requested <= self.capacity {
            return Ok(());
        }

        let too_large = || Error::AllocationFailed { bytes: requested };
        let grown = self
            .capacity
            .checked_add(self.capacity / 2)
            .ok_or_else(too_large)?;
        let new_capacity = checked_align_offset(requested.max(grown)).ok_or_else(too_large)?;
        let layout = Layout::from_size_align(new_capacity, KERNEL_ALIGNMENT).map_err(|_| {
            Error::AllocationFailed {
                bytes: new_capacity,
            }
        })?;

        let new_ptr = match self.heap {
            Some(old) => {
                // SAFETY: the current capacity was accepted as a layout when
                // the block was allocated.
                let old_layout = unsafe {
                    Layout::from_size_align_unchecked(self.capacity, KERNEL_ALIGNMENT)
                };
                // SAFETY: old was allocated with old_layout; the new size is
                // non-zero and validated above.
                let raw = unsafe { alloc::realloc(old.as_ptr(), old_layout, new_capacity) };
                let ptr = NonNull::new(raw).ok_or(Error::AllocationFailed {
                    bytes: new_capacity,
                })?;
                // SAFETY: [capacity, new_capacity) is inside the new block.
                unsafe {
                    ptr::write_bytes(
                        ptr.as_ptr().add(self.capacity),
                        0,
                        new_capacity - self.capacity,
                    );
                }
                ptr
            }
            None => {
                // SAFETY: layout has non-zero size.
                let raw = unsafe { alloc::alloc_zeroed(layout) };
                let ptr = NonNull::new(raw).ok_or(Error::AllocationFailed {
                    bytes: new_capacity,
                })?;
                // SAFETY: both regions hold at least len bytes and are distinct.
                unsafe {
                    ptr::copy_nonoverlapping(self.base(), ptr.as_ptr(), self.len);
                }
                ptr
            }
        };

        debug!(
            from = self.capacity,
            to = new_capacity,
            records = self.records.len(),
            "kernel arena grown"
        );
        self.heap = Some(new_ptr);
        self.capacity = new_capacity;
        Ok(())
    }

    /// Append `kernel` as a new record and return its offset.
    ///
    /// The record starts at the current length rounded up to 8 bytes. Any
    /// reference previously obtained from the builder is invalidated, which
    /// the borrow on `self` enforces.
    pub fn append<K: Kernel>(&mut self, kernel: K, request: KernelRequest) -> Result<usize> {
        #[allow(clippy::let_unit_value)]
        let () = RecordAlign::<K>::CHECK;

        let offset = align_offset(self.len);
        let size = align_offset(mem::size_of::<Record<K>>());
        let end = offset
            .checked_add(size)
            .ok_or(Error::AllocationFailed { bytes: usize::MAX })?;
        self.reserve(end)?;

        let record = Record {
            header: Header::of::<K>(size, request),
            kernel,
        };
        // SAFETY: [offset, end) lies within capacity; the base and offset
        // are both 8-aligned and the record needs no more than that.
        unsafe {
            self.base().add(offset).cast::<Record<K>>().write(record);
        }
        self.len = end;
        self.records.push(offset);

        trace!(offset, size, kernel = type_name::<K>(), "kernel appended");
        Ok(offset)
    }

    fn check_offset(&self, offset: usize) -> Result<()> {
        self.records
            .binary_search(&offset)
            .map(|_| ())
            .map_err(|_| Error::InvalidOffset { offset })
    }

    fn check_record<K: Kernel>(&self, offset: usize) -> Result<()> {
        self.check_offset(offset)?;
        // SAFETY: offset starts a live record.
        let header = unsafe { self.header(offset) };
        if (header.record_type)() != std::any::TypeId::of::<K>() {
            return Err(Error::RecordMismatch {
                offset,
                expected: type_name::<K>(),
            });
        }
        Ok(())
    }

    /// # Safety
    ///
    /// `offset` must start a live record.
    #[inline]
    unsafe fn header(&self, offset: usize) -> &Header {
        unsafe { &*self.base().add(offset).cast::<Header>() }
    }

    /// # Safety
    ///
    /// `offset` must start a live `Record<K>`.
    #[inline]
    unsafe fn kernel_at<K>(&self, offset: usize) -> &K {
        unsafe { &(*self.base().add(offset).cast::<Record<K>>()).kernel }
    }

    /// Mutable access to the kernel state at `offset`.
    ///
    /// Re-fetch after every append; the borrow checker rejects holding the
    /// reference across one.
    pub fn get_at<K: Kernel>(&mut self, offset: usize) -> Result<&mut K> {
        self.check_record::<K>(offset)?;
        // SAFETY: checked above that a Record<K> lives at offset; &mut self
        // guarantees exclusivity.
        Ok(unsafe { &mut (*self.base().add(offset).cast::<Record<K>>()).kernel })
    }

    /// Shared access to the kernel state at `offset`.
    pub fn get<K: Kernel>(&self, offset: usize) -> Result<&K> {
        self.check_record::<K>(offset)?;
        // SAFETY: checked above.
        Ok(unsafe { self.kernel_at::<K>(offset) })
    }

    /// Handle to the record at `offset`.
    pub fn node(&self, offset: usize) -> Result<Node<'_>> {
        self.check_offset(offset)?;
        Ok(Node {
            builder: self,
            offset,
        })
    }

    /// Record offsets in construction order.
    pub fn offsets(&self) -> &[usize] {
        &self.records
    }

    /// Invoke the single-element form of the record at `offset`.
    ///
    /// # Safety
    ///
    /// `dst` and `src` must satisfy [`Kernel::single`] for the types the
    /// record was built for.
    pub unsafe fn single(&self, offset: usize, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        let node = self.node(offset)?;
        node.expect_request(KernelRequest::Single)?;
        unsafe { node.single(dst, src) }
    }

    /// Invoke the strided form of the record at `offset`.
    ///
    /// # Safety
    ///
    /// The pointers and strides must satisfy [`Kernel::strided`] for the
    /// types the record was built for.
    pub unsafe fn strided(
        &self,
        offset: usize,
        dst: *mut u8,
        dst_stride: isize,
        src: &[*const u8],
        src_stride: &[isize],
        count: usize,
    ) -> Result<()> {
        let node = self.node(offset)?;
        node.expect_request(KernelRequest::Strided)?;
        unsafe { node.strided(dst, dst_stride, src, src_stride, count) }
    }

    /// Destroy every record, newest first, and release heap storage.
    ///
    /// The builder returns to its empty inline state. Safe on an empty builder.
    pub fn reset(&mut self) {
        let base = self.base();
        while let Some(offset) = self.records.pop() {
            // SAFETY: offset starts a live record; popping it first means it
            // is destroyed exactly once even if a destructor panics.
            unsafe {
                let destroy = (*base.add(offset).cast::<Header>()).destroy;
                destroy(base.add(offset));
            }
        }
        if let Some(heap) = self.heap.take() {
            // SAFETY: heap was allocated with this capacity and alignment.
            unsafe {
                alloc::dealloc(
                    heap.as_ptr(),
                    Layout::from_size_align_unchecked(self.capacity, KERNEL_ALIGNMENT),
                );
            }
        }
        self.capacity = INLINE_CAPACITY;
        self.len = 0;
    }
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KernelBuilder {
    fn drop(&mut self) {
        self.reset();
    }
}

impl std::fmt::Debug for KernelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelBuilder")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("records", &self.records)
            .field("spilled", &self.heap.is_some())
            .finish()
    }
}

// ============================================================================
// Node
// ============================================================================

/// Handle to one record inside a builder, used to invoke it and its children.
#[derive(Clone, Copy)]
pub struct Node<'a> {
    builder: &'a KernelBuilder,
    offset: usize,
}

impl<'a> Node<'a> {
    /// Absolute offset of this record.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn header(&self) -> &'a Header {
        // SAFETY: nodes are only created for recorded offsets.
        unsafe { self.builder.header(self.offset) }
    }

    /// Calling convention this record was built for.
    pub fn request(&self) -> KernelRequest {
        self.header().request
    }

    /// Offset just past this record.
    pub fn end(&self) -> usize {
        self.offset + self.header().size
    }

    /// The record appended immediately after this one.
    pub fn first_child(&self) -> Result<Node<'a>> {
        self.builder.node(self.end())
    }

    /// The record starting `relative` bytes after this one.
    pub fn child(&self, relative: usize) -> Result<Node<'a>> {
        self.builder.node(self.offset + relative)
    }

    fn expect_request(&self, called: KernelRequest) -> Result<()> {
        let built = self.request();
        if built != called {
            return Err(Error::RequestMismatch {
                offset: self.offset,
                built,
                called,
            });
        }
        Ok(())
    }

    /// Invoke this record's single-element form.
    ///
    /// # Safety
    ///
    /// See [`Kernel::single`].
    #[inline]
    pub unsafe fn single(&self, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        unsafe { (self.header().single)(*self, dst, src) }
    }

    /// Invoke this record's strided form.
    ///
    /// # Safety
    ///
    /// See [`Kernel::strided`].
    #[inline]
    pub unsafe fn strided(
        &self,
        dst: *mut u8,
        dst_stride: isize,
        src: &[*const u8],
        src_stride: &[isize],
        count: usize,
    ) -> Result<()> {
        unsafe { (self.header().strided)(*self, dst, dst_stride, src, src_stride, count) }
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("offset", &self.offset)
            .field("request", &self.request())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
