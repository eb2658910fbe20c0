//! Variable-length string storage.
//!
//! A `string` element is a [`StringData`]: a pointer/length pair owning a
//! heap buffer of UTF-8 bytes. All-zero bytes are a valid empty string, so
//! freshly zeroed destination memory can be assigned into directly.
//!
//! The missing-value marker is a null pointer with a length of `usize::MAX`.
//! It is only meaningful inside `?string` storage.

use std::ptr;

/// Length value marking a missing string.
const NA_LEN: usize = usize::MAX;

/// Owned string element, laid out as `{ptr, len}`.
#[repr(C)]
#[derive(Debug)]
pub struct StringData {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: StringData uniquely owns its heap buffer, like Box<[u8]>.
unsafe impl Send for StringData {}
// SAFETY: shared access only reads the buffer.
unsafe impl Sync for StringData {}

impl StringData {
    /// An empty string.
    pub const fn new() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
        }
    }

    /// The missing-value marker.
    pub const fn na() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: NA_LEN,
        }
    }

    /// Replace the contents with a copy of `bytes`, releasing the old buffer.
    pub fn set(&mut self, bytes: &[u8]) {
        self.reset();
        if bytes.is_empty() {
            return;
        }
        let boxed: Box<[u8]> = bytes.into();
        self.len = boxed.len();
        self.ptr = Box::into_raw(boxed).cast::<u8>();
    }

    /// Release the buffer and become the empty string.
    pub fn reset(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: a non-null ptr always comes from Box::into_raw in `set`
            // with exactly `len` bytes.
            unsafe {
                drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                    self.ptr, self.len,
                )));
            }
        }
        self.ptr = ptr::null_mut();
        self.len = 0;
    }

    /// Release the buffer and become the missing-value marker.
    pub fn set_na(&mut self) {
        self.reset();
        self.len = NA_LEN;
    }

    pub fn is_na(&self) -> bool {
        self.ptr.is_null() && self.len == NA_LEN
    }

    /// Raw bytes; empty for both the empty string and the NA marker.
    pub fn as_bytes(&self) -> &[u8] {
        if self.ptr.is_null() {
            &[]
        } else {
            // SAFETY: ptr/len describe the live buffer owned by self.
            unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
        }
    }

    /// Contents as text, if valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl Default for StringData {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for StringData {
    fn from(s: &str) -> Self {
        let mut data = Self::new();
        data.set(s.as_bytes());
        data
    }
}

impl Clone for StringData {
    fn clone(&self) -> Self {
        if self.is_na() {
            return Self::na();
        }
        let mut copy = Self::new();
        copy.set(self.as_bytes());
        copy
    }
}

impl PartialEq for StringData {
    fn eq(&self, other: &Self) -> bool {
        self.is_na() == other.is_na() && self.as_bytes() == other.as_bytes()
    }
}

impl Drop for StringData {
    fn drop(&mut self) {
        self.reset();
    }
}
