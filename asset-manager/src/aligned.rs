//! 16-byte-aligned float storage for SIMD-accessed audio buffers.
//!
//! The original design note calls for a manual aligned allocator with an
//! "offset byte" trick to recover the unaligned base pointer on free. Rust's
//! global allocator already accepts an explicit [`Layout`] alignment, so we
//! use that directly instead of hand-rolling pointer arithmetic; the offset
//! byte is only needed when the target has no notion of aligned allocation
//! at all, which `std::alloc` always provides here.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;

/// Alignment required for SIMD wide-group reads (four `f32` lanes).
pub const SAMPLE_ALIGN: usize = 16;

/// A contiguous run of `f32` samples aligned to [`SAMPLE_ALIGN`] bytes and
/// padded to a multiple of 4 samples so the last wide group can always be
/// read as four lanes without touching unrelated memory.
pub struct AlignedF32Buffer {
    ptr: NonNull<f32>,
    /// Logical length in samples (before padding).
    len: usize,
    /// Allocated length in samples (`len` rounded up to a multiple of 4).
    capacity: usize,
}

// SAFETY: the buffer uniquely owns its allocation; sharing is via `&`/`&mut`
// like any other owned buffer type.
unsafe impl Send for AlignedF32Buffer {}
unsafe impl Sync for AlignedF32Buffer {}

impl AlignedF32Buffer {
    /// Allocate a zero-filled, aligned buffer holding `len` logical samples.
    /// The padding lanes of the final wide group are zero, so SIMD reads
    /// past `len` observe silence rather than uninitialized memory.
    pub fn zeroed(len: usize) -> Self {
        let capacity = len.div_ceil(4) * 4;
        let capacity = capacity.max(4);
        let layout = Layout::from_size_align(capacity * std::mem::size_of::<f32>(), SAMPLE_ALIGN)
            .expect("aligned buffer layout");
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut f32).expect("allocation failed");
        Self { ptr, len, capacity }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Full padded capacity, a multiple of 4.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn layout(&self) -> Layout {
        Layout::from_size_align(self.capacity * std::mem::size_of::<f32>(), SAMPLE_ALIGN)
            .expect("aligned buffer layout")
    }

    /// Slice over the full padded capacity, including the zeroed tail lanes.
    pub fn as_padded_slice(&self) -> &[f32] {
        // SAFETY: `ptr` is valid for `capacity` elements for the buffer's lifetime.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.capacity) }
    }
}

impl Deref for AlignedF32Buffer {
    type Target = [f32];
    fn deref(&self) -> &[f32] {
        // SAFETY: `ptr` is valid for `len <= capacity` elements.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedF32Buffer {
    fn deref_mut(&mut self) -> &mut [f32] {
        // SAFETY: `ptr` is valid for `len <= capacity` elements.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedF32Buffer {
    fn drop(&mut self) {
        // SAFETY: `self.ptr` was allocated with the same layout by `alloc_zeroed`.
        unsafe { dealloc(self.ptr.as_ptr() as *mut u8, self.layout()) };
    }
}

impl Clone for AlignedF32Buffer {
    fn clone(&self) -> Self {
        let mut out = Self::zeroed(self.len);
        out.as_mut_padded_slice()
            .copy_from_slice(self.as_padded_slice());
        out
    }
}

impl AlignedF32Buffer {
    fn as_mut_padded_slice(&mut self) -> &mut [f32] {
        // SAFETY: `ptr` is valid for `capacity` elements for the buffer's lifetime.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity) }
    }
}
