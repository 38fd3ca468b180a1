//! RAII-owned native scratch memory
//!
//! `NativeBuffer` is an exclusively owned, zero-initialized, aligned region
//! of off-heap memory. It backs per-call argument buffers and scratch
//! allocations; dropping the buffer releases the memory unconditionally,
//! which is what guarantees teardown on every exit path of a call.

use std::alloc::{alloc_zeroed, dealloc, Layout as AllocLayout};
use std::ptr::NonNull;

/// An exclusively owned native memory region.
///
/// All accessors are bounds-checked; offsets are produced from validated
/// buffer layouts, so an out-of-bounds access is an internal logic error
/// and panics rather than corrupting memory.
#[derive(Debug)]
pub struct NativeBuffer {
    ptr: NonNull<u8>,
    size: usize,
    align: usize,
}

impl NativeBuffer {
    /// Allocate a zeroed buffer of `size` bytes at the given alignment.
    ///
    /// A zero-sized buffer performs no allocation.
    pub fn new(size: usize, align: usize) -> NativeBuffer {
        let align = align.max(1);
        if size == 0 {
            return NativeBuffer {
                ptr: NonNull::dangling(),
                size: 0,
                align,
            };
        }
        let layout = AllocLayout::from_size_align(size, align)
            .unwrap_or_else(|_| panic!("invalid buffer layout: size={size} align={align}"));
        // Safety: layout has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)
            .unwrap_or_else(|| std::alloc::handle_alloc_error(layout));
        NativeBuffer { ptr, size, align }
    }

    /// Buffer size in bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    /// True if the buffer holds no memory.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Base address of the buffer as a raw integer.
    pub fn addr(&self) -> u64 {
        if self.size == 0 {
            0
        } else {
            self.ptr.as_ptr() as u64
        }
    }

    /// Mutable base pointer.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Write a 64-bit word at a byte offset.
    pub fn write_word(&mut self, offset: usize, word: u64) {
        self.check(offset, 8);
        // Safety: bounds checked above; write_unaligned tolerates any offset.
        unsafe {
            self.ptr
                .as_ptr()
                .add(offset)
                .cast::<u64>()
                .write_unaligned(word);
        }
    }

    /// Read a 64-bit word at a byte offset.
    pub fn read_word(&self, offset: usize) -> u64 {
        self.check(offset, 8);
        // Safety: bounds checked above.
        unsafe {
            self.ptr
                .as_ptr()
                .add(offset)
                .cast::<u64>()
                .read_unaligned()
        }
    }

    /// Copy bytes into the buffer at a byte offset.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.check(offset, bytes.len());
        // Safety: bounds checked above; source and destination are disjoint.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.ptr.as_ptr().add(offset),
                bytes.len(),
            );
        }
    }

    /// Copy `len` bytes out of the buffer starting at a byte offset.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        self.check(offset, len);
        let mut out = vec![0u8; len];
        // Safety: bounds checked above.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), out.as_mut_ptr(), len);
        }
        out
    }

    /// View the whole buffer as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        if self.size == 0 {
            return &[];
        }
        // Safety: ptr covers size bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    fn check(&self, offset: usize, len: usize) {
        let end = offset.checked_add(len).expect("buffer offset overflow");
        assert!(
            end <= self.size,
            "buffer access out of bounds: {end} > {}",
            self.size
        );
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        if self.size != 0 {
            // Safety: allocated in new() with the identical layout.
            unsafe {
                let layout = AllocLayout::from_size_align_unchecked(self.size, self.align);
                dealloc(self.ptr.as_ptr(), layout);
            }
        }
    }
}

// Safety: the buffer is exclusively owned; no interior sharing.
unsafe impl Send for NativeBuffer {}
unsafe impl Sync for NativeBuffer {}
