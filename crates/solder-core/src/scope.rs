//! Lifetime-bounded region allocation
//!
//! A `Scope` models a block of native-language code: it hands out memory
//! segments that are valid exactly as long as the scope is alive. Closing
//! the scope releases every allocation at once; any later access through a
//! `Segment` reports `ScopeError::Closed` instead of touching freed memory.
//!
//! A scope lent to an in-flight upcall is pinned: `close()` fails with
//! `ScopeError::InUse` until the call completes.

use std::alloc::{alloc_zeroed, dealloc, Layout as AllocLayout};
use std::sync::Arc;

use parking_lot::Mutex;

/// Scope lifecycle and access errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The scope has been closed; its memory is gone.
    #[error("scope is closed")]
    Closed,

    /// The scope is lent to an in-flight call and cannot be closed now.
    #[error("scope is in use by {0} in-flight call(s)")]
    InUse(usize),

    /// A segment access fell outside the segment bounds.
    #[error("segment access out of bounds: {offset}+{len} > {size}")]
    OutOfBounds {
        /// Requested start offset.
        offset: usize,
        /// Requested length.
        len: usize,
        /// Segment size.
        size: usize,
    },

    /// An allocation request the platform allocator cannot express.
    #[error("invalid allocation request: size={size} align={align}")]
    BadRequest {
        /// Requested size.
        size: usize,
        /// Requested alignment.
        align: usize,
    },
}

struct Block {
    ptr: *mut u8,
    layout: AllocLayout,
}

struct ScopeState {
    blocks: Vec<Block>,
    closed: bool,
    pins: usize,
}

impl ScopeState {
    fn release_blocks(&mut self) {
        for block in self.blocks.drain(..) {
            // Safety: each block was allocated with exactly this layout and
            // is released at most once (drain empties the list).
            unsafe { dealloc(block.ptr, block.layout) };
        }
    }
}

struct ScopeInner {
    state: Mutex<ScopeState>,
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.closed {
            state.release_blocks();
        }
    }
}

// Safety: all access to the raw block pointers goes through the mutex.
unsafe impl Send for ScopeInner {}
unsafe impl Sync for ScopeInner {}

/// A lifetime-bounded native memory region.
///
/// Cloning a `Scope` clones the handle, not the region; all clones observe
/// the same lifecycle.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Default for Scope {
    fn default() -> Self {
        Scope::new()
    }
}

impl Scope {
    /// Create an open scope with no allocations.
    pub fn new() -> Scope {
        Scope {
            inner: Arc::new(ScopeInner {
                state: Mutex::new(ScopeState {
                    blocks: Vec::new(),
                    closed: false,
                    pins: 0,
                }),
            }),
        }
    }

    /// Allocate a zeroed segment of `size` bytes at the given alignment.
    pub fn allocate(&self, size: usize, align: usize) -> Result<Segment, ScopeError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(ScopeError::Closed);
        }
        let align = align.max(1);
        let alloc_size = size.max(1);
        let layout = AllocLayout::from_size_align(alloc_size, align)
            .map_err(|_| ScopeError::BadRequest { size, align })?;
        // Safety: layout has non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            std::alloc::handle_alloc_error(layout);
        }
        state.blocks.push(Block { ptr, layout });
        Ok(Segment {
            scope: self.clone(),
            addr: ptr as usize,
            len: size,
        })
    }

    /// Close the scope, releasing every allocation.
    ///
    /// Fails with `ScopeError::InUse` while the scope is pinned by an
    /// in-flight call, and with `ScopeError::Closed` if already closed.
    pub fn close(&self) -> Result<(), ScopeError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(ScopeError::Closed);
        }
        if state.pins > 0 {
            return Err(ScopeError::InUse(state.pins));
        }
        state.release_blocks();
        state.closed = true;
        Ok(())
    }

    /// True while the scope has not been closed.
    pub fn is_alive(&self) -> bool {
        !self.inner.state.lock().closed
    }

    /// Pin the scope for the duration of an in-flight call.
    ///
    /// While the returned guard lives, `close()` fails with `InUse`.
    pub fn pin(&self) -> Result<ScopePin, ScopeError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(ScopeError::Closed);
        }
        state.pins += 1;
        Ok(ScopePin {
            scope: self.clone(),
        })
    }

    fn with_live<R>(
        &self,
        f: impl FnOnce(&mut ScopeState) -> Result<R, ScopeError>,
    ) -> Result<R, ScopeError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(ScopeError::Closed);
        }
        f(&mut state)
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Scope")
            .field("closed", &state.closed)
            .field("pins", &state.pins)
            .field("blocks", &state.blocks.len())
            .finish()
    }
}

/// Guard keeping a scope pinned; dropping it releases the pin.
pub struct ScopePin {
    scope: Scope,
}

impl Drop for ScopePin {
    fn drop(&mut self) {
        let mut state = self.scope.inner.state.lock();
        state.pins -= 1;
    }
}

/// A memory segment allocated from a scope.
///
/// All accesses verify that the owning scope is still alive; after the
/// scope closes every access reports `ScopeError::Closed`.
#[derive(Clone)]
pub struct Segment {
    scope: Scope,
    addr: usize,
    len: usize,
}

impl Segment {
    /// Base address of the segment as a raw integer.
    ///
    /// The address is only meaningful while the owning scope is alive.
    pub fn addr(&self) -> u64 {
        self.addr as u64
    }

    /// Segment length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for zero-length segments.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The owning scope handle.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Copy bytes into the segment at a byte offset.
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<(), ScopeError> {
        self.scope.with_live(|_| {
            self.check(offset, bytes.len())?;
            // Safety: scope is alive (checked under the same lock that
            // releases the memory) and the range is in bounds.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr(),
                    (self.addr as *mut u8).add(offset),
                    bytes.len(),
                );
            }
            Ok(())
        })
    }

    /// Copy `len` bytes out of the segment starting at a byte offset.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>, ScopeError> {
        self.scope.with_live(|_| {
            self.check(offset, len)?;
            let mut out = vec![0u8; len];
            // Safety: scope is alive and the range is in bounds.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    (self.addr as *const u8).add(offset),
                    out.as_mut_ptr(),
                    len,
                );
            }
            Ok(out)
        })
    }

    /// Write a 64-bit word at a byte offset.
    pub fn write_word(&self, offset: usize, word: u64) -> Result<(), ScopeError> {
        self.write_bytes(offset, &word.to_le_bytes())
    }

    /// Read a 64-bit word at a byte offset.
    pub fn read_word(&self, offset: usize) -> Result<u64, ScopeError> {
        let bytes = self.read_bytes(offset, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(raw))
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), ScopeError> {
        let end = offset.checked_add(len).ok_or(ScopeError::OutOfBounds {
            offset,
            len,
            size: self.len,
        })?;
        if end > self.len {
            return Err(ScopeError::OutOfBounds {
                offset,
                len,
                size: self.len,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_access() {
        let scope = Scope::new();
        let seg = scope.allocate(16, 8).unwrap();
        assert_eq!(seg.len(), 16);
        seg.write_word(0, 42).unwrap();
        assert_eq!(seg.read_word(0).unwrap(), 42);
        // fresh memory is zeroed
        assert_eq!(seg.read_word(8).unwrap(), 0);
    }

    #[test]
    fn test_access_after_close_fails() {
        let scope = Scope::new();
        let seg = scope.allocate(8, 8).unwrap();
        scope.close().unwrap();
        assert!(!scope.is_alive());
        assert_eq!(seg.read_word(0), Err(ScopeError::Closed));
        assert_eq!(seg.write_word(0, 1), Err(ScopeError::Closed));
        assert_eq!(scope.allocate(8, 8).err(), Some(ScopeError::Closed));
    }

    #[test]
    fn test_double_close_fails() {
        let scope = Scope::new();
        scope.close().unwrap();
        assert_eq!(scope.close(), Err(ScopeError::Closed));
    }

    #[test]
    fn test_pinned_scope_refuses_close() {
        let scope = Scope::new();
        let pin = scope.pin().unwrap();
        assert_eq!(scope.close(), Err(ScopeError::InUse(1)));
        drop(pin);
        scope.close().unwrap();
    }

    #[test]
    fn test_out_of_bounds_access() {
        let scope = Scope::new();
        let seg = scope.allocate(8, 8).unwrap();
        assert!(matches!(
            seg.read_bytes(4, 8),
            Err(ScopeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_clones_share_lifecycle() {
        let scope = Scope::new();
        let other = scope.clone();
        scope.close().unwrap();
        assert!(!other.is_alive());
    }
}
