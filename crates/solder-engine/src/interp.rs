//! Binding interpreter
//!
//! Walks a binding recipe step by step against the per-call argument buffer.
//! This is the reference execution path: the specialized write plan is
//! compiled from the same recipes and must leave bit-identical buffer
//! contents.
//!
//! Each recipe threads two registers: the `base` managed value the recipe
//! marshals, and a scalar transfer `word`. `BufferLoad` reads a word out of
//! the base struct image, `VmStore` writes the current word (or the base
//! scalar) into a storage slot, `Copy` and `Allocate` produce scratch
//! addresses as the current word.

use solder_core::{align_up, Carrier, Layout, NativeBuffer, Scope, Segment, Value};

use crate::binding::Binding;
use crate::buffer_layout::BufferLayout;
use crate::error::CallError;
use crate::sequence::CallingSequence;

const WORD: usize = 8;

/// Bump allocator over one exclusively owned native region. Backs the
/// call-lifetime scratch of `Copy` and `Allocate`; dropping the arena
/// releases everything at once.
pub(crate) struct ScratchArena {
    buf: NativeBuffer,
    used: usize,
}

impl ScratchArena {
    pub(crate) fn new(capacity: usize) -> ScratchArena {
        ScratchArena {
            buf: NativeBuffer::new(capacity, 16),
            used: 0,
        }
    }

    fn allocate(&mut self, size: usize, align: usize) -> Result<u64, CallError> {
        let offset = align_up(self.used, align.max(1));
        let end = offset.checked_add(size).ok_or_else(|| {
            CallError::MarshalFailed(format!("scratch request overflows: {size} bytes"))
        })?;
        if end > self.buf.len() {
            return Err(CallError::MarshalFailed(format!(
                "scratch exhausted: need {size} bytes, {} left",
                self.buf.len() - self.used
            )));
        }
        self.used = end;
        Ok(self.buf.addr() + offset as u64)
    }
}

/// Where `Copy` and `Allocate` scratch comes from.
///
/// The arena variant lives exactly as long as the call; the scope-backed
/// variant parks its segments in the caller's scope so copied-out arguments
/// survive until the scope closes.
pub(crate) enum CallAllocator<'a> {
    Arena(&'a mut ScratchArena),
    Scoped {
        scope: &'a Scope,
        segments: &'a mut Vec<Segment>,
    },
}

impl CallAllocator<'_> {
    fn allocate(&mut self, size: usize, align: usize) -> Result<u64, CallError> {
        match self {
            CallAllocator::Arena(arena) => arena.allocate(size, align),
            CallAllocator::Scoped { scope, segments } => {
                let segment = scope.allocate(size, align)?;
                let addr = segment.addr();
                segments.push(segment);
                Ok(addr)
            }
        }
    }

    fn allocate_bytes(&mut self, bytes: &[u8], align: usize) -> Result<u64, CallError> {
        let addr = self.allocate(bytes.len(), align)?;
        // Safety: the region was just allocated with at least bytes.len()
        // bytes and is exclusively owned by this call (or its scope).
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
        }
        Ok(addr)
    }
}

/// Mutable marshaling state of one in-flight call.
pub(crate) struct MarshalCtx<'a> {
    pub layout: &'a BufferLayout,
    pub buffer: &'a mut NativeBuffer,
    pub stack: &'a mut NativeBuffer,
    pub alloc: CallAllocator<'a>,
}

impl MarshalCtx<'_> {
    fn write_storage(&mut self, storage: solder_abi::Storage, word: u64) -> Result<(), CallError> {
        if storage.is_stack() {
            let offset = storage.index as usize * WORD;
            if offset + WORD > self.stack.len() {
                return Err(CallError::MarshalFailed(format!(
                    "stack slot {} beyond the outgoing argument area",
                    storage.index
                )));
            }
            self.stack.write_word(offset, word);
            return Ok(());
        }
        let offset = self.layout.arg_offset(storage).ok_or_else(|| {
            CallError::MarshalFailed(format!("no argument buffer slot for {storage}"))
        })?;
        self.buffer.write_word(offset, word);
        Ok(())
    }

    fn read_ret_storage(&self, storage: solder_abi::Storage) -> Result<u64, CallError> {
        let offset = self.layout.ret_offset(storage).ok_or_else(|| {
            CallError::MarshalFailed(format!("no return buffer slot for {storage}"))
        })?;
        Ok(self.buffer.read_word(offset))
    }
}

/// Read `min(8, remaining)` bytes of a struct image at an offset,
/// zero-padding short trailing words.
pub(crate) fn image_word(image: &[u8], offset: usize) -> Result<u64, CallError> {
    if offset >= image.len() {
        return Err(CallError::MarshalFailed(format!(
            "buffer load at {offset} beyond struct image of {} bytes",
            image.len()
        )));
    }
    let take = WORD.min(image.len() - offset);
    let mut raw = [0u8; WORD];
    raw[..take].copy_from_slice(&image[offset..offset + take]);
    Ok(u64::from_le_bytes(raw))
}

/// Write `min(8, remaining)` bytes of a word into a struct image.
fn store_image_word(image: &mut [u8], offset: usize, word: u64) -> Result<(), CallError> {
    if offset >= image.len() {
        return Err(CallError::MarshalFailed(format!(
            "buffer store at {offset} beyond struct image of {} bytes",
            image.len()
        )));
    }
    let take = WORD.min(image.len() - offset);
    image[offset..offset + take].copy_from_slice(&word.to_le_bytes()[..take]);
    Ok(())
}

fn slot_word(value: &Value, carrier: Carrier) -> Result<u64, CallError> {
    if value.carrier() != carrier {
        return Err(CallError::MarshalFailed(format!(
            "value carrier {:?} does not match recipe carrier {carrier:?}",
            value.carrier()
        )));
    }
    value.to_slot_word().ok_or_else(|| {
        CallError::MarshalFailed("struct value has no single-word encoding".into())
    })
}

/// Run one argument recipe managed-to-native.
pub(crate) fn unbox_argument(
    ctx: &mut MarshalCtx<'_>,
    bindings: &[Binding],
    value: &Value,
) -> Result<(), CallError> {
    let mut word: Option<u64> = None;
    for binding in bindings {
        match *binding {
            Binding::VmStore { storage, carrier } => {
                let w = match word.take() {
                    Some(w) => w,
                    None => slot_word(value, carrier)?,
                };
                ctx.write_storage(storage, w)?;
            }
            Binding::BufferLoad { offset, .. } => {
                let image = value.struct_bytes().ok_or_else(|| {
                    CallError::MarshalFailed("buffer load from a non-struct value".into())
                })?;
                word = Some(image_word(image, offset)?);
            }
            Binding::Copy { size, align } => {
                let image = value.struct_bytes().ok_or_else(|| {
                    CallError::MarshalFailed("copy of a non-struct value".into())
                })?;
                if image.len() != size {
                    return Err(CallError::MarshalFailed(format!(
                        "struct image is {} bytes, layout expects {size}",
                        image.len()
                    )));
                }
                word = Some(ctx.alloc.allocate_bytes(image, align)?);
            }
            _ => {
                return Err(CallError::MarshalFailed(format!(
                    "binding {binding:?} is not valid in an argument recipe"
                )));
            }
        }
    }
    Ok(())
}

/// Run the pre-transition prefix of a return recipe: allocate the hidden
/// in-memory destination and store its address. Returns the destination
/// address when the sequence returns through memory.
pub(crate) fn prepare_return(
    ctx: &mut MarshalCtx<'_>,
    sequence: &CallingSequence,
) -> Result<Option<u64>, CallError> {
    if !sequence.in_memory_return {
        return Ok(None);
    }
    let mut dest: Option<u64> = None;
    for binding in &sequence.ret_bindings {
        match *binding {
            Binding::Allocate { size, align } => {
                dest = Some(ctx.alloc.allocate(size, align)?);
            }
            Binding::VmStore { storage, .. } => {
                let addr = dest.ok_or_else(|| {
                    CallError::MarshalFailed("hidden destination stored before allocation".into())
                })?;
                ctx.write_storage(storage, addr)?;
            }
            // everything past the dereference runs after the transition
            Binding::Dereference { .. } => break,
            _ => {
                return Err(CallError::MarshalFailed(format!(
                    "binding {binding:?} is not valid before an in-memory return"
                )));
            }
        }
    }
    dest.ok_or_else(|| {
        CallError::MarshalFailed("in-memory return without a destination allocation".into())
    })
    .map(Some)
}

/// Run the post-transition part of a return recipe native-to-managed.
pub(crate) fn box_return(
    ctx: &MarshalCtx<'_>,
    sequence: &CallingSequence,
    imr_dest: Option<u64>,
) -> Result<Option<Value>, CallError> {
    if sequence.ret_bindings.is_empty() {
        return Ok(None);
    }

    let ret_size = sequence
        .descriptor
        .ret
        .as_ref()
        .map(Layout::byte_size)
        .unwrap_or(0);

    let mut word: Option<u64> = None;
    let mut image: Option<Vec<u8>> = None;
    let mut result: Option<Value> = None;

    for binding in &sequence.ret_bindings {
        match *binding {
            // pre-transition steps, already executed
            Binding::Allocate { .. } | Binding::VmStore { .. } => {}
            Binding::VmLoad { storage, carrier } => {
                let w = ctx.read_ret_storage(storage)?;
                if sequence.signature.ret == Some(carrier) {
                    result = Value::from_slot_word(carrier, w);
                }
                word = Some(w);
            }
            Binding::BufferStore { offset, .. } => {
                let image = image.get_or_insert_with(|| vec![0u8; ret_size]);
                let w = word.take().ok_or_else(|| {
                    CallError::MarshalFailed("buffer store with no loaded word".into())
                })?;
                store_image_word(image, offset, w)?;
            }
            Binding::Dereference { offset, carrier } => {
                let addr = imr_dest.ok_or_else(|| {
                    CallError::MarshalFailed("dereference without a destination address".into())
                })?;
                let src = (addr as usize + offset) as *const u8;
                match carrier {
                    Carrier::Struct => {
                        let mut bytes = vec![0u8; ret_size];
                        // Safety: the destination was allocated ret_size
                        // bytes by prepare_return and outlives this read.
                        unsafe {
                            std::ptr::copy_nonoverlapping(src, bytes.as_mut_ptr(), ret_size);
                        }
                        result = Some(Value::Struct(bytes));
                    }
                    _ => {
                        let mut raw = [0u8; WORD];
                        let width = carrier.byte_size().unwrap_or(WORD);
                        // Safety: in-bounds read of the call-owned scratch.
                        unsafe {
                            std::ptr::copy_nonoverlapping(src, raw.as_mut_ptr(), width);
                        }
                        result = Value::from_slot_word(carrier, u64::from_le_bytes(raw));
                    }
                }
            }
            _ => {
                return Err(CallError::MarshalFailed(format!(
                    "binding {binding:?} is not valid in a return recipe"
                )));
            }
        }
    }

    if result.is_none() {
        if let Some(image) = image {
            result = Some(Value::Struct(image));
        }
    }
    result
        .map(Some)
        .ok_or_else(|| CallError::MarshalFailed("return recipe produced no value".into()))
}
