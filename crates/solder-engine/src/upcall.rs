//! Upcall stubs
//!
//! An upcall stub is a native-callable address that dispatches into a
//! managed handler. Stubs come from a fixed pool: each pool slot owns a
//! family of `extern "C"` trampolines, one per return-register flavor, and
//! creating a stub claims a slot and picks the trampoline matching its
//! sequence. Releasing the stub returns the slot.
//!
//! The trampolines declare a register-saturating uniform signature (eight
//! integer words, eight float words) and read only the storages the
//! sequence names, so one family serves every supported shape. Struct
//! returns through memory use blob-returning trampolines: the compiler
//! itself produces the indirect-result convention, which keeps the
//! trampolines free of any per-platform code.
//!
//! Each invocation pins the handler's scope; `Scope::close` reports
//! `InUse` until the call returns. A handler panic is caught at the
//! boundary and surfaces as a zeroed return value, never an unwind into
//! native frames.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use solder_abi::{Platform, Storage, StorageKind};
use solder_core::{Carrier, Scope, Value};

use crate::adapter::{ret_kind, RetKind};
use crate::binding::Binding;
use crate::builder::build_calling_sequence;
use crate::error::{CallError, UpcallError};
use crate::sequence::{CallingSequence, FunctionDescriptor, Signature};

const POOL_SLOTS: usize = 16;
const WORD: usize = 8;
const MAX_BLOB: usize = 64;

/// Declared shape of one managed handler parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpcallParam {
    /// The scope-lifetime token; must be the first parameter.
    ScopeToken,
    /// A marshaled value of the given carrier.
    Value(Carrier),
}

type HandlerFn = dyn Fn(&Scope, &[Value]) -> Result<Option<Value>, CallError> + Send + Sync;

/// A managed handler with its declared parameter and return shape.
pub struct UpcallHandler {
    params: Vec<UpcallParam>,
    ret: Option<Carrier>,
    func: Box<HandlerFn>,
}

impl UpcallHandler {
    /// A handler over the given parameter shapes and return carrier.
    pub fn new(
        params: Vec<UpcallParam>,
        ret: Option<Carrier>,
        func: impl Fn(&Scope, &[Value]) -> Result<Option<Value>, CallError> + Send + Sync + 'static,
    ) -> UpcallHandler {
        UpcallHandler {
            params,
            ret,
            func: Box::new(func),
        }
    }
}

impl std::fmt::Debug for UpcallHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpcallHandler")
            .field("params", &self.params)
            .field("ret", &self.ret)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetFlavor {
    Void,
    Int,
    Float,
    IntPair,
    FloatPair,
    IntFloat,
    FloatInt,
    /// In-memory return of exactly this many bytes.
    Blob(usize),
}

struct UpcallState {
    sequence: Arc<CallingSequence>,
    handler: UpcallHandler,
    scope: Scope,
    flavor: RetFlavor,
    /// SysV in-memory returns shift explicit integer storages down by one:
    /// the hidden destination occupies the first register, which the blob
    /// trampoline never sees as a parameter.
    shift: bool,
}

static SLOTS: Lazy<RwLock<Vec<Option<Arc<UpcallState>>>>> =
    Lazy::new(|| RwLock::new(vec![None; POOL_SLOTS]));

/// A native-callable stub bound to a pool slot.
///
/// Dropping the stub releases the slot; the address must not be called
/// afterwards.
#[derive(Debug)]
pub struct UpcallStub {
    slot: usize,
    address: u64,
}

impl UpcallStub {
    /// Create a stub for `handler` implementing `descriptor` on the host
    /// platform. The handler's first parameter must be the scope token.
    pub fn new(
        handler: UpcallHandler,
        descriptor: &FunctionDescriptor,
        scope: &Scope,
        platform: Platform,
    ) -> Result<UpcallStub, UpcallError> {
        if Platform::host() != Some(platform) {
            return Err(UpcallError::UnsupportedShape(format!(
                "platform {platform:?} is not the host"
            )));
        }
        // the trampoline family assumes split integer/float register pools
        if !matches!(platform, Platform::SysVx64 | Platform::AArch64) {
            return Err(UpcallError::UnsupportedShape(format!(
                "no trampoline family for platform {platform:?}"
            )));
        }
        let signature = handler_signature(&handler)?;
        let abi = solder_abi::AbiDescriptor::of(platform);
        let sequence = Arc::new(build_calling_sequence(&signature, descriptor, abi)?);

        if sequence.arg_move_storages().iter().any(Storage::is_stack) {
            return Err(UpcallError::UnsupportedShape(
                "stack arguments are not supported for upcalls".into(),
            ));
        }
        let flavor = ret_flavor(&sequence)?;
        let shift = sequence.in_memory_return && abi.imr_consumes_int_reg;

        if !scope.is_alive() {
            return Err(UpcallError::Scope(solder_core::ScopeError::Closed));
        }
        let state = Arc::new(UpcallState {
            sequence,
            handler,
            scope: scope.clone(),
            flavor,
            shift,
        });

        let mut slots = SLOTS.write();
        let slot = slots
            .iter()
            .position(Option::is_none)
            .ok_or(UpcallError::PoolExhausted)?;
        slots[slot] = Some(state);
        let address = trampoline_address(slot, flavor);
        log::debug!("upcall stub bound: slot {slot}, address {address:#x}, {flavor:?}");
        Ok(UpcallStub { slot, address })
    }

    /// The native-callable address of this stub.
    pub fn address(&self) -> u64 {
        self.address
    }
}

impl Drop for UpcallStub {
    fn drop(&mut self) {
        SLOTS.write()[self.slot] = None;
    }
}

fn handler_signature(handler: &UpcallHandler) -> Result<Signature, UpcallError> {
    match handler.params.first() {
        Some(UpcallParam::ScopeToken) => {}
        _ => {
            return Err(UpcallError::HandlerShape(
                "first parameter must be the scope token".into(),
            ));
        }
    }
    let mut params = Vec::with_capacity(handler.params.len() - 1);
    for param in &handler.params[1..] {
        match param {
            UpcallParam::Value(carrier) => params.push(*carrier),
            UpcallParam::ScopeToken => {
                return Err(UpcallError::HandlerShape(
                    "only the first parameter may be the scope token".into(),
                ));
            }
        }
    }
    Ok(Signature::new(params, handler.ret))
}

fn ret_flavor(sequence: &CallingSequence) -> Result<RetFlavor, UpcallError> {
    let kind = ret_kind(sequence)
        .map_err(|e| UpcallError::UnsupportedShape(e.to_string()))?;
    Ok(match kind {
        RetKind::Void => RetFlavor::Void,
        RetKind::Int => RetFlavor::Int,
        RetKind::Float => RetFlavor::Float,
        RetKind::IntPair => RetFlavor::IntPair,
        RetKind::FloatPair => RetFlavor::FloatPair,
        RetKind::IntFloat => RetFlavor::IntFloat,
        RetKind::FloatInt => RetFlavor::FloatInt,
        RetKind::InMemory => {
            let size = sequence
                .descriptor
                .ret
                .as_ref()
                .map(|l| l.byte_size())
                .unwrap_or(0);
            // the blob trampoline writes exactly its declared size, so the
            // callee-visible size must land on a word boundary the caller
            // actually allocated
            if size % WORD != 0 || size > MAX_BLOB {
                return Err(UpcallError::UnsupportedShape(format!(
                    "in-memory return of {size} bytes has no blob trampoline"
                )));
            }
            RetFlavor::Blob(size)
        }
    })
}

/// Return-register words (and blob bytes) one invocation produces.
struct UpcallOut {
    ints: [u64; 2],
    floats: [u64; 2],
    blob: [u8; MAX_BLOB],
}

impl Default for UpcallOut {
    fn default() -> UpcallOut {
        UpcallOut {
            ints: [0; 2],
            floats: [0; 2],
            blob: [0; MAX_BLOB],
        }
    }
}

fn dispatch(slot: usize, ints: [u64; 8], floats: [f64; 8]) -> UpcallOut {
    match panic::catch_unwind(AssertUnwindSafe(|| enter(slot, ints, floats))) {
        Ok(Ok(out)) => out,
        Ok(Err(err)) => {
            log::error!("upcall slot {slot} failed: {err}");
            UpcallOut::default()
        }
        Err(_) => {
            log::error!("upcall slot {slot}: handler panicked");
            UpcallOut::default()
        }
    }
}

fn enter(slot: usize, ints: [u64; 8], floats: [f64; 8]) -> Result<UpcallOut, CallError> {
    let state = SLOTS
        .read()
        .get(slot)
        .and_then(Clone::clone)
        .ok_or_else(|| CallError::MarshalFailed(format!("upcall slot {slot} is vacant")))?;

    let _pin = state.scope.pin()?;
    let float_bits = floats.map(f64::to_bits);

    let mut values = Vec::with_capacity(state.sequence.arg_bindings.len());
    for (bindings, layout) in state
        .sequence
        .arg_bindings
        .iter()
        .zip(&state.sequence.descriptor.args)
    {
        values.push(read_argument(
            &state,
            &ints,
            &float_bits,
            bindings,
            layout.byte_size(),
        )?);
    }

    let result = (state.handler.func)(&state.scope, &values)?;
    write_return(&state, result)
}

fn read_storage(
    state: &UpcallState,
    ints: &[u64; 8],
    floats: &[u64; 8],
    storage: Storage,
) -> Result<u64, CallError> {
    let index = match (storage.kind, state.shift) {
        (StorageKind::Integer, true) => {
            (storage.index as usize).checked_sub(1).ok_or_else(|| {
                CallError::MarshalFailed("hidden destination register read as an argument".into())
            })?
        }
        (StorageKind::Integer, false) => storage.index as usize,
        (StorageKind::Float, _) => {
            return floats.get(storage.index as usize).copied().ok_or_else(|| {
                CallError::MarshalFailed(format!("{storage} outside the trampoline registers"))
            });
        }
        (StorageKind::Stack, _) => {
            return Err(CallError::MarshalFailed(
                "stack storage reached an upcall".into(),
            ));
        }
    };
    ints.get(index).copied().ok_or_else(|| {
        CallError::MarshalFailed(format!("{storage} outside the trampoline registers"))
    })
}

/// Reverse one argument recipe: the recipe describes managed-to-native
/// moves, so an upcall reads where a downcall would have written.
fn read_argument(
    state: &UpcallState,
    ints: &[u64; 8],
    floats: &[u64; 8],
    bindings: &[Binding],
    layout_size: usize,
) -> Result<Value, CallError> {
    // single scalar move
    if let [Binding::VmStore { storage, carrier }] = bindings {
        let word = read_storage(state, ints, floats, *storage)?;
        return Value::from_slot_word(*carrier, word).ok_or_else(|| {
            CallError::MarshalFailed("scalar recipe with a struct carrier".into())
        });
    }

    // by-reference aggregate: the register holds a pointer to the bytes
    if let [Binding::Copy { size, .. }, Binding::VmStore { storage, .. }] = bindings {
        let addr = read_storage(state, ints, floats, *storage)?;
        if addr == 0 {
            return Err(CallError::MarshalFailed(
                "null by-reference aggregate argument".into(),
            ));
        }
        let mut bytes = vec![0u8; *size];
        // Safety: the native caller passed this pointer for an aggregate
        // of exactly `size` bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(addr as *const u8, bytes.as_mut_ptr(), *size);
        }
        return Ok(Value::Struct(bytes));
    }

    // register-decomposed aggregate: BufferLoad/VmStore word pairs
    let mut image: Option<Vec<u8>> = None;
    let mut chunks = bindings.chunks_exact(2);
    for pair in &mut chunks {
        let [Binding::BufferLoad { offset, .. }, Binding::VmStore { storage, .. }] = pair else {
            return Err(CallError::MarshalFailed(format!(
                "argument recipe {bindings:?} has no upcall reading"
            )));
        };
        let word = read_storage(state, ints, floats, *storage)?;
        let image = image.get_or_insert_with(|| vec![0u8; layout_size]);
        let end = (*offset + WORD).min(image.len());
        image[*offset..end].copy_from_slice(&word.to_le_bytes()[..end - *offset]);
    }
    match image {
        Some(image) => Ok(Value::Struct(image)),
        None => Err(CallError::MarshalFailed(
            "empty argument recipe in an upcall".into(),
        )),
    }
}

fn write_return(state: &UpcallState, result: Option<Value>) -> Result<UpcallOut, CallError> {
    let mut out = UpcallOut::default();
    let expected = state.sequence.signature.ret;
    let value = match (expected, result) {
        (None, _) => return Ok(out),
        (Some(_), None) => {
            return Err(CallError::MarshalFailed(
                "handler returned no value for a non-void shape".into(),
            ));
        }
        (Some(carrier), Some(value)) => {
            if value.carrier() != carrier {
                return Err(CallError::MarshalFailed(format!(
                    "handler returned {:?}, shape expects {carrier:?}",
                    value.carrier()
                )));
            }
            value
        }
    };

    match state.flavor {
        RetFlavor::Void => {}
        RetFlavor::Int | RetFlavor::Float => {
            let word = value.to_slot_word().ok_or_else(|| {
                CallError::MarshalFailed("struct value in a scalar return".into())
            })?;
            if state.flavor == RetFlavor::Int {
                out.ints[0] = word;
            } else {
                out.floats[0] = word;
            }
        }
        RetFlavor::IntPair | RetFlavor::FloatPair | RetFlavor::IntFloat | RetFlavor::FloatInt => {
            // register-decomposed struct return: reverse the VmLoad and
            // BufferStore pairs of the recipe
            let image = value.struct_bytes().ok_or_else(|| {
                CallError::MarshalFailed("scalar value in a struct return".into())
            })?;
            for pair in state.sequence.ret_bindings.chunks_exact(2) {
                let [Binding::VmLoad { storage, .. }, Binding::BufferStore { offset, .. }] = pair
                else {
                    return Err(CallError::MarshalFailed(
                        "return recipe has no upcall writing".into(),
                    ));
                };
                let word = crate::interp::image_word(image, *offset)?;
                match storage.kind {
                    StorageKind::Integer => out.ints[storage.index as usize] = word,
                    StorageKind::Float => out.floats[storage.index as usize] = word,
                    StorageKind::Stack => {
                        return Err(CallError::MarshalFailed(
                            "stack storage in a return recipe".into(),
                        ));
                    }
                }
            }
        }
        RetFlavor::Blob(size) => {
            let image = value.struct_bytes().ok_or_else(|| {
                CallError::MarshalFailed("scalar value in a struct return".into())
            })?;
            if image.len() != size {
                return Err(CallError::MarshalFailed(format!(
                    "handler returned {} bytes, shape expects {size}",
                    image.len()
                )));
            }
            out.blob[..size].copy_from_slice(image);
        }
    }
    Ok(out)
}

#[repr(C)]
struct RetIntPair {
    a: u64,
    b: u64,
}

#[repr(C)]
struct RetFloatPair {
    a: f64,
    b: f64,
}

#[repr(C)]
struct RetIntFloat {
    a: u64,
    b: f64,
}

#[repr(C)]
struct RetFloatInt {
    a: f64,
    b: u64,
}

#[repr(C)]
struct Blob24([u64; 3]);
#[repr(C)]
struct Blob32([u64; 4]);
#[repr(C)]
struct Blob40([u64; 5]);
#[repr(C)]
struct Blob48([u64; 6]);
#[repr(C)]
struct Blob56([u64; 7]);
#[repr(C)]
struct Blob64([u64; 8]);

fn blob_words<const W: usize>(out: &UpcallOut) -> [u64; W] {
    let mut words = [0u64; W];
    for (k, word) in words.iter_mut().enumerate() {
        let mut raw = [0u8; WORD];
        raw.copy_from_slice(&out.blob[k * WORD..(k + 1) * WORD]);
        *word = u64::from_le_bytes(raw);
    }
    words
}

macro_rules! tramp_type {
    ($($name:ident -> $ret:ty;)*) => {
        $(
            #[allow(improper_ctypes_definitions)]
            type $name = extern "C" fn(
                u64, u64, u64, u64, u64, u64, u64, u64,
                f64, f64, f64, f64, f64, f64, f64, f64,
            ) -> $ret;
        )*
    };
}

tramp_type! {
    TrampVoid -> ();
    TrampInt -> u64;
    TrampFloat -> f64;
    TrampIntPair -> RetIntPair;
    TrampFloatPair -> RetFloatPair;
    TrampIntFloat -> RetIntFloat;
    TrampFloatInt -> RetFloatInt;
    TrampBlob24 -> Blob24;
    TrampBlob32 -> Blob32;
    TrampBlob40 -> Blob40;
    TrampBlob48 -> Blob48;
    TrampBlob56 -> Blob56;
    TrampBlob64 -> Blob64;
}

struct FlavorTable {
    void: TrampVoid,
    int: TrampInt,
    float: TrampFloat,
    int_pair: TrampIntPair,
    float_pair: TrampFloatPair,
    int_float: TrampIntFloat,
    float_int: TrampFloatInt,
    blob24: TrampBlob24,
    blob32: TrampBlob32,
    blob40: TrampBlob40,
    blob48: TrampBlob48,
    blob56: TrampBlob56,
    blob64: TrampBlob64,
}

fn trampoline_address(slot: usize, flavor: RetFlavor) -> u64 {
    let table = &TABLES[slot];
    let addr = match flavor {
        RetFlavor::Void => table.void as usize,
        RetFlavor::Int => table.int as usize,
        RetFlavor::Float => table.float as usize,
        RetFlavor::IntPair => table.int_pair as usize,
        RetFlavor::FloatPair => table.float_pair as usize,
        RetFlavor::IntFloat => table.int_float as usize,
        RetFlavor::FloatInt => table.float_int as usize,
        RetFlavor::Blob(24) => table.blob24 as usize,
        RetFlavor::Blob(32) => table.blob32 as usize,
        RetFlavor::Blob(40) => table.blob40 as usize,
        RetFlavor::Blob(48) => table.blob48 as usize,
        RetFlavor::Blob(56) => table.blob56 as usize,
        RetFlavor::Blob(_) => table.blob64 as usize,
    };
    addr as u64
}

macro_rules! slot_trampolines {
    ($($slot:literal => $name:ident),* $(,)?) => {
        $(
            mod $name {
                use super::*;

                fn run(ints: [u64; 8], floats: [f64; 8]) -> UpcallOut {
                    dispatch($slot, ints, floats)
                }

                pub(super) extern "C" fn ret_void(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64, a7: u64,
                    f0: f64, f1: f64, f2: f64, f3: f64, f4: f64, f5: f64, f6: f64, f7: f64,
                ) {
                    run([a0, a1, a2, a3, a4, a5, a6, a7], [f0, f1, f2, f3, f4, f5, f6, f7]);
                }

                pub(super) extern "C" fn ret_int(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64, a7: u64,
                    f0: f64, f1: f64, f2: f64, f3: f64, f4: f64, f5: f64, f6: f64, f7: f64,
                ) -> u64 {
                    run([a0, a1, a2, a3, a4, a5, a6, a7], [f0, f1, f2, f3, f4, f5, f6, f7]).ints[0]
                }

                pub(super) extern "C" fn ret_float(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64, a7: u64,
                    f0: f64, f1: f64, f2: f64, f3: f64, f4: f64, f5: f64, f6: f64, f7: f64,
                ) -> f64 {
                    let out = run([a0, a1, a2, a3, a4, a5, a6, a7], [f0, f1, f2, f3, f4, f5, f6, f7]);
                    f64::from_bits(out.floats[0])
                }

                pub(super) extern "C" fn ret_int_pair(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64, a7: u64,
                    f0: f64, f1: f64, f2: f64, f3: f64, f4: f64, f5: f64, f6: f64, f7: f64,
                ) -> RetIntPair {
                    let out = run([a0, a1, a2, a3, a4, a5, a6, a7], [f0, f1, f2, f3, f4, f5, f6, f7]);
                    RetIntPair { a: out.ints[0], b: out.ints[1] }
                }

                pub(super) extern "C" fn ret_float_pair(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64, a7: u64,
                    f0: f64, f1: f64, f2: f64, f3: f64, f4: f64, f5: f64, f6: f64, f7: f64,
                ) -> RetFloatPair {
                    let out = run([a0, a1, a2, a3, a4, a5, a6, a7], [f0, f1, f2, f3, f4, f5, f6, f7]);
                    RetFloatPair {
                        a: f64::from_bits(out.floats[0]),
                        b: f64::from_bits(out.floats[1]),
                    }
                }

                pub(super) extern "C" fn ret_int_float(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64, a7: u64,
                    f0: f64, f1: f64, f2: f64, f3: f64, f4: f64, f5: f64, f6: f64, f7: f64,
                ) -> RetIntFloat {
                    let out = run([a0, a1, a2, a3, a4, a5, a6, a7], [f0, f1, f2, f3, f4, f5, f6, f7]);
                    RetIntFloat {
                        a: out.ints[0],
                        b: f64::from_bits(out.floats[0]),
                    }
                }

                pub(super) extern "C" fn ret_float_int(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64, a7: u64,
                    f0: f64, f1: f64, f2: f64, f3: f64, f4: f64, f5: f64, f6: f64, f7: f64,
                ) -> RetFloatInt {
                    let out = run([a0, a1, a2, a3, a4, a5, a6, a7], [f0, f1, f2, f3, f4, f5, f6, f7]);
                    RetFloatInt {
                        a: f64::from_bits(out.floats[0]),
                        b: out.ints[0],
                    }
                }

                pub(super) extern "C" fn ret_blob24(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64, a7: u64,
                    f0: f64, f1: f64, f2: f64, f3: f64, f4: f64, f5: f64, f6: f64, f7: f64,
                ) -> Blob24 {
                    let out = run([a0, a1, a2, a3, a4, a5, a6, a7], [f0, f1, f2, f3, f4, f5, f6, f7]);
                    Blob24(blob_words(&out))
                }

                pub(super) extern "C" fn ret_blob32(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64, a7: u64,
                    f0: f64, f1: f64, f2: f64, f3: f64, f4: f64, f5: f64, f6: f64, f7: f64,
                ) -> Blob32 {
                    let out = run([a0, a1, a2, a3, a4, a5, a6, a7], [f0, f1, f2, f3, f4, f5, f6, f7]);
                    Blob32(blob_words(&out))
                }

                pub(super) extern "C" fn ret_blob40(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64, a7: u64,
                    f0: f64, f1: f64, f2: f64, f3: f64, f4: f64, f5: f64, f6: f64, f7: f64,
                ) -> Blob40 {
                    let out = run([a0, a1, a2, a3, a4, a5, a6, a7], [f0, f1, f2, f3, f4, f5, f6, f7]);
                    Blob40(blob_words(&out))
                }

                pub(super) extern "C" fn ret_blob48(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64, a7: u64,
                    f0: f64, f1: f64, f2: f64, f3: f64, f4: f64, f5: f64, f6: f64, f7: f64,
                ) -> Blob48 {
                    let out = run([a0, a1, a2, a3, a4, a5, a6, a7], [f0, f1, f2, f3, f4, f5, f6, f7]);
                    Blob48(blob_words(&out))
                }

                pub(super) extern "C" fn ret_blob56(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64, a7: u64,
                    f0: f64, f1: f64, f2: f64, f3: f64, f4: f64, f5: f64, f6: f64, f7: f64,
                ) -> Blob56 {
                    let out = run([a0, a1, a2, a3, a4, a5, a6, a7], [f0, f1, f2, f3, f4, f5, f6, f7]);
                    Blob56(blob_words(&out))
                }

                pub(super) extern "C" fn ret_blob64(
                    a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64, a7: u64,
                    f0: f64, f1: f64, f2: f64, f3: f64, f4: f64, f5: f64, f6: f64, f7: f64,
                ) -> Blob64 {
                    let out = run([a0, a1, a2, a3, a4, a5, a6, a7], [f0, f1, f2, f3, f4, f5, f6, f7]);
                    Blob64(blob_words(&out))
                }
            }
        )*

        static TABLES: [FlavorTable; POOL_SLOTS] = [
            $(
                FlavorTable {
                    void: $name::ret_void,
                    int: $name::ret_int,
                    float: $name::ret_float,
                    int_pair: $name::ret_int_pair,
                    float_pair: $name::ret_float_pair,
                    int_float: $name::ret_int_float,
                    float_int: $name::ret_float_int,
                    blob24: $name::ret_blob24,
                    blob32: $name::ret_blob32,
                    blob40: $name::ret_blob40,
                    blob48: $name::ret_blob48,
                    blob56: $name::ret_blob56,
                    blob64: $name::ret_blob64,
                },
            )*
        ];
    };
}

slot_trampolines! {
    0 => slot00, 1 => slot01, 2 => slot02, 3 => slot03,
    4 => slot04, 5 => slot05, 6 => slot06, 7 => slot07,
    8 => slot08, 9 => slot09, 10 => slot10, 11 => slot11,
    12 => slot12, 13 => slot13, 14 => slot14, 15 => slot15,
}

#[cfg(test)]
mod tests {
    use super::*;
    use solder_core::Layout;

    fn host_or_skip() -> Option<Platform> {
        Platform::host()
    }

    fn noop_handler(params: Vec<UpcallParam>, ret: Option<Carrier>) -> UpcallHandler {
        UpcallHandler::new(params, ret, |_, _| Ok(None))
    }

    #[test]
    fn test_missing_scope_token_rejected() {
        let Some(platform) = host_or_skip() else { return };
        let handler = noop_handler(vec![UpcallParam::Value(Carrier::I64)], None);
        let desc = FunctionDescriptor::new(vec![Layout::int(8).unwrap()], None);
        let scope = Scope::new();
        assert!(matches!(
            UpcallStub::new(handler, &desc, &scope, platform),
            Err(UpcallError::HandlerShape(_))
        ));
    }

    #[test]
    fn test_duplicate_scope_token_rejected() {
        let Some(platform) = host_or_skip() else { return };
        let handler = noop_handler(
            vec![UpcallParam::ScopeToken, UpcallParam::ScopeToken],
            None,
        );
        let desc = FunctionDescriptor::new(vec![Layout::pointer()], None);
        let scope = Scope::new();
        assert!(matches!(
            UpcallStub::new(handler, &desc, &scope, platform),
            Err(UpcallError::HandlerShape(_))
        ));
    }

    #[test]
    fn test_closed_scope_rejected() {
        let Some(platform) = host_or_skip() else { return };
        let handler = noop_handler(vec![UpcallParam::ScopeToken], None);
        let desc = FunctionDescriptor::new(vec![], None);
        let scope = Scope::new();
        scope.close().unwrap();
        assert!(matches!(
            UpcallStub::new(handler, &desc, &scope, platform),
            Err(UpcallError::Scope(_))
        ));
    }

    #[test]
    fn test_slot_reuse_after_release() {
        let Some(platform) = host_or_skip() else { return };
        let desc = FunctionDescriptor::new(vec![], None);
        let scope = Scope::new();
        let a = UpcallStub::new(
            noop_handler(vec![UpcallParam::ScopeToken], None),
            &desc,
            &scope,
            platform,
        )
        .unwrap();
        let slot = a.slot;
        drop(a);
        let b = UpcallStub::new(
            noop_handler(vec![UpcallParam::ScopeToken], None),
            &desc,
            &scope,
            platform,
        )
        .unwrap();
        assert_eq!(b.slot, slot);
    }

    #[test]
    fn test_flavor_addresses_differ() {
        let table = &TABLES[0];
        assert_ne!(table.void as usize, table.int as usize);
        assert_ne!(trampoline_address(0, RetFlavor::Int), trampoline_address(1, RetFlavor::Int));
    }
}
