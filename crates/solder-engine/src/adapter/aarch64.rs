//! AArch64 AAPCS64 transition
//!
//! The canonical call shape saturates the convention: eight integer
//! register arguments (x0..x7), eight float register arguments (d0..d7)
//! and a fixed block of stack words.
//!
//! In-memory returns cannot name the indirect-result register (x8) as an
//! argument, so the canonical shape returns an oversized blob: the
//! compiler materializes the temporary, passes its address in x8 itself,
//! and the result bytes are copied to the marshaled destination after the
//! call. Blob shapes come in size buckets; a return larger than the
//! biggest bucket is an unsupported shape.

use super::{Adapter, RetKind, ReturnRegs, TransferFrame};
use crate::error::CallError;

#[repr(C)]
struct IntPair {
    a: u64, // x0
    b: u64, // x1
}

#[repr(C)]
struct FloatPair {
    a: f64, // d0
    b: f64, // d1
}

#[repr(C)]
struct IntFloat {
    a: u64, // x0
    b: f64, // d0
}

#[repr(C)]
struct FloatInt {
    a: f64, // d0
    b: u64, // x0
}

#[repr(C)]
struct Blob24([u64; 3]);
#[repr(C)]
struct Blob32([u64; 4]);
#[repr(C)]
struct Blob48([u64; 6]);
#[repr(C)]
struct Blob64([u64; 8]);
#[repr(C)]
struct Blob128([u64; 16]);
#[repr(C)]
struct Blob256([u64; 32]);

macro_rules! call_shape {
    ($($name:ident -> $ret:ty;)*) => {
        $(
            #[allow(improper_ctypes_definitions)]
            type $name = unsafe extern "C" fn(
                u64, u64, u64, u64, u64, u64, u64, u64,
                f64, f64, f64, f64, f64, f64, f64, f64,
                u64, u64, u64, u64, u64, u64, u64, u64,
            ) -> $ret;
        )*
    };
}

call_shape! {
    CallVoid -> ();
    CallInt -> u64;
    CallFloat -> f64;
    CallIntPair -> IntPair;
    CallFloatPair -> FloatPair;
    CallIntFloat -> IntFloat;
    CallFloatInt -> FloatInt;
    CallBlob24 -> Blob24;
    CallBlob32 -> Blob32;
    CallBlob48 -> Blob48;
    CallBlob64 -> Blob64;
    CallBlob128 -> Blob128;
    CallBlob256 -> Blob256;
}

pub(crate) struct HostAdapter;

impl Adapter for HostAdapter {
    unsafe fn transfer(&self, frame: &TransferFrame) -> Result<ReturnRegs, CallError> {
        let [i0, i1, i2, i3, i4, i5, i6, i7, _hidden] = frame.ints;
        let f = frame.floats.map(f64::from_bits);
        let s = frame.stack;

        macro_rules! call {
            ($shape:ty) => {
                (std::mem::transmute::<u64, $shape>(frame.target))(
                    i0, i1, i2, i3, i4, i5, i6, i7,
                    f[0], f[1], f[2], f[3], f[4], f[5], f[6], f[7],
                    s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7],
                )
            };
        }

        let mut regs = ReturnRegs::default();
        match frame.ret {
            RetKind::Void => {
                call!(CallVoid);
            }
            RetKind::Int => regs.ints[0] = call!(CallInt),
            RetKind::Float => regs.floats[0] = call!(CallFloat).to_bits(),
            RetKind::IntPair => {
                let r = call!(CallIntPair);
                regs.ints = [r.a, r.b];
            }
            RetKind::FloatPair => {
                let r = call!(CallFloatPair);
                regs.floats = [r.a.to_bits(), r.b.to_bits()];
            }
            RetKind::IntFloat => {
                let r = call!(CallIntFloat);
                regs.ints[0] = r.a;
                regs.floats[0] = r.b.to_bits();
            }
            RetKind::FloatInt => {
                let r = call!(CallFloatInt);
                regs.floats[0] = r.a.to_bits();
                regs.ints[0] = r.b;
            }
            RetKind::InMemory => {
                let info = frame.imr.ok_or_else(|| {
                    CallError::MarshalFailed("in-memory return without a destination".into())
                })?;
                macro_rules! blob {
                    ($shape:ty, $blob:ty) => {{
                        let blob: $blob = call!($shape);
                        // Safety: the destination was allocated info.size
                        // bytes by the return recipe.
                        std::ptr::copy_nonoverlapping(
                            blob.0.as_ptr() as *const u8,
                            info.dest as *mut u8,
                            info.size,
                        );
                    }};
                }
                match info.size {
                    0..=24 => blob!(CallBlob24, Blob24),
                    25..=32 => blob!(CallBlob32, Blob32),
                    33..=48 => blob!(CallBlob48, Blob48),
                    49..=64 => blob!(CallBlob64, Blob64),
                    65..=128 => blob!(CallBlob128, Blob128),
                    129..=256 => blob!(CallBlob256, Blob256),
                    _ => {
                        return Err(CallError::UnsupportedShape(format!(
                            "in-memory return of {} bytes exceeds the largest blob shape",
                            info.size
                        )));
                    }
                }
            }
        }
        Ok(regs)
    }
}
