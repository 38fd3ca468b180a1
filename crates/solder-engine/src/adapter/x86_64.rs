//! SysV x86-64 transition
//!
//! The canonical call shape saturates the convention: six integer register
//! arguments (rdi..r9), eight float register arguments (xmm0..xmm7) and a
//! fixed block of stack words. Callees with fewer arguments ignore the
//! surplus registers and stack slots.
//!
//! In-memory returns need no special shape: the convention passes the
//! hidden destination in rdi and returns it in rax, which is exactly a
//! leading pointer argument with a pointer return. The recipe already
//! placed the destination in the first integer slot.

use super::{Adapter, RetKind, ReturnRegs, TransferFrame};
use crate::error::CallError;

#[repr(C)]
struct IntPair {
    a: u64, // rax
    b: u64, // rdx
}

#[repr(C)]
struct FloatPair {
    a: f64, // xmm0
    b: f64, // xmm1
}

#[repr(C)]
struct IntFloat {
    a: u64, // rax
    b: f64, // xmm0
}

#[repr(C)]
struct FloatInt {
    a: f64, // xmm0
    b: u64, // rax
}

macro_rules! call_shape {
    ($($name:ident -> $ret:ty;)*) => {
        $(
            #[allow(improper_ctypes_definitions)]
            type $name = unsafe extern "C" fn(
                u64, u64, u64, u64, u64, u64,
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
}

pub(crate) struct HostAdapter;

impl Adapter for HostAdapter {
    unsafe fn transfer(&self, frame: &TransferFrame) -> Result<ReturnRegs, CallError> {
        let [i0, i1, i2, i3, i4, i5, ..] = frame.ints;
        let f = frame.floats.map(f64::from_bits);
        let s = frame.stack;

        macro_rules! call {
            ($shape:ty) => {
                (std::mem::transmute::<u64, $shape>(frame.target))(
                    i0, i1, i2, i3, i4, i5,
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
                // rdi carries the destination, rax returns it
                call!(CallInt);
            }
        }
        Ok(regs)
    }
}
