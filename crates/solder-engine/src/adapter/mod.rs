//! Universal native-transition adapters
//!
//! An adapter takes a filled transfer frame (the register and stack-slot
//! words marshaled from the argument buffer) and performs one canonical C
//! call on the host platform, returning the raw return-register words.
//! Transfer works by over-passing: the canonical call shape hands the
//! callee every argument register plus a fixed number of stack words, and
//! the callee reads only what its real signature declares.
//!
//! In-memory returns ride the platform's own indirect-result convention:
//! the canonical shape either declares the hidden destination as a leading
//! pointer argument (SysV, where it occupies the first integer register)
//! or returns an oversized blob so the compiler emits the dedicated
//! indirect-result register itself (AArch64).
//!
//! Adapters are memoized process-wide per platform; requesting one for a
//! platform other than the host fails with `CallError::UnsupportedShape`.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use solder_abi::{Platform, StorageKind};

use crate::error::CallError;
use crate::sequence::CallingSequence;

#[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
mod x86_64;
#[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
use x86_64 as host;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
use aarch64 as host;

/// Integer argument slots a transfer frame carries: the widest supported
/// register file plus the dedicated indirect-result slot.
pub(crate) const INT_SLOTS: usize = 9;
/// Float argument slots a transfer frame carries.
pub(crate) const FLOAT_SLOTS: usize = 8;
/// Stack words the canonical call shapes pass.
pub(crate) const STACK_WORDS: usize = 8;

/// Register and stack words for one native transition.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransferFrame {
    /// Target function address.
    pub target: u64,
    /// Integer argument register words, hidden indirect-result slot last.
    pub ints: [u64; INT_SLOTS],
    /// Float argument register words as raw bits.
    pub floats: [u64; FLOAT_SLOTS],
    /// Outgoing stack-argument words.
    pub stack: [u64; STACK_WORDS],
    /// In-memory-return destination and size, when the call has one.
    pub imr: Option<ImrInfo>,
    /// Return-register shape of the callee.
    pub ret: RetKind,
}

/// Hidden in-memory-return destination.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ImrInfo {
    /// Destination address the boxed return is read from.
    pub dest: u64,
    /// Bytes the callee writes.
    pub size: usize,
}

/// The return-register shapes the canonical call signatures cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetKind {
    Void,
    Int,
    Float,
    IntPair,
    FloatPair,
    IntFloat,
    FloatInt,
    InMemory,
}

/// Raw return-register words of one transition.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ReturnRegs {
    pub ints: [u64; 2],
    pub floats: [u64; 2],
}

/// One platform's transition implementation.
pub(crate) trait Adapter: Send + Sync {
    /// Perform the native call described by the frame.
    ///
    /// # Safety
    /// `frame.target` must be the address of a function whose real
    /// signature is compatible with the frame contents, and every pointer
    /// marshaled into the frame must be valid for the callee's accesses.
    unsafe fn transfer(&self, frame: &TransferFrame) -> Result<ReturnRegs, CallError>;
}

static ADAPTERS: Lazy<DashMap<Platform, Arc<dyn Adapter>>> = Lazy::new(DashMap::new);

/// The memoized adapter for a platform.
pub(crate) fn adapter_for(platform: Platform) -> Result<Arc<dyn Adapter>, CallError> {
    if Platform::host() != Some(platform) {
        return Err(CallError::UnsupportedShape(format!(
            "platform {platform:?} is not the host"
        )));
    }
    let entry = ADAPTERS
        .entry(platform)
        .or_try_insert_with(|| host_adapter().ok_or_else(unsupported_host))?;
    Ok(entry.value().clone())
}

#[cfg(any(
    all(target_arch = "x86_64", not(target_os = "windows")),
    target_arch = "aarch64"
))]
fn host_adapter() -> Option<Arc<dyn Adapter>> {
    Some(Arc::new(host::HostAdapter))
}

#[cfg(not(any(
    all(target_arch = "x86_64", not(target_os = "windows")),
    target_arch = "aarch64"
)))]
fn host_adapter() -> Option<Arc<dyn Adapter>> {
    None
}

fn unsupported_host() -> CallError {
    CallError::UnsupportedShape("no transition adapter for this architecture".into())
}

/// Derive the return-register shape of a sequence.
pub(crate) fn ret_kind(sequence: &CallingSequence) -> Result<RetKind, CallError> {
    if sequence.in_memory_return {
        return Ok(RetKind::InMemory);
    }
    let classes: Vec<StorageKind> = sequence
        .ret_move_storages()
        .iter()
        .map(|s| s.kind)
        .collect();
    use StorageKind::{Float, Integer};
    match classes[..] {
        [] => Ok(RetKind::Void),
        [Integer] => Ok(RetKind::Int),
        [Float] => Ok(RetKind::Float),
        [Integer, Integer] => Ok(RetKind::IntPair),
        [Float, Float] => Ok(RetKind::FloatPair),
        [Integer, Float] => Ok(RetKind::IntFloat),
        [Float, Integer] => Ok(RetKind::FloatInt),
        _ => Err(CallError::UnsupportedShape(format!(
            "return registers {classes:?} exceed the canonical shapes"
        ))),
    }
}
