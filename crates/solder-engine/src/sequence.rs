//! Calling sequences
//!
//! A `CallingSequence` is the immutable result of classifying one
//! (signature, function descriptor) pair against one ABI descriptor: a
//! binding recipe per argument, a recipe for the return value, and the
//! derived storage bookkeeping the invocation engines need. Sequences are
//! built once, cached, and shared by any number of concurrent calls.

use rustc_hash::FxHashMap;
use solder_abi::{AbiDescriptor, Storage, StorageKind};
use solder_core::{Carrier, Layout};

use crate::binding::Binding;

/// Managed-side view of a function: argument carriers and optional return
/// carrier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Argument carriers in call order.
    pub params: Vec<Carrier>,
    /// Return carrier, or `None` for void.
    pub ret: Option<Carrier>,
}

impl Signature {
    /// A signature with the given parameters and return carrier.
    pub fn new(params: Vec<Carrier>, ret: Option<Carrier>) -> Signature {
        Signature { params, ret }
    }
}

/// Native-side view of a function: argument layouts and optional return
/// layout.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDescriptor {
    /// Argument layouts in call order.
    pub args: Vec<Layout>,
    /// Return layout, or `None` for void.
    pub ret: Option<Layout>,
    /// Marks calls short enough to skip thread-state bookkeeping.
    pub trivial: bool,
}

impl FunctionDescriptor {
    /// A non-trivial descriptor with the given argument and return layouts.
    pub fn new(args: Vec<Layout>, ret: Option<Layout>) -> FunctionDescriptor {
        FunctionDescriptor {
            args,
            ret,
            trivial: false,
        }
    }

    /// Mark the descriptor as a trivial call.
    pub fn trivial(mut self) -> FunctionDescriptor {
        self.trivial = true;
        self
    }
}

impl std::hash::Hash for FunctionDescriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.args.hash(state);
        self.ret.hash(state);
        self.trivial.hash(state);
    }
}

impl Eq for FunctionDescriptor {}

/// The classified marshaling plan for one function on one platform.
#[derive(Debug)]
pub struct CallingSequence {
    /// Managed-side signature.
    pub signature: Signature,
    /// Native-side descriptor.
    pub descriptor: FunctionDescriptor,
    /// The ABI this sequence was classified against.
    pub abi: &'static AbiDescriptor,
    /// One binding recipe per argument, in call order.
    pub arg_bindings: Vec<Vec<Binding>>,
    /// Binding recipe for the return value (empty for void).
    pub ret_bindings: Vec<Binding>,
    /// Whether the return value travels through a hidden memory destination.
    pub in_memory_return: bool,
    /// Trivial-call marker carried over from the descriptor.
    pub trivial: bool,
}

impl CallingSequence {
    /// Every storage an argument recipe writes, in recipe order.
    pub fn arg_move_storages(&self) -> Vec<Storage> {
        self.arg_bindings
            .iter()
            .flatten()
            .filter_map(Binding::storage)
            .collect()
    }

    /// Every storage the return recipe reads or writes, in recipe order.
    pub fn ret_move_storages(&self) -> Vec<Storage> {
        self.ret_bindings.iter().filter_map(Binding::storage).collect()
    }

    /// Total bytes of outgoing stack arguments.
    pub fn stack_args_bytes(&self) -> usize {
        let slot = self.abi.stack_slot_size;
        self.arg_move_storages()
            .iter()
            .filter(|s| s.is_stack())
            .map(|s| (s.index as usize + 1) * slot)
            .max()
            .unwrap_or(0)
    }

    /// Upper bound on call-lifetime scratch bytes (copies and in-memory
    /// return destinations).
    pub fn scratch_bytes(&self) -> usize {
        self.arg_bindings
            .iter()
            .flatten()
            .chain(self.ret_bindings.iter())
            .map(Binding::scratch_bytes)
            .sum()
    }

    /// Dense index of each distinct argument storage of one class, in
    /// first-use order. Return-register storages are indexed separately
    /// because argument and return registers of the same number are
    /// different physical slots.
    pub fn index_map(&self, kind: StorageKind) -> FxHashMap<Storage, usize> {
        let mut map = FxHashMap::default();
        for storage in self.arg_move_storages() {
            if storage.kind == kind {
                let next = map.len();
                map.entry(storage).or_insert(next);
            }
        }
        map
    }
}
