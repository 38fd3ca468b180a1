//! Marshaling recipe language
//!
//! A binding is one primitive step of the marshaling plan for a single
//! argument or return value. The calling-sequence builder emits a short
//! binding list per value; the interpreter (and the specialized write plan
//! compiled from it) executes the list against the per-call argument buffer.
//!
//! Argument recipes run managed-to-native before the transition; return
//! recipes run native-to-managed after it. Each list threads one current
//! value from step to step.

use solder_abi::Storage;
use solder_core::Carrier;

/// One primitive marshaling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Write the current value into a physical storage slot.
    ///
    /// Integers narrower than the slot are written oversized: the full
    /// 64-bit sign extension fills the slot.
    VmStore {
        /// Destination register or stack slot.
        storage: Storage,
        /// Declared width and class of the value.
        carrier: Carrier,
    },

    /// Read a value of the given carrier out of a physical storage slot.
    ///
    /// Only the declared width is interpreted; upper slot bits are ignored.
    VmLoad {
        /// Source register or stack slot.
        storage: Storage,
        /// Declared width and class of the value.
        carrier: Carrier,
    },

    /// Copy the pointed-to bytes of the current struct value into fresh
    /// call-lifetime scratch and replace the current value with the copy's
    /// address.
    Copy {
        /// Bytes to copy.
        size: usize,
        /// Required scratch alignment.
        align: usize,
    },

    /// Allocate zeroed call-lifetime scratch and make its address the
    /// current value. Used for in-memory-return destinations.
    Allocate {
        /// Bytes to allocate.
        size: usize,
        /// Required alignment.
        align: usize,
    },

    /// Treat the current value as an address, offset it, and load the
    /// pointed-to value of the given carrier as the new current value.
    /// Struct carriers load the full pointed-to byte image.
    Dereference {
        /// Byte offset added to the address before the load.
        offset: usize,
        /// Type of the loaded value.
        carrier: Carrier,
    },

    /// Load one word of the current struct value's byte image.
    ///
    /// Reads `min(8, remaining)` bytes at the offset, zero-padding short
    /// trailing words, and makes the word the current value.
    BufferLoad {
        /// Byte offset into the struct image.
        offset: usize,
        /// Class the word travels under.
        carrier: Carrier,
    },

    /// Store the current word into a struct byte image at an offset,
    /// writing `min(8, remaining)` bytes.
    BufferStore {
        /// Byte offset into the struct image.
        offset: usize,
        /// Class the word traveled under.
        carrier: Carrier,
    },
}

impl Binding {
    /// The storage this binding touches, if it addresses one directly.
    pub fn storage(&self) -> Option<Storage> {
        match self {
            Binding::VmStore { storage, .. } | Binding::VmLoad { storage, .. } => Some(*storage),
            _ => None,
        }
    }

    /// True for steps that need call-lifetime scratch memory.
    pub fn allocates(&self) -> bool {
        matches!(self, Binding::Copy { .. } | Binding::Allocate { .. })
    }

    /// Scratch bytes this step consumes, including alignment slack.
    pub fn scratch_bytes(&self) -> usize {
        match self {
            Binding::Copy { size, align } | Binding::Allocate { size, align } => {
                solder_core::align_up(*size, *align) + align
            }
            _ => 0,
        }
    }
}
