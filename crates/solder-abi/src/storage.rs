//! Physical storage locations
//!
//! A `Storage` identifies one register or one stack slot of an ABI. Two
//! storages are equal iff their class and index match; the physical slot
//! size is transport metadata and takes no part in equality or hashing, so
//! storages can serve as map keys.

use std::hash::{Hash, Hasher};

/// The storage classes an ABI assigns values to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// General-purpose (integer) argument or return register.
    Integer,
    /// Floating-point / vector argument or return register.
    Float,
    /// A slot in the outgoing stack-argument area.
    Stack,
}

/// One register or stack slot.
#[derive(Debug, Clone, Copy, Eq)]
pub struct Storage {
    /// Storage class.
    pub kind: StorageKind,
    /// Register number or stack slot index within the class.
    pub index: u32,
    /// Physical slot size in bytes.
    pub size: usize,
}

impl PartialEq for Storage {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.index == other.index
    }
}

impl Hash for Storage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.index.hash(state);
    }
}

impl Storage {
    /// The `index`-th integer argument/return register.
    pub fn int_reg(index: u32) -> Storage {
        Storage {
            kind: StorageKind::Integer,
            index,
            size: 8,
        }
    }

    /// The `index`-th float argument/return register.
    pub fn float_reg(index: u32) -> Storage {
        Storage {
            kind: StorageKind::Float,
            index,
            size: 8,
        }
    }

    /// The `index`-th stack slot of the outgoing argument area.
    pub fn stack(index: u32) -> Storage {
        Storage {
            kind: StorageKind::Stack,
            index,
            size: 8,
        }
    }

    /// True for stack-slot storage.
    pub fn is_stack(&self) -> bool {
        self.kind == StorageKind::Stack
    }
}

impl std::fmt::Display for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            StorageKind::Integer => write!(f, "int{}", self.index),
            StorageKind::Float => write!(f, "float{}", self.index),
            StorageKind::Stack => write!(f, "stack{}", self.index),
        }
    }
}
