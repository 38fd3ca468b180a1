//! Argument buffer layout
//!
//! Every downcall marshals through one flat native buffer whose shape is
//! fixed per ABI: a three-word header (target address, outgoing stack byte
//! count, pointer to the stack-argument block), then one 8-byte slot per
//! argument register, then one slot per return register. The universal
//! adapter reads the header and register slots; the return slots are
//! written back after the transition.
//!
//! The integer-argument region carries one slot beyond the ABI's register
//! count for the hidden in-memory-return pointer on platforms where it does
//! not occupy a numbered argument register.

use solder_abi::{AbiDescriptor, Storage, StorageKind};

const WORD: usize = 8;

/// Slot offsets of the per-call argument buffer for one ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BufferLayout {
    /// Offset of the target function address.
    pub target: usize,
    /// Offset of the outgoing stack-argument byte count.
    pub stack_bytes: usize,
    /// Offset of the pointer to the stack-argument block.
    pub stack_ptr: usize,
    /// Offset of integer argument slot 0.
    pub int_args: usize,
    /// Offset of float argument slot 0.
    pub float_args: usize,
    /// Offset of integer return slot 0.
    pub int_rets: usize,
    /// Offset of float return slot 0.
    pub float_rets: usize,
    /// Total buffer size in bytes.
    pub size: usize,
    int_arg_slots: u32,
    float_arg_slots: u32,
    int_ret_slots: u32,
    float_ret_slots: u32,
}

impl BufferLayout {
    /// The buffer shape for one ABI descriptor.
    pub fn of(abi: &AbiDescriptor) -> BufferLayout {
        // extra integer slot for the dedicated indirect-result register
        let int_arg_slots = abi.int_arg_regs + 1;
        let float_arg_slots = abi.float_arg_regs;
        let int_ret_slots = abi.int_ret_regs;
        let float_ret_slots = abi.float_ret_regs;

        let target = 0;
        let stack_bytes = target + WORD;
        let stack_ptr = stack_bytes + WORD;
        let int_args = stack_ptr + WORD;
        let float_args = int_args + int_arg_slots as usize * WORD;
        let int_rets = float_args + float_arg_slots as usize * WORD;
        let float_rets = int_rets + int_ret_slots as usize * WORD;
        let size = float_rets + float_ret_slots as usize * WORD;

        BufferLayout {
            target,
            stack_bytes,
            stack_ptr,
            int_args,
            float_args,
            int_rets,
            float_rets,
            size,
            int_arg_slots,
            float_arg_slots,
            int_ret_slots,
            float_ret_slots,
        }
    }

    /// Buffer offset of an argument storage. Stack storages live in the
    /// separate stack-argument block and have no buffer slot.
    pub fn arg_offset(&self, storage: Storage) -> Option<usize> {
        match storage.kind {
            StorageKind::Integer if storage.index < self.int_arg_slots => {
                Some(self.int_args + storage.index as usize * WORD)
            }
            StorageKind::Float if storage.index < self.float_arg_slots => {
                Some(self.float_args + storage.index as usize * WORD)
            }
            _ => None,
        }
    }

    /// Buffer offset of a return storage.
    pub fn ret_offset(&self, storage: Storage) -> Option<usize> {
        match storage.kind {
            StorageKind::Integer if storage.index < self.int_ret_slots => {
                Some(self.int_rets + storage.index as usize * WORD)
            }
            StorageKind::Float if storage.index < self.float_ret_slots => {
                Some(self.float_rets + storage.index as usize * WORD)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solder_abi::Platform;

    #[test]
    fn test_header_is_three_words() {
        let layout = BufferLayout::of(AbiDescriptor::of(Platform::SysVx64));
        assert_eq!(layout.target, 0);
        assert_eq!(layout.stack_bytes, 8);
        assert_eq!(layout.stack_ptr, 16);
        assert_eq!(layout.int_args, 24);
    }

    #[test]
    fn test_regions_do_not_overlap() {
        for platform in [Platform::SysVx64, Platform::Win64, Platform::AArch64] {
            let abi = AbiDescriptor::of(platform);
            let layout = BufferLayout::of(abi);
            assert!(layout.int_args < layout.float_args);
            assert!(layout.float_args < layout.int_rets);
            assert!(layout.int_rets <= layout.float_rets);
            assert!(layout.float_rets <= layout.size);
        }
    }

    #[test]
    fn test_hidden_imr_slot_present() {
        let abi = AbiDescriptor::of(Platform::AArch64);
        let layout = BufferLayout::of(abi);
        // the indirect-result register gets the slot past the numbered args
        let hidden = Storage::int_reg(abi.int_arg_regs);
        assert!(layout.arg_offset(hidden).is_some());
        assert!(layout
            .arg_offset(Storage::int_reg(abi.int_arg_regs + 1))
            .is_none());
    }

    #[test]
    fn test_stack_storage_has_no_buffer_slot() {
        let layout = BufferLayout::of(AbiDescriptor::of(Platform::SysVx64));
        assert_eq!(layout.arg_offset(Storage::stack(0)), None);
    }

    #[test]
    fn test_arg_and_ret_slots_are_distinct() {
        let layout = BufferLayout::of(AbiDescriptor::of(Platform::SysVx64));
        let arg0 = layout.arg_offset(Storage::int_reg(0));
        let ret0 = layout.ret_offset(Storage::int_reg(0));
        assert_ne!(arg0, ret0);
    }
}
