//! Per-platform ABI descriptors
//!
//! An `AbiDescriptor` captures everything the calling-sequence builder needs
//! to classify a signature on one platform: argument/return register counts
//! per storage class, the stack slot unit, and the aggregate-passing
//! parameters. Descriptors are fixed per OS/architecture pair, built once,
//! and shared read-only for the life of the process.

use once_cell::sync::Lazy;

use crate::storage::StorageKind;

/// Supported OS/architecture pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// System V AMD64 (Linux, macOS on x86-64).
    SysVx64,
    /// Microsoft x64.
    Win64,
    /// AArch64 AAPCS64 (Linux, macOS on arm64).
    AArch64,
}

impl Platform {
    /// The platform this process is running on, if supported.
    pub fn host() -> Option<Platform> {
        #[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
        {
            Some(Platform::SysVx64)
        }
        #[cfg(all(target_arch = "x86_64", target_os = "windows"))]
        {
            Some(Platform::Win64)
        }
        #[cfg(target_arch = "aarch64")]
        {
            Some(Platform::AArch64)
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            None
        }
    }
}

/// How the platform passes aggregates too large for registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LargeAggregate {
    /// Copy to caller-owned scratch and pass its address (Win64, AArch64).
    ByReference,
    /// Spread the aggregate bytes over outgoing stack slots (SysV).
    OnStack,
}

/// When an aggregate word may use a float register instead of an integer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFloatRule {
    /// Classify each 8-byte word independently (SysV eightbytes).
    PerWord,
    /// Only aggregates made entirely of 8-byte floats use float registers
    /// (AAPCS64 homogeneous aggregates, restricted to f64 elements).
    Homogeneous,
    /// Aggregates never use float registers (Win64).
    Never,
}

/// Immutable description of one platform calling convention.
#[derive(Debug)]
pub struct AbiDescriptor {
    /// Human-readable convention name.
    pub name: &'static str,
    /// Platform this descriptor belongs to.
    pub platform: Platform,
    /// Number of integer argument registers.
    pub int_arg_regs: u32,
    /// Number of float argument registers.
    pub float_arg_regs: u32,
    /// Number of integer return registers.
    pub int_ret_regs: u32,
    /// Number of float return registers.
    pub float_ret_regs: u32,
    /// Natural byte size of one outgoing stack slot.
    pub stack_slot_size: usize,
    /// Largest aggregate passed in registers rather than memory.
    pub register_aggregate_max: usize,
    /// Whether register-passed aggregates must additionally have an exact
    /// power-of-two size (Win64: 1, 2, 4 or 8 bytes).
    pub register_aggregate_exact: bool,
    /// Convention for aggregates above `register_aggregate_max`.
    pub large_aggregate: LargeAggregate,
    /// Float-register eligibility for aggregate words.
    pub aggregate_float_rule: AggregateFloatRule,
    /// Whether a by-value aggregate that does not fit the remaining
    /// registers exhausts those registers for later arguments (AAPCS64)
    /// instead of leaving them available (SysV).
    pub aggregate_spill_exhausts_regs: bool,
    /// Whether an in-memory return consumes the first integer argument
    /// register for the hidden destination pointer (SysV/Win64: yes;
    /// AArch64 uses a dedicated indirect-result register instead).
    pub imr_consumes_int_reg: bool,
    /// Whether integer and float arguments share one register sequence by
    /// position (Win64) instead of drawing from independent pools.
    pub unified_arg_regs: bool,
}

impl AbiDescriptor {
    /// True when the storage class addresses stack memory.
    pub fn is_stack_kind(&self, kind: StorageKind) -> bool {
        kind == StorageKind::Stack
    }

    /// Physical byte size of one slot of the given storage class.
    pub fn type_size(&self, kind: StorageKind) -> usize {
        match kind {
            StorageKind::Integer | StorageKind::Float => 8,
            StorageKind::Stack => self.stack_slot_size,
        }
    }

    /// The memoized descriptor for a platform.
    pub fn of(platform: Platform) -> &'static AbiDescriptor {
        match platform {
            Platform::SysVx64 => &SYS_V_X64,
            Platform::Win64 => &WIN_64,
            Platform::AArch64 => &AARCH_64,
        }
    }

    /// The descriptor of the running process, if the platform is supported.
    pub fn host() -> Option<&'static AbiDescriptor> {
        Platform::host().map(AbiDescriptor::of)
    }
}

static SYS_V_X64: Lazy<AbiDescriptor> = Lazy::new(|| AbiDescriptor {
    name: "SysV x86-64",
    platform: Platform::SysVx64,
    int_arg_regs: 6,   // rdi rsi rdx rcx r8 r9
    float_arg_regs: 8, // xmm0..xmm7
    int_ret_regs: 2,   // rax rdx
    float_ret_regs: 2, // xmm0 xmm1
    stack_slot_size: 8,
    register_aggregate_max: 16,
    register_aggregate_exact: false,
    large_aggregate: LargeAggregate::OnStack,
    aggregate_float_rule: AggregateFloatRule::PerWord,
    aggregate_spill_exhausts_regs: false,
    imr_consumes_int_reg: true, // hidden pointer in rdi
    unified_arg_regs: false,
});

static WIN_64: Lazy<AbiDescriptor> = Lazy::new(|| AbiDescriptor {
    name: "Windows x64",
    platform: Platform::Win64,
    int_arg_regs: 4,   // rcx rdx r8 r9
    float_arg_regs: 4, // xmm0..xmm3
    int_ret_regs: 1,   // rax
    float_ret_regs: 1, // xmm0
    stack_slot_size: 8,
    register_aggregate_max: 8,
    register_aggregate_exact: true,
    large_aggregate: LargeAggregate::ByReference,
    aggregate_float_rule: AggregateFloatRule::Never,
    aggregate_spill_exhausts_regs: false,
    imr_consumes_int_reg: true, // hidden pointer in rcx
    unified_arg_regs: true,
});

static AARCH_64: Lazy<AbiDescriptor> = Lazy::new(|| AbiDescriptor {
    name: "AArch64 AAPCS",
    platform: Platform::AArch64,
    int_arg_regs: 8,   // x0..x7
    float_arg_regs: 8, // v0..v7
    int_ret_regs: 2,   // x0 x1
    float_ret_regs: 2, // d0 d1
    stack_slot_size: 8,
    register_aggregate_max: 16,
    register_aggregate_exact: false,
    large_aggregate: LargeAggregate::ByReference,
    aggregate_float_rule: AggregateFloatRule::Homogeneous,
    aggregate_spill_exhausts_regs: true,
    imr_consumes_int_reg: false, // hidden pointer in x8
    unified_arg_regs: false,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors_are_singletons() {
        let a = AbiDescriptor::of(Platform::SysVx64);
        let b = AbiDescriptor::of(Platform::SysVx64);
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_sysv_shape() {
        let abi = AbiDescriptor::of(Platform::SysVx64);
        assert_eq!(abi.int_arg_regs, 6);
        assert_eq!(abi.float_arg_regs, 8);
        assert_eq!(abi.large_aggregate, LargeAggregate::OnStack);
        assert!(abi.imr_consumes_int_reg);
        assert!(!abi.unified_arg_regs);
    }

    #[test]
    fn test_win64_shape() {
        let abi = AbiDescriptor::of(Platform::Win64);
        assert_eq!(abi.int_arg_regs, 4);
        assert_eq!(abi.register_aggregate_max, 8);
        assert!(abi.register_aggregate_exact);
        assert!(abi.unified_arg_regs);
        assert_eq!(abi.aggregate_float_rule, AggregateFloatRule::Never);
    }

    #[test]
    fn test_aarch64_shape() {
        let abi = AbiDescriptor::of(Platform::AArch64);
        assert_eq!(abi.int_arg_regs, 8);
        assert!(!abi.imr_consumes_int_reg);
        assert_eq!(abi.large_aggregate, LargeAggregate::ByReference);
    }

    #[test]
    fn test_stack_predicates() {
        let abi = AbiDescriptor::of(Platform::SysVx64);
        assert!(abi.is_stack_kind(StorageKind::Stack));
        assert!(!abi.is_stack_kind(StorageKind::Integer));
        assert_eq!(abi.type_size(StorageKind::Stack), 8);
    }

    #[test]
    fn test_host_matches_target() {
        // the host platform must be one of the supported descriptors on CI
        if let Some(abi) = AbiDescriptor::host() {
            assert!(matches!(
                abi.platform,
                Platform::SysVx64 | Platform::Win64 | Platform::AArch64
            ));
        }
    }
}
