//! Calling-sequence builder
//!
//! Classifies a (signature, function descriptor) pair against an ABI
//! descriptor and emits the binding recipes. Classification is a pure
//! function of its inputs: the same triple always produces the same
//! sequence, which is what makes process-wide sequence caching sound.
//!
//! The return value is classified before the arguments so that an
//! in-memory return can reserve its hidden destination register ahead of
//! argument allocation on platforms where the two share a register file.

use solder_abi::{AbiDescriptor, AggregateFloatRule, LargeAggregate, Storage};
use solder_core::{Carrier, Layout, LayoutNode, ScalarKind};

use crate::binding::Binding;
use crate::error::{BindError, ValueSite};
use crate::sequence::{CallingSequence, FunctionDescriptor, Signature};

const WORD: usize = 8;

/// Build the calling sequence for one function on one platform.
pub fn build_calling_sequence(
    signature: &Signature,
    descriptor: &FunctionDescriptor,
    abi: &'static AbiDescriptor,
) -> Result<CallingSequence, BindError> {
    check_function_types(signature, descriptor)?;

    let ret_plan = classify_return(signature.ret, descriptor.ret.as_ref(), abi)?;

    let mut regs = RegAlloc::new(abi);
    let (ret_bindings, in_memory_return) = match ret_plan {
        RetPlan::Void => (Vec::new(), false),
        RetPlan::Scalar(carrier) => {
            let storage = if carrier.is_float() {
                Storage::float_reg(0)
            } else {
                Storage::int_reg(0)
            };
            (vec![Binding::VmLoad { storage, carrier }], false)
        }
        RetPlan::Small { classes } => {
            let mut bindings = Vec::new();
            let mut next_int = 0;
            let mut next_float = 0;
            for (word, class) in classes.iter().enumerate() {
                let (storage, carrier) = match class {
                    WordClass::Integer => {
                        let s = Storage::int_reg(next_int);
                        next_int += 1;
                        (s, Carrier::I64)
                    }
                    WordClass::Float => {
                        let s = Storage::float_reg(next_float);
                        next_float += 1;
                        (s, Carrier::F64)
                    }
                };
                bindings.push(Binding::VmLoad { storage, carrier });
                bindings.push(Binding::BufferStore {
                    offset: word * WORD,
                    carrier,
                });
            }
            (bindings, false)
        }
        RetPlan::InMemory { size, align } => {
            let hidden = if abi.imr_consumes_int_reg {
                // first allocation, guaranteed a register
                regs.int_slot()
            } else {
                // dedicated indirect-result register past the numbered args
                Storage::int_reg(abi.int_arg_regs)
            };
            let bindings = vec![
                Binding::Allocate { size, align },
                Binding::VmStore {
                    storage: hidden,
                    carrier: Carrier::Ptr,
                },
                Binding::Dereference {
                    offset: 0,
                    carrier: Carrier::Struct,
                },
            ];
            (bindings, true)
        }
    };

    let mut arg_bindings = Vec::with_capacity(signature.params.len());
    for (index, (carrier, layout)) in signature
        .params
        .iter()
        .zip(descriptor.args.iter())
        .enumerate()
    {
        if !carrier.is_compatible_with(layout) {
            return Err(BindError::IncompatibleCarrier {
                site: ValueSite::Argument(index),
                carrier: *carrier,
            });
        }
        arg_bindings.push(classify_argument(index, *carrier, layout, &mut regs, abi)?);
    }

    Ok(CallingSequence {
        signature: signature.clone(),
        descriptor: descriptor.clone(),
        abi,
        arg_bindings,
        ret_bindings,
        in_memory_return,
        trivial: descriptor.trivial,
    })
}

fn check_function_types(
    signature: &Signature,
    descriptor: &FunctionDescriptor,
) -> Result<(), BindError> {
    if signature.params.len() != descriptor.args.len() {
        return Err(BindError::SignatureMismatch(format!(
            "arity disagrees: {} managed parameter(s) vs {} native argument(s)",
            signature.params.len(),
            descriptor.args.len()
        )));
    }
    if signature.ret.is_some() != descriptor.ret.is_some() {
        return Err(BindError::SignatureMismatch(
            "return void-ness disagrees between signature and descriptor".into(),
        ));
    }
    if let (Some(carrier), Some(layout)) = (signature.ret, descriptor.ret.as_ref()) {
        if !carrier.is_compatible_with(layout) {
            return Err(BindError::IncompatibleCarrier {
                site: ValueSite::Return,
                carrier,
            });
        }
    }
    Ok(())
}

enum RetPlan {
    Void,
    Scalar(Carrier),
    Small { classes: Vec<WordClass> },
    InMemory { size: usize, align: usize },
}

fn classify_return(
    carrier: Option<Carrier>,
    layout: Option<&Layout>,
    abi: &AbiDescriptor,
) -> Result<RetPlan, BindError> {
    let (carrier, layout) = match (carrier, layout) {
        (None, None) => return Ok(RetPlan::Void),
        (Some(c), Some(l)) => (c, l),
        // voidness already validated
        _ => return Ok(RetPlan::Void),
    };
    if carrier != Carrier::Struct {
        return Ok(RetPlan::Scalar(carrier));
    }
    let size = layout.byte_size();
    let align = layout.alignment(false);
    if fits_by_value(size, abi) {
        let classes = word_classes(layout, abi.aggregate_float_rule, ValueSite::Return)?;
        let ints = classes.iter().filter(|c| **c == WordClass::Integer).count();
        let floats = classes.len() - ints;
        if ints <= abi.int_ret_regs as usize && floats <= abi.float_ret_regs as usize {
            return Ok(RetPlan::Small { classes });
        }
    }
    Ok(RetPlan::InMemory { size, align })
}

fn classify_argument(
    index: usize,
    carrier: Carrier,
    layout: &Layout,
    regs: &mut RegAlloc<'_>,
    abi: &AbiDescriptor,
) -> Result<Vec<Binding>, BindError> {
    if carrier != Carrier::Struct {
        let storage = if carrier.is_float() {
            regs.float_slot()
        } else {
            regs.int_slot()
        };
        return Ok(vec![Binding::VmStore { storage, carrier }]);
    }

    let size = layout.byte_size();
    let align = layout.alignment(false);
    let words = size.div_ceil(WORD);

    if !fits_by_value(size, abi) {
        return Ok(match abi.large_aggregate {
            LargeAggregate::ByReference => {
                let storage = regs.int_slot();
                vec![
                    Binding::Copy { size, align },
                    Binding::VmStore {
                        storage,
                        carrier: Carrier::Ptr,
                    },
                ]
            }
            LargeAggregate::OnStack => spread_on_stack(words, regs),
        });
    }

    let classes = word_classes(layout, abi.aggregate_float_rule, ValueSite::Argument(index))?;
    let ints = classes.iter().filter(|c| **c == WordClass::Integer).count();
    let floats = classes.len() - ints;
    let fits = if abi.unified_arg_regs {
        classes.len() <= regs.ints_left()
    } else {
        ints <= regs.ints_left() && floats <= regs.floats_left()
    };
    if !fits {
        if abi.aggregate_spill_exhausts_regs {
            regs.exhaust();
        }
        return Ok(spread_on_stack(words, regs));
    }

    let mut bindings = Vec::with_capacity(classes.len() * 2);
    for (word, class) in classes.iter().enumerate() {
        let (storage, word_carrier) = match class {
            WordClass::Integer => (regs.int_slot(), Carrier::I64),
            WordClass::Float => (regs.float_slot(), Carrier::F64),
        };
        bindings.push(Binding::BufferLoad {
            offset: word * WORD,
            carrier: word_carrier,
        });
        bindings.push(Binding::VmStore {
            storage,
            carrier: word_carrier,
        });
    }
    Ok(bindings)
}

fn fits_by_value(size: usize, abi: &AbiDescriptor) -> bool {
    size > 0
        && size <= abi.register_aggregate_max
        && (!abi.register_aggregate_exact || size.is_power_of_two())
}

fn spread_on_stack(words: usize, regs: &mut RegAlloc<'_>) -> Vec<Binding> {
    let mut bindings = Vec::with_capacity(words * 2);
    for word in 0..words {
        bindings.push(Binding::BufferLoad {
            offset: word * WORD,
            carrier: Carrier::I64,
        });
        bindings.push(Binding::VmStore {
            storage: regs.stack_slot(),
            carrier: Carrier::I64,
        });
    }
    bindings
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordClass {
    Integer,
    Float,
}

#[derive(Debug, Clone, Copy)]
struct Leaf {
    offset: usize,
    size: usize,
    kind: ScalarKind,
}

fn scalar_leaves(layout: &Layout) -> Vec<Leaf> {
    fn collect(layout: &Layout, base: usize, out: &mut Vec<Leaf>) {
        match layout.node() {
            LayoutNode::Scalar { size, kind } => out.push(Leaf {
                offset: base,
                size: *size,
                kind: *kind,
            }),
            LayoutNode::Sequence { element, count } => {
                let stride = element.byte_size();
                for i in 0..*count {
                    collect(element, base + i * stride, out);
                }
            }
            LayoutNode::Group { members, .. } => {
                for member in members {
                    collect(&member.layout, base + member.offset, out);
                }
            }
            LayoutNode::Padding { .. } => {}
        }
    }
    let mut out = Vec::new();
    collect(layout, 0, &mut out);
    out
}

/// Classify each 8-byte word of a by-value aggregate.
///
/// 32-bit float members are rejected whenever the rule could route words
/// through float registers: the transport moves whole 8-byte float slots
/// and cannot reproduce sub-word float packing.
fn word_classes(
    layout: &Layout,
    rule: AggregateFloatRule,
    site: ValueSite,
) -> Result<Vec<WordClass>, BindError> {
    let size = layout.byte_size();
    let words = size.div_ceil(WORD);
    if rule == AggregateFloatRule::Never {
        return Ok(vec![WordClass::Integer; words]);
    }

    let leaves = scalar_leaves(layout);
    if leaves
        .iter()
        .any(|l| l.kind == ScalarKind::Float && l.size != 8)
    {
        return Err(BindError::UnsupportedCarrier(format!(
            "{site}: 32-bit float member in a register-passed aggregate"
        )));
    }

    match rule {
        AggregateFloatRule::PerWord => {
            let mut classes = Vec::with_capacity(words);
            for word in 0..words {
                let lo = word * WORD;
                let hi = lo + WORD;
                let in_word: Vec<&Leaf> = leaves
                    .iter()
                    .filter(|l| l.offset < hi && l.offset + l.size > lo)
                    .collect();
                let all_float =
                    !in_word.is_empty() && in_word.iter().all(|l| l.kind == ScalarKind::Float);
                classes.push(if all_float {
                    WordClass::Float
                } else {
                    WordClass::Integer
                });
            }
            Ok(classes)
        }
        AggregateFloatRule::Homogeneous => {
            let all_float =
                !leaves.is_empty() && leaves.iter().all(|l| l.kind == ScalarKind::Float);
            Ok(vec![
                if all_float {
                    WordClass::Float
                } else {
                    WordClass::Integer
                };
                words
            ])
        }
        AggregateFloatRule::Never => unreachable!(),
    }
}

struct RegAlloc<'a> {
    abi: &'a AbiDescriptor,
    next_int: u32,
    next_float: u32,
    next_stack: u32,
}

impl<'a> RegAlloc<'a> {
    fn new(abi: &'a AbiDescriptor) -> RegAlloc<'a> {
        RegAlloc {
            abi,
            next_int: 0,
            next_float: 0,
            next_stack: 0,
        }
    }

    fn ints_left(&self) -> usize {
        (self.abi.int_arg_regs - self.next_int) as usize
    }

    fn floats_left(&self) -> usize {
        (self.abi.float_arg_regs - self.next_float) as usize
    }

    fn int_slot(&mut self) -> Storage {
        if self.next_int < self.abi.int_arg_regs {
            let storage = Storage::int_reg(self.next_int);
            self.next_int += 1;
            self.sync_unified();
            storage
        } else {
            self.stack_slot()
        }
    }

    fn float_slot(&mut self) -> Storage {
        if self.next_float < self.abi.float_arg_regs {
            let storage = Storage::float_reg(self.next_float);
            self.next_float += 1;
            self.sync_unified();
            storage
        } else {
            self.stack_slot()
        }
    }

    fn stack_slot(&mut self) -> Storage {
        let storage = Storage::stack(self.next_stack);
        self.next_stack += 1;
        storage
    }

    fn exhaust(&mut self) {
        self.next_int = self.abi.int_arg_regs;
        self.next_float = self.abi.float_arg_regs;
    }

    // integer and float registers share one position sequence on unified
    // conventions; an argument of either class shadows the other file
    fn sync_unified(&mut self) {
        if self.abi.unified_arg_regs {
            let position = self.next_int.max(self.next_float);
            self.next_int = position;
            self.next_float = position;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solder_abi::Platform;

    fn abi(platform: Platform) -> &'static AbiDescriptor {
        AbiDescriptor::of(platform)
    }

    fn i64_layout() -> Layout {
        Layout::int(8).unwrap()
    }

    fn pair_i64() -> Layout {
        Layout::struct_of(vec![i64_layout(), i64_layout()]).unwrap()
    }

    #[test]
    fn test_two_longs_returning_long() {
        let sig = Signature::new(vec![Carrier::I64, Carrier::I64], Some(Carrier::I64));
        let desc = FunctionDescriptor::new(vec![i64_layout(), i64_layout()], Some(i64_layout()));
        let seq = build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)).unwrap();

        assert_eq!(
            seq.arg_bindings,
            vec![
                vec![Binding::VmStore {
                    storage: Storage::int_reg(0),
                    carrier: Carrier::I64,
                }],
                vec![Binding::VmStore {
                    storage: Storage::int_reg(1),
                    carrier: Carrier::I64,
                }],
            ]
        );
        assert_eq!(
            seq.ret_bindings,
            vec![Binding::VmLoad {
                storage: Storage::int_reg(0),
                carrier: Carrier::I64,
            }]
        );
        assert!(!seq.in_memory_return);
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let sig = Signature::new(vec![Carrier::I64], None);
        let desc = FunctionDescriptor::new(vec![i64_layout(), i64_layout()], None);
        assert!(matches!(
            build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)),
            Err(BindError::SignatureMismatch(_))
        ));
    }

    #[test]
    fn test_voidness_mismatch_rejected() {
        let sig = Signature::new(vec![], Some(Carrier::I32));
        let desc = FunctionDescriptor::new(vec![], None);
        assert!(matches!(
            build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)),
            Err(BindError::SignatureMismatch(_))
        ));
    }

    #[test]
    fn test_incompatible_carrier_rejected() {
        let sig = Signature::new(vec![Carrier::F64], None);
        let desc = FunctionDescriptor::new(vec![i64_layout()], None);
        assert!(matches!(
            build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)),
            Err(BindError::IncompatibleCarrier {
                site: ValueSite::Argument(0),
                carrier: Carrier::F64,
            })
        ));
    }

    #[test]
    fn test_incompatible_return_carrier_names_the_return_value() {
        let sig = Signature::new(vec![], Some(Carrier::I32));
        let desc = FunctionDescriptor::new(vec![], Some(Layout::float(8).unwrap()));
        let err = build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)).unwrap_err();
        assert!(matches!(
            err,
            BindError::IncompatibleCarrier {
                site: ValueSite::Return,
                carrier: Carrier::I32,
            }
        ));
        assert!(err.to_string().contains("return value"));
    }

    #[test]
    fn test_integer_args_spill_to_stack() {
        let sig = Signature::new(vec![Carrier::I64; 8], None);
        let desc = FunctionDescriptor::new(vec![i64_layout(); 8], None);
        let seq = build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)).unwrap();
        let storages = seq.arg_move_storages();
        assert_eq!(storages[5], Storage::int_reg(5));
        assert_eq!(storages[6], Storage::stack(0));
        assert_eq!(storages[7], Storage::stack(1));
        assert_eq!(seq.stack_args_bytes(), 16);
    }

    #[test]
    fn test_split_register_files_on_sysv() {
        let sig = Signature::new(vec![Carrier::I64, Carrier::F64, Carrier::I64], None);
        let desc = FunctionDescriptor::new(
            vec![i64_layout(), Layout::float(8).unwrap(), i64_layout()],
            None,
        );
        let seq = build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)).unwrap();
        assert_eq!(
            seq.arg_move_storages(),
            vec![
                Storage::int_reg(0),
                Storage::float_reg(0),
                Storage::int_reg(1),
            ]
        );
    }

    #[test]
    fn test_unified_register_positions_on_win64() {
        let sig = Signature::new(vec![Carrier::I64, Carrier::F64, Carrier::I64], None);
        let desc = FunctionDescriptor::new(
            vec![i64_layout(), Layout::float(8).unwrap(), i64_layout()],
            None,
        );
        let seq = build_calling_sequence(&sig, &desc, abi(Platform::Win64)).unwrap();
        assert_eq!(
            seq.arg_move_storages(),
            vec![
                Storage::int_reg(0),
                Storage::float_reg(1),
                Storage::int_reg(2),
            ]
        );
    }

    #[test]
    fn test_small_struct_arg_decomposes_per_word() {
        let layout = Layout::struct_of(vec![i64_layout(), Layout::float(8).unwrap()]).unwrap();
        let sig = Signature::new(vec![Carrier::Struct], None);
        let desc = FunctionDescriptor::new(vec![layout], None);
        let seq = build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)).unwrap();
        assert_eq!(
            seq.arg_bindings[0],
            vec![
                Binding::BufferLoad {
                    offset: 0,
                    carrier: Carrier::I64,
                },
                Binding::VmStore {
                    storage: Storage::int_reg(0),
                    carrier: Carrier::I64,
                },
                Binding::BufferLoad {
                    offset: 8,
                    carrier: Carrier::F64,
                },
                Binding::VmStore {
                    storage: Storage::float_reg(0),
                    carrier: Carrier::F64,
                },
            ]
        );
    }

    #[test]
    fn test_homogeneous_double_pair_uses_float_regs() {
        let layout =
            Layout::struct_of(vec![Layout::float(8).unwrap(), Layout::float(8).unwrap()]).unwrap();
        let sig = Signature::new(vec![Carrier::Struct], None);
        let desc = FunctionDescriptor::new(vec![layout], None);
        for platform in [Platform::SysVx64, Platform::AArch64] {
            let seq = build_calling_sequence(&sig, &desc, abi(platform)).unwrap();
            assert_eq!(
                seq.arg_move_storages(),
                vec![Storage::float_reg(0), Storage::float_reg(1)],
                "{platform:?}"
            );
        }
    }

    #[test]
    fn test_f32_member_in_aggregate_rejected() {
        let layout =
            Layout::struct_of(vec![Layout::float(4).unwrap(), Layout::float(4).unwrap()]).unwrap();
        let sig = Signature::new(vec![Carrier::Struct], None);
        let desc = FunctionDescriptor::new(vec![layout], None);
        assert!(matches!(
            build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)),
            Err(BindError::UnsupportedCarrier(_))
        ));
    }

    #[test]
    fn test_large_struct_spreads_on_sysv_stack() {
        let layout = Layout::struct_of(vec![i64_layout(), i64_layout(), i64_layout()]).unwrap();
        let sig = Signature::new(vec![Carrier::Struct], None);
        let desc = FunctionDescriptor::new(vec![layout], None);
        let seq = build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)).unwrap();
        assert_eq!(
            seq.arg_move_storages(),
            vec![Storage::stack(0), Storage::stack(1), Storage::stack(2)]
        );
        assert_eq!(seq.stack_args_bytes(), 24);
    }

    #[test]
    fn test_large_struct_passed_by_reference_on_aarch64() {
        let layout = Layout::struct_of(vec![i64_layout(), i64_layout(), i64_layout()]).unwrap();
        let sig = Signature::new(vec![Carrier::Struct], None);
        let desc = FunctionDescriptor::new(vec![layout], None);
        let seq = build_calling_sequence(&sig, &desc, abi(Platform::AArch64)).unwrap();
        assert_eq!(
            seq.arg_bindings[0],
            vec![
                Binding::Copy { size: 24, align: 8 },
                Binding::VmStore {
                    storage: Storage::int_reg(0),
                    carrier: Carrier::Ptr,
                },
            ]
        );
    }

    #[test]
    fn test_win64_rejects_non_power_of_two_by_value() {
        let layout = Layout::struct_of(vec![
            Layout::int(4).unwrap(),
            Layout::int(4).unwrap(),
            Layout::int(4).unwrap(),
        ])
        .unwrap();
        let sig = Signature::new(vec![Carrier::Struct], None);
        let desc = FunctionDescriptor::new(vec![layout], None);
        let seq = build_calling_sequence(&sig, &desc, abi(Platform::Win64)).unwrap();
        assert!(matches!(seq.arg_bindings[0][0], Binding::Copy { .. }));
    }

    #[test]
    fn test_small_struct_return_in_registers() {
        let sig = Signature::new(vec![], Some(Carrier::Struct));
        let desc = FunctionDescriptor::new(vec![], Some(pair_i64()));
        let seq = build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)).unwrap();
        assert!(!seq.in_memory_return);
        assert_eq!(
            seq.ret_bindings,
            vec![
                Binding::VmLoad {
                    storage: Storage::int_reg(0),
                    carrier: Carrier::I64,
                },
                Binding::BufferStore {
                    offset: 0,
                    carrier: Carrier::I64,
                },
                Binding::VmLoad {
                    storage: Storage::int_reg(1),
                    carrier: Carrier::I64,
                },
                Binding::BufferStore {
                    offset: 8,
                    carrier: Carrier::I64,
                },
            ]
        );
    }

    #[test]
    fn test_in_memory_return_reserves_first_int_reg_on_sysv() {
        let layout = Layout::struct_of(vec![i64_layout(), i64_layout(), i64_layout()]).unwrap();
        let sig = Signature::new(vec![Carrier::I64], Some(Carrier::Struct));
        let desc = FunctionDescriptor::new(vec![i64_layout()], Some(layout));
        let seq = build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)).unwrap();
        assert!(seq.in_memory_return);
        assert_eq!(
            seq.ret_bindings,
            vec![
                Binding::Allocate { size: 24, align: 8 },
                Binding::VmStore {
                    storage: Storage::int_reg(0),
                    carrier: Carrier::Ptr,
                },
                Binding::Dereference {
                    offset: 0,
                    carrier: Carrier::Struct,
                },
            ]
        );
        // the hidden pointer shifted the first explicit argument
        assert_eq!(seq.arg_move_storages(), vec![Storage::int_reg(1)]);
    }

    #[test]
    fn test_in_memory_return_uses_dedicated_reg_on_aarch64() {
        let layout = Layout::struct_of(vec![i64_layout(), i64_layout(), i64_layout()]).unwrap();
        let sig = Signature::new(vec![Carrier::I64], Some(Carrier::Struct));
        let desc = FunctionDescriptor::new(vec![i64_layout()], Some(layout));
        let abi = abi(Platform::AArch64);
        let seq = build_calling_sequence(&sig, &desc, abi).unwrap();
        assert!(seq.in_memory_return);
        assert_eq!(
            seq.ret_bindings[1],
            Binding::VmStore {
                storage: Storage::int_reg(abi.int_arg_regs),
                carrier: Carrier::Ptr,
            }
        );
        // the explicit argument keeps the first numbered register
        assert_eq!(seq.arg_move_storages(), vec![Storage::int_reg(0)]);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let sig = Signature::new(vec![Carrier::I32, Carrier::F64, Carrier::Struct], None);
        let desc = FunctionDescriptor::new(
            vec![Layout::int(4).unwrap(), Layout::float(8).unwrap(), pair_i64()],
            None,
        );
        let a = build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)).unwrap();
        let b = build_calling_sequence(&sig, &desc, abi(Platform::SysVx64)).unwrap();
        assert_eq!(a.arg_bindings, b.arg_bindings);
        assert_eq!(a.ret_bindings, b.ret_bindings);
    }
}
