//! Downcall invoker
//!
//! A `Downcaller` owns everything one native call shape needs: the calling
//! sequence, the argument buffer layout, the host adapter and, when the
//! shape qualifies, a specialized write plan compiled from the binding
//! recipes. Every invocation marshals into a fresh exclusively owned
//! buffer, performs the transition, and unmarshals the return value; the
//! buffer and any scratch are released on every exit path.
//!
//! The specialized plan and the interpreter must produce bit-identical
//! buffer contents; `marshal` exposes the would-be buffer image so tests
//! can hold the engine to that.

use std::cell::Cell;
use std::sync::Arc;

use solder_core::{Carrier, NativeBuffer, Scope, Segment, Value};

use crate::adapter::{self, Adapter, ImrInfo, RetKind, TransferFrame, FLOAT_SLOTS, INT_SLOTS, STACK_WORDS};
use crate::buffer_layout::BufferLayout;
use crate::error::CallError;
use crate::interp::{self, CallAllocator, MarshalCtx, ScratchArena};
use crate::sequence::CallingSequence;
use crate::Binding;

use solder_abi::{Storage, StorageKind};

const WORD: usize = 8;

thread_local! {
    static TRANSITION_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Native-transition nesting depth of the current thread.
///
/// Incremented around every non-trivial transition; trivial calls skip the
/// bookkeeping entirely.
pub fn transition_depth() -> usize {
    TRANSITION_DEPTH.with(Cell::get)
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> DepthGuard {
        TRANSITION_DEPTH.with(|d| d.set(d.get() + 1));
        DepthGuard
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        TRANSITION_DEPTH.with(|d| d.set(d.get() - 1));
    }
}

/// Marshaling strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Specialized when the shape qualifies, interpreted otherwise.
    #[default]
    Auto,
    /// Specialized only; construction fails for shapes the specializer
    /// declines.
    Specialized,
    /// Interpreted only.
    Interpreted,
}

/// Engine-level invoker configuration.
#[derive(Debug, Clone, Default)]
pub struct InvokerConfig {
    /// Marshaling strategy.
    pub strategy: Strategy,
}

/// The would-be argument buffer contents of one marshaled call, without
/// the transition. Diagnostic surface for the strategy-equivalence
/// property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarshalImage {
    /// Argument buffer bytes (header words zeroed: addresses vary per
    /// invocation and are excluded from image comparison).
    pub buffer: Vec<u8>,
    /// Outgoing stack-argument bytes.
    pub stack: Vec<u8>,
}

/// One fully resolved write of the specialized plan.
#[derive(Debug, Clone, Copy)]
enum SpecOp {
    /// Scalar value word into the argument buffer.
    ScalarToBuffer { offset: usize, carrier: Carrier },
    /// Scalar value word into the stack-argument block.
    ScalarToStack { offset: usize, carrier: Carrier },
    /// One word of a struct image into the argument buffer.
    ImageToBuffer { image_offset: usize, offset: usize },
    /// One word of a struct image into the stack-argument block.
    ImageToStack { image_offset: usize, offset: usize },
}

struct WritePlan {
    args: Vec<Vec<SpecOp>>,
}

/// Compile the argument recipes into resolved writes. Declines any shape
/// with scratch allocation (Copy/Allocate chains stay interpreted).
fn specialize(sequence: &CallingSequence, layout: &BufferLayout) -> Option<WritePlan> {
    if sequence
        .arg_bindings
        .iter()
        .flatten()
        .any(Binding::allocates)
    {
        return None;
    }
    let mut args = Vec::with_capacity(sequence.arg_bindings.len());
    for bindings in &sequence.arg_bindings {
        let mut ops = Vec::with_capacity(bindings.len());
        let mut i = 0;
        while i < bindings.len() {
            match bindings[i] {
                Binding::VmStore { storage, carrier } => {
                    ops.push(resolve_scalar(layout, storage, carrier)?);
                }
                Binding::BufferLoad { offset, .. } => {
                    let Some(Binding::VmStore { storage, .. }) = bindings.get(i + 1) else {
                        return None;
                    };
                    ops.push(resolve_image(layout, *storage, offset)?);
                    i += 1;
                }
                _ => return None,
            }
            i += 1;
        }
        args.push(ops);
    }
    Some(WritePlan { args })
}

fn resolve_scalar(layout: &BufferLayout, storage: Storage, carrier: Carrier) -> Option<SpecOp> {
    if storage.is_stack() {
        Some(SpecOp::ScalarToStack {
            offset: storage.index as usize * WORD,
            carrier,
        })
    } else {
        Some(SpecOp::ScalarToBuffer {
            offset: layout.arg_offset(storage)?,
            carrier,
        })
    }
}

fn resolve_image(layout: &BufferLayout, storage: Storage, image_offset: usize) -> Option<SpecOp> {
    if storage.is_stack() {
        Some(SpecOp::ImageToStack {
            image_offset,
            offset: storage.index as usize * WORD,
        })
    } else {
        Some(SpecOp::ImageToBuffer {
            image_offset,
            offset: layout.arg_offset(storage)?,
        })
    }
}

/// An invoker bound to one calling sequence.
pub struct Downcaller {
    sequence: Arc<CallingSequence>,
    layout: BufferLayout,
    adapter: Arc<dyn Adapter>,
    plan: Option<WritePlan>,
    ret: RetKind,
    stack_bytes: usize,
    scratch_bytes: usize,
}

impl Downcaller {
    /// Bind an invoker to a sequence under the given configuration.
    pub fn new(sequence: Arc<CallingSequence>, config: InvokerConfig) -> Result<Downcaller, CallError> {
        let adapter = adapter::adapter_for(sequence.abi.platform)?;
        let ret = adapter::ret_kind(&sequence)?;
        let stack_bytes = sequence.stack_args_bytes();
        if stack_bytes > STACK_WORDS * WORD {
            return Err(CallError::UnsupportedShape(format!(
                "{stack_bytes} stack-argument bytes exceed the canonical frame"
            )));
        }
        let layout = BufferLayout::of(sequence.abi);
        let plan = match config.strategy {
            Strategy::Interpreted => None,
            Strategy::Auto | Strategy::Specialized => specialize(&sequence, &layout),
        };
        if config.strategy == Strategy::Specialized && plan.is_none() {
            return Err(CallError::UnsupportedShape(
                "shape declined by the specializer".into(),
            ));
        }
        let scratch_bytes = sequence.scratch_bytes();
        log::debug!(
            "downcaller bound: {} arg recipe(s), {} stack byte(s), {} scratch byte(s), {}",
            sequence.arg_bindings.len(),
            stack_bytes,
            scratch_bytes,
            if plan.is_some() { "specialized" } else { "interpreted" },
        );
        Ok(Downcaller {
            sequence,
            layout,
            adapter,
            plan,
            ret,
            stack_bytes,
            scratch_bytes,
        })
    }

    /// The sequence this invoker is bound to.
    pub fn sequence(&self) -> &CallingSequence {
        &self.sequence
    }

    /// True when invocations run the specialized write plan.
    pub fn is_specialized(&self) -> bool {
        self.plan.is_some()
    }

    /// Invoke the native function at `address` with call-lifetime scratch.
    pub fn call(&self, address: u64, args: &[Value]) -> Result<Option<Value>, CallError> {
        let mut arena = ScratchArena::new(self.scratch_bytes);
        self.invoke(address, args, CallAllocator::Arena(&mut arena))
    }

    /// Invoke with scratch drawn from the caller's scope; copied-out
    /// arguments then live until the scope closes.
    pub fn call_in_scope(
        &self,
        address: u64,
        args: &[Value],
        scope: &Scope,
    ) -> Result<Option<Value>, CallError> {
        let mut segments: Vec<Segment> = Vec::new();
        self.invoke(
            address,
            args,
            CallAllocator::Scoped {
                scope,
                segments: &mut segments,
            },
        )
    }

    /// Marshal without performing the transition, exposing the buffer
    /// image that the call would hand to the adapter.
    pub fn marshal(&self, args: &[Value]) -> Result<MarshalImage, CallError> {
        let mut arena = ScratchArena::new(self.scratch_bytes);
        let mut buffer = NativeBuffer::new(self.layout.size, WORD);
        let mut stack = NativeBuffer::new(self.stack_bytes, WORD);
        let mut ctx = MarshalCtx {
            layout: &self.layout,
            buffer: &mut buffer,
            stack: &mut stack,
            alloc: CallAllocator::Arena(&mut arena),
        };
        self.marshal_args(&mut ctx, args)?;
        interp::prepare_return(&mut ctx, &self.sequence)?;
        Ok(MarshalImage {
            buffer: buffer.as_slice().to_vec(),
            stack: stack.as_slice().to_vec(),
        })
    }

    fn invoke(
        &self,
        address: u64,
        args: &[Value],
        alloc: CallAllocator<'_>,
    ) -> Result<Option<Value>, CallError> {
        let mut buffer = NativeBuffer::new(self.layout.size, WORD);
        let mut stack = NativeBuffer::new(self.stack_bytes, WORD);
        let mut ctx = MarshalCtx {
            layout: &self.layout,
            buffer: &mut buffer,
            stack: &mut stack,
            alloc,
        };

        self.marshal_args(&mut ctx, args)?;
        let imr_dest = interp::prepare_return(&mut ctx, &self.sequence)?;

        ctx.buffer.write_word(self.layout.target, address);
        ctx.buffer
            .write_word(self.layout.stack_bytes, self.stack_bytes as u64);
        ctx.buffer.write_word(self.layout.stack_ptr, ctx.stack.addr());

        let frame = self.build_frame(&ctx, address, imr_dest);
        log::trace!(
            "transition to {address:#x}: ints={:x?} floats={:x?} stack={:x?}",
            frame.ints,
            frame.floats,
            frame.stack,
        );

        // Safety: the caller vouched for the target address and every
        // marshaled pointer when it invoked this downcall.
        let regs = if self.sequence.trivial {
            unsafe { self.adapter.transfer(&frame)? }
        } else {
            let _depth = DepthGuard::enter();
            unsafe { self.adapter.transfer(&frame)? }
        };

        for k in 0..self.sequence.abi.int_ret_regs.min(2) {
            if let Some(offset) = self.layout.ret_offset(Storage::int_reg(k)) {
                ctx.buffer.write_word(offset, regs.ints[k as usize]);
            }
        }
        for k in 0..self.sequence.abi.float_ret_regs.min(2) {
            if let Some(offset) = self.layout.ret_offset(Storage::float_reg(k)) {
                ctx.buffer.write_word(offset, regs.floats[k as usize]);
            }
        }

        interp::box_return(&ctx, &self.sequence, imr_dest)
    }

    fn marshal_args(&self, ctx: &mut MarshalCtx<'_>, args: &[Value]) -> Result<(), CallError> {
        if args.len() != self.sequence.signature.params.len() {
            return Err(CallError::MarshalFailed(format!(
                "{} argument(s) passed, sequence expects {}",
                args.len(),
                self.sequence.signature.params.len()
            )));
        }
        match &self.plan {
            Some(plan) => run_plan(ctx, plan, args),
            None => {
                for (bindings, value) in self.sequence.arg_bindings.iter().zip(args) {
                    interp::unbox_argument(ctx, bindings, value)?;
                }
                Ok(())
            }
        }
    }

    fn read_reg_slot(
        &self,
        ctx: &MarshalCtx<'_>,
        storage: Storage,
        ints: &mut [u64; INT_SLOTS],
        floats: &mut [u64; FLOAT_SLOTS],
    ) {
        let Some(offset) = self.layout.arg_offset(storage) else {
            return;
        };
        let word = ctx.buffer.read_word(offset);
        match storage.kind {
            StorageKind::Integer => {
                if let Some(slot) = ints.get_mut(storage.index as usize) {
                    *slot = word;
                }
            }
            StorageKind::Float => {
                if let Some(slot) = floats.get_mut(storage.index as usize) {
                    *slot = word;
                }
            }
            StorageKind::Stack => {}
        }
    }

    fn build_frame(
        &self,
        ctx: &MarshalCtx<'_>,
        address: u64,
        imr_dest: Option<u64>,
    ) -> TransferFrame {
        let mut ints = [0u64; INT_SLOTS];
        let mut floats = [0u64; FLOAT_SLOTS];
        // only the registers the recipes named carry meaningful words; the
        // rest stay zero and the callee never reads them
        for storage in self.sequence.index_map(StorageKind::Integer).keys() {
            self.read_reg_slot(ctx, *storage, &mut ints, &mut floats);
        }
        for storage in self.sequence.index_map(StorageKind::Float).keys() {
            self.read_reg_slot(ctx, *storage, &mut ints, &mut floats);
        }
        // the in-memory-return recipe stores the hidden destination pointer
        for binding in &self.sequence.ret_bindings {
            if let Binding::VmStore { storage, .. } = binding {
                self.read_reg_slot(ctx, *storage, &mut ints, &mut floats);
            }
        }
        let mut stack_words = [0u64; STACK_WORDS];
        for (k, word) in stack_words.iter_mut().enumerate() {
            if (k + 1) * WORD <= ctx.stack.len() {
                *word = ctx.stack.read_word(k * WORD);
            }
        }
        let imr = imr_dest.map(|dest| ImrInfo {
            dest,
            size: self
                .sequence
                .descriptor
                .ret
                .as_ref()
                .map(|l| l.byte_size())
                .unwrap_or(0),
        });
        TransferFrame {
            target: address,
            ints,
            floats,
            stack: stack_words,
            imr,
            ret: self.ret,
        }
    }
}

fn run_plan(ctx: &mut MarshalCtx<'_>, plan: &WritePlan, args: &[Value]) -> Result<(), CallError> {
    for (ops, value) in plan.args.iter().zip(args) {
        for op in ops {
            match *op {
                SpecOp::ScalarToBuffer { offset, carrier } => {
                    ctx.buffer.write_word(offset, scalar_word(value, carrier)?);
                }
                SpecOp::ScalarToStack { offset, carrier } => {
                    ctx.stack.write_word(offset, scalar_word(value, carrier)?);
                }
                SpecOp::ImageToBuffer {
                    image_offset,
                    offset,
                } => {
                    let word = struct_word(value, image_offset)?;
                    ctx.buffer.write_word(offset, word);
                }
                SpecOp::ImageToStack {
                    image_offset,
                    offset,
                } => {
                    let word = struct_word(value, image_offset)?;
                    ctx.stack.write_word(offset, word);
                }
            }
        }
    }
    Ok(())
}

fn scalar_word(value: &Value, carrier: Carrier) -> Result<u64, CallError> {
    if value.carrier() != carrier {
        return Err(CallError::MarshalFailed(format!(
            "value carrier {:?} does not match plan carrier {carrier:?}",
            value.carrier()
        )));
    }
    value.to_slot_word().ok_or_else(|| {
        CallError::MarshalFailed("struct value has no single-word encoding".into())
    })
}

fn struct_word(value: &Value, image_offset: usize) -> Result<u64, CallError> {
    let image = value
        .struct_bytes()
        .ok_or_else(|| CallError::MarshalFailed("plan expected a struct value".into()))?;
    interp::image_word(image, image_offset)
}
