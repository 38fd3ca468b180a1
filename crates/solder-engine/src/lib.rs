//! Solder binding engine
//!
//! The calling-convention core of the Solder foreign-function bridge:
//! - **Bindings**: the primitive marshaling recipe language (`binding` module)
//! - **Sequences**: calling sequences and their builder (`sequence`, `builder`)
//! - **Downcalls**: invoking native code through a per-call argument buffer
//!   (`downcall`, `adapter`)
//! - **Upcalls**: native-callable stubs dispatching to managed handlers
//!   (`upcall`)
//! - **Interpreter**: the generic recipe walker used as correctness fallback
//!   (`interp`)
//!
//! A calling sequence is built once per (signature, descriptor, platform)
//! triple, cached process-wide, and shared immutably by any number of
//! concurrent calls.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod binding;
pub mod builder;
pub mod cache;
pub mod downcall;
pub mod error;
pub mod sequence;
pub mod upcall;

mod adapter;
mod buffer_layout;
mod interp;

pub use binding::Binding;
pub use builder::build_calling_sequence;
pub use cache::cached_sequence;
pub use downcall::{transition_depth, Downcaller, InvokerConfig, MarshalImage, Strategy};
pub use error::{BindError, CallError, UpcallError, ValueSite};
pub use sequence::{CallingSequence, FunctionDescriptor, Signature};
pub use upcall::{UpcallHandler, UpcallParam, UpcallStub};
