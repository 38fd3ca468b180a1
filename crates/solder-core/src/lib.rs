//! Solder core: layouts, managed values, and native memory regions
//!
//! This crate provides the data model underneath the Solder binding engine:
//! - **Layouts**: immutable descriptions of native type shapes (`layout` module)
//! - **Values**: the managed-side value and carrier model (`value` module)
//! - **Buffers**: RAII-owned native scratch memory (`buffer` module)
//! - **Scopes**: lifetime-bounded region allocators (`scope` module)
//!
//! Nothing here knows about any ABI; classification and marshaling live in
//! `solder-engine`.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod buffer;
pub mod layout;
pub mod scope;
pub mod value;

pub use buffer::NativeBuffer;
pub use layout::{align_up, GroupKind, Layout, LayoutError, LayoutNode, Member, ScalarKind};
pub use scope::{Scope, ScopeError, ScopePin, Segment};
pub use value::{Carrier, Value};
