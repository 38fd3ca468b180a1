//! Solder ABI descriptors
//!
//! Pure-data descriptions of platform calling conventions:
//! - **Storage**: one physical register or stack slot (`storage` module)
//! - **AbiDescriptor**: per-platform register counts and classification
//!   parameters, with memoized singletons (`descriptor` module)
//!
//! Descriptors are immutable, `'static`, and shared read-only; everything
//! that interprets them lives in `solder-engine`.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod descriptor;
pub mod storage;

pub use descriptor::{AbiDescriptor, AggregateFloatRule, LargeAggregate, Platform};
pub use storage::{Storage, StorageKind};
