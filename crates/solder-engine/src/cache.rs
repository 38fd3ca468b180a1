//! Process-wide calling-sequence cache
//!
//! Classification is deterministic, so sequences are cached per
//! (signature, descriptor, platform) and shared as `Arc`s. Concurrent
//! misses may build the same sequence more than once; exactly one result
//! is retained and handed to every caller.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use solder_abi::{AbiDescriptor, Platform};

use crate::builder::build_calling_sequence;
use crate::error::BindError;
use crate::sequence::{CallingSequence, FunctionDescriptor, Signature};

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    signature: Signature,
    descriptor: FunctionDescriptor,
    platform: Platform,
}

static SEQUENCES: Lazy<DashMap<CacheKey, Arc<CallingSequence>>> = Lazy::new(DashMap::new);

/// The shared calling sequence for a (signature, descriptor, platform)
/// triple, building and caching it on first use.
pub fn cached_sequence(
    signature: &Signature,
    descriptor: &FunctionDescriptor,
    platform: Platform,
) -> Result<Arc<CallingSequence>, BindError> {
    let key = CacheKey {
        signature: signature.clone(),
        descriptor: descriptor.clone(),
        platform,
    };
    if let Some(hit) = SEQUENCES.get(&key) {
        return Ok(hit.clone());
    }
    let built = Arc::new(build_calling_sequence(
        signature,
        descriptor,
        AbiDescriptor::of(platform),
    )?);
    let entry = SEQUENCES.entry(key).or_insert(built);
    Ok(entry.value().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solder_core::{Carrier, Layout};

    #[test]
    fn test_equal_keys_share_one_sequence() {
        let sig = Signature::new(vec![Carrier::I64], Some(Carrier::I64));
        let desc = FunctionDescriptor::new(vec![Layout::int(8).unwrap()], Some(Layout::int(8).unwrap()));
        let a = cached_sequence(&sig, &desc, Platform::SysVx64).unwrap();
        let b = cached_sequence(&sig, &desc, Platform::SysVx64).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_platforms_are_distinct_keys() {
        let sig = Signature::new(vec![Carrier::I64], None);
        let desc = FunctionDescriptor::new(vec![Layout::int(8).unwrap()], None);
        let a = cached_sequence(&sig, &desc, Platform::SysVx64).unwrap();
        let b = cached_sequence(&sig, &desc, Platform::AArch64).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_layout_names_do_not_split_keys() {
        let sig = Signature::new(vec![Carrier::Struct], None);
        let group = Layout::struct_of(vec![Layout::int(8).unwrap(), Layout::int(8).unwrap()]);
        let named = group.clone().unwrap().with_name("point");
        let anon = group.unwrap();
        let a = cached_sequence(
            &sig,
            &FunctionDescriptor::new(vec![named], None),
            Platform::SysVx64,
        )
        .unwrap();
        let b = cached_sequence(
            &sig,
            &FunctionDescriptor::new(vec![anon], None),
            Platform::SysVx64,
        )
        .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
