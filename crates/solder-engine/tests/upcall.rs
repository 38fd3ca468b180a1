//! Native-to-managed round trips through pooled upcall stubs.

#![cfg(any(
    all(target_arch = "x86_64", not(target_os = "windows")),
    target_arch = "aarch64"
))]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use solder_abi::{AbiDescriptor, Platform};
use solder_core::{Carrier, Layout, Scope, Value};
use solder_engine::{
    build_calling_sequence, Downcaller, FunctionDescriptor, InvokerConfig, Signature,
    UpcallHandler, UpcallParam, UpcallStub,
};

fn host() -> Platform {
    Platform::host().expect("supported host")
}

fn i64_layout() -> Layout {
    Layout::int(8).unwrap()
}

fn pair_layout() -> Layout {
    Layout::struct_of(vec![i64_layout(), i64_layout()]).unwrap()
}

fn triple_layout() -> Layout {
    Layout::struct_of(vec![i64_layout(), i64_layout(), i64_layout()]).unwrap()
}

#[repr(C)]
#[derive(Clone, Copy, PartialEq, Debug)]
struct Pair {
    x: i64,
    y: i64,
}

#[repr(C)]
#[derive(Clone, Copy, PartialEq, Debug)]
struct Triple {
    a: i64,
    b: i64,
    c: i64,
}

#[test]
fn test_native_caller_reaches_the_handler() {
    let scope = Scope::new();
    let handler = UpcallHandler::new(
        vec![
            UpcallParam::ScopeToken,
            UpcallParam::Value(Carrier::I64),
            UpcallParam::Value(Carrier::I64),
        ],
        Some(Carrier::I64),
        |_, args| match (&args[0], &args[1]) {
            (Value::I64(a), Value::I64(b)) => Ok(Some(Value::I64(a + b))),
            _ => Ok(Some(Value::I64(-1))),
        },
    );
    let descriptor = FunctionDescriptor::new(
        vec![i64_layout(), i64_layout()],
        Some(i64_layout()),
    );
    let stub = UpcallStub::new(handler, &descriptor, &scope, host()).unwrap();

    let f: extern "C" fn(i64, i64) -> i64 =
        unsafe { std::mem::transmute(stub.address() as usize) };
    assert_eq!(f(3, 4), 7);
    assert_eq!(f(-10, 4), -6);

    drop(stub);
    scope.close().unwrap();
}

#[test]
fn test_downcall_into_own_stub() {
    let scope = Scope::new();
    let handler = UpcallHandler::new(
        vec![UpcallParam::ScopeToken, UpcallParam::Value(Carrier::F64)],
        Some(Carrier::F64),
        |_, args| match args[0] {
            Value::F64(v) => Ok(Some(Value::F64(v * 2.0))),
            _ => Ok(Some(Value::F64(f64::NAN))),
        },
    );
    let descriptor = FunctionDescriptor::new(
        vec![Layout::float(8).unwrap()],
        Some(Layout::float(8).unwrap()),
    );
    let stub = UpcallStub::new(handler, &descriptor, &scope, host()).unwrap();

    let sequence = Arc::new(
        build_calling_sequence(
            &Signature::new(vec![Carrier::F64], Some(Carrier::F64)),
            &descriptor,
            AbiDescriptor::of(host()),
        )
        .unwrap(),
    );
    let caller = Downcaller::new(sequence, InvokerConfig::default()).unwrap();
    let out = caller.call(stub.address(), &[Value::F64(1.25)]).unwrap();
    assert_eq!(out, Some(Value::F64(2.5)));

    drop(stub);
    scope.close().unwrap();
}

#[test]
fn test_scope_is_pinned_while_the_handler_runs() {
    let scope = Scope::new();
    let handler = UpcallHandler::new(
        vec![UpcallParam::ScopeToken],
        Some(Carrier::I64),
        |scope, _| {
            // the invocation holds a pin, so closing must fail here
            let refused = scope.close().is_err();
            Ok(Some(Value::I64(refused as i64)))
        },
    );
    let descriptor = FunctionDescriptor::new(vec![], Some(i64_layout()));
    let stub = UpcallStub::new(handler, &descriptor, &scope, host()).unwrap();

    let f: extern "C" fn() -> i64 = unsafe { std::mem::transmute(stub.address() as usize) };
    assert_eq!(f(), 1);

    drop(stub);
    // the pin is gone once the upcall returns
    scope.close().unwrap();
}

#[test]
fn test_struct_argument_crosses_into_the_handler() {
    let scope = Scope::new();
    let seen = Arc::new(AtomicU64::new(0));
    let seen_in = seen.clone();
    let handler = UpcallHandler::new(
        vec![UpcallParam::ScopeToken, UpcallParam::Value(Carrier::Struct)],
        Some(Carrier::I64),
        move |_, args| {
            let bytes = args[0].struct_bytes().unwrap_or(&[]);
            seen_in.store(bytes.len() as u64, Ordering::SeqCst);
            let mut sum = 0i64;
            for chunk in bytes.chunks_exact(8) {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                sum += i64::from_le_bytes(word);
            }
            Ok(Some(Value::I64(sum)))
        },
    );
    let descriptor = FunctionDescriptor::new(vec![pair_layout()], Some(i64_layout()));
    let stub = UpcallStub::new(handler, &descriptor, &scope, host()).unwrap();

    let f: extern "C" fn(Pair) -> i64 = unsafe { std::mem::transmute(stub.address() as usize) };
    assert_eq!(f(Pair { x: 11, y: 31 }), 42);
    assert_eq!(seen.load(Ordering::SeqCst), 16);

    drop(stub);
    scope.close().unwrap();
}

#[test]
fn test_small_struct_return_through_registers() {
    let scope = Scope::new();
    let handler = UpcallHandler::new(
        vec![UpcallParam::ScopeToken, UpcallParam::Value(Carrier::I64)],
        Some(Carrier::Struct),
        |_, args| {
            let seed = match args[0] {
                Value::I64(v) => v,
                _ => 0,
            };
            let mut image = Vec::new();
            image.extend_from_slice(&seed.to_le_bytes());
            image.extend_from_slice(&(seed * 2).to_le_bytes());
            Ok(Some(Value::Struct(image)))
        },
    );
    let descriptor = FunctionDescriptor::new(vec![i64_layout()], Some(pair_layout()));
    let stub = UpcallStub::new(handler, &descriptor, &scope, host()).unwrap();

    let f: extern "C" fn(i64) -> Pair = unsafe { std::mem::transmute(stub.address() as usize) };
    assert_eq!(f(21), Pair { x: 21, y: 42 });

    drop(stub);
    scope.close().unwrap();
}

#[test]
fn test_in_memory_struct_return_from_handler() {
    let scope = Scope::new();
    let handler = UpcallHandler::new(
        vec![UpcallParam::ScopeToken, UpcallParam::Value(Carrier::I64)],
        Some(Carrier::Struct),
        |_, args| {
            let seed = match args[0] {
                Value::I64(v) => v,
                _ => 0,
            };
            let mut image = Vec::new();
            for v in [seed, seed + 1, seed + 2] {
                image.extend_from_slice(&v.to_le_bytes());
            }
            Ok(Some(Value::Struct(image)))
        },
    );
    let descriptor = FunctionDescriptor::new(vec![i64_layout()], Some(triple_layout()));
    let stub = UpcallStub::new(handler, &descriptor, &scope, host()).unwrap();

    let f: extern "C" fn(i64) -> Triple = unsafe { std::mem::transmute(stub.address() as usize) };
    assert_eq!(f(5), Triple { a: 5, b: 6, c: 7 });

    drop(stub);
    scope.close().unwrap();
}

#[test]
fn test_panicking_handler_yields_zeroed_return() {
    let scope = Scope::new();
    let handler = UpcallHandler::new(
        vec![UpcallParam::ScopeToken],
        Some(Carrier::I64),
        |_, _| panic!("handler blew up"),
    );
    let descriptor = FunctionDescriptor::new(vec![], Some(i64_layout()));
    let stub = UpcallStub::new(handler, &descriptor, &scope, host()).unwrap();

    let f: extern "C" fn() -> i64 = unsafe { std::mem::transmute(stub.address() as usize) };
    assert_eq!(f(), 0);

    drop(stub);
    scope.close().unwrap();
}

#[test]
fn test_released_slot_serves_a_new_stub() {
    let scope = Scope::new();
    let descriptor = FunctionDescriptor::new(vec![], Some(i64_layout()));

    let first = UpcallStub::new(
        UpcallHandler::new(
            vec![UpcallParam::ScopeToken],
            Some(Carrier::I64),
            |_, _| Ok(Some(Value::I64(1))),
        ),
        &descriptor,
        &scope,
        host(),
    )
    .unwrap();
    drop(first);

    // the freed slot is claimable again; concurrent tests may race for it,
    // so only the new stub's behavior is asserted
    let second = UpcallStub::new(
        UpcallHandler::new(
            vec![UpcallParam::ScopeToken],
            Some(Carrier::I64),
            |_, _| Ok(Some(Value::I64(2))),
        ),
        &descriptor,
        &scope,
        host(),
    )
    .unwrap();

    let f: extern "C" fn() -> i64 = unsafe { std::mem::transmute(second.address() as usize) };
    assert_eq!(f(), 2);

    drop(second);
    scope.close().unwrap();
}
