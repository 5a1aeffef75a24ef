//! Sandbox cache tests
//!
//! Validates the process-wide sandbox cache:
//! - Identity for equal keys, distinctness for any differing field
//! - Eager rejection of unrunnable configurations
//! - Oldest-first eviction
//! - Exactly one sandbox per key under concurrent requests
//! - Static state isolation between sandboxes
//!
//! # Running Tests
//! ```bash
//! cargo test -p umbra-engine --test sandbox_cache_tests
//! ```

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::*;
use umbra_engine::{ApiLevel, ConfigError, InstrumentationConfiguration, Sandbox, SandboxState, Sdk, UmbraError};
use umbra_sdk::{Invoker, LooperMode, ResourcesMode, Value};

fn get(manager: &umbra_engine::SandboxManager, sdk: i32, resources: ResourcesMode, looper: LooperMode) -> Arc<Sandbox> {
    manager.get_sandbox(config(), &ApiLevel(sdk), resources, looper).unwrap()
}

#[derive(Debug)]
struct NeedsNewerHost;

impl Sdk for NeedsNewerHost {
    fn api_level(&self) -> i32 {
        33
    }

    fn android_version(&self) -> String {
        "13".to_string()
    }

    fn is_known(&self) -> bool {
        true
    }

    fn is_supported(&self) -> bool {
        false
    }

    fn unsupported_message(&self) -> String {
        "API level 33 requires host runtime 11".to_string()
    }
}

// ===== Identity Tests =====

#[test]
fn test_equal_keys_share_sandbox() {
    let m = manager();
    let a = get(&m, 30, ResourcesMode::Binary, LooperMode::Paused);
    // structurally equal configuration built separately
    let b = get(&m, 30, ResourcesMode::Binary, LooperMode::Paused);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(m.len(), 1);
}

#[test]
fn test_each_key_field_distinguishes() {
    let m = manager();
    let base = get(&m, 28, ResourcesMode::Binary, LooperMode::Paused);

    let other_sdk = get(&m, 29, ResourcesMode::Binary, LooperMode::Paused);
    let other_resources = get(&m, 28, ResourcesMode::Legacy, LooperMode::Paused);
    let other_looper = get(&m, 28, ResourcesMode::Binary, LooperMode::Legacy);
    let other_config = m
        .get_sandbox(
            Arc::new(
                InstrumentationConfiguration::builder()
                    .add_instrumented_package("com.example.")
                    .do_not_instrument_class(PLAIN)
                    .build()
                    .unwrap(),
            ),
            &ApiLevel(28),
            ResourcesMode::Binary,
            LooperMode::Paused,
        )
        .unwrap();

    for other in [&other_sdk, &other_resources, &other_looper, &other_config] {
        assert!(!Arc::ptr_eq(&base, other));
    }
    assert_eq!(m.len(), 5);
}

// ===== Rejection Tests =====

#[test]
fn test_legacy_resources_is_assumption_violation() {
    let m = manager();
    let err: UmbraError = m
        .get_sandbox(config(), &ApiLevel(29), ResourcesMode::Legacy, LooperMode::Paused)
        .unwrap_err()
        .into();
    assert!(err.is_assumption_violation());
    assert!(m.is_empty());
}

#[test]
fn test_unsupported_sdk_rejected_before_build() {
    let m = manager();
    let err = m
        .get_sandbox(config(), &NeedsNewerHost, ResourcesMode::Binary, LooperMode::Paused)
        .unwrap_err();
    match err {
        ConfigError::UnsupportedSdk(message) => assert!(message.contains("requires host runtime 11")),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(m.is_empty());
}

// ===== Eviction Tests =====

#[test]
fn test_eviction_is_oldest_first() {
    let m = umbra_engine::SandboxManager::new(system(), Arc::new(umbra_engine::Interceptors::default()), 2);
    let s21 = get(&m, 21, ResourcesMode::Binary, LooperMode::Paused);
    let s22 = get(&m, 22, ResourcesMode::Binary, LooperMode::Paused);
    // reuse does not refresh the entry
    get(&m, 21, ResourcesMode::Binary, LooperMode::Paused);
    let s23 = get(&m, 23, ResourcesMode::Binary, LooperMode::Paused);

    assert_eq!(s21.state(), SandboxState::Evicted);
    assert_ne!(s22.state(), SandboxState::Evicted);
    assert_ne!(s23.state(), SandboxState::Evicted);
    assert_eq!(m.len(), 2);

    let err = s21.new_instance(WIDGET, &[]).unwrap_err();
    assert!(err.is_fatal());
}

// ===== Concurrency Tests =====

#[test]
fn test_concurrent_requests_build_one_sandbox() {
    let m = manager();
    let threads = 8;
    let barrier = Barrier::new(threads);

    let sandboxes: Vec<Arc<Sandbox>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    get(&m, 30, ResourcesMode::Binary, LooperMode::Paused)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(m.len(), 1);
    for sandbox in &sandboxes[1..] {
        assert!(Arc::ptr_eq(&sandboxes[0], sandbox));
    }
}

#[test]
fn test_concurrent_dispatch_on_shared_sandbox() {
    let sb = sandbox(map_of([stateful_widget_shadow()]), 30);

    thread::scope(|scope| {
        for i in 0..4 {
            let sb = &sb;
            scope.spawn(move || {
                let widget = sb.new_instance(WIDGET, &[]).unwrap();
                umbra_sdk::shadow_of::<WidgetState>(&widget).unwrap().set(i);
                for _ in 0..100 {
                    assert_eq!(sb.invoke(&widget, "getValue", &[]).unwrap(), Value::Int(i));
                }
            });
        }
    });
}

// ===== Isolation Tests =====

#[test]
fn test_acquired_statics_are_per_sandbox() {
    let m = manager();
    let a = get(&m, 30, ResourcesMode::Binary, LooperMode::Paused);
    let b = get(&m, 31, ResourcesMode::Binary, LooperMode::Paused);

    a.set_static_field(WIDGET, "instances", Value::Int(3)).unwrap();
    assert_eq!(a.get_static_field(WIDGET, "instances").unwrap(), Value::Int(3));
    assert!(b.get_static_field(WIDGET, "instances").unwrap().is_null());
}
