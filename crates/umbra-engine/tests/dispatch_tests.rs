//! End-to-end dispatch tests
//!
//! Drives real classes through sandboxes and checks which implementation
//! each call reaches:
//! - Per-instance shadow binding
//! - SDK band selection for classes and methods
//! - Picker-driven shadow selection
//! - Interceptor precedence over shadows
//! - Fall-through for unshadowed classes
//!
//! # Running Tests
//! ```bash
//! cargo test -p umbra-engine --test dispatch_tests
//! ```

mod common;

use std::sync::Arc;

use common::*;
use umbra_engine::{Interceptor, Interceptors, InstrumentationConfiguration, MethodRef, ShadowMap};
use umbra_sdk::{
    extract, shadow_of, CallContext, CallError, CallResult, DispatchError, Invoker, LooperMode, LooperModeFlag,
    LooperShadowPicker, ShadowClassDef, ShadowMethodDef, TypeKind, Value, DEFAULT_SDK,
};

fn get_value(sandbox: &dyn Invoker, class: &str) -> Value {
    let obj = sandbox.new_instance(class, &[]).unwrap();
    sandbox.invoke(&obj, "getValue", &[]).unwrap()
}

// ===== Per-Instance Binding Tests =====

#[test]
fn test_scenario_a_per_instance_state() {
    let sb = sandbox(map_of([stateful_widget_shadow()]), 30);

    let widget1 = sb.new_instance(WIDGET, &[]).unwrap();
    let widget2 = sb.new_instance(WIDGET, &[]).unwrap();
    shadow_of::<WidgetState>(&widget1).unwrap().set(1);
    shadow_of::<WidgetState>(&widget2).unwrap().set(2);

    let v1 = sb.invoke(&widget1, "getValue", &[]).unwrap();
    let v2 = sb.invoke(&widget2, "getValue", &[]).unwrap();
    assert_ne!(v1, v2);
    assert_eq!(v1, Value::Int(1));
    assert_eq!(v2, Value::Int(2));
}

#[test]
fn test_extract_is_idempotent_and_isolated() {
    let sb = sandbox(map_of([stateful_widget_shadow()]), 30);
    let widget1 = sb.new_instance(WIDGET, &[]).unwrap();
    let widget2 = sb.new_instance(WIDGET, &[]).unwrap();

    let first = extract(&widget1).unwrap();
    let second = extract(&widget1).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &extract(&widget2).unwrap()));
    assert_eq!(first.shadow_class(), SHADOW_WIDGET);

    let plain = sb.new_instance(PLAIN, &[]).unwrap();
    assert!(extract(&plain).is_none());
}

#[test]
fn test_subclass_instance_binds_superclass_shadow() {
    let sb = sandbox(map_of([stateful_widget_shadow()]), 30);
    let fancy = sb.new_instance(FANCY_WIDGET, &[]).unwrap();
    shadow_of::<WidgetState>(&fancy).unwrap().set(11);

    assert_eq!(sb.invoke(&fancy, "getValue", &[]).unwrap(), Value::Int(11));
    assert_eq!(sb.invoke(&fancy, "sparkle", &[Value::Int(4)]).unwrap(), Value::Int(8));
}

// ===== SDK Band Tests =====

#[test]
fn test_scenario_b_method_max_sdk() {
    let shadow = ShadowClassDef::builder(SHADOW_WIDGET, WIDGET)
        .method(
            ShadowMethodDef::new("getValue", vec![], TypeKind::Int, |_| Ok(Value::Int(-1))).max_sdk(21),
        )
        .build();
    let map = map_of([shadow]);

    assert_eq!(get_value(sandbox(map.clone(), 21).as_ref(), WIDGET), Value::Int(-1));
    assert_eq!(get_value(sandbox(map, 22).as_ref(), WIDGET), Value::Int(REAL_VALUE));
}

#[test]
fn test_class_band_boundaries() {
    let map = map_of([constant_widget_shadow(SHADOW_WIDGET, -1, 19, 21)]);
    let expected = [
        (18, REAL_VALUE),
        (19, -1),
        (20, -1),
        (21, -1),
        (22, REAL_VALUE),
    ];
    for (sdk, value) in expected {
        assert_eq!(
            get_value(sandbox(map.clone(), sdk).as_ref(), WIDGET),
            Value::Int(value),
            "sdk {}",
            sdk
        );
    }
}

#[test]
fn test_unbounded_shadow_applies_everywhere() {
    let map = map_of([constant_widget_shadow(SHADOW_WIDGET, -1, DEFAULT_SDK, DEFAULT_SDK)]);
    for sdk in [0, 1, 10000] {
        assert_eq!(get_value(sandbox(map.clone(), sdk).as_ref(), WIDGET), Value::Int(-1));
    }
}

#[test]
fn test_disjoint_bands_pick_one_shadow() {
    let map = map_of([
        constant_widget_shadow("org.umbra.shadows.ShadowOldWidget", 1, 0, 22),
        constant_widget_shadow("org.umbra.shadows.ShadowNewWidget", 2, 23, DEFAULT_SDK),
    ]);
    assert_eq!(get_value(sandbox(map.clone(), 22).as_ref(), WIDGET), Value::Int(1));
    assert_eq!(get_value(sandbox(map.clone(), 23).as_ref(), WIDGET), Value::Int(2));
    assert_eq!(get_value(sandbox(map, 34).as_ref(), WIDGET), Value::Int(2));
}

#[test]
fn test_disjoint_method_bands_run_exactly_one_method() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let old_calls = Arc::new(AtomicUsize::new(0));
    let new_calls = Arc::new(AtomicUsize::new(0));
    let (old, new) = (Arc::clone(&old_calls), Arc::clone(&new_calls));
    let shadow = ShadowClassDef::builder(SHADOW_WIDGET, WIDGET)
        .method(
            ShadowMethodDef::new("getValue", vec![], TypeKind::Int, move |_| {
                old.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Int(1))
            })
            .min_sdk(0)
            .max_sdk(22),
        )
        .method(
            ShadowMethodDef::new("getValueV23", vec![], TypeKind::Int, move |_| {
                new.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Int(2))
            })
            .method_name("getValue")
            .min_sdk(23),
        )
        .build();
    let map = map_of([shadow]);

    for (sdk, value) in [(22, 1), (23, 2), (10000, 2)] {
        let before = old_calls.load(Ordering::SeqCst) + new_calls.load(Ordering::SeqCst);
        assert_eq!(get_value(sandbox(map.clone(), sdk).as_ref(), WIDGET), Value::Int(value), "sdk {}", sdk);
        let after = old_calls.load(Ordering::SeqCst) + new_calls.load(Ordering::SeqCst);
        assert_eq!(after - before, 1, "sdk {}", sdk);
    }
    assert_eq!(old_calls.load(Ordering::SeqCst), 1);
    assert_eq!(new_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unshadowed_class_calls_real_at_any_sdk() {
    let map = map_of([stateful_widget_shadow()]);
    for sdk in [0, 16, 21, 28, 34, 10000] {
        assert_eq!(get_value(sandbox(map.clone(), sdk).as_ref(), PLAIN), Value::Int(7));
    }
}

// ===== Plan Tests =====

#[test]
fn test_call_through_disabled_returns_defaults() {
    let shadow = ShadowClassDef::builder(SHADOW_WIDGET, WIDGET)
        .call_through_by_default(false)
        .build();
    let sb = sandbox(map_of([shadow]), 30);
    let widget = sb.new_instance(WIDGET, &[]).unwrap();

    assert_eq!(sb.invoke(&widget, "getValue", &[]).unwrap(), Value::Int(0));
    assert!(sb.invoke(&widget, "describe", &[]).unwrap().is_null());
}

#[test]
fn test_shadow_can_call_real() {
    let shadow = ShadowClassDef::builder(SHADOW_WIDGET, WIDGET)
        .implementation("getValue", vec![], TypeKind::Int, |ctx| {
            let real = ctx.call_real()?.as_int().unwrap_or_default();
            Ok(Value::Int(real + 1))
        })
        .build();
    let sb = sandbox(map_of([shadow]), 30);
    assert_eq!(get_value(sb.as_ref(), WIDGET), Value::Int(REAL_VALUE + 1));
}

#[test]
fn test_static_method_shadow() {
    let shadow = ShadowClassDef::builder(SHADOW_WIDGET, WIDGET)
        .method(ShadowMethodDef::new("count", vec![], TypeKind::Int, |_| Ok(Value::Int(99))).static_method())
        .build();
    let sb = sandbox(map_of([shadow]), 30);
    assert_eq!(sb.invoke_static(WIDGET, "count", &[]).unwrap(), Value::Int(99));
}

#[test]
fn test_shadow_exceptions_propagate_unchanged() {
    let shadow = ShadowClassDef::builder(SHADOW_WIDGET, WIDGET)
        .implementation("getValue", vec![], TypeKind::Int, |_| {
            Err(umbra_sdk::Exception::illegal_state("not attached").into())
        })
        .build();
    let sb = sandbox(map_of([shadow]), 30);
    let widget = sb.new_instance(WIDGET, &[]).unwrap();

    let err = sb.invoke(&widget, "getValue", &[]).unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(err.exception().unwrap().message, "not attached");
}

#[test]
fn test_wrong_arguments_are_fatal() {
    let sb = sandbox(ShadowMap::default(), 30);
    let fancy = sb.new_instance(FANCY_WIDGET, &[]).unwrap();
    let err = sb.invoke(&fancy, "sparkle", &[Value::string("x")]).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, CallError::Dispatch(DispatchError::NoSuchMethod { .. })));
}

// ===== Picker Tests =====

#[test]
fn test_scenario_c_picker_follows_mode_flag() {
    let flag = LooperModeFlag::new(LooperMode::Paused);
    let picker = Arc::new(LooperShadowPicker::new(
        flag.clone(),
        "org.umbra.shadows.ShadowLegacyWidget",
        "org.umbra.shadows.ShadowPausedWidget",
    ));
    let legacy = ShadowClassDef::builder("org.umbra.shadows.ShadowLegacyWidget", WIDGET)
        .picker(picker.clone())
        .implementation("getValue", vec![], TypeKind::Int, |_| Ok(Value::Int(1)))
        .build();
    let paused = ShadowClassDef::builder("org.umbra.shadows.ShadowPausedWidget", WIDGET)
        .picker(picker)
        .implementation("getValue", vec![], TypeKind::Int, |_| Ok(Value::Int(2)))
        .build();
    let sb = sandbox(map_of([legacy, paused]), 30);

    let first = sb.new_instance(WIDGET, &[]).unwrap();
    assert_eq!(sb.invoke(&first, "getValue", &[]).unwrap(), Value::Int(2));

    flag.set(LooperMode::Legacy);
    let second = sb.new_instance(WIDGET, &[]).unwrap();
    assert_eq!(sb.invoke(&second, "getValue", &[]).unwrap(), Value::Int(1));

    flag.set(LooperMode::Paused);
    let third = sb.new_instance(WIDGET, &[]).unwrap();
    assert_eq!(sb.invoke(&third, "getValue", &[]).unwrap(), Value::Int(2));

    // the pick is made once per instance
    assert_eq!(sb.invoke(&second, "getValue", &[]).unwrap(), Value::Int(1));
}

// ===== Interceptor Tests =====

struct FixedValue {
    refs: Vec<MethodRef>,
}

impl Interceptor for FixedValue {
    fn method_refs(&self) -> &[MethodRef] {
        &self.refs
    }

    fn intercept(&self, _method_name: &str, _ctx: &CallContext<'_>) -> CallResult {
        Ok(Value::Int(1000))
    }
}

fn intercepting(config_lists_ref: bool) -> Arc<umbra_engine::Sandbox> {
    let method_ref = MethodRef::new(WIDGET, "getValue");
    let interceptors = Arc::new(Interceptors::new([Arc::new(FixedValue {
        refs: vec![method_ref.clone()],
    }) as Arc<dyn Interceptor>]));
    let mut builder = InstrumentationConfiguration::builder().add_instrumented_package("com.example.");
    if config_lists_ref {
        builder = builder.add_intercepted_method(method_ref);
    }
    sandbox_with(
        map_of([constant_widget_shadow(SHADOW_WIDGET, -1, DEFAULT_SDK, DEFAULT_SDK)]),
        30,
        interceptors,
        Arc::new(builder.build().unwrap()),
    )
}

#[test]
fn test_interceptor_wins_over_shadow() {
    let sb = intercepting(true);
    assert_eq!(get_value(sb.as_ref(), WIDGET), Value::Int(1000));
    // also for receivers whose class only inherits the method
    assert_eq!(get_value(sb.as_ref(), FANCY_WIDGET), Value::Int(1000));
}

#[test]
fn test_interceptor_ignored_unless_configured() {
    let sb = intercepting(false);
    assert_eq!(get_value(sb.as_ref(), WIDGET), Value::Int(-1));
}

#[test]
fn test_android_time_interceptor_without_class_on_path() {
    let interceptors = Arc::new(Interceptors::android(17));
    let config = InstrumentationConfiguration::builder()
        .add_intercepted_methods(interceptors.all_method_refs())
        .build()
        .unwrap();
    let sb = sandbox_with(ShadowMap::default(), 30, Arc::clone(&interceptors), Arc::new(config));

    let before = sb.invoke_static("java.lang.System", "currentTimeMillis", &[]).unwrap();
    assert_eq!(before, Value::Long(interceptors.clock().current_time_millis()));
    interceptors.clock().advance(std::time::Duration::from_millis(250));
    let after = sb.invoke_static("java.lang.System", "currentTimeMillis", &[]).unwrap();
    assert_eq!(after.as_long().unwrap() - before.as_long().unwrap(), 250);
}

#[test]
fn test_noop_interceptor_returns_default_of_known_return_kind() {
    let interceptors = Arc::new(Interceptors::android(17));
    let config = InstrumentationConfiguration::builder()
        .add_intercepted_methods(interceptors.all_method_refs())
        .build()
        .unwrap();
    let sb = sandbox_with(ShadowMap::default(), 30, interceptors, Arc::new(config));

    let direction = sb
        .invoke_static("android.util.LocaleUtil", "getLayoutDirectionFromLocale", &[Value::Null])
        .unwrap();
    assert_eq!(direction, Value::Int(0));
    let loaded = sb.invoke_static("java.lang.System", "loadLibrary", &[Value::string("umbra")]).unwrap();
    assert!(loaded.is_null());
}

struct DefaultValue {
    refs: Vec<MethodRef>,
}

impl Interceptor for DefaultValue {
    fn method_refs(&self) -> &[MethodRef] {
        &self.refs
    }

    fn intercept(&self, _method_name: &str, ctx: &CallContext<'_>) -> CallResult {
        Ok(ctx.method.ret.default_value())
    }
}

#[test]
fn test_interceptor_sees_declared_return_kind() {
    let method_ref = MethodRef::new(WIDGET, "getValue");
    let interceptors = Arc::new(Interceptors::new([Arc::new(DefaultValue {
        refs: vec![method_ref.clone()],
    }) as Arc<dyn Interceptor>]));
    let config = InstrumentationConfiguration::builder()
        .add_instrumented_package("com.example.")
        .add_intercepted_method(method_ref)
        .build()
        .unwrap();
    let sb = sandbox_with(ShadowMap::default(), 30, interceptors, Arc::new(config));

    assert_eq!(get_value(sb.as_ref(), WIDGET), Value::Int(0));
}

#[test]
fn test_arraycopy_in_opposite_directions_concurrently() {
    let interceptors = Arc::new(Interceptors::android(17));
    let config = InstrumentationConfiguration::builder()
        .add_intercepted_methods(interceptors.all_method_refs())
        .build()
        .unwrap();
    let sb = sandbox_with(ShadowMap::default(), 30, interceptors, Arc::new(config));
    let a = Value::array(vec![Value::Int(1); 64]);
    let b = Value::array(vec![Value::Int(2); 64]);

    let copy = |src: &Value, dest: &Value| {
        for _ in 0..500 {
            sb.invoke_static(
                "java.lang.System",
                "arraycopy",
                &[src.clone(), Value::Int(0), dest.clone(), Value::Int(0), Value::Int(64)],
            )
            .unwrap();
        }
    };
    std::thread::scope(|s| {
        s.spawn(|| copy(&a, &b));
        s.spawn(|| copy(&b, &a));
    });

    let (Value::Array(a), Value::Array(b)) = (&a, &b) else {
        panic!("arrays expected");
    };
    assert_eq!(a.lock().len(), 64);
    assert_eq!(b.lock().len(), 64);
}
