//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use umbra_engine::{
    ApiLevel, ClassDef, ClassPath, InstrumentationConfiguration, Interceptors, Sandbox, SandboxManager, ShadowMap,
    SystemClassLoader,
};
use umbra_sdk::{LooperMode, ResourcesMode, ShadowClassDef, TypeKind, Value};

pub const WIDGET: &str = "com.example.Widget";
pub const FANCY_WIDGET: &str = "com.example.FancyWidget";
pub const PLAIN: &str = "com.example.Plain";
pub const SHADOW_WIDGET: &str = "org.umbra.shadows.ShadowWidget";

/// Value the real `Widget.getValue()` returns
pub const REAL_VALUE: i32 = 42;

/// Per-instance state of the widget shadow
#[derive(Debug, Default)]
pub struct WidgetState {
    pub value: AtomicI32,
}

impl WidgetState {
    pub fn set(&self, value: i32) {
        self.value.store(value, Ordering::SeqCst);
    }

    pub fn get(&self) -> i32 {
        self.value.load(Ordering::SeqCst)
    }
}

pub fn widget_class() -> ClassDef {
    ClassDef::builder(WIDGET)
        .constructor(vec![], |_| Ok(Value::Null))
        .method("getValue", vec![], TypeKind::Int, |_| Ok(Value::Int(REAL_VALUE)))
        .method("describe", vec![], TypeKind::Str, |_| Ok(Value::string("real widget")))
        .static_method("count", vec![], TypeKind::Int, |_| Ok(Value::Int(0)))
        .build()
}

pub fn fancy_widget_class() -> ClassDef {
    ClassDef::builder(FANCY_WIDGET)
        .superclass(WIDGET)
        .method("sparkle", vec![TypeKind::Int], TypeKind::Int, |ctx| {
            Ok(Value::Int(ctx.arg_int(0)? * 2))
        })
        .build()
}

pub fn plain_class() -> ClassDef {
    ClassDef::builder(PLAIN)
        .method("getValue", vec![], TypeKind::Int, |_| Ok(Value::Int(7)))
        .build()
}

pub fn class_path() -> ClassPath {
    let mut builder = ClassPath::builder();
    builder.add_all([widget_class(), fancy_widget_class(), plain_class()]);
    builder.build().unwrap()
}

pub fn config() -> Arc<InstrumentationConfiguration> {
    Arc::new(
        InstrumentationConfiguration::builder()
            .add_instrumented_package("com.example.")
            .build()
            .unwrap(),
    )
}

/// Shadow returning the value stored in its per-instance state
pub fn stateful_widget_shadow() -> ShadowClassDef {
    ShadowClassDef::builder(SHADOW_WIDGET, WIDGET)
        .state::<WidgetState>()
        .implementation("getValue", vec![], TypeKind::Int, |ctx| {
            Ok(Value::Int(ctx.shadow::<WidgetState>()?.get()))
        })
        .build()
}

/// Shadow returning `value` from `getValue`, limited to `[min_sdk, max_sdk]`
pub fn constant_widget_shadow(name: &str, value: i32, min_sdk: i32, max_sdk: i32) -> ShadowClassDef {
    ShadowClassDef::builder(name, WIDGET)
        .min_sdk(min_sdk)
        .max_sdk(max_sdk)
        .implementation("getValue", vec![], TypeKind::Int, move |_| Ok(Value::Int(value)))
        .build()
}

pub fn map_of(shadows: impl IntoIterator<Item = ShadowClassDef>) -> ShadowMap {
    let mut builder = ShadowMap::builder();
    builder.add_shadow_classes(shadows);
    builder.build().unwrap()
}

pub fn system() -> Arc<SystemClassLoader> {
    Arc::new(SystemClassLoader::new(class_path()))
}

pub fn manager() -> SandboxManager {
    SandboxManager::new(system(), Arc::new(Interceptors::default()), 8)
}

/// Fresh sandbox at `sdk` running `map`
pub fn sandbox(map: ShadowMap, sdk: i32) -> Arc<Sandbox> {
    sandbox_with(map, sdk, Arc::new(Interceptors::default()), config())
}

pub fn sandbox_with(
    map: ShadowMap,
    sdk: i32,
    interceptors: Arc<Interceptors>,
    config: Arc<InstrumentationConfiguration>,
) -> Arc<Sandbox> {
    let manager = SandboxManager::new(system(), interceptors, 1);
    let sandbox = manager
        .get_sandbox(config, &ApiLevel(sdk), ResourcesMode::Binary, LooperMode::Paused)
        .unwrap();
    sandbox.configure(map);
    sandbox
}
