//! Umbra SDK - Lightweight SDK for describing classes and writing shadows
//!
//! This crate provides the types shared by class definitions, shadow
//! classes and the dispatch engine, without depending on the engine itself.
//!
//! # Example
//!
//! ```ignore
//! use umbra_sdk::{ShadowClassDef, TypeKind, Value};
//!
//! #[derive(Default)]
//! struct WidgetState { value: parking_lot::Mutex<i32> }
//!
//! let shadow = ShadowClassDef::builder("org.umbra.shadows.ShadowWidget", "com.example.Widget")
//!     .state::<WidgetState>()
//!     .implementation("getValue", vec![], TypeKind::Int, |ctx| {
//!         Ok(Value::Int(*ctx.shadow::<WidgetState>()?.value.lock()))
//!     })
//!     .build();
//! ```

#![warn(missing_docs)]

pub mod context;
pub mod descriptor;
pub mod error;
pub mod object;
pub mod picker;
pub mod shadow;
pub mod value;

pub use context::{CallContext, Invoker, MethodBody};
pub use descriptor::{
    FlatHierarchy, MethodDescriptor, TypeHierarchy, TypeKind, CONSTRUCTOR_METHOD_NAME,
    OBJECT_CLASS_NAME, STATIC_INITIALIZER_METHOD_NAME,
};
pub use error::{CallError, CallResult, DispatchError, Exception};
pub use object::{extract, shadow_of, ObjectRef, RealObject, ShadowInstance, ShadowLayer, ShadowRef, ShadowState};
pub use picker::{LooperMode, LooperModeFlag, LooperShadowPicker, ParseModeError, ResourcesMode, ShadowPicker};
pub use shadow::{
    Implementation, ShadowClassDef, ShadowClassDefBuilder, ShadowFactory, ShadowMethodDef, Visibility,
    DEFAULT_SDK, PUBLIC_SHADOW_METHOD_NAMES,
};
pub use value::{ArrayRef, Value};
