//! Shadow class definitions
//!
//! A shadow class is declared as a `ShadowClassDef`: the real class it
//! implements, the SDK band it applies to, how its per-instance state is
//! created and the methods it substitutes. Method bodies are closures over a
//! [`CallContext`](crate::context::CallContext).

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::context::{CallContext, MethodBody};
use crate::descriptor::{MethodDescriptor, TypeKind};
use crate::error::CallResult;
use crate::object::ShadowState;
use crate::picker::ShadowPicker;

/// SDK bound meaning "no bound"
pub const DEFAULT_SDK: i32 = -1;

/// Method names allowed to be public on a shadow class
pub const PUBLIC_SHADOW_METHOD_NAMES: [&str; 3] = ["toString", "hashCode", "equals"];

// ============================================================================
// Method markers
// ============================================================================

/// Marks a shadow method as a substitute implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implementation {
    /// Lowest SDK (inclusive) the method applies to, `-1` for no bound
    pub min_sdk: i32,
    /// Highest SDK (inclusive) the method applies to, `-1` for no bound
    pub max_sdk: i32,
    /// Name of the real method, when it differs from the shadow method's name
    pub method_name: Option<String>,
}

impl Default for Implementation {
    fn default() -> Self {
        Self {
            min_sdk: DEFAULT_SDK,
            max_sdk: DEFAULT_SDK,
            method_name: None,
        }
    }
}

/// Visibility of a shadow method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Public
    Public,
    /// Protected; the conventional visibility of shadow methods
    Protected,
    /// Package-private; never dispatched to
    PackagePrivate,
    /// Private; never dispatched to
    Private,
}

impl Visibility {
    /// Whether the class handler may dispatch to a method of this visibility
    pub fn is_dispatchable(self) -> bool {
        matches!(self, Visibility::Public | Visibility::Protected)
    }
}

// ============================================================================
// Shadow methods
// ============================================================================

/// One method declared on a shadow class
#[derive(Clone)]
pub struct ShadowMethodDef {
    /// Declared name and signature
    pub descriptor: MethodDescriptor,
    /// `Implementation` marker, if present
    pub implementation: Option<Implementation>,
    /// Declared visibility
    pub visibility: Visibility,
    /// Static shadow method
    pub is_static: bool,
    /// Body
    pub body: MethodBody,
}

impl ShadowMethodDef {
    /// Create a protected, marked shadow method with no SDK bounds
    pub fn new<F>(name: impl Into<String>, params: Vec<TypeKind>, ret: TypeKind, body: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> CallResult + Send + Sync + 'static,
    {
        Self {
            descriptor: MethodDescriptor::new(name, params, ret),
            implementation: Some(Implementation::default()),
            visibility: Visibility::Protected,
            is_static: false,
            body: Arc::new(body),
        }
    }

    /// Lowest SDK this method applies to
    pub fn min_sdk(mut self, sdk: i32) -> Self {
        self.implementation.get_or_insert_with(Implementation::default).min_sdk = sdk;
        self
    }

    /// Highest SDK this method applies to
    pub fn max_sdk(mut self, sdk: i32) -> Self {
        self.implementation.get_or_insert_with(Implementation::default).max_sdk = sdk;
        self
    }

    /// Substitute the real method named `real_name` instead of the one
    /// sharing this method's name
    pub fn method_name(mut self, real_name: impl Into<String>) -> Self {
        self.implementation
            .get_or_insert_with(Implementation::default)
            .method_name = Some(real_name.into());
        self
    }

    /// Drop the `Implementation` marker
    pub fn unmarked(mut self) -> Self {
        self.implementation = None;
        self
    }

    /// Set the visibility
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Make the method static
    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Name of the real method this substitutes
    pub fn effective_name(&self) -> &str {
        self.implementation
            .as_ref()
            .and_then(|i| i.method_name.as_deref())
            .unwrap_or(&self.descriptor.name)
    }

    /// Descriptor of the real method this substitutes
    pub fn effective_descriptor(&self) -> MethodDescriptor {
        match self.implementation.as_ref().and_then(|i| i.method_name.as_ref()) {
            Some(name) => self.descriptor.with_name(name.clone()),
            None => self.descriptor.clone(),
        }
    }
}

impl fmt::Debug for ShadowMethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowMethodDef")
            .field("descriptor", &self.descriptor.signature())
            .field("implementation", &self.implementation)
            .field("visibility", &self.visibility)
            .field("is_static", &self.is_static)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Shadow state factories
// ============================================================================

type StateFn = Arc<dyn Fn() -> Result<ShadowState, String> + Send + Sync>;

/// How the state of a shadow class is created for each real instance
#[derive(Clone)]
pub enum ShadowFactory {
    /// No state; the layer holds `()`
    Stateless,
    /// Fresh state per real instance
    PerInstance(StateFn),
    /// One state shared by every real instance
    Singleton(ShadowState),
}

impl ShadowFactory {
    /// Fresh `S::default()` per instance
    pub fn per_instance<S: Default + Send + Sync + 'static>() -> Self {
        ShadowFactory::PerInstance(Arc::new(|| Ok(Arc::new(S::default()) as ShadowState)))
    }

    /// Produce the state for one real instance
    pub fn create(&self) -> Result<ShadowState, String> {
        match self {
            ShadowFactory::Stateless => Ok(Arc::new(())),
            ShadowFactory::PerInstance(f) => f(),
            ShadowFactory::Singleton(state) => Ok(Arc::clone(state)),
        }
    }
}

impl fmt::Debug for ShadowFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShadowFactory::Stateless => write!(f, "Stateless"),
            ShadowFactory::PerInstance(_) => write!(f, "PerInstance"),
            ShadowFactory::Singleton(_) => write!(f, "Singleton"),
        }
    }
}

// ============================================================================
// Shadow classes
// ============================================================================

/// A shadow class: substitute behavior for one real class
#[derive(Clone)]
pub struct ShadowClassDef {
    /// Shadow class name
    pub name: String,
    /// Real class this shadow implements
    pub real_class: String,
    /// Lowest SDK (inclusive), `-1` for no bound
    pub min_sdk: i32,
    /// Highest SDK (inclusive), `-1` for no bound
    pub max_sdk: i32,
    /// Match shadow methods by arity when parameter kinds differ
    pub loose_signatures: bool,
    /// Run the real method when no shadow method matches
    pub call_through_by_default: bool,
    /// Selects between alternative shadows of the same real class
    pub picker: Option<Arc<dyn ShadowPicker>>,
    /// Shadow superclass whose methods this shadow inherits
    pub superclass: Option<String>,
    /// State creation
    pub factory: ShadowFactory,
    /// Declared methods
    pub methods: Vec<ShadowMethodDef>,
    by_name: FxHashMap<String, Vec<usize>>,
}

impl ShadowClassDef {
    /// Start describing a shadow class `name` for `real_class`
    pub fn builder(name: impl Into<String>, real_class: impl Into<String>) -> ShadowClassDefBuilder {
        ShadowClassDefBuilder {
            def: ShadowClassDef {
                name: name.into(),
                real_class: real_class.into(),
                min_sdk: DEFAULT_SDK,
                max_sdk: DEFAULT_SDK,
                loose_signatures: false,
                call_through_by_default: true,
                picker: None,
                superclass: None,
                factory: ShadowFactory::Stateless,
                methods: Vec::new(),
                by_name: FxHashMap::default(),
            },
        }
    }

    /// Positions in `methods` of the methods substituting real methods
    /// named `name`
    pub fn method_indices(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Methods substituting real methods named `name`
    pub fn methods_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ShadowMethodDef> + 'a {
        self.method_indices(name).iter().map(move |&i| &self.methods[i])
    }

    /// Method whose effective descriptor has exactly the parameter kinds of
    /// `descriptor`
    pub fn find_exact(&self, descriptor: &MethodDescriptor) -> Option<&ShadowMethodDef> {
        self.methods_named(&descriptor.name)
            .find(|m| m.descriptor.params == descriptor.params)
    }

    fn index(&mut self) {
        self.by_name.clear();
        for (i, method) in self.methods.iter().enumerate() {
            self.by_name
                .entry(method.effective_name().to_string())
                .or_default()
                .push(i);
        }
    }
}

impl fmt::Debug for ShadowClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowClassDef")
            .field("name", &self.name)
            .field("real_class", &self.real_class)
            .field("min_sdk", &self.min_sdk)
            .field("max_sdk", &self.max_sdk)
            .field("loose_signatures", &self.loose_signatures)
            .field("call_through_by_default", &self.call_through_by_default)
            .field("picker", &self.picker.is_some())
            .field("superclass", &self.superclass)
            .field("factory", &self.factory)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// Builder for [`ShadowClassDef`]
pub struct ShadowClassDefBuilder {
    def: ShadowClassDef,
}

impl ShadowClassDefBuilder {
    /// Lowest SDK this shadow applies to
    pub fn min_sdk(mut self, sdk: i32) -> Self {
        self.def.min_sdk = sdk;
        self
    }

    /// Highest SDK this shadow applies to
    pub fn max_sdk(mut self, sdk: i32) -> Self {
        self.def.max_sdk = sdk;
        self
    }

    /// Enable arity-based matching of shadow methods
    pub fn loose_signatures(mut self, loose: bool) -> Self {
        self.def.loose_signatures = loose;
        self
    }

    /// Whether unmatched real methods run (`true`) or do nothing (`false`)
    pub fn call_through_by_default(mut self, call_through: bool) -> Self {
        self.def.call_through_by_default = call_through;
        self
    }

    /// Attach a picker
    pub fn picker(mut self, picker: Arc<dyn ShadowPicker>) -> Self {
        self.def.picker = Some(picker);
        self
    }

    /// Inherit methods from another shadow class
    pub fn superclass(mut self, shadow_class: impl Into<String>) -> Self {
        self.def.superclass = Some(shadow_class.into());
        self
    }

    /// Give every real instance a fresh `S::default()` state
    pub fn state<S: Default + Send + Sync + 'static>(mut self) -> Self {
        self.def.factory = ShadowFactory::per_instance::<S>();
        self
    }

    /// Set the state factory
    pub fn factory(mut self, factory: ShadowFactory) -> Self {
        self.def.factory = factory;
        self
    }

    /// Add a method
    pub fn method(mut self, method: ShadowMethodDef) -> Self {
        self.def.methods.push(method);
        self
    }

    /// Add a protected, marked, unbounded instance method
    pub fn implementation<F>(self, name: &str, params: Vec<TypeKind>, ret: TypeKind, body: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> CallResult + Send + Sync + 'static,
    {
        self.method(ShadowMethodDef::new(name, params, ret, body))
    }

    /// Finish the definition
    pub fn build(mut self) -> ShadowClassDef {
        self.def.index();
        self.def
    }
}
