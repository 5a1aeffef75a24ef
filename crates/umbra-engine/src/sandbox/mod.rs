//! Sandboxes: isolated class worlds that run instrumented code
//!
//! A `Sandbox` owns one class loader, one class handler (and through it the
//! active shadow map and interceptor table) and a fixed SDK level and mode
//! pair. It is the `Invoker` every method body, shadow and interceptor calls
//! back into, so nested calls go through the same hook as top-level ones.
//!
//! - `key`: cache key identifying interchangeable sandboxes
//! - `manager`: bounded, thread-safe sandbox cache

pub mod key;
pub mod manager;

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};
use umbra_sdk::{
    CallContext, CallError, CallResult, DispatchError, Exception, Invoker, LooperMode, MethodDescriptor, ObjectRef,
    RealObject, ResourcesMode, TypeHierarchy, TypeKind, Value, CONSTRUCTOR_METHOD_NAME, OBJECT_CLASS_NAME,
};

use crate::dispatch::{check_args, ClassHandler, Invocation, MethodCall, Plan, ShadowWrangler};
use crate::error::ClassLoadError;
use crate::instrument::{InitState, InstrumentationConfiguration, LoadedClass, LoadedMethod, SandboxClassLoader, SystemClassLoader};
use crate::interceptors::{Interceptor, Interceptors};
use crate::shadow::ShadowMap;

pub use key::SandboxKey;
pub use manager::SandboxManager;

/// Lifecycle of a sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    /// Created, no shadow map installed yet
    Uninitialized,
    /// Shadow map installed, no code run yet
    Configured,
    /// Has run code
    Active,
    /// Dropped from the cache; every further call fails
    Evicted,
}

/// An isolated environment for one (configuration, SDK, modes) combination
pub struct Sandbox {
    loader: SandboxClassLoader,
    handler: RwLock<Arc<dyn ClassHandler>>,
    interceptors: Arc<Interceptors>,
    api_level: i32,
    resources_mode: ResourcesMode,
    looper_mode: LooperMode,
    state: RwLock<SandboxState>,
}

impl Sandbox {
    /// Create an unconfigured sandbox; every class is unshadowed until
    /// [`Sandbox::configure`] installs a shadow map
    pub fn new(
        config: Arc<InstrumentationConfiguration>,
        system: Arc<SystemClassLoader>,
        api_level: i32,
        resources_mode: ResourcesMode,
        looper_mode: LooperMode,
        interceptors: Arc<Interceptors>,
    ) -> Self {
        let handler = ShadowWrangler::new(ShadowMap::default(), api_level, Arc::clone(&interceptors));
        Self {
            loader: SandboxClassLoader::new(config, system),
            handler: RwLock::new(Arc::new(handler)),
            interceptors,
            api_level,
            resources_mode,
            looper_mode,
            state: RwLock::new(SandboxState::Uninitialized),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Instrumentation configuration
    pub fn config(&self) -> &Arc<InstrumentationConfiguration> {
        self.loader.config()
    }

    /// Class loader
    pub fn class_loader(&self) -> &SandboxClassLoader {
        &self.loader
    }

    /// Resources mode
    pub fn resources_mode(&self) -> ResourcesMode {
        self.resources_mode
    }

    /// Looper mode
    pub fn looper_mode(&self) -> LooperMode {
        self.looper_mode
    }

    /// Interceptor table
    pub fn interceptors(&self) -> &Arc<Interceptors> {
        &self.interceptors
    }

    /// Current class handler
    pub fn class_handler(&self) -> Arc<dyn ClassHandler> {
        self.handler.read().clone()
    }

    /// Shadow map the class handler resolves against
    pub fn shadow_map(&self) -> ShadowMap {
        self.handler.read().shadow_map().clone()
    }

    /// Lifecycle state
    pub fn state(&self) -> SandboxState {
        *self.state.read()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Install the shadow map for the first time
    pub fn configure(&self, map: ShadowMap) {
        self.install(map);
        let mut state = self.state.write();
        if *state == SandboxState::Uninitialized {
            *state = SandboxState::Configured;
        }
    }

    /// Swap in a different shadow map between tests.
    ///
    /// Cached dispatch plans belong to the previous handler and are dropped
    /// with it; classes whose mappings changed are logged.
    pub fn replace_shadow_map(&self, map: ShadowMap) {
        let invalidated = self.handler.read().shadow_map().invalidated_classes(&map);
        if !invalidated.is_empty() {
            debug!(
                api_level = self.api_level,
                classes = invalidated.len(),
                "Shadow map replaced, invalidating {:?}",
                invalidated
            );
        }
        self.configure(map);
    }

    /// Mark the sandbox unusable; later calls fail with a dispatch error
    pub fn evict(&self) {
        *self.state.write() = SandboxState::Evicted;
    }

    fn install(&self, map: ShadowMap) {
        let handler = ShadowWrangler::new(map, self.api_level, Arc::clone(&self.interceptors));
        *self.handler.write() = Arc::new(handler);
    }

    fn enter(&self) -> Result<(), CallError> {
        match *self.state.read() {
            SandboxState::Active => return Ok(()),
            SandboxState::Evicted => return Err(DispatchError::SandboxEvicted(self.api_level).into()),
            SandboxState::Uninitialized | SandboxState::Configured => {}
        }
        let mut state = self.state.write();
        match *state {
            SandboxState::Evicted => Err(DispatchError::SandboxEvicted(self.api_level).into()),
            _ => {
                *state = SandboxState::Active;
                Ok(())
            }
        }
    }

    // ========================================================================
    // Classes
    // ========================================================================

    /// Load `name` through this sandbox's loader
    pub fn load_class(&self, name: &str) -> Result<Arc<LoadedClass>, ClassLoadError> {
        self.loader.load_class(name)
    }

    /// Run static initializers for `class` and its superclasses, outermost
    /// superclass first
    pub fn ensure_initialized(&self, class: &LoadedClass) -> Result<(), CallError> {
        if let Some(superclass) = class.superclass() {
            self.ensure_initialized(superclass)?;
        }
        if class.init_state() == InitState::Initialized {
            return Ok(());
        }
        class.initialize(|| self.run_static_initializer(class))
    }

    fn run_static_initializer(&self, class: &LoadedClass) -> Result<(), CallError> {
        let clinit = MethodDescriptor::static_initializer();
        let plan = if class.is_instrumented() {
            self.class_handler().class_initializing(class)?
        } else {
            Plan::CallReal
        };

        if let Some(shadow_method) = plan.shadow_method() {
            let ctx = CallContext {
                invoker: self,
                class_name: class.name(),
                method: &clinit,
                this: None,
                shadow: None,
                args: &[],
            };
            (shadow_method.body)(&ctx)?;
        } else if let Some(real) = class.declared_method(&clinit) {
            Invocation {
                invoker: self,
                method: real,
                this: None,
                args: &[],
            }
            .run_real()?;
        }
        Ok(())
    }

    fn load_initialized(&self, name: &str) -> Result<Arc<LoadedClass>, CallError> {
        let class = self.load_class(name)?;
        self.ensure_initialized(&class)?;
        Ok(class)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Route one call of a loaded method: interpreted directly when the
    /// method is not instrumented, through the class handler's plan otherwise
    fn dispatch(&self, method: &LoadedMethod, this: Option<&ObjectRef>, args: &[Value]) -> CallResult {
        check_args(&method.descriptor, args, self)?;
        let invocation = Invocation {
            invoker: self,
            method,
            this,
            args,
        };
        if !method.instrumented {
            return invocation.run_real();
        }
        let plan = self.class_handler().method_invoked(&MethodCall {
            declaring_class: &method.declaring_class,
            method: &method.descriptor,
            is_static: method.is_static,
            instance: this,
            hierarchy: self,
        });
        invocation.run(&plan)
    }

    /// Run the interceptor for `owner.method` if the configuration
    /// intercepts it
    fn intercepted(&self, owner: &str, method: &str, this: Option<&ObjectRef>, args: &[Value]) -> Option<CallResult> {
        if !self.config().should_intercept(owner, method) {
            return None;
        }
        let interceptor = self.class_handler().intercept(owner, method)?;
        let ret = self.intercepted_return_kind(owner, method, this.is_none(), args, interceptor.as_ref());
        let descriptor = MethodDescriptor::new(method, args.iter().map(Value::kind).collect(), ret);
        let ctx = CallContext {
            invoker: self,
            class_name: owner,
            method: &descriptor,
            this,
            shadow: this.and_then(|t| t.shadow()),
            args,
        };
        Some(interceptor.intercept(method, &ctx))
    }

    /// Return kind the intercepted method declares on the class path, else
    /// the one its interceptor knows, else `Any`
    fn intercepted_return_kind(
        &self,
        owner: &str,
        method: &str,
        is_static: bool,
        args: &[Value],
        interceptor: &dyn Interceptor,
    ) -> TypeKind {
        self.load_class(owner)
            .ok()
            .and_then(|class| {
                class
                    .resolve(method, args, is_static, self)
                    .map(|m| m.descriptor.ret.clone())
            })
            .or_else(|| interceptor.return_kind(owner, method))
            .unwrap_or(TypeKind::Any)
    }

    fn no_such_method(class: &str, method: &str, args: &[Value]) -> CallError {
        DispatchError::NoSuchMethod {
            class: class.to_string(),
            method: method.to_string(),
            args: render_args(args),
        }
        .into()
    }
}

fn render_args(args: &[Value]) -> String {
    let kinds: Vec<String> = args.iter().map(|a| a.kind().to_string()).collect();
    format!("({})", kinds.join(", "))
}

impl TypeHierarchy for Sandbox {
    fn is_subclass_of(&self, class_name: &str, ancestor: &str) -> bool {
        if class_name == ancestor || ancestor == OBJECT_CLASS_NAME {
            return true;
        }
        match self.load_class(class_name) {
            Ok(class) => class.is_subclass_of(ancestor),
            Err(e) => {
                warn!(class = class_name, ancestor, error = %e, "Cannot load class for subtype check");
                false
            }
        }
    }
}

impl Invoker for Sandbox {
    fn api_level(&self) -> i32 {
        self.api_level
    }

    fn new_instance(&self, class_name: &str, args: &[Value]) -> Result<ObjectRef, CallError> {
        self.enter()?;
        let class = self.load_initialized(class_name)?;
        if class.is_interface() {
            return Err(Exception::new("java.lang.InstantiationException", class.name()).into());
        }

        let instance = RealObject::new(class.name());
        if class.has_instrumented_ancestor() {
            self.class_handler().initializing(&class, &instance)?;
        }

        // implicit super() chain, outermost superclass first
        let no_arg = MethodDescriptor::constructor(Vec::new());
        let ancestors: Vec<&LoadedClass> = class.ancestors().skip(1).collect();
        for ancestor in ancestors.into_iter().rev() {
            if let Some(ctor) = ancestor.declared_method(&no_arg) {
                self.dispatch(ctor, Some(&instance), &[])?;
            }
        }

        let ctors = || class.declared_methods_named(CONSTRUCTOR_METHOD_NAME);
        let ctor = ctors()
            .find(|m| m.descriptor.matches_args_exactly(args))
            .or_else(|| ctors().find(|m| m.descriptor.accepts_args(args, self)))
            .ok_or_else(|| Self::no_such_method(class.name(), CONSTRUCTOR_METHOD_NAME, args))?;
        self.dispatch(ctor, Some(&instance), args)?;
        Ok(instance)
    }

    fn invoke(&self, this: &ObjectRef, method: &str, args: &[Value]) -> CallResult {
        self.enter()?;
        let class_name = this.class_name();
        if let Some(result) = self.intercepted(class_name, method, Some(this), args) {
            return result;
        }

        let class = self.load_initialized(class_name)?;
        for ancestor in class.ancestors().skip(1) {
            if let Some(result) = self.intercepted(ancestor.name(), method, Some(this), args) {
                return result;
            }
        }

        let target = class
            .resolve(method, args, false, self)
            .ok_or_else(|| Self::no_such_method(class_name, method, args))?;
        self.dispatch(target, Some(this), args)
    }

    fn invoke_static(&self, class_name: &str, method: &str, args: &[Value]) -> CallResult {
        self.enter()?;
        if let Some(result) = self.intercepted(class_name, method, None, args) {
            return result;
        }

        let class = self.load_initialized(class_name)?;
        let target = class
            .resolve(method, args, true, self)
            .ok_or_else(|| Self::no_such_method(class_name, method, args))?;
        self.dispatch(target, None, args)
    }

    fn invoke_original(
        &self,
        class_name: &str,
        this: Option<&ObjectRef>,
        method: &MethodDescriptor,
        args: &[Value],
    ) -> CallResult {
        self.enter()?;
        let class = self.load_initialized(class_name)?;
        let target = class
            .find_by_signature(method)
            .ok_or_else(|| Self::no_such_method(class_name, &method.name, args))?;
        check_args(&target.descriptor, args, self)?;
        Invocation {
            invoker: self,
            method: target,
            this,
            args,
        }
        .run_real()
    }

    fn get_static_field(&self, class_name: &str, field: &str) -> Result<Value, CallError> {
        self.enter()?;
        Ok(self.load_initialized(class_name)?.get_static(field))
    }

    fn set_static_field(&self, class_name: &str, field: &str, value: Value) -> Result<(), CallError> {
        self.enter()?;
        self.load_initialized(class_name)?.set_static(field, value);
        Ok(())
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("api_level", &self.api_level)
            .field("resources_mode", &self.resources_mode)
            .field("looper_mode", &self.looper_mode)
            .field("state", &self.state())
            .field("loader", &self.loader)
            .finish()
    }
}
