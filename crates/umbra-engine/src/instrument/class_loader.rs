//! Class loaders and loaded classes
//!
//! The `SystemClassLoader` is shared by every sandbox and never instruments.
//! Each sandbox owns a `SandboxClassLoader` that acquires the classes its
//! configuration asks for, instruments the eligible ones, and delegates the
//! rest to the system loader. A class acquired by two sandboxes is two
//! distinct classes with separate static state.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::trace;
use umbra_sdk::{CallError, Exception, MethodBody, MethodDescriptor, TypeHierarchy, Value, OBJECT_CLASS_NAME};

use super::class_path::ClassPath;
use super::config::InstrumentationConfiguration;
use super::instrumentor::ClassInstrumentor;
use crate::error::ClassLoadError;

// ============================================================================
// Loaded classes
// ============================================================================

/// A method of a loaded class, after instrumentation
#[derive(Clone)]
pub struct LoadedMethod {
    /// Name and signature
    pub descriptor: MethodDescriptor,
    /// Class the method is declared on
    pub declaring_class: String,
    /// Static method
    pub is_static: bool,
    /// Cannot be overridden
    pub is_final: bool,
    /// Has no implementation
    pub is_abstract: bool,
    /// Calls go through the class handler
    pub instrumented: bool,
    /// Real implementation (`None` for abstract methods)
    pub body: Option<MethodBody>,
}

impl fmt::Debug for LoadedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedMethod")
            .field("descriptor", &self.descriptor.signature())
            .field("declaring_class", &self.declaring_class)
            .field("is_static", &self.is_static)
            .field("instrumented", &self.instrumented)
            .finish_non_exhaustive()
    }
}

/// Static initialization progress of a class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Static initializer has not run
    Uninitialized,
    /// Static initializer is running on the thread holding the init lock
    Running,
    /// Static initializer completed
    Initialized,
    /// Static initializer failed; the class is unusable
    Failed,
}

/// A class defined by a loader
pub struct LoadedClass {
    name: String,
    superclass: Option<Arc<LoadedClass>>,
    acquired: bool,
    instrumented: bool,
    is_interface: bool,
    methods: Vec<Arc<LoadedMethod>>,
    by_name: FxHashMap<String, Vec<usize>>,
    statics: Mutex<FxHashMap<String, Value>>,
    init: ReentrantMutex<Cell<InitState>>,
}

impl LoadedClass {
    pub(crate) fn new(
        name: String,
        superclass: Option<Arc<LoadedClass>>,
        acquired: bool,
        instrumented: bool,
        is_interface: bool,
        methods: Vec<LoadedMethod>,
    ) -> Self {
        let mut by_name: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (i, method) in methods.iter().enumerate() {
            by_name.entry(method.descriptor.name.clone()).or_default().push(i);
        }
        Self {
            name,
            superclass,
            acquired,
            instrumented,
            is_interface,
            methods: methods.into_iter().map(Arc::new).collect(),
            by_name,
            statics: Mutex::new(FxHashMap::default()),
            init: ReentrantMutex::new(Cell::new(InitState::Uninitialized)),
        }
    }

    /// Fully qualified name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Loaded superclass (`None` directly under the root class)
    pub fn superclass(&self) -> Option<&Arc<LoadedClass>> {
        self.superclass.as_ref()
    }

    /// Defined by a sandbox loader rather than the system loader
    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Rewritten to dispatch through the class handler
    pub fn is_instrumented(&self) -> bool {
        self.instrumented
    }

    /// Interface
    pub fn is_interface(&self) -> bool {
        self.is_interface
    }

    /// Declared methods
    pub fn methods(&self) -> &[Arc<LoadedMethod>] {
        &self.methods
    }

    /// This class followed by its superclasses, most derived first
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Whether this class is `ancestor` or inherits from it
    pub fn is_subclass_of(&self, ancestor: &str) -> bool {
        ancestor == OBJECT_CLASS_NAME || self.ancestors().any(|c| c.name == ancestor)
    }

    /// Whether this class or an ancestor is instrumented
    pub fn has_instrumented_ancestor(&self) -> bool {
        self.ancestors().any(|c| c.instrumented)
    }

    /// Declared methods named `name`
    pub fn declared_methods_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Arc<LoadedMethod>> + 'a {
        self.by_name
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(move |&i| &self.methods[i])
    }

    /// Declared method with exactly the parameter kinds of `descriptor`
    pub fn declared_method(&self, descriptor: &MethodDescriptor) -> Option<&Arc<LoadedMethod>> {
        self.declared_methods_named(&descriptor.name)
            .find(|m| m.descriptor.params == descriptor.params)
    }

    /// Nearest method with exactly the parameter kinds of `descriptor`,
    /// searching this class and then its ancestors
    pub fn find_by_signature(&self, descriptor: &MethodDescriptor) -> Option<&Arc<LoadedMethod>> {
        self.ancestors().find_map(|c| c.declared_method(descriptor))
    }

    /// Method named `name` that can take `args`.
    ///
    /// A method whose parameter kinds match the arguments exactly wins over
    /// one that only accepts them after widening; within each pass the most
    /// derived declaration wins, so overrides shadow what they override.
    pub fn resolve(
        &self,
        name: &str,
        args: &[Value],
        is_static: bool,
        hierarchy: &dyn TypeHierarchy,
    ) -> Option<&Arc<LoadedMethod>> {
        let candidates = || {
            self.ancestors()
                .flat_map(move |c| c.declared_methods_named(name))
                .filter(move |m| m.is_static == is_static)
        };
        candidates()
            .find(|m| m.descriptor.matches_args_exactly(args))
            .or_else(|| candidates().find(|m| m.descriptor.accepts_args(args, hierarchy)))
    }

    /// Any method named `name` on this class or an ancestor
    pub fn has_method_named(&self, name: &str) -> bool {
        self.ancestors().any(|c| c.by_name.contains_key(name))
    }

    /// Read a static field (`Null` if never written)
    pub fn get_static(&self, field: &str) -> Value {
        self.statics.lock().get(field).cloned().unwrap_or_default()
    }

    /// Write a static field
    pub fn set_static(&self, field: impl Into<String>, value: Value) {
        self.statics.lock().insert(field.into(), value);
    }

    /// Static initialization progress
    pub fn init_state(&self) -> InitState {
        self.init.lock().get()
    }

    /// Run `initializer` unless the class is already initialized.
    ///
    /// The thread running the initializer holds the class's init lock: other
    /// threads wait for it, and re-entrant requests from the same thread
    /// return immediately. A failed initializer leaves the class unusable.
    pub fn initialize<F>(&self, initializer: F) -> Result<(), CallError>
    where
        F: FnOnce() -> Result<(), CallError>,
    {
        let state = self.init.lock();
        match state.get() {
            InitState::Initialized | InitState::Running => return Ok(()),
            InitState::Failed => {
                return Err(Exception::new(
                    "java.lang.NoClassDefFoundError",
                    format!("Could not initialize class {}", self.name),
                )
                .into())
            }
            InitState::Uninitialized => {}
        }
        state.set(InitState::Running);
        let result = initializer();
        state.set(if result.is_ok() {
            InitState::Initialized
        } else {
            InitState::Failed
        });
        result
    }
}

impl fmt::Debug for LoadedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedClass")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|s| s.name()))
            .field("acquired", &self.acquired)
            .field("instrumented", &self.instrumented)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// Iterator over a class and its superclasses
pub struct Ancestors<'a> {
    next: Option<&'a LoadedClass>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a LoadedClass;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.superclass.as_deref();
        Some(current)
    }
}

// ============================================================================
// Loaders
// ============================================================================

/// Loader for classes no sandbox acquires; shared and never instruments
pub struct SystemClassLoader {
    class_path: ClassPath,
    instrumentor: ClassInstrumentor,
    loaded: RwLock<FxHashMap<String, Arc<LoadedClass>>>,
}

impl SystemClassLoader {
    /// Loader over `class_path`
    pub fn new(class_path: ClassPath) -> Self {
        Self {
            class_path,
            instrumentor: ClassInstrumentor::new(Arc::new(InstrumentationConfiguration::default())),
            loaded: RwLock::new(FxHashMap::default()),
        }
    }

    /// Classes this loader can see
    pub fn class_path(&self) -> &ClassPath {
        &self.class_path
    }

    /// Load `name` without instrumentation
    pub fn load_class(&self, name: &str) -> Result<Arc<LoadedClass>, ClassLoadError> {
        if let Some(class) = self.loaded.read().get(name) {
            return Ok(Arc::clone(class));
        }

        let def = self
            .class_path
            .get(name)
            .ok_or_else(|| ClassLoadError::NotFound(name.to_string()))?;
        let superclass = match def.superclass.as_deref() {
            Some(s) => Some(self.load_class(s)?),
            None => None,
        };
        let methods = self.instrumentor.instrument(def, superclass.as_ref(), false)?;
        let class = Arc::new(LoadedClass::new(
            def.name.clone(),
            superclass,
            false,
            false,
            def.is_interface,
            methods,
        ));
        trace!(class = name, "System loader defined class");

        let mut loaded = self.loaded.write();
        Ok(Arc::clone(loaded.entry(name.to_string()).or_insert(class)))
    }

    /// Number of classes loaded so far
    pub fn loaded_count(&self) -> usize {
        self.loaded.read().len()
    }
}

impl fmt::Debug for SystemClassLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemClassLoader")
            .field("class_path", &self.class_path)
            .field("loaded", &self.loaded.read().len())
            .finish()
    }
}

/// Per-sandbox loader
pub struct SandboxClassLoader {
    config: Arc<InstrumentationConfiguration>,
    system: Arc<SystemClassLoader>,
    instrumentor: ClassInstrumentor,
    loaded: RwLock<FxHashMap<String, Arc<LoadedClass>>>,
}

impl SandboxClassLoader {
    /// Loader applying `config`, delegating to `system`
    pub fn new(config: Arc<InstrumentationConfiguration>, system: Arc<SystemClassLoader>) -> Self {
        Self {
            instrumentor: ClassInstrumentor::new(Arc::clone(&config)),
            config,
            system,
            loaded: RwLock::new(FxHashMap::default()),
        }
    }

    /// Configuration this loader applies
    pub fn config(&self) -> &Arc<InstrumentationConfiguration> {
        &self.config
    }

    /// Shared parent loader
    pub fn system(&self) -> &Arc<SystemClassLoader> {
        &self.system
    }

    /// Load `name`, applying class-name translations.
    ///
    /// Acquired classes are defined (and instrumented when eligible) by this
    /// loader and cached; everything else comes from the system loader.
    pub fn load_class(&self, name: &str) -> Result<Arc<LoadedClass>, ClassLoadError> {
        if let Some(class) = self.loaded.read().get(name) {
            return Ok(Arc::clone(class));
        }

        let class = self.load_untranslated(self.config.translate(name))?;

        let mut loaded = self.loaded.write();
        Ok(Arc::clone(loaded.entry(name.to_string()).or_insert(class)))
    }

    /// Already loaded class, without loading
    pub fn find_loaded_class(&self, name: &str) -> Option<Arc<LoadedClass>> {
        self.loaded.read().get(name).cloned()
    }

    /// Number of names resolved so far
    pub fn loaded_count(&self) -> usize {
        self.loaded.read().len()
    }

    fn load_untranslated(&self, name: &str) -> Result<Arc<LoadedClass>, ClassLoadError> {
        if let Some(class) = self.loaded.read().get(name) {
            return Ok(Arc::clone(class));
        }
        if !self.config.should_acquire(name) {
            return self.system.load_class(name);
        }

        let def = self
            .system
            .class_path()
            .get(name)
            .ok_or_else(|| ClassLoadError::NotFound(name.to_string()))?;
        let superclass = match self.instrumentor.superclass_name(def) {
            Some(s) => Some(self.load_class(s)?),
            None => None,
        };
        let instrumented = self.config.should_instrument(def);
        let methods = self.instrumentor.instrument(def, superclass.as_ref(), instrumented)?;
        let class = Arc::new(LoadedClass::new(
            def.name.clone(),
            superclass,
            true,
            instrumented,
            def.is_interface,
            methods,
        ));
        trace!(class = name, instrumented, "Sandbox loader defined class");

        let mut loaded = self.loaded.write();
        Ok(Arc::clone(loaded.entry(name.to_string()).or_insert(class)))
    }
}

impl fmt::Debug for SandboxClassLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxClassLoader")
            .field("config", &self.config)
            .field("loaded", &self.loaded.read().len())
            .finish()
    }
}
