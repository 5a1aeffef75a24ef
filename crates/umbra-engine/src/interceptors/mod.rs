//! Method interceptors
//!
//! Interceptors replace calls to specific methods wherever they occur,
//! independent of any shadow. The table is built once per sandbox and never
//! mutated, so lookups need no locking.

pub mod android;
pub mod cleaner;
pub mod clock;

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use umbra_sdk::{CallContext, CallResult, TypeKind};

pub use android::AndroidInterceptors;
pub use cleaner::CleanerInterceptor;
pub use clock::FakeClock;

/// Method name matching every method of the owner class
pub const ANY_METHOD: &str = "*";

/// Owner class and method name of an intercepted method
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef {
    /// Owner class
    pub class_name: String,
    /// Method name, or `*` for every method
    pub method_name: String,
}

impl MethodRef {
    /// Reference to one method
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }

    /// Reference to every method of `class_name`
    pub fn any(class_name: impl Into<String>) -> Self {
        Self::new(class_name, ANY_METHOD)
    }

    /// Check if this matches every method of its owner
    pub fn is_wildcard(&self) -> bool {
        self.method_name == ANY_METHOD
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class_name, self.method_name)
    }
}

/// Replacement behavior for a fixed set of methods
pub trait Interceptor: Send + Sync {
    /// Methods this interceptor replaces
    fn method_refs(&self) -> &[MethodRef];

    /// Run the replacement for `method_name`
    fn intercept(&self, method_name: &str, ctx: &CallContext<'_>) -> CallResult;

    /// Return kind of `owner.method_name` for when no class on the class
    /// path declares it
    fn return_kind(&self, _owner: &str, _method_name: &str) -> Option<TypeKind> {
        None
    }
}

/// Lookup table from method ref to interceptor
#[derive(Clone, Default)]
pub struct Interceptors {
    by_owner: FxHashMap<String, FxHashMap<String, Arc<dyn Interceptor>>>,
    all: Vec<Arc<dyn Interceptor>>,
    clock: Arc<FakeClock>,
}

impl Interceptors {
    /// Build a table; a ref claimed twice goes to the later interceptor
    pub fn new(interceptors: impl IntoIterator<Item = Arc<dyn Interceptor>>) -> Self {
        Self::with_clock(interceptors, Arc::new(FakeClock::new()))
    }

    /// Build a table that owns `clock`
    pub fn with_clock(
        interceptors: impl IntoIterator<Item = Arc<dyn Interceptor>>,
        clock: Arc<FakeClock>,
    ) -> Self {
        let mut by_owner: FxHashMap<String, FxHashMap<String, Arc<dyn Interceptor>>> = FxHashMap::default();
        let mut all = Vec::new();
        for interceptor in interceptors {
            for method_ref in interceptor.method_refs() {
                by_owner
                    .entry(method_ref.class_name.clone())
                    .or_default()
                    .insert(method_ref.method_name.clone(), Arc::clone(&interceptor));
            }
            all.push(interceptor);
        }
        Self { by_owner, all, clock }
    }

    /// The standard platform interceptors for a host runtime major version
    pub fn android(host_runtime_version: u32) -> Self {
        let clock = Arc::new(FakeClock::new());
        Self::with_clock(AndroidInterceptors::all(host_runtime_version, &clock), clock)
    }

    /// Interceptor for `owner.method`, falling back to `owner.*`
    pub fn find_interceptor(&self, owner: &str, method: &str) -> Option<&Arc<dyn Interceptor>> {
        let methods = self.by_owner.get(owner)?;
        methods.get(method).or_else(|| methods.get(ANY_METHOD))
    }

    /// Every method ref in the table
    pub fn all_method_refs(&self) -> Vec<MethodRef> {
        let mut refs: Vec<MethodRef> = self
            .all
            .iter()
            .flat_map(|i| i.method_refs().iter().cloned())
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }

    /// Clock serving the intercepted time methods
    pub fn clock(&self) -> &Arc<FakeClock> {
        &self.clock
    }

    /// Number of interceptors
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

impl fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptors")
            .field("interceptors", &self.all.len())
            .field("owners", &self.by_owner.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_sdk::Value;

    struct Fixed {
        refs: Vec<MethodRef>,
        value: i32,
    }

    impl Interceptor for Fixed {
        fn method_refs(&self) -> &[MethodRef] {
            &self.refs
        }

        fn intercept(&self, _method_name: &str, _ctx: &CallContext<'_>) -> CallResult {
            Ok(Value::Int(self.value))
        }
    }

    fn fixed(refs: Vec<MethodRef>, value: i32) -> Arc<dyn Interceptor> {
        Arc::new(Fixed { refs, value })
    }

    #[test]
    fn test_exact_lookup() {
        let table = Interceptors::new([fixed(vec![MethodRef::new("a.B", "run")], 1)]);
        assert!(table.find_interceptor("a.B", "run").is_some());
        assert!(table.find_interceptor("a.B", "stop").is_none());
        assert!(table.find_interceptor("a.C", "run").is_none());
    }

    #[test]
    fn test_wildcard_fallback() {
        let table = Interceptors::new([
            fixed(vec![MethodRef::any("a.Session")], 1),
            fixed(vec![MethodRef::new("a.Session", "close")], 2),
        ]);
        assert!(table.find_interceptor("a.Session", "open").is_some());
        assert!(table.find_interceptor("a.Session", "close").is_some());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_all_method_refs_sorted_unique() {
        let table = Interceptors::new([
            fixed(vec![MethodRef::new("b.B", "x"), MethodRef::new("a.A", "y")], 1),
            fixed(vec![MethodRef::new("a.A", "y")], 2),
        ]);
        let refs = table.all_method_refs();
        assert_eq!(refs, vec![MethodRef::new("a.A", "y"), MethodRef::new("b.B", "x")]);
    }

    #[test]
    fn test_method_ref_display() {
        assert_eq!(MethodRef::any("a.B").to_string(), "a.B.*");
        assert!(MethodRef::any("a.B").is_wildcard());
    }
}
