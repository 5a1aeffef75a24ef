//! Real objects and their shadows
//!
//! A `RealObject` is an instance of a loaded class. When the class handler
//! decides the object's class is shadowed it binds exactly one
//! `ShadowInstance` to it, before any constructor body runs. The shadow keeps
//! only a weak reference back, so the pair lives and dies with the real
//! object.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::value::Value;

/// Shared handle to a real object
pub type ObjectRef = Arc<RealObject>;

/// Shared handle to a bound shadow
pub type ShadowRef = Arc<ShadowInstance>;

/// Type-erased shadow state
pub type ShadowState = Arc<dyn Any + Send + Sync>;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Real objects
// ============================================================================

/// An instance of a class loaded by a sandbox
pub struct RealObject {
    id: u64,
    class_name: String,
    fields: Mutex<FxHashMap<String, Value>>,
    shadow: OnceCell<ShadowRef>,
}

impl RealObject {
    /// Allocate a new, unbound instance of `class_name`
    pub fn new(class_name: impl Into<String>) -> ObjectRef {
        Arc::new(Self {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            class_name: class_name.into(),
            fields: Mutex::new(FxHashMap::default()),
            shadow: OnceCell::new(),
        })
    }

    /// Process-unique identity of this object
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the object's runtime class
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Read an instance field (`Null` if never written)
    pub fn get_field(&self, name: &str) -> Value {
        self.fields.lock().get(name).cloned().unwrap_or_default()
    }

    /// Write an instance field
    pub fn set_field(&self, name: impl Into<String>, value: Value) {
        self.fields.lock().insert(name.into(), value);
    }

    /// The bound shadow, if any
    pub fn shadow(&self) -> Option<&ShadowRef> {
        self.shadow.get()
    }

    /// Bind a shadow to this object, creating it with `create` on first use.
    ///
    /// Binding happens at most once: later calls (including concurrent ones)
    /// observe the shadow of whichever call won and never run `create`.
    pub fn bind_shadow<E>(
        self: &Arc<Self>,
        create: impl FnOnce(Weak<RealObject>) -> Result<ShadowInstance, E>,
    ) -> Result<ShadowRef, E> {
        let weak = Arc::downgrade(self);
        self.shadow
            .get_or_try_init(|| create(weak).map(Arc::new))
            .cloned()
    }
}

impl fmt::Debug for RealObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealObject")
            .field("id", &self.id)
            .field("class_name", &self.class_name)
            .field("shadow", &self.shadow.get().map(|s| s.shadow_class()))
            .finish()
    }
}

// ============================================================================
// Shadows
// ============================================================================

/// State contributed by one shadow class in a shadow hierarchy
#[derive(Clone)]
pub struct ShadowLayer {
    /// Shadow class that owns this state
    pub shadow_class: String,
    /// The state itself
    pub state: ShadowState,
}

impl fmt::Debug for ShadowLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowLayer")
            .field("shadow_class", &self.shadow_class)
            .finish_non_exhaustive()
    }
}

/// The shadow bound to one real object
///
/// Layers are ordered from the most specific shadow class to its shadow
/// superclasses, so a shadow method declared on a superclass finds its own
/// state through [`ShadowInstance::state`].
pub struct ShadowInstance {
    shadow_class: String,
    layers: Vec<ShadowLayer>,
    real: Weak<RealObject>,
}

impl ShadowInstance {
    /// Create a shadow instance
    pub fn new(shadow_class: impl Into<String>, layers: Vec<ShadowLayer>, real: Weak<RealObject>) -> Self {
        Self {
            shadow_class: shadow_class.into(),
            layers,
            real,
        }
    }

    /// Most specific shadow class of this instance
    pub fn shadow_class(&self) -> &str {
        &self.shadow_class
    }

    /// State layers, most specific first
    pub fn layers(&self) -> &[ShadowLayer] {
        &self.layers
    }

    /// Check whether `shadow_class` is this shadow's class or one of its
    /// shadow superclasses
    pub fn is_instance_of(&self, shadow_class: &str) -> bool {
        self.shadow_class == shadow_class || self.layers.iter().any(|l| l.shadow_class == shadow_class)
    }

    /// Borrow the first state layer of type `S`
    pub fn state<S: Any + Send + Sync>(&self) -> Option<&S> {
        self.layers.iter().find_map(|l| l.state.downcast_ref::<S>())
    }

    /// Shared handle to the first state layer of type `S`
    pub fn state_arc<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        self.layers
            .iter()
            .find_map(|l| Arc::clone(&l.state).downcast::<S>().ok())
    }

    /// The real object this shadow stands in for, while it is alive
    pub fn real_object(&self) -> Option<ObjectRef> {
        self.real.upgrade()
    }
}

impl fmt::Debug for ShadowInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowInstance")
            .field("shadow_class", &self.shadow_class)
            .field("layers", &self.layers)
            .finish()
    }
}

/// Get the shadow bound to `obj`
pub fn extract(obj: &ObjectRef) -> Option<ShadowRef> {
    obj.shadow().cloned()
}

/// Get the typed state of the shadow bound to `obj`
pub fn shadow_of<S: Any + Send + Sync>(obj: &ObjectRef) -> Option<Arc<S>> {
    obj.shadow()?.state_arc::<S>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    struct Counter(Mutex<i32>);

    fn counter_shadow(real: Weak<RealObject>) -> Result<ShadowInstance, Infallible> {
        Ok(ShadowInstance::new(
            "ShadowCounter",
            vec![ShadowLayer {
                shadow_class: "ShadowCounter".to_string(),
                state: Arc::new(Counter(Mutex::new(0))),
            }],
            real,
        ))
    }

    #[test]
    fn test_ids_are_unique() {
        let a = RealObject::new("A");
        let b = RealObject::new("A");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_fields_default_to_null() {
        let obj = RealObject::new("A");
        assert!(obj.get_field("missing").is_null());
        obj.set_field("x", Value::Int(3));
        assert_eq!(obj.get_field("x"), Value::Int(3));
    }

    #[test]
    fn test_bind_is_idempotent() {
        let obj = RealObject::new("Counter");
        let first = obj.bind_shadow(counter_shadow).unwrap();
        let second = obj
            .bind_shadow(|_| -> Result<ShadowInstance, Infallible> {
                panic!("second binding must not create a shadow")
            })
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&extract(&obj).unwrap(), &first));
    }

    #[test]
    fn test_shadow_of_is_per_instance() {
        let a = RealObject::new("Counter");
        let b = RealObject::new("Counter");
        a.bind_shadow(counter_shadow).unwrap();
        b.bind_shadow(counter_shadow).unwrap();

        *shadow_of::<Counter>(&a).unwrap().0.lock() = 5;
        assert_eq!(*shadow_of::<Counter>(&a).unwrap().0.lock(), 5);
        assert_eq!(*shadow_of::<Counter>(&b).unwrap().0.lock(), 0);
    }

    #[test]
    fn test_unbound_object_has_no_shadow() {
        let obj = RealObject::new("Plain");
        assert!(extract(&obj).is_none());
        assert!(shadow_of::<Counter>(&obj).is_none());
    }

    #[test]
    fn test_back_reference_is_weak() {
        let obj = RealObject::new("Counter");
        let shadow = obj.bind_shadow(counter_shadow).unwrap();
        assert_eq!(shadow.real_object().unwrap().id(), obj.id());
        drop(obj);
        assert!(shadow.real_object().is_none());
    }

    #[test]
    fn test_state_lookup_by_type() {
        let shadow = ShadowInstance::new(
            "ShadowButton",
            vec![
                ShadowLayer {
                    shadow_class: "ShadowButton".to_string(),
                    state: Arc::new(String::from("button")),
                },
                ShadowLayer {
                    shadow_class: "ShadowView".to_string(),
                    state: Arc::new(42u32),
                },
            ],
            Weak::new(),
        );
        assert_eq!(shadow.state::<String>().map(String::as_str), Some("button"));
        assert_eq!(shadow.state::<u32>(), Some(&42));
        assert!(shadow.state::<i64>().is_none());
        assert!(shadow.is_instance_of("ShadowView"));
        assert!(!shadow.is_instance_of("ShadowText"));
    }
}
