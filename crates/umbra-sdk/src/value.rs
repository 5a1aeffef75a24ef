//! Dynamic values passed across the dispatch boundary
//!
//! Every argument and return value that flows through a sandbox call is a
//! `Value`. Primitives are stored inline; objects and arrays are shared
//! handles compared by identity.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::descriptor::TypeKind;
use crate::object::ObjectRef;

/// Shared, mutable array storage
pub type ArrayRef = Arc<Mutex<Vec<Value>>>;

/// A value flowing through an intercepted call
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value / `void` return
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 64-bit float
    Double(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Reference to an instance of a loaded class
    Object(ObjectRef),
    /// Reference to an array
    Array(ArrayRef),
}

impl Value {
    /// Create a string value
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Create a new array value owning `items`
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(Mutex::new(items)))
    }

    /// Check if this is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as bool if this is a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i32 if this is an int
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as i64, widening ints
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i as i64),
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Get as f64, widening integers
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Long(l) => Some(*l as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Get as string slice if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the object handle if this is an object
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get the array handle if this is an array
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// The runtime kind of this value.
    ///
    /// `Null` reports `TypeKind::Any` since it is assignable to every
    /// reference kind.
    pub fn kind(&self) -> TypeKind {
        match self {
            Value::Null => TypeKind::Any,
            Value::Bool(_) => TypeKind::Bool,
            Value::Int(_) => TypeKind::Int,
            Value::Long(_) => TypeKind::Long,
            Value::Double(_) => TypeKind::Double,
            Value::Str(_) => TypeKind::Str,
            Value::Object(obj) => TypeKind::Object(obj.class_name().to_string()),
            Value::Array(_) => TypeKind::Array,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Long(l) => write!(f, "Long({})", l),
            Value::Double(d) => write!(f, "Double({})", d),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Object(obj) => write!(f, "Object({}@{:x})", obj.class_name(), obj.id()),
            Value::Array(arr) => write!(f, "Array(len={})", arr.lock().len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}
