//! Method descriptors and parameter kinds
//!
//! A `MethodDescriptor` is the tagged-variant replacement for a reflective
//! method signature: a name, an ordered list of parameter kinds and a return
//! kind. Matching between a real method and a shadow method is done on these
//! descriptors, so the algorithm can be tested without any object model.

use std::fmt;

use crate::value::Value;

/// Reserved method name under which constructors are dispatched
pub const CONSTRUCTOR_METHOD_NAME: &str = "__constructor__";

/// Reserved method name under which static initializers are dispatched
pub const STATIC_INITIALIZER_METHOD_NAME: &str = "__staticInitializer__";

/// Fully qualified name of the root class
pub const OBJECT_CLASS_NAME: &str = "java.lang.Object";

/// Parameter / return kind of a method
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeKind {
    /// No value (return kind only)
    Void,
    /// Boolean
    Bool,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// 64-bit float
    Double,
    /// String
    Str,
    /// Instance of the named class (or one of its subclasses)
    Object(String),
    /// Array of any element kind
    Array,
    /// Any reference; the loosely-typed form used by generic shadow methods
    Any,
}

impl TypeKind {
    /// Object kind for a class name; the root class collapses to `Any`
    pub fn object(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        if class_name == OBJECT_CLASS_NAME {
            TypeKind::Any
        } else {
            TypeKind::Object(class_name)
        }
    }

    /// Whether values of this kind are references (nullable)
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            TypeKind::Str | TypeKind::Object(_) | TypeKind::Array | TypeKind::Any
        )
    }

    /// Check whether a parameter of this kind accepts an argument of kind `from`.
    ///
    /// Exact kinds always match; numeric kinds widen (`int → long → double`);
    /// `Any` accepts every reference or primitive; object kinds follow the
    /// class hierarchy.
    pub fn is_assignable_from(&self, from: &TypeKind, hierarchy: &dyn TypeHierarchy) -> bool {
        if self == from {
            return true;
        }
        match (self, from) {
            (_, TypeKind::Void) | (TypeKind::Void, _) => false,
            (TypeKind::Any, _) => true,
            (TypeKind::Long, TypeKind::Int) => true,
            (TypeKind::Double, TypeKind::Int | TypeKind::Long) => true,
            (TypeKind::Object(target), TypeKind::Object(source)) => {
                hierarchy.is_subclass_of(source, target)
            }
            _ => false,
        }
    }

    /// Check whether a parameter of this kind accepts `value`
    pub fn accepts(&self, value: &Value, hierarchy: &dyn TypeHierarchy) -> bool {
        if value.is_null() {
            return self.is_reference();
        }
        self.is_assignable_from(&value.kind(), hierarchy)
    }

    /// The value a method of this return kind yields when it does nothing
    pub fn default_value(&self) -> Value {
        match self {
            TypeKind::Bool => Value::Bool(false),
            TypeKind::Int => Value::Int(0),
            TypeKind::Long => Value::Long(0),
            TypeKind::Double => Value::Double(0.0),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Void => write!(f, "void"),
            TypeKind::Bool => write!(f, "boolean"),
            TypeKind::Int => write!(f, "int"),
            TypeKind::Long => write!(f, "long"),
            TypeKind::Double => write!(f, "double"),
            TypeKind::Str => write!(f, "java.lang.String"),
            TypeKind::Object(name) => write!(f, "{}", name),
            TypeKind::Array => write!(f, "java.lang.Object[]"),
            TypeKind::Any => write!(f, "{}", OBJECT_CLASS_NAME),
        }
    }
}

/// Class hierarchy queries used by assignability checks
pub trait TypeHierarchy {
    /// True if `class_name` is `ancestor` or inherits from it
    fn is_subclass_of(&self, class_name: &str, ancestor: &str) -> bool;
}

/// Hierarchy that only knows about identity
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatHierarchy;

impl TypeHierarchy for FlatHierarchy {
    fn is_subclass_of(&self, class_name: &str, ancestor: &str) -> bool {
        class_name == ancestor || ancestor == OBJECT_CLASS_NAME
    }
}

/// Name, parameter kinds and return kind of a method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Method name
    pub name: String,
    /// Ordered parameter kinds
    pub params: Vec<TypeKind>,
    /// Return kind
    pub ret: TypeKind,
}

impl MethodDescriptor {
    /// Create a new descriptor
    pub fn new(name: impl Into<String>, params: Vec<TypeKind>, ret: TypeKind) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
        }
    }

    /// Descriptor of a constructor taking `params`
    pub fn constructor(params: Vec<TypeKind>) -> Self {
        Self::new(CONSTRUCTOR_METHOD_NAME, params, TypeKind::Void)
    }

    /// Descriptor of a static initializer
    pub fn static_initializer() -> Self {
        Self::new(STATIC_INITIALIZER_METHOD_NAME, Vec::new(), TypeKind::Void)
    }

    /// Check if this describes a constructor
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_METHOD_NAME
    }

    /// Check if this describes a static initializer
    pub fn is_static_initializer(&self) -> bool {
        self.name == STATIC_INITIALIZER_METHOD_NAME
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Same descriptor under another name
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: self.params.clone(),
            ret: self.ret.clone(),
        }
    }

    /// Loosely-typed form: every parameter becomes `Any`
    pub fn generic(&self) -> Self {
        Self {
            name: self.name.clone(),
            params: vec![TypeKind::Any; self.params.len()],
            ret: self.ret.clone(),
        }
    }

    /// `name(kind,kind)`; the return kind is not part of the signature
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        format!("{}({})", self.name, params.join(","))
    }

    /// Check whether `args` can be passed to this method
    pub fn accepts_args(&self, args: &[Value], hierarchy: &dyn TypeHierarchy) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(param, arg)| param.accepts(arg, hierarchy))
    }

    /// Check whether `args` match the parameter kinds without any widening
    pub fn matches_args_exactly(&self, args: &[Value]) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(param, arg)| match arg {
                    Value::Null => param.is_reference(),
                    _ => *param == arg.kind(),
                })
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ret, self.signature())
    }
}
