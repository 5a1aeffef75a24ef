//! Loadable class definitions
//!
//! A `ClassDef` stands in for a class file: its name, superclass, the flags
//! the instrumentation configuration looks at, and its methods with closure
//! bodies. Constructors are methods named `__constructor__`; the static
//! initializer is a static, parameterless method named
//! `__staticInitializer__`.

use std::fmt;
use std::sync::Arc;

use umbra_sdk::{CallContext, CallResult, MethodBody, MethodDescriptor, TypeKind};

/// One method declared on a class
#[derive(Clone)]
pub struct MethodDef {
    /// Name and signature
    pub descriptor: MethodDescriptor,
    /// Static method
    pub is_static: bool,
    /// Native method; has no body until instrumented
    pub is_native: bool,
    /// Abstract method; never has a body
    pub is_abstract: bool,
    /// Cannot be overridden
    pub is_final: bool,
    /// Body
    pub body: Option<MethodBody>,
}

impl MethodDef {
    fn concrete(descriptor: MethodDescriptor, body: MethodBody) -> Self {
        Self {
            descriptor,
            is_static: false,
            is_native: false,
            is_abstract: false,
            is_final: false,
            body: Some(body),
        }
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("descriptor", &self.descriptor.signature())
            .field("is_static", &self.is_static)
            .field("is_native", &self.is_native)
            .field("is_abstract", &self.is_abstract)
            .field("is_final", &self.is_final)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// A class as it sits on the class path
#[derive(Clone, Debug)]
pub struct ClassDef {
    /// Fully qualified name
    pub name: String,
    /// Superclass name; `None` extends the root class directly
    pub superclass: Option<String>,
    /// Interface
    pub is_interface: bool,
    /// Annotation type
    pub is_annotation: bool,
    /// Carries the `Instrument` marker
    pub instrument: bool,
    /// Carries the `DoNotInstrument` marker
    pub do_not_instrument: bool,
    /// Declared methods, in declaration order
    pub methods: Vec<MethodDef>,
}

impl ClassDef {
    /// Start describing class `name`
    pub fn builder(name: impl Into<String>) -> ClassDefBuilder {
        ClassDefBuilder {
            def: ClassDef {
                name: name.into(),
                superclass: None,
                is_interface: false,
                is_annotation: false,
                instrument: false,
                do_not_instrument: false,
                methods: Vec::new(),
            },
        }
    }

    /// Package part of the name (empty for the default package)
    pub fn package_name(&self) -> &str {
        self.name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
    }

    /// Declared method with exactly this signature
    pub fn declared_method(&self, descriptor: &MethodDescriptor) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.descriptor.name == descriptor.name && m.descriptor.params == descriptor.params)
    }

    /// Declared method named `name`, whatever its parameters
    pub fn declares(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m.descriptor.name == name)
    }

    /// Declared constructors
    pub fn constructors(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods.iter().filter(|m| m.descriptor.is_constructor())
    }
}

/// Builder for [`ClassDef`]
pub struct ClassDefBuilder {
    def: ClassDef,
}

impl ClassDefBuilder {
    /// Extend `superclass`
    pub fn superclass(mut self, superclass: impl Into<String>) -> Self {
        self.def.superclass = Some(superclass.into());
        self
    }

    /// Mark as an interface
    pub fn interface(mut self) -> Self {
        self.def.is_interface = true;
        self
    }

    /// Mark as an annotation type
    pub fn annotation(mut self) -> Self {
        self.def.is_annotation = true;
        self
    }

    /// Add the `Instrument` marker
    pub fn instrument(mut self) -> Self {
        self.def.instrument = true;
        self
    }

    /// Add the `DoNotInstrument` marker
    pub fn do_not_instrument(mut self) -> Self {
        self.def.do_not_instrument = true;
        self
    }

    /// Add an already described method
    pub fn method_def(mut self, method: MethodDef) -> Self {
        self.def.methods.push(method);
        self
    }

    /// Add a constructor
    pub fn constructor<F>(self, params: Vec<TypeKind>, body: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> CallResult + Send + Sync + 'static,
    {
        self.method_def(MethodDef::concrete(MethodDescriptor::constructor(params), Arc::new(body)))
    }

    /// Add an instance method
    pub fn method<F>(self, name: &str, params: Vec<TypeKind>, ret: TypeKind, body: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> CallResult + Send + Sync + 'static,
    {
        self.method_def(MethodDef::concrete(
            MethodDescriptor::new(name, params, ret),
            Arc::new(body),
        ))
    }

    /// Add a final instance method
    pub fn final_method<F>(self, name: &str, params: Vec<TypeKind>, ret: TypeKind, body: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> CallResult + Send + Sync + 'static,
    {
        let mut method = MethodDef::concrete(MethodDescriptor::new(name, params, ret), Arc::new(body));
        method.is_final = true;
        self.method_def(method)
    }

    /// Add a static method
    pub fn static_method<F>(self, name: &str, params: Vec<TypeKind>, ret: TypeKind, body: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> CallResult + Send + Sync + 'static,
    {
        let mut method = MethodDef::concrete(MethodDescriptor::new(name, params, ret), Arc::new(body));
        method.is_static = true;
        self.method_def(method)
    }

    /// Add a native method
    pub fn native_method(self, name: &str, params: Vec<TypeKind>, ret: TypeKind, is_static: bool) -> Self {
        self.method_def(MethodDef {
            descriptor: MethodDescriptor::new(name, params, ret),
            is_static,
            is_native: true,
            is_abstract: false,
            is_final: false,
            body: None,
        })
    }

    /// Add an abstract method
    pub fn abstract_method(self, name: &str, params: Vec<TypeKind>, ret: TypeKind) -> Self {
        self.method_def(MethodDef {
            descriptor: MethodDescriptor::new(name, params, ret),
            is_static: false,
            is_native: false,
            is_abstract: true,
            is_final: false,
            body: None,
        })
    }

    /// Add the static initializer
    pub fn static_initializer<F>(self, body: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> CallResult + Send + Sync + 'static,
    {
        let mut method = MethodDef::concrete(MethodDescriptor::static_initializer(), Arc::new(body));
        method.is_static = true;
        self.method_def(method)
    }

    /// Finish the definition
    pub fn build(self) -> ClassDef {
        self.def
    }
}
