//! Class verification and rewriting
//!
//! Every class a loader defines passes through the instrumentor. Verification
//! rejects malformed definitions; rewriting turns a `ClassDef` into the
//! method table of a `LoadedClass`. For instrumented classes that means:
//!
//! - every concrete method is marked to dispatch through the class handler
//! - a no-argument constructor exists so shadows can create instances
//! - native methods get a body returning the default value
//! - `equals`/`hashCode`/`toString` are declared so they can be shadowed
//! - class-name translations are applied to parameter kinds

use std::sync::Arc;

use rustc_hash::FxHashSet;
use umbra_sdk::{
    CallContext, CallResult, Exception, MethodBody, MethodDescriptor, TypeKind, Value,
    STATIC_INITIALIZER_METHOD_NAME,
};

use super::class_def::{ClassDef, MethodDef};
use super::class_loader::{LoadedClass, LoadedMethod};
use super::config::InstrumentationConfiguration;
use crate::error::ClassLoadError;

/// Verifies and rewrites class definitions for one loader
#[derive(Debug, Clone)]
pub struct ClassInstrumentor {
    config: Arc<InstrumentationConfiguration>,
}

impl ClassInstrumentor {
    /// Instrumentor applying `config`'s translations
    pub fn new(config: Arc<InstrumentationConfiguration>) -> Self {
        Self { config }
    }

    /// Verify `def` and build its method table.
    ///
    /// `superclass` must already be loaded; `instrumented` selects whether
    /// the class is rewritten or only completed (implicit constructor,
    /// native stubs).
    pub fn instrument(
        &self,
        def: &ClassDef,
        superclass: Option<&Arc<LoadedClass>>,
        instrumented: bool,
    ) -> Result<Vec<LoadedMethod>, ClassLoadError> {
        self.verify(def, superclass)?;

        let mut methods: Vec<LoadedMethod> = def
            .methods
            .iter()
            .map(|m| self.rewrite_method(def, m, instrumented))
            .collect();

        if !def.is_interface {
            let has_no_arg = def
                .constructors()
                .any(|c| c.descriptor.params.is_empty());
            let has_any = def.constructors().next().is_some();
            // javac adds a default constructor only when none is declared;
            // instrumentation adds one whenever it is missing
            if !has_any || (instrumented && !has_no_arg) {
                methods.push(LoadedMethod {
                    descriptor: MethodDescriptor::constructor(Vec::new()),
                    declaring_class: def.name.clone(),
                    is_static: false,
                    is_final: false,
                    is_abstract: false,
                    instrumented,
                    body: Some(Arc::new(|_: &CallContext<'_>| Ok(Value::Null))),
                });
            }
        }

        if instrumented {
            for (descriptor, root) in object_methods() {
                if def.declared_method(&descriptor).is_some() {
                    continue;
                }
                let inherited = superclass.and_then(|s| s.find_by_signature(&descriptor));
                if inherited.is_some_and(|m| m.is_final) {
                    continue;
                }
                let body = match inherited {
                    Some(m) => delegate_to(m.declaring_class.clone()),
                    None => root,
                };
                methods.push(LoadedMethod {
                    descriptor,
                    declaring_class: def.name.clone(),
                    is_static: false,
                    is_final: false,
                    is_abstract: false,
                    instrumented: true,
                    body: Some(body),
                });
            }
        }

        Ok(methods)
    }

    /// Superclass name after translation
    pub fn superclass_name<'a>(&'a self, def: &'a ClassDef) -> Option<&'a str> {
        def.superclass.as_deref().map(|s| self.config.translate(s))
    }

    fn verify(&self, def: &ClassDef, superclass: Option<&Arc<LoadedClass>>) -> Result<(), ClassLoadError> {
        let fail = |reason: String| ClassLoadError::Verification {
            class: def.name.clone(),
            reason,
        };

        let mut seen = FxHashSet::default();
        for method in &def.methods {
            let desc = &method.descriptor;
            let signature = desc.signature();
            if !seen.insert(signature.clone()) {
                return Err(fail(format!("duplicate method {}", signature)));
            }
            if desc.name == STATIC_INITIALIZER_METHOD_NAME && (!method.is_static || !desc.params.is_empty()) {
                return Err(fail(format!("{} must be static and take no arguments", signature)));
            }
            if desc.is_constructor() && method.is_static {
                return Err(fail(format!("constructor {} cannot be static", signature)));
            }
            if method.is_abstract && method.body.is_some() {
                return Err(fail(format!("abstract method {} has a body", signature)));
            }
            if method.is_native && method.body.is_some() {
                return Err(fail(format!("native method {} has a body", signature)));
            }
            if !method.is_abstract && !method.is_native && method.body.is_none() {
                return Err(fail(format!("method {} has no body", signature)));
            }
            if !method.is_static && !desc.is_constructor() {
                if let Some(overridden) = superclass.and_then(|s| s.find_by_signature(desc)) {
                    if overridden.is_final {
                        return Err(fail(format!(
                            "{} overrides final method of {}",
                            signature, overridden.declaring_class
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn rewrite_method(&self, def: &ClassDef, method: &MethodDef, instrumented: bool) -> LoadedMethod {
        let descriptor = if instrumented {
            self.translate_descriptor(&method.descriptor)
        } else {
            method.descriptor.clone()
        };
        let body = match (&method.body, method.is_native) {
            (Some(body), _) => Some(Arc::clone(body)),
            (None, true) if instrumented => Some(native_stub(descriptor.ret.clone())),
            (None, true) => Some(unsatisfied_link(def.name.clone(), descriptor.name.clone())),
            (None, false) => None,
        };
        LoadedMethod {
            descriptor,
            declaring_class: def.name.clone(),
            is_static: method.is_static,
            is_final: method.is_final,
            is_abstract: method.is_abstract,
            instrumented: instrumented && !method.is_abstract,
            body,
        }
    }

    fn translate_descriptor(&self, descriptor: &MethodDescriptor) -> MethodDescriptor {
        let translate = |kind: &TypeKind| match kind {
            TypeKind::Object(name) => TypeKind::object(self.config.translate(name)),
            other => other.clone(),
        };
        MethodDescriptor {
            name: descriptor.name.clone(),
            params: descriptor.params.iter().map(translate).collect(),
            ret: translate(&descriptor.ret),
        }
    }
}

// ============================================================================
// Generated bodies
// ============================================================================

fn native_stub(ret: TypeKind) -> MethodBody {
    Arc::new(move |_: &CallContext<'_>| Ok(ret.default_value()))
}

fn unsatisfied_link(class: String, method: String) -> MethodBody {
    Arc::new(move |_: &CallContext<'_>| {
        Err(Exception::new(
            "java.lang.UnsatisfiedLinkError",
            format!("no native implementation of {}.{}", class, method),
        )
        .into())
    })
}

fn delegate_to(class: String) -> MethodBody {
    Arc::new(move |ctx: &CallContext<'_>| ctx.invoker.invoke_original(&class, ctx.this, ctx.method, ctx.args))
}

/// Descriptors and root-class bodies of `equals`, `hashCode`, `toString`
fn object_methods() -> [(MethodDescriptor, MethodBody); 3] {
    [
        (
            MethodDescriptor::new("equals", vec![TypeKind::Any], TypeKind::Bool),
            Arc::new(root_equals),
        ),
        (
            MethodDescriptor::new("hashCode", Vec::new(), TypeKind::Int),
            Arc::new(root_hash_code),
        ),
        (
            MethodDescriptor::new("toString", Vec::new(), TypeKind::Str),
            Arc::new(root_to_string),
        ),
    ]
}

fn root_equals(ctx: &CallContext<'_>) -> CallResult {
    let this = ctx.this()?;
    let same = match ctx.arg(0)? {
        Value::Object(other) => Arc::ptr_eq(this, other),
        _ => false,
    };
    Ok(Value::Bool(same))
}

fn root_hash_code(ctx: &CallContext<'_>) -> CallResult {
    let id = ctx.this()?.id();
    Ok(Value::Int((id ^ (id >> 32)) as i32))
}

fn root_to_string(ctx: &CallContext<'_>) -> CallResult {
    let this = ctx.this()?;
    Ok(Value::string(format!("{}@{:x}", this.class_name(), this.id())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrumentor() -> ClassInstrumentor {
        let config = InstrumentationConfiguration::builder()
            .add_class_name_translation("java.old.Thing", "java.new.Thing")
            .build()
            .unwrap();
        ClassInstrumentor::new(Arc::new(config))
    }

    fn names(methods: &[LoadedMethod]) -> Vec<String> {
        methods.iter().map(|m| m.descriptor.signature()).collect()
    }

    #[test]
    fn test_uninstrumented_gets_implicit_constructor_only() {
        let def = ClassDef::builder("a.Plain")
            .method("run", vec![], TypeKind::Void, |_| Ok(Value::Null))
            .build();
        let methods = instrumentor().instrument(&def, None, false).unwrap();
        assert_eq!(names(&methods), vec!["run()", "__constructor__()"]);
        assert!(methods.iter().all(|m| !m.instrumented));
    }

    #[test]
    fn test_instrumented_rewrites() {
        let def = ClassDef::builder("android.view.View")
            .constructor(vec![TypeKind::Int], |_| Ok(Value::Null))
            .method("take", vec![TypeKind::object("java.old.Thing")], TypeKind::Void, |_| {
                Ok(Value::Null)
            })
            .native_method("nativeCount", vec![], TypeKind::Int, true)
            .build();
        let methods = instrumentor().instrument(&def, None, true).unwrap();
        let sigs = names(&methods);

        assert!(sigs.contains(&"__constructor__(int)".to_string()));
        assert!(sigs.contains(&"__constructor__()".to_string()));
        assert!(sigs.contains(&"take(java.new.Thing)".to_string()));
        assert!(sigs.contains(&"equals(java.lang.Object)".to_string()));
        assert!(sigs.contains(&"hashCode()".to_string()));
        assert!(sigs.contains(&"toString()".to_string()));
        assert!(methods.iter().all(|m| m.instrumented));

        let native = methods
            .iter()
            .find(|m| m.descriptor.name == "nativeCount")
            .unwrap();
        assert!(native.body.is_some());
    }

    #[test]
    fn test_declared_object_methods_are_kept() {
        let def = ClassDef::builder("android.Named")
            .method("toString", vec![], TypeKind::Str, |_| Ok(Value::from("named")))
            .build();
        let methods = instrumentor().instrument(&def, None, true).unwrap();
        let count = methods.iter().filter(|m| m.descriptor.name == "toString").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_verification_failures() {
        let i = instrumentor();

        let dup = ClassDef::builder("a.Dup")
            .method("m", vec![], TypeKind::Void, |_| Ok(Value::Null))
            .method("m", vec![], TypeKind::Int, |_| Ok(Value::Int(1)))
            .build();
        assert!(matches!(
            i.instrument(&dup, None, true),
            Err(ClassLoadError::Verification { reason, .. }) if reason.contains("duplicate")
        ));

        let bad_clinit = ClassDef::builder("a.Clinit")
            .method(STATIC_INITIALIZER_METHOD_NAME, vec![], TypeKind::Void, |_| Ok(Value::Null))
            .build();
        assert!(i.instrument(&bad_clinit, None, true).is_err());

        let bodyless = ClassDef::builder("a.Bodyless")
            .method_def(MethodDef {
                descriptor: MethodDescriptor::new("m", vec![], TypeKind::Void),
                is_static: false,
                is_native: false,
                is_abstract: false,
                is_final: false,
                body: None,
            })
            .build();
        assert!(i.instrument(&bodyless, None, false).is_err());
    }
}
