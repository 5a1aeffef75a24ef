//! Invoker trait and per-call context
//!
//! Defines the interface that a sandbox implements. Real method bodies,
//! shadow methods and interceptors program against `CallContext` and
//! `Invoker` without depending on engine internals.

use std::any::{type_name, Any};
use std::sync::Arc;

use crate::descriptor::{MethodDescriptor, TypeHierarchy};
use crate::error::{CallError, CallResult, DispatchError};
use crate::object::{ObjectRef, ShadowRef};
use crate::value::Value;

/// Body of a real method, a shadow method or an interceptor
pub type MethodBody = Arc<dyn Fn(&CallContext<'_>) -> CallResult + Send + Sync>;

/// Abstract sandbox operations available to running code.
///
/// Every call made through an `Invoker` goes through the same entry hook
/// instrumented code uses: interceptors first, then the class handler's plan.
/// Only [`Invoker::invoke_original`] bypasses dispatch.
pub trait Invoker: TypeHierarchy + Send + Sync {
    // ========================================================================
    // Environment
    // ========================================================================

    /// API level the sandbox runs at
    fn api_level(&self) -> i32;

    // ========================================================================
    // Instances
    // ========================================================================

    /// Load `class_name`, allocate an instance, bind its shadow and run the
    /// constructor matching `args`
    fn new_instance(&self, class_name: &str, args: &[Value]) -> Result<ObjectRef, CallError>;

    /// Call an instance method, dispatching on the receiver's runtime class
    fn invoke(&self, this: &ObjectRef, method: &str, args: &[Value]) -> CallResult;

    /// Call a static method
    fn invoke_static(&self, class_name: &str, method: &str, args: &[Value]) -> CallResult;

    /// Run the real body of `method` declared on `class_name` without
    /// consulting interceptors or shadows
    fn invoke_original(
        &self,
        class_name: &str,
        this: Option<&ObjectRef>,
        method: &MethodDescriptor,
        args: &[Value],
    ) -> CallResult;

    // ========================================================================
    // Static state
    // ========================================================================

    /// Read a static field (`Null` if never written)
    fn get_static_field(&self, class_name: &str, field: &str) -> Result<Value, CallError>;

    /// Write a static field
    fn set_static_field(&self, class_name: &str, field: &str, value: Value) -> Result<(), CallError>;
}

/// Everything a method body sees about the call it is serving
pub struct CallContext<'a> {
    /// Sandbox running the call
    pub invoker: &'a dyn Invoker,
    /// Class declaring the real method
    pub class_name: &'a str,
    /// Descriptor of the real method
    pub method: &'a MethodDescriptor,
    /// Receiver (`None` for static methods and static initializers)
    pub this: Option<&'a ObjectRef>,
    /// Shadow bound to the receiver
    pub shadow: Option<&'a ShadowRef>,
    /// Arguments
    pub args: &'a [Value],
}

impl<'a> CallContext<'a> {
    /// API level the sandbox runs at
    pub fn api_level(&self) -> i32 {
        self.invoker.api_level()
    }

    /// The receiver, or a dispatch error for static calls
    pub fn this(&self) -> Result<&'a ObjectRef, CallError> {
        self.this.ok_or_else(|| {
            DispatchError::Receiver {
                class: self.class_name.to_string(),
                method: self.method.signature(),
                reason: "no receiver for instance method".to_string(),
            }
            .into()
        })
    }

    /// Argument at `index`
    pub fn arg(&self, index: usize) -> Result<&'a Value, CallError> {
        self.args.get(index).ok_or_else(|| {
            DispatchError::ArityMismatch {
                method: self.method.signature(),
                expected: index + 1,
                got: self.args.len(),
            }
            .into()
        })
    }

    /// Int argument at `index`
    pub fn arg_int(&self, index: usize) -> Result<i32, CallError> {
        let value = self.arg(index)?;
        value.as_int().ok_or_else(|| self.arg_type_error(index, "int", value))
    }

    /// Long argument at `index` (ints widen)
    pub fn arg_long(&self, index: usize) -> Result<i64, CallError> {
        let value = self.arg(index)?;
        value.as_long().ok_or_else(|| self.arg_type_error(index, "long", value))
    }

    /// Bool argument at `index`
    pub fn arg_bool(&self, index: usize) -> Result<bool, CallError> {
        let value = self.arg(index)?;
        value.as_bool().ok_or_else(|| self.arg_type_error(index, "boolean", value))
    }

    /// String argument at `index` (`None` for null)
    pub fn arg_str(&self, index: usize) -> Result<Option<&'a str>, CallError> {
        let value = self.arg(index)?;
        match value {
            Value::Null => Ok(None),
            Value::Str(s) => Ok(Some(s)),
            other => Err(self.arg_type_error(index, "java.lang.String", other)),
        }
    }

    fn arg_type_error(&self, index: usize, expected: &str, got: &Value) -> CallError {
        DispatchError::ArgumentType {
            method: self.method.signature(),
            index,
            expected: expected.to_string(),
            got: got.kind().to_string(),
        }
        .into()
    }

    /// Typed state of the receiver's shadow
    pub fn shadow<S: Any + Send + Sync>(&self) -> Result<Arc<S>, CallError> {
        let shadow = self
            .shadow
            .ok_or_else(|| DispatchError::ShadowNotBound(self.class_name.to_string()))?;
        shadow.state_arc::<S>().ok_or_else(|| {
            DispatchError::ShadowStateMismatch {
                class: self.class_name.to_string(),
                expected: type_name::<S>(),
            }
            .into()
        })
    }

    /// Run the real implementation of the method being served
    pub fn call_real(&self) -> CallResult {
        self.invoker
            .invoke_original(self.class_name, self.this, self.method, self.args)
    }

    /// Run the real implementation with different arguments
    pub fn call_real_with(&self, args: &[Value]) -> CallResult {
        self.invoker
            .invoke_original(self.class_name, self.this, self.method, args)
    }
}
