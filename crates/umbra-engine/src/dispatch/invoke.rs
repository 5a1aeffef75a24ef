//! Argument checks and plan execution

use umbra_sdk::{
    CallContext, CallResult, DispatchError, Exception, Invoker, MethodDescriptor, ObjectRef, TypeHierarchy, Value,
};

use super::Plan;
use crate::instrument::LoadedMethod;

/// Check `args` against the parameter kinds of `method`
pub fn check_args(
    method: &MethodDescriptor,
    args: &[Value],
    hierarchy: &dyn TypeHierarchy,
) -> Result<(), DispatchError> {
    if method.arity() != args.len() {
        return Err(DispatchError::ArityMismatch {
            method: method.signature(),
            expected: method.arity(),
            got: args.len(),
        });
    }
    for (index, (param, arg)) in method.params.iter().zip(args).enumerate() {
        if !param.accepts(arg, hierarchy) {
            return Err(DispatchError::ArgumentType {
                method: method.signature(),
                index,
                expected: param.to_string(),
                got: if arg.is_null() {
                    "null".to_string()
                } else {
                    arg.kind().to_string()
                },
            });
        }
    }
    Ok(())
}

/// One call of a loaded method, ready to run under a plan
pub struct Invocation<'a> {
    /// Sandbox running the call
    pub invoker: &'a dyn Invoker,
    /// Method being called
    pub method: &'a LoadedMethod,
    /// Receiver
    pub this: Option<&'a ObjectRef>,
    /// Arguments, already checked against the method
    pub args: &'a [Value],
}

impl<'a> Invocation<'a> {
    fn context(&self) -> CallContext<'a> {
        CallContext {
            invoker: self.invoker,
            class_name: &self.method.declaring_class,
            method: &self.method.descriptor,
            this: self.this,
            shadow: self.this.and_then(|t| t.shadow()),
            args: self.args,
        }
    }

    /// Run the real body
    pub fn run_real(&self) -> CallResult {
        match &self.method.body {
            Some(body) => body(&self.context()),
            None => Err(Exception::new(
                "java.lang.AbstractMethodError",
                format!(
                    "{}.{}",
                    self.method.declaring_class,
                    self.method.descriptor.signature()
                ),
            )
            .into()),
        }
    }

    /// Run whatever `plan` says
    pub fn run(&self, plan: &Plan) -> CallResult {
        match plan {
            Plan::CallReal => self.run_real(),
            Plan::DoNothing => Ok(self.method.descriptor.ret.default_value()),
            Plan::Shadow { .. } => {
                let Some(shadow_method) = plan.shadow_method() else {
                    return self.run_real();
                };
                check_args(&shadow_method.descriptor, self.args, self.invoker)?;
                (shadow_method.body)(&self.context())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_sdk::{FlatHierarchy, TypeKind};

    #[test]
    fn test_arity_mismatch() {
        let m = MethodDescriptor::new("set", vec![TypeKind::Int], TypeKind::Void);
        let err = check_args(&m, &[], &FlatHierarchy).unwrap_err();
        assert_eq!(
            err,
            DispatchError::ArityMismatch {
                method: "set(int)".into(),
                expected: 1,
                got: 0
            }
        );
    }

    #[test]
    fn test_argument_type_mismatch() {
        let m = MethodDescriptor::new("set", vec![TypeKind::Int, TypeKind::Str], TypeKind::Void);
        let err = check_args(&m, &[Value::Int(1), Value::Int(2)], &FlatHierarchy).unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentType { index: 1, .. }));

        let err = check_args(&m, &[Value::Null, Value::Null], &FlatHierarchy).unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentType { index: 0, ref got, .. } if got == "null"));
    }

    #[test]
    fn test_widening_accepted() {
        let m = MethodDescriptor::new("set", vec![TypeKind::Long, TypeKind::Any], TypeKind::Void);
        assert!(check_args(&m, &[Value::Int(1), Value::from("x")], &FlatHierarchy).is_ok());
    }
}
