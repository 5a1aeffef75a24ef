//! `sun.misc.Cleaner` compatibility for hosts where it no longer exists

use umbra_sdk::{CallContext, CallResult, Exception, RealObject, Value};

use super::{Interceptor, MethodRef};

/// Owner of the intercepted methods, and class of the handle `create` returns
pub const CLEANER_CLASS: &str = "sun.misc.Cleaner";

const ACTION_FIELD: &str = "action";
const CLEANED_FIELD: &str = "cleaned";

/// Maps `sun.misc.Cleaner.create`/`clean` onto a handle that runs its
/// action at most once
pub struct CleanerInterceptor {
    refs: Vec<MethodRef>,
}

impl CleanerInterceptor {
    /// Create the interceptor
    pub fn new() -> Self {
        Self {
            refs: vec![
                MethodRef::new(CLEANER_CLASS, "create"),
                MethodRef::new(CLEANER_CLASS, "clean"),
            ],
        }
    }

    fn create(ctx: &CallContext<'_>) -> CallResult {
        let action = ctx.arg(1)?;
        if action.is_null() {
            return Err(Exception::null_pointer("cleaner action").into());
        }
        let cleanable = RealObject::new(CLEANER_CLASS);
        cleanable.set_field(ACTION_FIELD, action.clone());
        cleanable.set_field(CLEANED_FIELD, Value::Bool(false));
        Ok(Value::Object(cleanable))
    }

    fn clean(ctx: &CallContext<'_>) -> CallResult {
        let cleanable = ctx.this()?;
        if cleanable.get_field(CLEANED_FIELD).as_bool() == Some(true) {
            return Ok(Value::Null);
        }
        cleanable.set_field(CLEANED_FIELD, Value::Bool(true));
        match cleanable.get_field(ACTION_FIELD) {
            Value::Object(action) => ctx.invoker.invoke(&action, "run", &[]).map(|_| Value::Null),
            _ => Ok(Value::Null),
        }
    }
}

impl Default for CleanerInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for CleanerInterceptor {
    fn method_refs(&self) -> &[MethodRef] {
        &self.refs
    }

    fn intercept(&self, method_name: &str, ctx: &CallContext<'_>) -> CallResult {
        match method_name {
            "create" => Self::create(ctx),
            "clean" => Self::clean(ctx),
            other => Err(Exception::illegal_state(format!("Cleaner.{} is not intercepted", other)).into()),
        }
    }
}
