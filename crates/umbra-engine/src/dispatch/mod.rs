//! Class handler: the hook instrumented classes call into
//!
//! - `signature`: matching real methods to shadow methods
//! - `wrangler`: the shadow-map backed `ClassHandler`
//! - `invoke`: argument checks and plan execution

pub mod invoke;
pub mod signature;
pub mod wrangler;

use std::fmt;
use std::sync::Arc;

use umbra_sdk::{CallError, MethodDescriptor, ObjectRef, ShadowClassDef, ShadowMethodDef, ShadowRef, TypeHierarchy};

use crate::instrument::LoadedClass;
use crate::interceptors::Interceptor;
use crate::shadow::ShadowMap;

pub use invoke::{check_args, Invocation};
pub use signature::{find_declared_shadow_method, is_valid_shadow_method, MatchKind};
pub use wrangler::ShadowWrangler;

/// What to do for one call of an instrumented method
#[derive(Clone)]
pub enum Plan {
    /// Run the real implementation
    CallReal,
    /// Return the default value without running anything
    DoNothing,
    /// Run a shadow method
    Shadow {
        /// Shadow class declaring the method
        def: Arc<ShadowClassDef>,
        /// Position of the method in `def.methods`
        index: usize,
    },
}

impl Plan {
    /// The shadow method this plan runs, if any
    pub fn shadow_method(&self) -> Option<&ShadowMethodDef> {
        match self {
            Plan::Shadow { def, index } => def.methods.get(*index),
            _ => None,
        }
    }

    /// Whether the real implementation runs
    pub fn is_call_real(&self) -> bool {
        matches!(self, Plan::CallReal)
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::CallReal => write!(f, "CallReal"),
            Plan::DoNothing => write!(f, "DoNothing"),
            Plan::Shadow { def, index } => match def.methods.get(*index) {
                Some(m) => write!(f, "Shadow({}.{})", def.name, m.descriptor.signature()),
                None => write!(f, "Shadow({}#{})", def.name, index),
            },
        }
    }
}

/// One call of an instrumented method, as seen by the class handler
pub struct MethodCall<'a> {
    /// Class declaring the real method
    pub declaring_class: &'a str,
    /// Real method
    pub method: &'a MethodDescriptor,
    /// Static method
    pub is_static: bool,
    /// Receiver (`None` for static calls)
    pub instance: Option<&'a ObjectRef>,
    /// Class hierarchy of the sandbox making the call
    pub hierarchy: &'a dyn TypeHierarchy,
}

/// Receives the callbacks instrumented classes make
pub trait ClassHandler: Send + Sync {
    /// Plan for the static initializer of `class`
    fn class_initializing(&self, class: &LoadedClass) -> Result<Plan, CallError>;

    /// Bind the shadow for a new instance of `class`, before any constructor
    /// body runs; `None` when no class in its hierarchy is shadowed
    fn initializing(&self, class: &LoadedClass, instance: &ObjectRef) -> Result<Option<ShadowRef>, CallError>;

    /// Plan for one call of an instrumented method
    fn method_invoked(&self, call: &MethodCall<'_>) -> Plan;

    /// Interceptor replacing `owner.method`
    fn intercept(&self, owner: &str, method: &str) -> Option<Arc<dyn Interceptor>>;

    /// Shadow map this handler resolves against
    fn shadow_map(&self) -> &ShadowMap;

    /// API level this handler matches shadows for
    fn api_level(&self) -> i32;
}
