//! Shadow-map backed class handler
//!
//! The wrangler answers the three questions instrumented code asks: how to
//! run a static initializer, which shadow to bind to a new instance, and
//! what to do for a method call. Plans are cached per (shadow class,
//! declaring class, signature); the shadow map and interceptor table are
//! immutable, so a wrangler never needs invalidating. Replacing the shadow
//! map means replacing the wrangler.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;
use umbra_sdk::{
    CallError, DispatchError, MethodDescriptor, ObjectRef, ShadowClassDef, ShadowInstance, ShadowLayer, ShadowRef,
    TypeHierarchy,
};

use super::signature::find_declared_shadow_method;
use super::{ClassHandler, MethodCall, Plan};
use crate::instrument::LoadedClass;
use crate::interceptors::{Interceptor, Interceptors};
use crate::shadow::{SdkShadowMatcher, ShadowInfo, ShadowMap};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PlanKey {
    shadow_class: String,
    declaring_class: String,
    signature: String,
}

/// The standard [`ClassHandler`]
pub struct ShadowWrangler {
    map: ShadowMap,
    matcher: SdkShadowMatcher,
    interceptors: Arc<Interceptors>,
    plans: RwLock<FxHashMap<PlanKey, Plan>>,
}

impl ShadowWrangler {
    /// Handler resolving against `map` at API level `api_level`
    pub fn new(map: ShadowMap, api_level: i32, interceptors: Arc<Interceptors>) -> Self {
        Self {
            map,
            matcher: SdkShadowMatcher::new(api_level),
            interceptors,
            plans: RwLock::new(FxHashMap::default()),
        }
    }

    /// Interceptor table
    pub fn interceptors(&self) -> &Arc<Interceptors> {
        &self.interceptors
    }

    /// Number of cached plans
    pub fn cached_plans(&self) -> usize {
        self.plans.read().len()
    }

    /// Shadow mapping that applies to a call on `declaring_class`.
    ///
    /// An instance keeps the shadow it was bound to: if one of its layers
    /// shadows the declaring class, that mapping wins over a fresh lookup.
    fn shadow_info_for(&self, declaring_class: &str, instance: Option<&ObjectRef>) -> Option<Arc<ShadowInfo>> {
        if let Some(bound) = instance.and_then(|i| i.shadow()) {
            for layer in bound.layers() {
                if let Some(info) = self.map.own_info(&layer.shadow_class) {
                    if info.real_class_name == declaring_class {
                        return Some(Arc::clone(info));
                    }
                }
            }
        }
        self.map.get_shadow_info(declaring_class, &self.matcher, instance)
    }

    /// Search `def` and then each shadow superclass that shadows the same
    /// real class at this SDK
    fn find_shadow_method(
        &self,
        declaring_class: &str,
        method: &MethodDescriptor,
        info: &ShadowInfo,
        hierarchy: &dyn TypeHierarchy,
    ) -> Option<(Arc<ShadowClassDef>, usize)> {
        let mut def = Arc::clone(info.shadow_def());
        let mut loose = info.loose_signatures;
        loop {
            if let Some((index, kind)) =
                find_declared_shadow_method(&def, method, loose, &self.matcher, hierarchy)
            {
                trace!(shadow = %def.name, method = %method.signature(), ?kind, "Matched shadow method");
                return Some((def, index));
            }

            let parent = def.superclass.as_deref().and_then(|s| self.map.own_info(s))?;
            if parent.real_class_name != declaring_class || !self.matcher.matches_info(parent) {
                return None;
            }
            loose = parent.loose_signatures;
            def = Arc::clone(parent.shadow_def());
        }
    }

    fn calculate_plan(
        &self,
        declaring_class: &str,
        method: &MethodDescriptor,
        info: &ShadowInfo,
        hierarchy: &dyn TypeHierarchy,
    ) -> Plan {
        match self.find_shadow_method(declaring_class, method, info, hierarchy) {
            Some((def, index)) => Plan::Shadow { def, index },
            None if info.call_through_by_default => Plan::CallReal,
            None => Plan::DoNothing,
        }
    }

    fn create_shadow(&self, def: &Arc<ShadowClassDef>, instance: &ObjectRef) -> Result<ShadowRef, CallError> {
        instance.bind_shadow(|real| {
            let mut layers = Vec::new();
            let mut current = Some(Arc::clone(def));
            while let Some(layer_def) = current {
                let state = layer_def
                    .factory
                    .create()
                    .map_err(|reason| DispatchError::ShadowInstantiation {
                        shadow: layer_def.name.clone(),
                        reason,
                    })?;
                layers.push(ShadowLayer {
                    shadow_class: layer_def.name.clone(),
                    state,
                });
                current = layer_def
                    .superclass
                    .as_deref()
                    .and_then(|s| self.map.shadow_class(s))
                    .cloned();
            }
            trace!(shadow = %def.name, real = instance.class_name(), "Bound shadow");
            Ok(ShadowInstance::new(def.name.clone(), layers, real))
        })
    }
}

impl ClassHandler for ShadowWrangler {
    fn class_initializing(&self, class: &LoadedClass) -> Result<Plan, CallError> {
        let Some(info) = self.map.get_shadow_info(class.name(), &self.matcher, None) else {
            return Ok(Plan::CallReal);
        };
        let clinit = MethodDescriptor::static_initializer();
        match self.find_shadow_method(class.name(), &clinit, &info, &umbra_sdk::FlatHierarchy) {
            Some((def, index)) => {
                let method = &def.methods[index];
                if !method.is_static {
                    return Err(DispatchError::NotStatic(format!(
                        "{}.{}",
                        def.name, method.descriptor.name
                    ))
                    .into());
                }
                Ok(Plan::Shadow { def, index })
            }
            // shadows that do not call through still get the real initializer
            None => Ok(Plan::CallReal),
        }
    }

    fn initializing(&self, class: &LoadedClass, instance: &ObjectRef) -> Result<Option<ShadowRef>, CallError> {
        if let Some(bound) = instance.shadow() {
            return Ok(Some(Arc::clone(bound)));
        }
        for ancestor in class.ancestors() {
            if let Some(info) = self.map.get_shadow_info(ancestor.name(), &self.matcher, Some(instance)) {
                return self.create_shadow(info.shadow_def(), instance).map(Some);
            }
        }
        Ok(None)
    }

    fn method_invoked(&self, call: &MethodCall<'_>) -> Plan {
        let Some(info) = self.shadow_info_for(call.declaring_class, call.instance) else {
            return Plan::CallReal;
        };

        let key = PlanKey {
            shadow_class: info.shadow_class_name.clone(),
            declaring_class: call.declaring_class.to_string(),
            signature: call.method.signature(),
        };
        if let Some(plan) = self.plans.read().get(&key) {
            return plan.clone();
        }

        let plan = self.calculate_plan(call.declaring_class, call.method, &info, call.hierarchy);
        trace!(
            class = call.declaring_class,
            method = %key.signature,
            is_static = call.is_static,
            ?plan,
            "Calculated plan"
        );
        self.plans.write().entry(key).or_insert(plan).clone()
    }

    fn intercept(&self, owner: &str, method: &str) -> Option<Arc<dyn Interceptor>> {
        self.interceptors.find_interceptor(owner, method).cloned()
    }

    fn shadow_map(&self) -> &ShadowMap {
        &self.map
    }

    fn api_level(&self) -> i32 {
        self.matcher.api_level()
    }
}

impl fmt::Debug for ShadowWrangler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowWrangler")
            .field("map", &self.map)
            .field("api_level", &self.matcher.api_level())
            .field("interceptors", &self.interceptors)
            .field("cached_plans", &self.plans.read().len())
            .finish()
    }
}
