//! Registration-time checks on shadow classes

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;
use umbra_sdk::{ShadowClassDef, ShadowMethodDef, Visibility, DEFAULT_SDK, PUBLIC_SHADOW_METHOD_NAMES};

use crate::error::RegistrationError;

/// Check the methods of one shadow class.
///
/// Constructor and static initializer shadows must carry the
/// `Implementation` marker, and static initializer shadows must be static.
/// Public methods outside the `toString`/`hashCode`/`equals` exemption are
/// reported but accepted. Two dispatchable methods substituting the same
/// real signature must not share an SDK level.
pub fn validate_shadow_class(def: &ShadowClassDef) -> Result<(), RegistrationError> {
    validate_method_bands(def)?;
    for method in &def.methods {
        let desc = &method.descriptor;
        let reserved = desc.is_constructor() || desc.is_static_initializer();

        if reserved && method.implementation.is_none() {
            return Err(RegistrationError::MissingImplementation {
                shadow: def.name.clone(),
                method: desc.name.clone(),
            });
        }

        if desc.is_static_initializer() && !method.is_static {
            return Err(RegistrationError::NotStatic {
                shadow: def.name.clone(),
                method: desc.name.clone(),
            });
        }

        if method.visibility == Visibility::Public
            && !PUBLIC_SHADOW_METHOD_NAMES.contains(&desc.name.as_str())
        {
            warn!(
                shadow = %def.name,
                method = %desc.signature(),
                "Shadow method should be protected, not public"
            );
        }
    }
    Ok(())
}

fn validate_method_bands(def: &ShadowClassDef) -> Result<(), RegistrationError> {
    for (pos, first) in def.methods.iter().enumerate() {
        if !first.visibility.is_dispatchable() {
            continue;
        }
        let clash = def.methods[pos + 1..].iter().find(|second| {
            second.visibility.is_dispatchable()
                && second.is_static == first.is_static
                && second.effective_name() == first.effective_name()
                && second.descriptor.params == first.descriptor.params
                && bands_overlap(first, second)
        });
        if clash.is_some() {
            return Err(RegistrationError::AmbiguousMethod {
                shadow: def.name.clone(),
                method: first.effective_descriptor().signature(),
            });
        }
    }
    Ok(())
}

/// Inclusive SDK band of a method; unmarked methods match every level
fn method_band(method: &ShadowMethodDef) -> Option<(i32, i32)> {
    let (min, max) = method
        .implementation
        .as_ref()
        .map_or((DEFAULT_SDK, DEFAULT_SDK), |i| (i.min_sdk, i.max_sdk));
    let lo = if min == DEFAULT_SDK { i32::MIN } else { min };
    let hi = if max == DEFAULT_SDK { i32::MAX } else { max };
    (lo <= hi).then_some((lo, hi))
}

fn bands_overlap(a: &ShadowMethodDef, b: &ShadowMethodDef) -> bool {
    match (method_band(a), method_band(b)) {
        (Some((lo1, hi1)), Some((lo2, hi2))) => lo1 <= hi2 && lo2 <= hi1,
        _ => false,
    }
}

/// Check that every declared shadow superclass exists and that no chain
/// loops back on itself
pub fn validate_superclasses(
    shadows: &FxHashMap<String, Arc<ShadowClassDef>>,
) -> Result<(), RegistrationError> {
    for def in shadows.values() {
        let mut seen = FxHashSet::default();
        seen.insert(def.name.as_str());
        let mut current = def.superclass.as_deref();
        while let Some(name) = current {
            if !seen.insert(name) {
                return Err(RegistrationError::SuperclassCycle(def.name.clone()));
            }
            let parent = shadows.get(name).ok_or_else(|| RegistrationError::UnknownShadow {
                real: def.real_class.clone(),
                shadow: name.to_string(),
            })?;
            current = parent.superclass.as_deref();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_sdk::{CallContext, CallResult, ShadowMethodDef, TypeKind, Value};

    fn noop(_: &CallContext<'_>) -> CallResult {
        Ok(Value::Null)
    }

    fn table(defs: Vec<ShadowClassDef>) -> FxHashMap<String, Arc<ShadowClassDef>> {
        defs.into_iter().map(|d| (d.name.clone(), Arc::new(d))).collect()
    }

    #[test]
    fn test_unmarked_constructor_rejected() {
        let def = ShadowClassDef::builder("ShadowWidget", "Widget")
            .method(ShadowMethodDef::new("__constructor__", vec![], TypeKind::Void, noop).unmarked())
            .build();
        assert!(matches!(
            validate_shadow_class(&def),
            Err(RegistrationError::MissingImplementation { .. })
        ));
    }

    #[test]
    fn test_instance_static_initializer_rejected() {
        let def = ShadowClassDef::builder("ShadowWidget", "Widget")
            .method(ShadowMethodDef::new("__staticInitializer__", vec![], TypeKind::Void, noop))
            .build();
        assert!(matches!(
            validate_shadow_class(&def),
            Err(RegistrationError::NotStatic { .. })
        ));

        let def = ShadowClassDef::builder("ShadowWidget", "Widget")
            .method(ShadowMethodDef::new("__staticInitializer__", vec![], TypeKind::Void, noop).static_method())
            .build();
        assert!(validate_shadow_class(&def).is_ok());
    }

    #[test]
    fn test_public_method_is_only_a_warning() {
        let def = ShadowClassDef::builder("ShadowWidget", "Widget")
            .method(
                ShadowMethodDef::new("getValue", vec![], TypeKind::Int, noop).visibility(Visibility::Public),
            )
            .build();
        assert!(validate_shadow_class(&def).is_ok());
    }

    #[test]
    fn test_same_signature_methods_need_disjoint_bands() {
        let disjoint = ShadowClassDef::builder("ShadowWidget", "Widget")
            .method(ShadowMethodDef::new("getValue", vec![], TypeKind::Int, noop).max_sdk(22))
            .method(
                ShadowMethodDef::new("getValueV23", vec![], TypeKind::Int, noop)
                    .method_name("getValue")
                    .min_sdk(23),
            )
            .build();
        assert!(validate_shadow_class(&disjoint).is_ok());

        let overlapping = ShadowClassDef::builder("ShadowWidget", "Widget")
            .method(ShadowMethodDef::new("getValue", vec![], TypeKind::Int, noop).max_sdk(23))
            .method(
                ShadowMethodDef::new("getValueV23", vec![], TypeKind::Int, noop)
                    .method_name("getValue")
                    .min_sdk(23),
            )
            .build();
        assert!(matches!(
            validate_shadow_class(&overlapping),
            Err(RegistrationError::AmbiguousMethod { ref method, .. }) if method.starts_with("getValue(")
        ));
    }

    #[test]
    fn test_superclass_chain() {
        let ok = table(vec![
            ShadowClassDef::builder("ShadowButton", "Button").superclass("ShadowView").build(),
            ShadowClassDef::builder("ShadowView", "View").build(),
        ]);
        assert!(validate_superclasses(&ok).is_ok());

        let missing = table(vec![ShadowClassDef::builder("ShadowButton", "Button")
            .superclass("ShadowView")
            .build()]);
        assert!(matches!(
            validate_superclasses(&missing),
            Err(RegistrationError::UnknownShadow { .. })
        ));

        let cyclic = table(vec![
            ShadowClassDef::builder("A", "X").superclass("B").build(),
            ShadowClassDef::builder("B", "Y").superclass("A").build(),
        ]);
        assert!(matches!(
            validate_superclasses(&cyclic),
            Err(RegistrationError::SuperclassCycle(_))
        ));
    }
}
