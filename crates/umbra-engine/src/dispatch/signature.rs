//! Shadow method lookup on a single shadow class
//!
//! Pure matching between a real method descriptor and the methods a shadow
//! class declares. Walking shadow superclasses and deciding what to do when
//! nothing matches is the wrangler's job.

use umbra_sdk::{MethodDescriptor, ShadowClassDef, ShadowMethodDef, TypeHierarchy};

use crate::shadow::SdkShadowMatcher;

/// How a shadow method was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Same name and parameter kinds
    Exact,
    /// Loose signatures: the all-`Any` form of the same arity
    Generic,
    /// Loose signatures: every shadow parameter accepts the real one
    Assignable,
}

/// Whether the class handler may dispatch to `method` at the matcher's SDK
pub fn is_valid_shadow_method(def: &ShadowClassDef, method: &ShadowMethodDef, matcher: &SdkShadowMatcher) -> bool {
    method.visibility.is_dispatchable() && matcher.matches_method(&def.name, method)
}

/// Find the method `def` declares for `real`.
///
/// Tries the exact signature first; with `loose` it then tries the generic
/// form and finally any method whose parameters accept the real ones.
/// Returns the method's position in `def.methods`.
pub fn find_declared_shadow_method(
    def: &ShadowClassDef,
    real: &MethodDescriptor,
    loose: bool,
    matcher: &SdkShadowMatcher,
    hierarchy: &dyn TypeHierarchy,
) -> Option<(usize, MatchKind)> {
    let indices = def.method_indices(&real.name);
    let valid = |i: usize| is_valid_shadow_method(def, &def.methods[i], matcher);

    if let Some(&i) = indices
        .iter()
        .find(|&&i| def.methods[i].descriptor.params == real.params && valid(i))
    {
        return Some((i, MatchKind::Exact));
    }
    if !loose {
        return None;
    }

    let generic = real.generic();
    if let Some(&i) = indices
        .iter()
        .find(|&&i| def.methods[i].descriptor.params == generic.params && valid(i))
    {
        return Some((i, MatchKind::Generic));
    }

    indices
        .iter()
        .copied()
        .find(|&i| {
            let params = &def.methods[i].descriptor.params;
            params.len() == real.params.len()
                && params
                    .iter()
                    .zip(&real.params)
                    .all(|(shadow, real)| shadow.is_assignable_from(real, hierarchy))
                && valid(i)
        })
        .map(|i| (i, MatchKind::Assignable))
}
