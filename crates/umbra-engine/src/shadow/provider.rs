//! Shadow providers
//!
//! A provider is a bundle of shadow classes shipped together, plus the
//! packages its shadows cover and a hook to clear the static state those
//! shadows keep between tests.

use umbra_sdk::ShadowClassDef;

use super::map::{ShadowMap, ShadowMapBuilder};
use crate::error::RegistrationError;

/// A bundle of shadow classes
pub trait ShadowProvider: Send + Sync {
    /// Shadow classes this provider contributes
    fn shadows(&self) -> Vec<ShadowClassDef>;

    /// Real class → shadow class mappings made by name only
    fn extra_shadows(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Packages whose classes must be instrumented for these shadows to apply
    fn provided_package_names(&self) -> Vec<String>;

    /// Clear static shadow state between tests
    fn reset(&self) {}
}

/// Register every shadow of `provider` on `builder`
pub fn register_provider(builder: &mut ShadowMapBuilder, provider: &dyn ShadowProvider) {
    builder.add_shadow_classes(provider.shadows());
    for (real, shadow) in provider.extra_shadows() {
        builder.add_extra_shadow(real, shadow);
    }
}

/// Build one map layer from `providers`
pub fn build_map<'a>(
    providers: impl IntoIterator<Item = &'a dyn ShadowProvider>,
) -> Result<ShadowMap, RegistrationError> {
    let mut builder = ShadowMap::builder();
    for provider in providers {
        register_provider(&mut builder, provider);
    }
    builder.build()
}
