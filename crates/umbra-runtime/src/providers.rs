//! Shadow provider discovery
//!
//! Crates shipping shadows register a provider once per process with
//! [`register_provider`]; [`ShadowProviders::discover`] collects every
//! registered provider in registration order. Environments can also be
//! given an explicit provider list.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, trace};
use umbra_engine::shadow::build_map;
use umbra_engine::{RegistrationError, ShadowMap, ShadowProvider};

static REGISTERED: Lazy<RwLock<Vec<Arc<dyn ShadowProvider>>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// Make `provider` visible to [`ShadowProviders::discover`]
pub fn register_provider(provider: Arc<dyn ShadowProvider>) {
    REGISTERED.write().push(provider);
}

/// An ordered set of shadow providers
#[derive(Clone, Default)]
pub struct ShadowProviders {
    providers: Vec<Arc<dyn ShadowProvider>>,
}

impl ShadowProviders {
    /// Providers in the given order
    pub fn new(providers: impl IntoIterator<Item = Arc<dyn ShadowProvider>>) -> Self {
        Self {
            providers: providers.into_iter().collect(),
        }
    }

    /// Every provider registered in this process so far
    pub fn discover() -> Self {
        let providers = REGISTERED.read().clone();
        debug!(count = providers.len(), "Discovered shadow providers");
        Self { providers }
    }

    /// Add a provider after the existing ones
    pub fn push(&mut self, provider: Arc<dyn ShadowProvider>) {
        self.providers.push(provider);
    }

    /// Packages every provider needs instrumented, deduplicated
    pub fn provided_package_names(&self) -> BTreeSet<String> {
        self.providers
            .iter()
            .flat_map(|p| p.provided_package_names())
            .collect()
    }

    /// Base shadow map holding every provider's shadows
    pub fn build_base_map(&self) -> Result<ShadowMap, RegistrationError> {
        build_map(self.providers.iter().map(|p| p.as_ref()))
    }

    /// Clear static shadow state kept by every provider
    pub fn reset_all(&self) {
        for provider in &self.providers {
            provider.reset();
        }
        trace!(count = self.providers.len(), "Reset shadow providers");
    }

    /// Number of providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if there are no providers
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ShadowProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowProviders")
            .field("providers", &self.providers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use umbra_engine::SdkShadowMatcher;
    use umbra_sdk::ShadowClassDef;

    #[derive(Default)]
    struct Counting {
        resets: AtomicUsize,
    }

    impl ShadowProvider for Counting {
        fn shadows(&self) -> Vec<ShadowClassDef> {
            vec![ShadowClassDef::builder("org.umbra.shadows.ShadowToast", "android.widget.Toast").build()]
        }

        fn provided_package_names(&self) -> Vec<String> {
            vec!["android.widget".to_string(), "android.app".to_string()]
        }

        fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Views;

    impl ShadowProvider for Views {
        fn shadows(&self) -> Vec<ShadowClassDef> {
            vec![ShadowClassDef::builder("org.umbra.shadows.ShadowView", "android.view.View").build()]
        }

        fn provided_package_names(&self) -> Vec<String> {
            vec!["android.view".to_string(), "android.app".to_string()]
        }
    }

    #[test]
    fn test_aggregates_packages_and_shadows() {
        let providers = ShadowProviders::new([
            Arc::new(Counting::default()) as Arc<dyn ShadowProvider>,
            Arc::new(Views),
        ]);
        let packages: Vec<String> = providers.provided_package_names().into_iter().collect();
        assert_eq!(packages, vec!["android.app", "android.view", "android.widget"]);

        let map = providers.build_base_map().unwrap();
        let matcher = SdkShadowMatcher::new(30);
        assert!(map.get_shadow_info("android.widget.Toast", &matcher, None).is_some());
        assert!(map.get_shadow_info("android.view.View", &matcher, None).is_some());
    }

    #[test]
    fn test_reset_reaches_every_provider() {
        let counting = Arc::new(Counting::default());
        let providers = ShadowProviders::new([counting.clone() as Arc<dyn ShadowProvider>]);
        providers.reset_all();
        providers.reset_all();
        assert_eq!(counting.resets.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_discover_sees_registered_providers() {
        register_provider(Arc::new(Views));
        assert!(ShadowProviders::discover().len() >= 1);
    }
}
