//! Test environments
//!
//! An `Environment` is the process-scoped owner of everything sandboxes
//! share: the system class loader, the interceptor table, the base shadow
//! map built from providers and the sandbox cache. Each test asks it for a
//! sandbox with a [`SandboxRequest`]; the environment picks or builds the
//! sandbox and installs the base map plus the test's own shadows.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use umbra_engine::{
    ClassPath, ConfigBuilder, InstrumentationConfiguration, Interceptors, Sandbox, SandboxManager, SandboxState,
    ShadowMap, SystemClassLoader, UmbraError,
};
use umbra_sdk::{CallError, LooperMode, ResourcesMode, ShadowClassDef};

use crate::error::RuntimeResult;
use crate::options::RuntimeOptions;
use crate::providers::ShadowProviders;
use crate::sdk::SdkCollection;

/// What one test needs from its sandbox
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    /// API level to run at
    pub api_level: i32,
    /// Looper mode; the environment default when `None`
    pub looper_mode: Option<LooperMode>,
    /// Resources mode; the environment default when `None`
    pub resources_mode: Option<ResourcesMode>,
    /// Instrumentation configuration; the environment default when `None`
    pub configuration: Option<Arc<InstrumentationConfiguration>>,
    /// Shadows layered over the base map for this test only
    pub shadows: Vec<ShadowClassDef>,
}

impl SandboxRequest {
    /// Request for `api_level` with every other setting defaulted
    pub fn new(api_level: i32) -> Self {
        Self {
            api_level,
            looper_mode: None,
            resources_mode: None,
            configuration: None,
            shadows: Vec::new(),
        }
    }

    /// Run in `mode`
    pub fn looper_mode(mut self, mode: LooperMode) -> Self {
        self.looper_mode = Some(mode);
        self
    }

    /// Load resources in `mode`
    pub fn resources_mode(mut self, mode: ResourcesMode) -> Self {
        self.resources_mode = Some(mode);
        self
    }

    /// Use `configuration` instead of the environment's
    pub fn configuration(mut self, configuration: Arc<InstrumentationConfiguration>) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Layer `shadow` over the base map
    pub fn shadow(mut self, shadow: ShadowClassDef) -> Self {
        self.shadows.push(shadow);
        self
    }
}

/// Process-scoped owner of shared sandbox state
pub struct Environment {
    options: RuntimeOptions,
    sdks: SdkCollection,
    providers: ShadowProviders,
    interceptors: Arc<Interceptors>,
    configuration: Arc<InstrumentationConfiguration>,
    base_map: ShadowMap,
    manager: SandboxManager,
}

impl Environment {
    /// Environment over `class_path` using `providers`
    pub fn new(options: RuntimeOptions, class_path: ClassPath, providers: ShadowProviders) -> RuntimeResult<Self> {
        let interceptors = Arc::new(Interceptors::android(options.host_runtime_version));
        let configuration = Arc::new(Self::build_configuration(&options, &providers, &interceptors)?);
        let base_map = providers.build_base_map()?;
        let manager = SandboxManager::new(
            Arc::new(SystemClassLoader::new(class_path)),
            Arc::clone(&interceptors),
            options.sandbox_cache_size,
        );
        debug!(
            providers = providers.len(),
            shadowed_classes = base_map.len(),
            host_runtime_version = options.host_runtime_version,
            cache_size = options.sandbox_cache_size,
            "Created environment"
        );

        Ok(Self {
            sdks: SdkCollection::new(options.host_runtime_version),
            options,
            providers,
            interceptors,
            configuration,
            base_map,
            manager,
        })
    }

    /// Environment configured from process environment variables and every
    /// registered provider
    pub fn from_env(class_path: ClassPath) -> RuntimeResult<Self> {
        Self::new(RuntimeOptions::from_env()?, class_path, ShadowProviders::discover())
    }

    /// Defaults, provider packages, option overrides and every interceptor ref
    fn build_configuration(
        options: &RuntimeOptions,
        providers: &ShadowProviders,
        interceptors: &Interceptors,
    ) -> RuntimeResult<InstrumentationConfiguration> {
        let mut builder = InstrumentationConfiguration::builder().with_default_exclusions();
        for package in providers.provided_package_names() {
            builder = builder.add_instrumented_package(package);
        }
        for package in &options.do_not_acquire_packages {
            builder = builder.do_not_acquire_package(package.clone());
        }
        if let Some(regex) = &options.do_not_instrument_regex {
            builder = builder.set_do_not_instrument_class_regex(regex.clone());
        }
        builder = builder.add_intercepted_methods(interceptors.all_method_refs());
        Ok(builder.build()?)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Options this environment was built with
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Known SDKs on this host
    pub fn sdks(&self) -> &SdkCollection {
        &self.sdks
    }

    /// Shadow providers
    pub fn providers(&self) -> &ShadowProviders {
        &self.providers
    }

    /// Interceptor table shared by every sandbox
    pub fn interceptors(&self) -> &Arc<Interceptors> {
        &self.interceptors
    }

    /// Default instrumentation configuration
    pub fn configuration(&self) -> &Arc<InstrumentationConfiguration> {
        &self.configuration
    }

    /// Builder preloaded with the default configuration, for tests that
    /// need to adjust it
    pub fn configuration_builder(&self) -> ConfigBuilder {
        self.configuration.to_builder()
    }

    /// Shadow map built from the providers
    pub fn base_shadow_map(&self) -> &ShadowMap {
        &self.base_map
    }

    /// Sandbox cache
    pub fn manager(&self) -> &SandboxManager {
        &self.manager
    }

    // ========================================================================
    // Sandboxes
    // ========================================================================

    /// Sandbox for `request`, with the base map and the request's shadows
    /// installed
    pub fn sandbox_for(&self, request: &SandboxRequest) -> RuntimeResult<Arc<Sandbox>> {
        let sdk = self.sdks.get(request.api_level);
        let configuration = request
            .configuration
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.configuration));
        let sandbox = self.manager.get_sandbox(
            configuration,
            &sdk,
            request.resources_mode.unwrap_or(self.options.resources_mode),
            request.looper_mode.unwrap_or(self.options.looper_mode),
        )?;

        let map = self.shadow_map_for(request)?;
        if sandbox.state() == SandboxState::Uninitialized {
            sandbox.configure(map);
        } else {
            sandbox.replace_shadow_map(map);
        }
        Ok(sandbox)
    }

    fn shadow_map_for(&self, request: &SandboxRequest) -> RuntimeResult<ShadowMap> {
        if request.shadows.is_empty() {
            return Ok(self.base_map.clone());
        }
        let mut builder = self.base_map.new_builder();
        builder.add_shadow_classes(request.shadows.iter().cloned());
        Ok(builder.build()?)
    }

    /// Run `test` in the sandbox for `request`, then reset provider state
    /// and the fake clock whatever the outcome, panics included
    pub fn run<T, F>(&self, request: &SandboxRequest, test: F) -> RuntimeResult<T>
    where
        F: FnOnce(&Sandbox) -> Result<T, CallError>,
    {
        let sandbox = self.sandbox_for(request)?;
        let _reset = ResetOnDrop(self);
        test(&sandbox).map_err(|e| UmbraError::Call(e).into())
    }

    /// Clear state shadows and interceptors keep between tests
    pub fn reset(&self) {
        self.providers.reset_all();
        self.interceptors.clock().reset();
    }
}

/// Resets the environment when a test run ends, including by unwinding
struct ResetOnDrop<'a>(&'a Environment);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.reset();
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("options", &self.options)
            .field("providers", &self.providers)
            .field("base_map", &self.base_map)
            .field("manager", &self.manager)
            .finish()
    }
}
