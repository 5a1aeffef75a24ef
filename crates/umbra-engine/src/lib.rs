//! Umbra Dispatch Engine
//!
//! This crate runs real classes inside isolated sandboxes where individual
//! methods can be replaced by shadows chosen per SDK level:
//! - **Shadow registry**: immutable, layered shadow maps (`shadow` module)
//! - **Dispatch**: the class handler deciding what each call runs (`dispatch` module)
//! - **Interceptors**: call-site replacements for platform methods (`interceptors` module)
//! - **Instrumentation**: configuration, class path, loaders (`instrument` module)
//! - **Sandboxes**: the invoker and its process-wide cache (`sandbox` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use umbra_engine::{ApiLevel, ClassPath, InstrumentationConfiguration, SandboxManager, ShadowMap};
//!
//! let system = Arc::new(SystemClassLoader::new(class_path));
//! let manager = SandboxManager::new(system, Arc::new(Interceptors::android(17)), 8);
//! let sandbox = manager.get_sandbox(config, &ApiLevel(30), ResourcesMode::Binary, LooperMode::Paused)?;
//! sandbox.configure(shadow_map);
//!
//! let widget = sandbox.new_instance("com.example.Widget", &[])?;
//! let value = sandbox.invoke(&widget, "getValue", &[])?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Error types
pub mod error;

/// Platform SDK descriptions
pub mod sdk;

/// Shadow registry: mappings, SDK matching, providers
pub mod shadow;

/// Class handler and plan execution
pub mod dispatch;

/// Method interceptors
pub mod interceptors;

/// Class definitions, loading and instrumentation
pub mod instrument;

/// Sandboxes and the sandbox cache
pub mod sandbox;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatch::{ClassHandler, MethodCall, Plan, ShadowWrangler};
pub use error::{ClassLoadError, ConfigError, RegistrationError, UmbraError, UmbraResult};
pub use instrument::{
    ClassDef, ClassDefBuilder, ClassPath, ClassPathBuilder, ConfigBuilder, InstrumentationConfiguration,
    LoadedClass, SandboxClassLoader, SystemClassLoader,
};
pub use interceptors::{AndroidInterceptors, FakeClock, Interceptor, Interceptors, MethodRef, ANY_METHOD};
pub use sandbox::{Sandbox, SandboxKey, SandboxManager, SandboxState};
pub use sdk::{ApiLevel, Sdk, LEGACY_RESOURCES_MAX_SDK};
pub use shadow::{SdkShadowMatcher, ShadowInfo, ShadowMap, ShadowMapBuilder, ShadowProvider};
