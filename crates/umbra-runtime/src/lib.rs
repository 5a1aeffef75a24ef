//! Umbra Runtime
//!
//! Binds the dispatch engine to test runs:
//! - **Options**: environment variables controlling sandbox creation (`options` module)
//! - **SDKs**: the known platform SDKs and which ones this host can run (`sdk` module)
//! - **Providers**: discovery of crates shipping shadows (`providers` module)
//! - **Environment**: the process-scoped owner of sandboxes (`environment` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use umbra_runtime::{Environment, SandboxRequest};
//!
//! let env = Environment::from_env(class_path)?;
//! let value = env.run(&SandboxRequest::new(30), |sandbox| {
//!     let widget = sandbox.new_instance("com.example.Widget", &[])?;
//!     sandbox.invoke(&widget, "getValue", &[])
//! })?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Error types
pub mod error;

/// Options read from the process environment
pub mod options;

/// Known platform SDKs
pub mod sdk;

/// Shadow provider discovery
pub mod providers;

/// Test environments
pub mod environment;

pub use environment::{Environment, SandboxRequest};
pub use error::{RuntimeError, RuntimeResult};
pub use options::{RuntimeOptions, DEFAULT_HOST_RUNTIME_VERSION};
pub use providers::{register_provider, ShadowProviders};
pub use sdk::{DefaultSdk, SdkCollection};
