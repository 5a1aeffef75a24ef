//! Platform SDK descriptions
//!
//! An `Sdk` is one platform API level a sandbox can run. Concrete SDK lists
//! live in the runtime crate; the engine only needs these queries.

use std::fmt;

use crate::error::ConfigError;

/// Highest API level that still ships legacy resources
pub const LEGACY_RESOURCES_MAX_SDK: i32 = 28;

/// A platform SDK
pub trait Sdk: Send + Sync + fmt::Debug {
    /// Numeric API level
    fn api_level(&self) -> i32;

    /// Human-readable platform version (e.g. "9")
    fn android_version(&self) -> String;

    /// Whether this SDK is one the framework knows about
    fn is_known(&self) -> bool;

    /// Whether this SDK can run on the current host
    fn is_supported(&self) -> bool;

    /// Why this SDK cannot run on the current host
    fn unsupported_message(&self) -> String;

    /// Fail with a configuration error unless this SDK can run here
    fn verify_supported_sdk(&self, test_class_name: &str) -> Result<(), ConfigError> {
        if self.is_known() && !self.is_supported() {
            return Err(ConfigError::UnsupportedSdk(format!(
                "Failed to create a sandbox for {}: {}",
                test_class_name,
                self.unsupported_message()
            )));
        }
        Ok(())
    }
}

/// An SDK described only by its API level; always known and supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApiLevel(pub i32);

impl Sdk for ApiLevel {
    fn api_level(&self) -> i32 {
        self.0
    }

    fn android_version(&self) -> String {
        self.0.to_string()
    }

    fn is_known(&self) -> bool {
        true
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn unsupported_message(&self) -> String {
        String::new()
    }
}
