//! Sandbox cache key

use std::fmt;
use std::sync::Arc;

use umbra_sdk::{LooperMode, ResourcesMode};

use crate::instrument::InstrumentationConfiguration;

/// Everything that makes two sandboxes interchangeable.
///
/// Two requests share a sandbox exactly when every field is equal; the
/// configuration compares structurally, not by identity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SandboxKey {
    /// Instrumentation configuration
    pub configuration: Arc<InstrumentationConfiguration>,
    /// API level
    pub api_level: i32,
    /// Resources mode
    pub resources_mode: ResourcesMode,
    /// Looper mode
    pub looper_mode: LooperMode,
}

impl SandboxKey {
    /// Key for the given configuration and modes
    pub fn new(
        configuration: Arc<InstrumentationConfiguration>,
        api_level: i32,
        resources_mode: ResourcesMode,
        looper_mode: LooperMode,
    ) -> Self {
        Self {
            configuration,
            api_level,
            resources_mode,
            looper_mode,
        }
    }
}

impl fmt::Debug for SandboxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxKey")
            .field("api_level", &self.api_level)
            .field("resources_mode", &self.resources_mode)
            .field("looper_mode", &self.looper_mode)
            .finish_non_exhaustive()
    }
}
