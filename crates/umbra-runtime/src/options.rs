//! Runtime options read from the process environment
//!
//! Options are read once per environment. `from_vars` takes any key/value
//! source so tests never touch the real environment.

use umbra_engine::sandbox::manager::DEFAULT_CACHE_SIZE;
use umbra_sdk::{LooperMode, ResourcesMode};

use crate::error::{RuntimeError, RuntimeResult};

/// Comma-separated package prefixes sandboxes never acquire
pub const DO_NOT_ACQUIRE_PACKAGES_VAR: &str = "UMBRA_DO_NOT_ACQUIRE_PACKAGES";
/// Regex of class names never instrumented
pub const DO_NOT_INSTRUMENT_REGEX_VAR: &str = "UMBRA_DO_NOT_INSTRUMENT_REGEX";
/// Maximum number of cached sandboxes
pub const SANDBOX_CACHE_SIZE_VAR: &str = "UMBRA_SANDBOX_CACHE_SIZE";
/// Host runtime major version
pub const HOST_RUNTIME_VERSION_VAR: &str = "UMBRA_HOST_RUNTIME_VERSION";
/// Looper mode for new sandboxes
pub const LOOPER_MODE_VAR: &str = "UMBRA_LOOPER_MODE";
/// Resources mode for new sandboxes
pub const RESOURCES_MODE_VAR: &str = "UMBRA_RESOURCES_MODE";

/// Host runtime version assumed when none is configured
pub const DEFAULT_HOST_RUNTIME_VERSION: u32 = 17;

/// Options controlling how environments build sandboxes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Extra package prefixes never acquired
    pub do_not_acquire_packages: Vec<String>,
    /// Classes matching this regex are never instrumented
    pub do_not_instrument_regex: Option<String>,
    /// Maximum number of cached sandboxes
    pub sandbox_cache_size: usize,
    /// Host runtime major version
    pub host_runtime_version: u32,
    /// Default looper mode
    pub looper_mode: LooperMode,
    /// Default resources mode
    pub resources_mode: ResourcesMode,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            do_not_acquire_packages: Vec::new(),
            do_not_instrument_regex: None,
            sandbox_cache_size: DEFAULT_CACHE_SIZE,
            host_runtime_version: DEFAULT_HOST_RUNTIME_VERSION,
            looper_mode: LooperMode::default(),
            resources_mode: ResourcesMode::default(),
        }
    }
}

impl RuntimeOptions {
    /// Read options from the process environment
    pub fn from_env() -> RuntimeResult<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Read options from `vars`; unknown keys are ignored and blank values
    /// count as unset
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> RuntimeResult<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();
        for (key, value) in vars {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                DO_NOT_ACQUIRE_PACKAGES_VAR => {
                    options.do_not_acquire_packages = value
                        .split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                DO_NOT_INSTRUMENT_REGEX_VAR => {
                    options.do_not_instrument_regex = Some(value.to_string());
                }
                SANDBOX_CACHE_SIZE_VAR => {
                    options.sandbox_cache_size = match value.parse::<usize>() {
                        Ok(0) => return Err(RuntimeError::option(SANDBOX_CACHE_SIZE_VAR, "must be at least 1")),
                        Ok(size) => size,
                        Err(e) => return Err(RuntimeError::option(SANDBOX_CACHE_SIZE_VAR, e)),
                    };
                }
                HOST_RUNTIME_VERSION_VAR => {
                    options.host_runtime_version = parse_host_version(value)
                        .ok_or_else(|| RuntimeError::option(HOST_RUNTIME_VERSION_VAR, format!("invalid version '{}'", value)))?;
                }
                LOOPER_MODE_VAR => {
                    options.looper_mode = value.parse().map_err(|e| RuntimeError::option(LOOPER_MODE_VAR, e))?;
                }
                RESOURCES_MODE_VAR => {
                    options.resources_mode = value.parse().map_err(|e| RuntimeError::option(RESOURCES_MODE_VAR, e))?;
                }
                _ => {}
            }
        }
        Ok(options)
    }
}

/// Major version from "17", "17.0.2" or the legacy "1.8" form
fn parse_host_version(value: &str) -> Option<u32> {
    let mut parts = value.split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    if major == 1 {
        return parts.next()?.parse().ok();
    }
    Some(major)
}
