//! Shadow pickers and the run modes they select on
//!
//! When several shadow classes implement the same real class for the same
//! SDK, a `ShadowPicker` chooses the active one. Pickers typically read an
//! external mode such as the looper mode.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::object::ObjectRef;

/// Chooses the active shadow class for a real class
pub trait ShadowPicker: Send + Sync {
    /// Name of the shadow class to use for `instance` (`None` for static
    /// dispatch), or `None` to leave the class unshadowed
    fn pick_shadow_class(&self, instance: Option<&ObjectRef>) -> Option<String>;

    /// Every shadow class this picker can return, checked at registration.
    /// Empty when the picker cannot enumerate them.
    fn shadow_classes(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<F> ShadowPicker for F
where
    F: Fn(Option<&ObjectRef>) -> Option<String> + Send + Sync,
{
    fn pick_shadow_class(&self, instance: Option<&ObjectRef>) -> Option<String> {
        self(instance)
    }
}

/// A mode string that did not parse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{value}'")]
pub struct ParseModeError {
    /// Which mode was being parsed
    pub kind: &'static str,
    /// Rejected input
    pub value: String,
}

// ============================================================================
// Looper mode
// ============================================================================

/// How the main looper is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum LooperMode {
    /// Tasks run immediately on post
    Legacy,
    /// Tasks queue until the test idles the looper
    #[default]
    Paused,
    /// Looper runs on its own thread, as in instrumentation tests
    InstrumentationTest,
}

impl LooperMode {
    fn as_u8(self) -> u8 {
        match self {
            LooperMode::Legacy => 0,
            LooperMode::Paused => 1,
            LooperMode::InstrumentationTest => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LooperMode::Legacy,
            2 => LooperMode::InstrumentationTest,
            _ => LooperMode::Paused,
        }
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            LooperMode::Legacy => "legacy",
            LooperMode::Paused => "paused",
            LooperMode::InstrumentationTest => "instrumentation_test",
        }
    }
}

impl fmt::Display for LooperMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LooperMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(LooperMode::Legacy),
            "paused" => Ok(LooperMode::Paused),
            "instrumentation_test" => Ok(LooperMode::InstrumentationTest),
            _ => Err(ParseModeError {
                kind: "looper mode",
                value: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Resources mode
// ============================================================================

/// How resources are loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ResourcesMode {
    /// Resources parsed from raw XML; unavailable above SDK 28
    Legacy,
    /// Resources loaded from compiled binary tables
    #[default]
    Binary,
}

impl ResourcesMode {
    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            ResourcesMode::Legacy => "legacy",
            ResourcesMode::Binary => "binary",
        }
    }
}

impl fmt::Display for ResourcesMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourcesMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(ResourcesMode::Legacy),
            "binary" => Ok(ResourcesMode::Binary),
            _ => Err(ParseModeError {
                kind: "resources mode",
                value: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Mode-driven picker
// ============================================================================

/// Shared, switchable looper mode
///
/// Clones observe the same mode.
#[derive(Clone)]
pub struct LooperModeFlag(Arc<AtomicU8>);

impl LooperModeFlag {
    /// Create a flag holding `mode`
    pub fn new(mode: LooperMode) -> Self {
        Self(Arc::new(AtomicU8::new(mode.as_u8())))
    }

    /// Current mode
    pub fn get(&self) -> LooperMode {
        LooperMode::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Switch mode
    pub fn set(&self, mode: LooperMode) {
        self.0.store(mode.as_u8(), Ordering::Release);
    }
}

impl Default for LooperModeFlag {
    fn default() -> Self {
        Self::new(LooperMode::default())
    }
}

impl fmt::Debug for LooperModeFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LooperModeFlag").field(&self.get()).finish()
    }
}

/// Picks the legacy shadow in legacy looper mode, the paused shadow otherwise
#[derive(Debug, Clone)]
pub struct LooperShadowPicker {
    flag: LooperModeFlag,
    legacy: String,
    paused: String,
}

impl LooperShadowPicker {
    /// Create a picker reading `flag`
    pub fn new(flag: LooperModeFlag, legacy: impl Into<String>, paused: impl Into<String>) -> Self {
        Self {
            flag,
            legacy: legacy.into(),
            paused: paused.into(),
        }
    }
}

impl ShadowPicker for LooperShadowPicker {
    fn pick_shadow_class(&self, _instance: Option<&ObjectRef>) -> Option<String> {
        match self.flag.get() {
            LooperMode::Legacy => Some(self.legacy.clone()),
            LooperMode::Paused | LooperMode::InstrumentationTest => Some(self.paused.clone()),
        }
    }

    fn shadow_classes(&self) -> Vec<String> {
        vec![self.legacy.clone(), self.paused.clone()]
    }
}
