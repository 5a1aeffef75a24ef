//! SDK band matching for shadow classes and shadow methods

use tracing::warn;
use umbra_sdk::ShadowMethodDef;

use super::info::ShadowInfo;

/// Decides whether shadows and shadow methods apply at one API level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SdkShadowMatcher {
    sdk: i32,
}

impl SdkShadowMatcher {
    /// Matcher for API level `sdk`
    pub fn new(sdk: i32) -> Self {
        Self { sdk }
    }

    /// API level matched against
    pub fn api_level(&self) -> i32 {
        self.sdk
    }

    /// `min <= sdk <= max`, where `-1` leaves an end open
    #[inline]
    pub fn matches_bounds(&self, min_sdk: i32, max_sdk: i32) -> bool {
        min_sdk <= self.sdk && (max_sdk == -1 || max_sdk >= self.sdk)
    }

    /// Whether a shadow mapping applies
    pub fn matches_info(&self, info: &ShadowInfo) -> bool {
        self.matches_bounds(info.min_sdk, info.max_sdk)
    }

    /// Whether a shadow method applies.
    ///
    /// Methods without an `Implementation` marker are logged and treated as
    /// matching every SDK.
    pub fn matches_method(&self, shadow_class: &str, method: &ShadowMethodDef) -> bool {
        match &method.implementation {
            Some(marker) => self.matches_bounds(marker.min_sdk, marker.max_sdk),
            None => {
                warn!(
                    shadow = shadow_class,
                    method = %method.descriptor.signature(),
                    "No Implementation marker on shadow method"
                );
                true
            }
        }
    }
}
