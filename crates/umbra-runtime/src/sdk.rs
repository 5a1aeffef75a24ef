//! Known platform SDKs
//!
//! Every SDK the framework ships support for, with the host runtime version
//! it needs. Whether an SDK is supported depends on the host this process
//! runs on.

use std::collections::BTreeMap;

use umbra_engine::Sdk;

/// API level, platform version, minimum host runtime version
const KNOWN_SDKS: [(i32, &str, u32); 18] = [
    (16, "4.1", 8),
    (17, "4.2", 8),
    (18, "4.3", 8),
    (19, "4.4", 8),
    (21, "5.0", 8),
    (22, "5.1", 8),
    (23, "6.0", 8),
    (24, "7.0", 8),
    (25, "7.1", 8),
    (26, "8.0", 8),
    (27, "8.1", 8),
    (28, "9", 8),
    (29, "10", 9),
    (30, "11", 9),
    (31, "12", 9),
    (32, "12.1", 9),
    (33, "13", 11),
    (34, "14", 17),
];

/// One platform SDK as seen from a particular host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultSdk {
    api_level: i32,
    android_version: String,
    required_host_version: u32,
    host_version: u32,
    known: bool,
}

impl DefaultSdk {
    /// An SDK the framework has no record of
    pub fn unknown(api_level: i32, host_version: u32) -> Self {
        Self {
            api_level,
            android_version: format!("API {}", api_level),
            required_host_version: 0,
            host_version,
            known: false,
        }
    }

    /// Host runtime version this SDK needs
    pub fn required_host_version(&self) -> u32 {
        self.required_host_version
    }
}

impl Sdk for DefaultSdk {
    fn api_level(&self) -> i32 {
        self.api_level
    }

    fn android_version(&self) -> String {
        self.android_version.clone()
    }

    fn is_known(&self) -> bool {
        self.known
    }

    fn is_supported(&self) -> bool {
        self.known && self.host_version >= self.required_host_version
    }

    fn unsupported_message(&self) -> String {
        if !self.known {
            return format!("API level {} is not a known SDK", self.api_level);
        }
        format!(
            "Android SDK {} requires host runtime {} (have {})",
            self.api_level, self.required_host_version, self.host_version
        )
    }
}

/// The known SDKs, evaluated against one host runtime version
#[derive(Debug, Clone)]
pub struct SdkCollection {
    sdks: BTreeMap<i32, DefaultSdk>,
    host_version: u32,
}

impl SdkCollection {
    /// Collection for a host running runtime major version `host_version`
    pub fn new(host_version: u32) -> Self {
        let sdks = KNOWN_SDKS
            .iter()
            .map(|&(api_level, version, required)| {
                (
                    api_level,
                    DefaultSdk {
                        api_level,
                        android_version: version.to_string(),
                        required_host_version: required,
                        host_version,
                        known: true,
                    },
                )
            })
            .collect();
        Self { sdks, host_version }
    }

    /// The SDK for `api_level`; unknown levels yield an unknown SDK
    pub fn get(&self, api_level: i32) -> DefaultSdk {
        self.sdks
            .get(&api_level)
            .cloned()
            .unwrap_or_else(|| DefaultSdk::unknown(api_level, self.host_version))
    }

    /// Every known SDK, oldest first
    pub fn known_sdks(&self) -> impl Iterator<Item = &DefaultSdk> + '_ {
        self.sdks.values()
    }

    /// Known SDKs this host can run, oldest first
    pub fn supported_sdks(&self) -> impl Iterator<Item = &DefaultSdk> + '_ {
        self.sdks.values().filter(|s| s.is_supported())
    }

    /// Newest known SDK
    pub fn max_known_sdk(&self) -> Option<&DefaultSdk> {
        self.sdks.values().next_back()
    }

    /// Newest SDK this host can run
    pub fn max_supported_sdk(&self) -> Option<&DefaultSdk> {
        self.sdks.values().rev().find(|s| s.is_supported())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_version_gates_support() {
        let old_host = SdkCollection::new(8);
        assert!(old_host.get(28).is_supported());
        assert!(!old_host.get(29).is_supported());
        assert_eq!(old_host.max_supported_sdk().unwrap().api_level(), 28);

        let host_11 = SdkCollection::new(11);
        assert!(host_11.get(33).is_supported());
        assert!(!host_11.get(34).is_supported());

        let new_host = SdkCollection::new(17);
        assert_eq!(new_host.supported_sdks().count(), new_host.known_sdks().count());
        assert_eq!(new_host.max_known_sdk().unwrap().android_version(), "14");
    }

    #[test]
    fn test_unsupported_sdk_fails_verification() {
        let sdks = SdkCollection::new(8);
        let err = sdks.get(33).verify_supported_sdk("com.example.WidgetTest").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("com.example.WidgetTest"));
        assert!(message.contains("requires host runtime 11"));
    }

    #[test]
    fn test_unknown_sdk_passes_verification() {
        let sdks = SdkCollection::new(17);
        let unknown = sdks.get(20);
        assert!(!unknown.is_known());
        assert!(!unknown.is_supported());
        assert!(unknown.verify_supported_sdk("T").is_ok());
    }
}
