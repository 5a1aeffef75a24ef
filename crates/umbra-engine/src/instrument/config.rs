//! Instrumentation configuration
//!
//! Decides, per class name, whether a sandbox loads a class itself
//! ("acquires" it) or delegates to the shared system loader, whether an
//! acquired class is instrumented, and which call sites are intercepted.
//! Configurations are values: two configurations with the same fields are
//! equal and hash the same, so they can key the sandbox cache.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use regex::Regex;
use umbra_sdk::CONSTRUCTOR_METHOD_NAME;

use super::class_def::ClassDef;
use crate::error::ConfigError;
use crate::interceptors::{MethodRef, ANY_METHOD};

/// Framework classes every sandbox loads itself
pub const CLASSES_TO_ALWAYS_ACQUIRE: [&str; 3] = [
    "org.umbra.internal.UmbraInternals",
    "org.umbra.internal.bytecode.InvokeDynamicSupport",
    "org.umbra.shadow.api.Shadow",
];

/// Host runtime classes the platform code needs its own copy of
const HOST_CLASSES_TO_ACQUIRE: [&str; 3] = [
    "java.util.jar.StrictJarFile",
    "javax.net.ssl.DistinguishedNameParser",
    "javax.microedition.khronos.opengles.GL",
];

/// Packages left to the system loader by [`Builder::with_default_exclusions`]
pub const DEFAULT_PACKAGES_TO_NOT_ACQUIRE: [&str; 12] = [
    "java.",
    "javax.",
    "sun.",
    "com.sun.",
    "org.w3c.",
    "org.xml.",
    "org.junit",
    "org.hamcrest",
    "scala.",
    "kotlin.",
    "org.umbra.annotation.",
    "org.umbra.internal.",
];

/// Framework classes left to the system loader by
/// [`Builder::with_default_exclusions`]
pub const DEFAULT_CLASSES_TO_NOT_ACQUIRE: [&str; 6] = [
    "org.umbra.internal.bytecode.ShadowWrangler",
    "org.umbra.internal.bytecode.ClassHandler",
    "org.umbra.internal.bytecode.ShadowMap",
    "org.umbra.internal.bytecode.ShadowInfo",
    "org.umbra.annotation.Implementation",
    "org.umbra.annotation.RealObject",
];

/// Packages instrumented by [`Builder::with_default_exclusions`]
pub const DEFAULT_INSTRUMENTED_PACKAGES: [&str; 6] = [
    "dalvik.",
    "libcore.",
    "android.",
    "com.android.internal.",
    "org.apache.http.",
    "org.kxml2.",
];

/// Host classes replaced by framework stand-ins
pub const DEFAULT_CLASS_NAME_TRANSLATIONS: [(&str, &str); 3] = [
    ("java.net.ExtendedResponseCache", "org.umbra.internal.bytecode.UmbraExtendedResponseCache"),
    ("java.net.ResponseSource", "org.umbra.internal.bytecode.UmbraResponseSource"),
    ("java.nio.charset.Charsets", "org.umbra.internal.bytecode.UmbraCharsets"),
];

/// `android.R`, `com.android.internal.R` and their nested classes
fn is_platform_r_class(name: &str) -> bool {
    ["android.R", "com.android.internal.R"].iter().any(|r| {
        name == *r
            || name
                .strip_prefix(r)
                .and_then(|rest| rest.strip_prefix('$'))
                .is_some_and(|nested| !nested.is_empty())
    })
}

/// `*.R` and its lowercase nested classes (`R$layout`, `R$id`, ...)
fn is_app_r_class(name: &str) -> bool {
    if name.ends_with(".R") {
        return true;
    }
    match name.rfind(".R$") {
        Some(idx) => {
            let nested = &name[idx + 3..];
            !nested.is_empty() && nested.bytes().all(|b| b.is_ascii_lowercase())
        }
        None => false,
    }
}

/// Which classes a sandbox acquires, instruments and intercepts
#[derive(Clone)]
pub struct InstrumentationConfiguration {
    instrumented_packages: BTreeSet<String>,
    instrumented_classes: BTreeSet<String>,
    classes_to_not_acquire: BTreeSet<String>,
    packages_to_not_acquire: BTreeSet<String>,
    classes_to_not_instrument: BTreeSet<String>,
    packages_to_not_instrument: BTreeSet<String>,
    class_name_translations: BTreeMap<String, String>,
    intercepted_methods: BTreeSet<MethodRef>,
    do_not_instrument_regex: Option<(String, Regex)>,
}

impl InstrumentationConfiguration {
    /// Start an empty configuration
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Start a configuration preloaded with every setting of `config`
    pub fn from_config(config: &InstrumentationConfiguration) -> Builder {
        Builder {
            instrumented_packages: config.instrumented_packages.clone(),
            instrumented_classes: config.instrumented_classes.clone(),
            classes_to_not_acquire: config.classes_to_not_acquire.clone(),
            packages_to_not_acquire: config.packages_to_not_acquire.clone(),
            classes_to_not_instrument: config.classes_to_not_instrument.clone(),
            packages_to_not_instrument: config.packages_to_not_instrument.clone(),
            class_name_translations: config.class_name_translations.clone(),
            intercepted_methods: config.intercepted_methods.clone(),
            do_not_instrument_regex: config.do_not_instrument_regex.as_ref().map(|(p, _)| p.clone()),
        }
    }

    /// Builder preloaded with this configuration
    pub fn to_builder(&self) -> Builder {
        Self::from_config(self)
    }

    /// Whether a sandbox loads `name` itself instead of delegating to the
    /// system loader
    pub fn should_acquire(&self, name: &str) -> bool {
        if CLASSES_TO_ALWAYS_ACQUIRE.contains(&name) || HOST_CLASSES_TO_ACQUIRE.contains(&name) {
            return true;
        }
        if is_platform_r_class(name) {
            return true;
        }
        if self
            .packages_to_not_acquire
            .iter()
            .any(|pkg| name.starts_with(pkg.as_str()))
        {
            return false;
        }
        !(is_app_r_class(name) || self.classes_to_not_acquire.contains(name))
    }

    /// Whether an acquired class is rewritten to route calls through the
    /// class handler
    pub fn should_instrument(&self, class: &ClassDef) -> bool {
        let name = class.name.as_str();
        !(class.is_interface || class.is_annotation || class.do_not_instrument)
            && (self.is_in_instrumented_package(name)
                || self.instrumented_classes.contains(name)
                || class.instrument)
            && !self.classes_to_not_instrument.contains(name)
            && !self
                .packages_to_not_instrument
                .iter()
                .any(|pkg| name.starts_with(pkg.as_str()))
            && !self.excluded_by_regex(name)
    }

    /// Whether calls to `owner.method` are replaced by an interceptor.
    /// Constructors are never intercepted.
    pub fn should_intercept(&self, owner: &str, method: &str) -> bool {
        if method == CONSTRUCTOR_METHOD_NAME {
            return false;
        }
        self.intercepted_methods.contains(&MethodRef::new(owner, method))
            || self.intercepted_methods.contains(&MethodRef::new(owner, ANY_METHOD))
    }

    /// Stand-in class for `name`, or `name` itself
    pub fn translate<'a>(&'a self, name: &'a str) -> &'a str {
        self.class_name_translations
            .get(name)
            .map(String::as_str)
            .unwrap_or(name)
    }

    /// Every intercepted method ref
    pub fn intercepted_methods(&self) -> &BTreeSet<MethodRef> {
        &self.intercepted_methods
    }

    /// Requested class → stand-in class
    pub fn class_name_translations(&self) -> &BTreeMap<String, String> {
        &self.class_name_translations
    }

    /// Package prefixes whose classes are instrumented
    pub fn instrumented_packages(&self) -> &BTreeSet<String> {
        &self.instrumented_packages
    }

    /// Pattern excluding classes from instrumentation, as given
    pub fn do_not_instrument_regex(&self) -> Option<&str> {
        self.do_not_instrument_regex.as_ref().map(|(p, _)| p.as_str())
    }

    fn is_in_instrumented_package(&self, name: &str) -> bool {
        self.instrumented_packages
            .iter()
            .any(|pkg| name.starts_with(pkg.as_str()))
    }

    fn excluded_by_regex(&self, name: &str) -> bool {
        self.do_not_instrument_regex
            .as_ref()
            .is_some_and(|(_, re)| re.is_match(name))
    }

    fn regex_pattern(&self) -> Option<&str> {
        self.do_not_instrument_regex()
    }
}

impl PartialEq for InstrumentationConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.instrumented_packages == other.instrumented_packages
            && self.instrumented_classes == other.instrumented_classes
            && self.classes_to_not_acquire == other.classes_to_not_acquire
            && self.packages_to_not_acquire == other.packages_to_not_acquire
            && self.classes_to_not_instrument == other.classes_to_not_instrument
            && self.packages_to_not_instrument == other.packages_to_not_instrument
            && self.class_name_translations == other.class_name_translations
            && self.intercepted_methods == other.intercepted_methods
            && self.regex_pattern() == other.regex_pattern()
    }
}

impl Eq for InstrumentationConfiguration {}

impl Hash for InstrumentationConfiguration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instrumented_packages.hash(state);
        self.instrumented_classes.hash(state);
        self.classes_to_not_acquire.hash(state);
        self.packages_to_not_acquire.hash(state);
        self.classes_to_not_instrument.hash(state);
        self.packages_to_not_instrument.hash(state);
        self.class_name_translations.hash(state);
        self.intercepted_methods.hash(state);
        self.regex_pattern().hash(state);
    }
}

impl Default for InstrumentationConfiguration {
    fn default() -> Self {
        Builder::default().freeze(None)
    }
}

impl fmt::Debug for InstrumentationConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentationConfiguration")
            .field("instrumented_packages", &self.instrumented_packages)
            .field("instrumented_classes", &self.instrumented_classes)
            .field("classes_to_not_acquire", &self.classes_to_not_acquire.len())
            .field("packages_to_not_acquire", &self.packages_to_not_acquire)
            .field("classes_to_not_instrument", &self.classes_to_not_instrument)
            .field("packages_to_not_instrument", &self.packages_to_not_instrument)
            .field("class_name_translations", &self.class_name_translations.len())
            .field("intercepted_methods", &self.intercepted_methods.len())
            .field("do_not_instrument_regex", &self.regex_pattern())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent builder for [`InstrumentationConfiguration`]
#[derive(Debug, Clone, Default)]
pub struct Builder {
    instrumented_packages: BTreeSet<String>,
    instrumented_classes: BTreeSet<String>,
    classes_to_not_acquire: BTreeSet<String>,
    packages_to_not_acquire: BTreeSet<String>,
    classes_to_not_instrument: BTreeSet<String>,
    packages_to_not_instrument: BTreeSet<String>,
    class_name_translations: BTreeMap<String, String>,
    intercepted_methods: BTreeSet<MethodRef>,
    do_not_instrument_regex: Option<String>,
}

impl Builder {
    /// Never acquire `class_name`
    pub fn do_not_acquire_class(mut self, class_name: impl Into<String>) -> Self {
        self.classes_to_not_acquire.insert(class_name.into());
        self
    }

    /// Never acquire classes whose name starts with `package_name`
    pub fn do_not_acquire_package(mut self, package_name: impl Into<String>) -> Self {
        self.packages_to_not_acquire.insert(package_name.into());
        self
    }

    /// Load `to_name` whenever `from_name` is requested
    pub fn add_class_name_translation(
        mut self,
        from_name: impl Into<String>,
        to_name: impl Into<String>,
    ) -> Self {
        self.class_name_translations.insert(from_name.into(), to_name.into());
        self
    }

    /// Route calls to `method_ref` through the interceptor table
    pub fn add_intercepted_method(mut self, method_ref: MethodRef) -> Self {
        self.intercepted_methods.insert(method_ref);
        self
    }

    /// Route calls to every ref in `method_refs` through the interceptor table
    pub fn add_intercepted_methods(mut self, method_refs: impl IntoIterator<Item = MethodRef>) -> Self {
        self.intercepted_methods.extend(method_refs);
        self
    }

    /// Instrument `class_name` wherever it lives
    pub fn add_instrumented_class(mut self, class_name: impl Into<String>) -> Self {
        self.instrumented_classes.insert(class_name.into());
        self
    }

    /// Instrument classes whose name starts with `package_name`
    pub fn add_instrumented_package(mut self, package_name: impl Into<String>) -> Self {
        self.instrumented_packages.insert(package_name.into());
        self
    }

    /// Never instrument `class_name`
    pub fn do_not_instrument_class(mut self, class_name: impl Into<String>) -> Self {
        self.classes_to_not_instrument.insert(class_name.into());
        self
    }

    /// Never instrument classes whose name starts with `package_name`
    pub fn do_not_instrument_package(mut self, package_name: impl Into<String>) -> Self {
        self.packages_to_not_instrument.insert(package_name.into());
        self
    }

    /// Never instrument classes whose whole name matches `regex`
    pub fn set_do_not_instrument_class_regex(mut self, regex: impl Into<String>) -> Self {
        self.do_not_instrument_regex = Some(regex.into());
        self
    }

    /// Add the standard exclusions, instrumented packages and translations
    pub fn with_default_exclusions(mut self) -> Self {
        self.packages_to_not_acquire
            .extend(DEFAULT_PACKAGES_TO_NOT_ACQUIRE.iter().map(|p| p.to_string()));
        self.classes_to_not_acquire
            .extend(DEFAULT_CLASSES_TO_NOT_ACQUIRE.iter().map(|c| c.to_string()));
        self.instrumented_packages
            .extend(DEFAULT_INSTRUMENTED_PACKAGES.iter().map(|p| p.to_string()));
        for (from, to) in DEFAULT_CLASS_NAME_TRANSLATIONS {
            self.class_name_translations
                .insert(from.to_string(), to.to_string());
        }
        self
    }

    /// Compile the exclusion regex and freeze the configuration
    pub fn build(self) -> Result<InstrumentationConfiguration, ConfigError> {
        let compiled = match &self.do_not_instrument_regex {
            Some(pattern) => {
                let re = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| ConfigError::InvalidRegex {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                Some((pattern.clone(), re))
            }
            None => None,
        };
        Ok(self.freeze(compiled))
    }

    fn freeze(self, do_not_instrument_regex: Option<(String, Regex)>) -> InstrumentationConfiguration {
        InstrumentationConfiguration {
            instrumented_packages: self.instrumented_packages,
            instrumented_classes: self.instrumented_classes,
            classes_to_not_acquire: self.classes_to_not_acquire,
            packages_to_not_acquire: self.packages_to_not_acquire,
            classes_to_not_instrument: self.classes_to_not_instrument,
            packages_to_not_instrument: self.packages_to_not_instrument,
            class_name_translations: self.class_name_translations,
            intercepted_methods: self.intercepted_methods,
            do_not_instrument_regex,
        }
    }
}
