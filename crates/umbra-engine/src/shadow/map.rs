//! Immutable real-class → shadow-class registry
//!
//! A `ShadowMap` is built once and never mutated. Deriving a map with extra
//! shadows goes through [`ShadowMap::new_builder`], which keeps the existing
//! entries as a lower-precedence layer. Maps are cheap to clone and are
//! shared between threads without locking.

use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;
use umbra_sdk::{ObjectRef, ShadowClassDef, ShadowPicker};

use super::info::ShadowInfo;
use super::matcher::SdkShadowMatcher;
use super::validate::{validate_shadow_class, validate_superclasses};
use crate::error::RegistrationError;

#[derive(Default)]
struct ShadowMapInner {
    /// Real class → candidates, later layers first
    candidates: FxHashMap<String, Vec<Arc<ShadowInfo>>>,
    /// Real class → shadow class, for classes mapped by name only
    extra_shadows: FxHashMap<String, String>,
    /// Shadow class → definition
    shadows: FxHashMap<String, Arc<ShadowClassDef>>,
    /// Shadow class → the mapping it declares for itself
    own_infos: FxHashMap<String, Arc<ShadowInfo>>,
    /// Number of layers built into this map
    layers: usize,
}

/// Snapshot of every shadow mapping in effect for a sandbox
#[derive(Clone, Default)]
pub struct ShadowMap {
    inner: Arc<ShadowMapInner>,
}

impl ShadowMap {
    /// Start an empty map
    pub fn builder() -> ShadowMapBuilder {
        ShadowMapBuilder::on(ShadowMap::default())
    }

    /// Start a map layered on top of this one
    pub fn new_builder(&self) -> ShadowMapBuilder {
        ShadowMapBuilder::on(self.clone())
    }

    /// Every candidate mapping for `real_class`, highest precedence first
    pub fn get(&self, real_class: &str) -> &[Arc<ShadowInfo>] {
        self.inner
            .candidates
            .get(real_class)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether any mapping mentions `real_class`
    pub fn contains(&self, real_class: &str) -> bool {
        self.inner.candidates.contains_key(real_class) || self.inner.extra_shadows.contains_key(real_class)
    }

    /// The mapping active for `real_class` at the matcher's SDK.
    ///
    /// A candidate with a picker defers to it (the picker sees `instance`,
    /// `None` for static dispatch); otherwise the first candidate whose SDK
    /// band matches wins. Classes with no mapping yield `None`.
    pub fn get_shadow_info(
        &self,
        real_class: &str,
        matcher: &SdkShadowMatcher,
        instance: Option<&ObjectRef>,
    ) -> Option<Arc<ShadowInfo>> {
        if let Some(candidates) = self.inner.candidates.get(real_class) {
            for info in candidates {
                if let Some(picker) = &info.picker {
                    return self.pick(real_class, picker.as_ref(), instance);
                }
                if matcher.matches_info(info) {
                    return Some(Arc::clone(info));
                }
            }
            return None;
        }

        let shadow = self.inner.extra_shadows.get(real_class)?;
        let info = self.inner.own_infos.get(shadow)?;
        matcher.matches_info(info).then(|| {
            if info.real_class_name == real_class {
                Arc::clone(info)
            } else {
                Arc::new(ShadowInfo::new(Arc::clone(&info.def), real_class, None))
            }
        })
    }

    fn pick(
        &self,
        real_class: &str,
        picker: &dyn ShadowPicker,
        instance: Option<&ObjectRef>,
    ) -> Option<Arc<ShadowInfo>> {
        let picked = picker.pick_shadow_class(instance)?;
        let info = self.inner.own_infos.get(&picked)?;
        if info.real_class_name == real_class {
            Some(Arc::clone(info))
        } else {
            Some(Arc::new(ShadowInfo::new(Arc::clone(&info.def), real_class, None)))
        }
    }

    /// Definition of the shadow class `name`
    pub fn shadow_class(&self, name: &str) -> Option<&Arc<ShadowClassDef>> {
        self.inner.shadows.get(name)
    }

    /// Mapping the shadow class `name` declares for itself
    pub fn own_info(&self, name: &str) -> Option<&Arc<ShadowInfo>> {
        self.inner.own_infos.get(name)
    }

    /// Real classes with at least one mapping
    pub fn real_classes(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner
            .candidates
            .keys()
            .chain(self.inner.extra_shadows.keys())
            .map(String::as_str)
    }

    /// Number of real classes with at least one mapping
    pub fn len(&self) -> usize {
        self.inner.candidates.len()
            + self
                .inner
                .extra_shadows
                .keys()
                .filter(|k| !self.inner.candidates.contains_key(*k))
                .count()
    }

    /// Check if no mappings are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of layers this map was built from
    pub fn layers(&self) -> usize {
        self.inner.layers
    }

    /// Real classes whose mappings differ between this map and `other`
    pub fn invalidated_classes(&self, other: &ShadowMap) -> FxHashSet<String> {
        let mut invalidated = FxHashSet::default();
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return invalidated;
        }

        let keys: FxHashSet<&String> = self
            .inner
            .candidates
            .keys()
            .chain(other.inner.candidates.keys())
            .collect();
        for key in keys {
            let a = self.get(key);
            let b = other.get(key);
            let same = a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_mapping(y));
            if !same {
                invalidated.insert(key.clone());
            }
        }

        let extra_keys: FxHashSet<&String> = self
            .inner
            .extra_shadows
            .keys()
            .chain(other.inner.extra_shadows.keys())
            .collect();
        for key in extra_keys {
            if self.inner.extra_shadows.get(key) != other.inner.extra_shadows.get(key) {
                invalidated.insert(key.clone());
            }
        }

        invalidated
    }
}

impl fmt::Debug for ShadowMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowMap")
            .field("classes", &self.len())
            .field("shadows", &self.inner.shadows.len())
            .field("layers", &self.inner.layers)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

struct PendingMapping {
    shadow_class: String,
    real_class: String,
    picker: Option<Arc<dyn ShadowPicker>>,
}

/// Collects one layer of shadow registrations
pub struct ShadowMapBuilder {
    base: ShadowMap,
    shadows: Vec<ShadowClassDef>,
    mappings: Vec<PendingMapping>,
    extra_shadows: Vec<(String, String)>,
}

impl ShadowMapBuilder {
    fn on(base: ShadowMap) -> Self {
        Self {
            base,
            shadows: Vec::new(),
            mappings: Vec::new(),
            extra_shadows: Vec::new(),
        }
    }

    /// Register a shadow class and the mapping it declares
    pub fn add_shadow_class(&mut self, def: ShadowClassDef) -> &mut Self {
        self.mappings.push(PendingMapping {
            shadow_class: def.name.clone(),
            real_class: def.real_class.clone(),
            picker: def.picker.clone(),
        });
        self.shadows.push(def);
        self
    }

    /// Register several shadow classes
    pub fn add_shadow_classes(&mut self, defs: impl IntoIterator<Item = ShadowClassDef>) -> &mut Self {
        for def in defs {
            self.add_shadow_class(def);
        }
        self
    }

    /// Map an already registered shadow class onto another real class
    pub fn add_shadow_type(
        &mut self,
        shadow_class: impl Into<String>,
        real_class: impl Into<String>,
        picker: Option<Arc<dyn ShadowPicker>>,
    ) -> &mut Self {
        self.mappings.push(PendingMapping {
            shadow_class: shadow_class.into(),
            real_class: real_class.into(),
            picker,
        });
        self
    }

    /// Map a real class to a shadow class by name only
    pub fn add_extra_shadow(
        &mut self,
        real_class: impl Into<String>,
        shadow_class: impl Into<String>,
    ) -> &mut Self {
        self.extra_shadows.push((real_class.into(), shadow_class.into()));
        self
    }

    /// Validate this layer and freeze it on top of the base map
    pub fn build(self) -> Result<ShadowMap, RegistrationError> {
        let base = &self.base.inner;
        let layer = base.layers;

        let mut shadows = base.shadows.clone();
        let mut own_infos = base.own_infos.clone();
        let mut defined_here = FxHashSet::default();
        for def in self.shadows {
            if !defined_here.insert(def.name.clone()) {
                return Err(RegistrationError::DuplicateShadow(def.name));
            }
            validate_shadow_class(&def)?;
            let def = Arc::new(def);
            let mut info = ShadowInfo::of(Arc::clone(&def));
            info.layer = layer;
            own_infos.insert(def.name.clone(), Arc::new(info));
            shadows.insert(def.name.clone(), def);
        }
        validate_superclasses(&shadows)?;

        let mut layer_candidates: FxHashMap<String, Vec<Arc<ShadowInfo>>> = FxHashMap::default();
        for mapping in self.mappings {
            let def = shadows
                .get(&mapping.shadow_class)
                .ok_or_else(|| RegistrationError::UnknownShadow {
                    real: mapping.real_class.clone(),
                    shadow: mapping.shadow_class.clone(),
                })?;
            if let Some(picker) = &mapping.picker {
                for picked in picker.shadow_classes() {
                    if !shadows.contains_key(&picked) {
                        return Err(RegistrationError::UnknownShadow {
                            real: mapping.real_class.clone(),
                            shadow: picked,
                        });
                    }
                }
            }
            let mut info = ShadowInfo::new(Arc::clone(def), mapping.real_class.clone(), mapping.picker);
            info.layer = layer;
            layer_candidates
                .entry(mapping.real_class)
                .or_default()
                .push(Arc::new(info));
        }

        for (real, infos) in &layer_candidates {
            let unpicked: Vec<&Arc<ShadowInfo>> = infos.iter().filter(|i| !i.has_picker()).collect();
            for (i, first) in unpicked.iter().enumerate() {
                for second in &unpicked[i + 1..] {
                    if first.overlaps(second) {
                        return Err(RegistrationError::Ambiguous {
                            real: real.clone(),
                            first: first.shadow_class_name.clone(),
                            second: second.shadow_class_name.clone(),
                        });
                    }
                }
            }
        }

        let mut candidates = base.candidates.clone();
        for (real, mut infos) in layer_candidates {
            if let Some(lower) = candidates.remove(&real) {
                infos.extend(lower);
            }
            candidates.insert(real, infos);
        }

        let mut extra_shadows = base.extra_shadows.clone();
        for (real, shadow) in self.extra_shadows {
            if !shadows.contains_key(&shadow) {
                return Err(RegistrationError::UnknownShadow { real, shadow });
            }
            extra_shadows.insert(real, shadow);
        }

        debug!(
            layer,
            classes = candidates.len(),
            shadows = shadows.len(),
            "Built shadow map"
        );

        Ok(ShadowMap {
            inner: Arc::new(ShadowMapInner {
                candidates,
                extra_shadows,
                shadows,
                own_infos,
                layers: layer + 1,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_sdk::{LooperMode, LooperModeFlag, LooperShadowPicker};

    fn shadow(name: &str, real: &str, min: i32, max: i32) -> ShadowClassDef {
        ShadowClassDef::builder(name, real).min_sdk(min).max_sdk(max).build()
    }

    fn active(map: &ShadowMap, real: &str, sdk: i32) -> Option<String> {
        map.get_shadow_info(real, &SdkShadowMatcher::new(sdk), None)
            .map(|i| i.shadow_class_name.clone())
    }

    #[test]
    fn test_unregistered_class_has_no_shadow() {
        let map = ShadowMap::builder().build().unwrap();
        assert!(map.get("com.example.Plain").is_empty());
        assert_eq!(active(&map, "com.example.Plain", 21), None);
        assert!(map.is_empty());
    }

    #[test]
    fn test_disjoint_bands_select_by_sdk() {
        let mut builder = ShadowMap::builder();
        builder
            .add_shadow_class(shadow("ShadowOld", "Widget", 0, 22))
            .add_shadow_class(shadow("ShadowNew", "Widget", 23, -1));
        let map = builder.build().unwrap();

        assert_eq!(active(&map, "Widget", 22).as_deref(), Some("ShadowOld"));
        assert_eq!(active(&map, "Widget", 23).as_deref(), Some("ShadowNew"));
        assert_eq!(map.get("Widget").len(), 2);
    }

    #[test]
    fn test_overlapping_bands_rejected() {
        let mut builder = ShadowMap::builder();
        builder
            .add_shadow_class(shadow("ShadowA", "Widget", 0, 23))
            .add_shadow_class(shadow("ShadowB", "Widget", 23, -1));
        assert!(matches!(builder.build(), Err(RegistrationError::Ambiguous { .. })));
    }

    #[test]
    fn test_duplicate_shadow_rejected() {
        let mut builder = ShadowMap::builder();
        builder
            .add_shadow_class(shadow("ShadowA", "Widget", 0, 20))
            .add_shadow_class(shadow("ShadowA", "Widget", 21, -1));
        assert!(matches!(builder.build(), Err(RegistrationError::DuplicateShadow(_))));
    }

    #[test]
    fn test_later_layer_takes_precedence() {
        let mut builder = ShadowMap::builder();
        builder.add_shadow_class(shadow("ShadowBase", "Widget", -1, -1));
        let base = builder.build().unwrap();

        let mut builder = base.new_builder();
        builder.add_shadow_class(shadow("ShadowOverride", "Widget", -1, -1));
        let layered = builder.build().unwrap();

        assert_eq!(active(&base, "Widget", 21).as_deref(), Some("ShadowBase"));
        assert_eq!(active(&layered, "Widget", 21).as_deref(), Some("ShadowOverride"));
        assert_eq!(layered.layers(), 2);
        assert_eq!(layered.get("Widget").len(), 2);
    }

    #[test]
    fn test_lower_layer_used_outside_override_band() {
        let mut builder = ShadowMap::builder();
        builder.add_shadow_class(shadow("ShadowBase", "Widget", -1, -1));
        let base = builder.build().unwrap();

        let mut builder = base.new_builder();
        builder.add_shadow_class(shadow("ShadowModern", "Widget", 30, -1));
        let layered = builder.build().unwrap();

        assert_eq!(active(&layered, "Widget", 29).as_deref(), Some("ShadowBase"));
        assert_eq!(active(&layered, "Widget", 30).as_deref(), Some("ShadowModern"));
    }

    #[test]
    fn test_picker_decides() {
        let flag = LooperModeFlag::new(LooperMode::Legacy);
        let picker: Arc<dyn ShadowPicker> =
            Arc::new(LooperShadowPicker::new(flag.clone(), "ShadowLegacyLooper", "ShadowPausedLooper"));

        let mut builder = ShadowMap::builder();
        builder.add_shadow_classes([
            ShadowClassDef::builder("ShadowLegacyLooper", "android.os.Looper")
                .picker(Arc::clone(&picker))
                .build(),
            ShadowClassDef::builder("ShadowPausedLooper", "android.os.Looper")
                .picker(Arc::clone(&picker))
                .build(),
        ]);
        let map = builder.build().unwrap();

        assert_eq!(active(&map, "android.os.Looper", 28).as_deref(), Some("ShadowLegacyLooper"));
        flag.set(LooperMode::Paused);
        assert_eq!(active(&map, "android.os.Looper", 28).as_deref(), Some("ShadowPausedLooper"));
    }

    #[test]
    fn test_picker_naming_unknown_shadow_rejected() {
        let picker: Arc<dyn ShadowPicker> = Arc::new(LooperShadowPicker::new(
            LooperModeFlag::default(),
            "ShadowLegacyLooper",
            "ShadowMissing",
        ));
        let mut builder = ShadowMap::builder();
        builder.add_shadow_class(
            ShadowClassDef::builder("ShadowLegacyLooper", "android.os.Looper")
                .picker(picker)
                .build(),
        );
        assert!(matches!(builder.build(), Err(RegistrationError::UnknownShadow { .. })));
    }

    #[test]
    fn test_add_shadow_type_maps_second_real_class() {
        let mut builder = ShadowMap::builder();
        builder
            .add_shadow_class(shadow("ShadowView", "android.view.View", -1, -1))
            .add_shadow_type("ShadowView", "android.view.ViewCompat", None);
        let map = builder.build().unwrap();

        let info = map
            .get_shadow_info("android.view.ViewCompat", &SdkShadowMatcher::new(21), None)
            .unwrap();
        assert_eq!(info.shadow_class_name, "ShadowView");
        assert_eq!(info.real_class_name, "android.view.ViewCompat");
    }

    #[test]
    fn test_add_shadow_type_unknown_shadow() {
        let mut builder = ShadowMap::builder();
        builder.add_shadow_type("ShadowMissing", "Widget", None);
        assert!(matches!(builder.build(), Err(RegistrationError::UnknownShadow { .. })));
    }

    #[test]
    fn test_extra_shadow_resolved_by_name() {
        let mut builder = ShadowMap::builder();
        builder
            .add_shadow_class(shadow("ShadowHidden", "android.app.HiddenApi", -1, -1))
            .add_extra_shadow("android.app.HiddenApiImpl", "ShadowHidden");
        let map = builder.build().unwrap();

        let info = map
            .get_shadow_info("android.app.HiddenApiImpl", &SdkShadowMatcher::new(33), None)
            .unwrap();
        assert_eq!(info.shadow_class_name, "ShadowHidden");
        assert_eq!(info.real_class_name, "android.app.HiddenApiImpl");
        assert!(map.contains("android.app.HiddenApiImpl"));
    }

    #[test]
    fn test_invalidated_classes() {
        let mut builder = ShadowMap::builder();
        builder
            .add_shadow_class(shadow("ShadowA", "A", -1, -1))
            .add_shadow_class(shadow("ShadowB", "B", -1, -1));
        let base = builder.build().unwrap();
        assert!(base.invalidated_classes(&base.clone()).is_empty());

        let mut builder = base.new_builder();
        builder.add_shadow_class(shadow("ShadowA2", "A", -1, -1));
        builder.add_shadow_class(shadow("ShadowC", "C", -1, -1));
        let layered = builder.build().unwrap();

        let invalidated = base.invalidated_classes(&layered);
        assert!(invalidated.contains("A"));
        assert!(invalidated.contains("C"));
        assert!(!invalidated.contains("B"));
    }
}
