//! Shadow mapping records

use std::fmt;
use std::sync::Arc;

use umbra_sdk::{ShadowClassDef, ShadowPicker};

/// One mapping from a real class to a shadow class
#[derive(Clone)]
pub struct ShadowInfo {
    /// Real class being shadowed
    pub real_class_name: String,
    /// Shadow class standing in for it
    pub shadow_class_name: String,
    /// Lowest SDK (inclusive), `-1` for no bound
    pub min_sdk: i32,
    /// Highest SDK (inclusive), `-1` for no bound
    pub max_sdk: i32,
    /// Arity-based method matching
    pub loose_signatures: bool,
    /// Unmatched methods run the real implementation
    pub call_through_by_default: bool,
    /// Chooses between alternative shadows
    pub picker: Option<Arc<dyn ShadowPicker>>,
    pub(crate) def: Arc<ShadowClassDef>,
    pub(crate) layer: usize,
}

impl ShadowInfo {
    /// Mapping of `def` onto `real_class_name`
    pub fn new(
        def: Arc<ShadowClassDef>,
        real_class_name: impl Into<String>,
        picker: Option<Arc<dyn ShadowPicker>>,
    ) -> Self {
        Self {
            real_class_name: real_class_name.into(),
            shadow_class_name: def.name.clone(),
            min_sdk: def.min_sdk,
            max_sdk: def.max_sdk,
            loose_signatures: def.loose_signatures,
            call_through_by_default: def.call_through_by_default,
            picker,
            def,
            layer: 0,
        }
    }

    /// The mapping a shadow class declares for itself
    pub fn of(def: Arc<ShadowClassDef>) -> Self {
        let real = def.real_class.clone();
        let picker = def.picker.clone();
        Self::new(def, real, picker)
    }

    /// Definition of the shadow class
    pub fn shadow_def(&self) -> &Arc<ShadowClassDef> {
        &self.def
    }

    /// Whether a picker decides this mapping
    pub fn has_picker(&self) -> bool {
        self.picker.is_some()
    }

    /// Inclusive SDK band with open ends widened to the `i32` range;
    /// `None` when the band is empty
    pub(crate) fn band(&self) -> Option<(i32, i32)> {
        let lo = if self.min_sdk == -1 { i32::MIN } else { self.min_sdk };
        let hi = if self.max_sdk == -1 { i32::MAX } else { self.max_sdk };
        (lo <= hi).then_some((lo, hi))
    }

    /// Whether the SDK bands of two mappings intersect
    pub fn overlaps(&self, other: &ShadowInfo) -> bool {
        match (self.band(), other.band()) {
            (Some((lo1, hi1)), Some((lo2, hi2))) => lo1 <= hi2 && lo2 <= hi1,
            _ => false,
        }
    }

    /// Same shadow, same band, same picker
    pub(crate) fn same_mapping(&self, other: &ShadowInfo) -> bool {
        self.shadow_class_name == other.shadow_class_name
            && self.min_sdk == other.min_sdk
            && self.max_sdk == other.max_sdk
            && Arc::ptr_eq(&self.def, &other.def)
            && match (&self.picker, &other.picker) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

impl fmt::Debug for ShadowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowInfo")
            .field("real_class_name", &self.real_class_name)
            .field("shadow_class_name", &self.shadow_class_name)
            .field("min_sdk", &self.min_sdk)
            .field("max_sdk", &self.max_sdk)
            .field("loose_signatures", &self.loose_signatures)
            .field("call_through_by_default", &self.call_through_by_default)
            .field("picker", &self.picker.is_some())
            .field("layer", &self.layer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(min: i32, max: i32) -> ShadowInfo {
        ShadowInfo::of(Arc::new(
            ShadowClassDef::builder("ShadowWidget", "Widget")
                .min_sdk(min)
                .max_sdk(max)
                .build(),
        ))
    }

    #[test]
    fn test_disjoint_bands() {
        assert!(!info(0, 22).overlaps(&info(23, -1)));
        assert!(!info(23, -1).overlaps(&info(-1, 22)));
    }

    #[test]
    fn test_overlapping_bands() {
        assert!(info(0, 22).overlaps(&info(22, 30)));
        assert!(info(-1, -1).overlaps(&info(28, 28)));
    }

    #[test]
    fn test_empty_band_overlaps_nothing() {
        assert!(!info(30, 20).overlaps(&info(-1, -1)));
    }

    #[test]
    fn test_of_copies_def_flags() {
        let def = Arc::new(
            ShadowClassDef::builder("ShadowWidget", "Widget")
                .loose_signatures(true)
                .call_through_by_default(false)
                .build(),
        );
        let info = ShadowInfo::of(def);
        assert_eq!(info.real_class_name, "Widget");
        assert_eq!(info.shadow_class_name, "ShadowWidget");
        assert!(info.loose_signatures);
        assert!(!info.call_through_by_default);
    }
}
