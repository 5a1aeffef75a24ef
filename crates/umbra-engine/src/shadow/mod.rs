//! Shadow registry
//!
//! - `info`: one real → shadow mapping
//! - `map`: immutable layered registry of mappings
//! - `matcher`: SDK band checks
//! - `provider`: bundles of shadow classes
//! - `validate`: registration-time checks

pub mod info;
pub mod map;
pub mod matcher;
pub mod provider;
pub mod validate;

pub use info::ShadowInfo;
pub use map::{ShadowMap, ShadowMapBuilder};
pub use matcher::SdkShadowMatcher;
pub use provider::{build_map, register_provider, ShadowProvider};
