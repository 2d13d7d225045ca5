//! Smooth skinning data and the edits applied to it.
//!
//! [`skin::SmoothSkinningData`] stores per-vertex weighted bindings between
//! mesh vertices and skeletal influences as compact flat arrays, in the same
//! shape most DCC exporters hand them over. The [`remove`] module strips
//! influences from that storage by name, by index, or by dropping the ones
//! that carry no weight anywhere, repacking every per-vertex array without
//! touching the remaining weights.
//!
pub mod influence;
pub mod remove;
pub mod skin;

pub use remove::{
    remove_influences, RemovalMode, RemoveInfluencesError, RemoveInfluencesErrorKind, SelectorError,
};
pub use skin::{SkinningDataError, SmoothSkinningData, SmoothSkinningParts};
