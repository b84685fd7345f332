//! Decoder for compiled studio models.
//!
//! A compiled model is spread over several sibling files: the model descriptor (`.mdl`), an
//! optional animation block file (`.ani`), the hardware mesh strips (`.vtx`), the vertex data
//! (`.vvd`) and the collision solids (`.phy`). This library reads them through a
//! [`archive::FileSource`], cross-checks them against each other, and produces an
//! engine-agnostic [`model::ImportedModel`]: a sectioned multi-LOD mesh, a bone hierarchy,
//! keyframe clips and convex collision hulls, re-expressed in the caller's coordinate
//! convention.

pub mod animation;
pub mod archive;
pub mod coord;
pub mod error;
pub mod keyvalues;
/// Binary format readers and the import pipeline.
pub mod loader;
pub mod mesh;
pub mod model;
pub mod physics;
pub mod skeleton;
pub mod transform;
