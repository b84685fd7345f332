use crate::{
    animation::{AnimClip, SequenceInfo},
    error::ImportError,
    keyvalues::KeyValue,
    mesh::MeshAsset,
    physics::{Constraint, PhysSolid},
    skeleton::Skeleton,
    transform::DecomposedTransform,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub bone: usize,
    /// Relative to `bone`, in the destination convention.
    pub local: DecomposedTransform,
}

/// Another model file this one pulls animations from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludedModel {
    pub label: String,
    pub file_name: String,
}

/// Everything decoded from one model and its sibling files.
#[derive(Debug)]
pub struct ImportedModel {
    pub name: String,
    pub version: i32,
    pub checksum: i32,
    pub skeleton: Skeleton,
    pub mesh: Option<MeshAsset>,
    pub clips: Vec<AnimClip>,
    pub sequences: Vec<SequenceInfo>,
    pub solids: Vec<PhysSolid>,
    pub constraints: Vec<Constraint>,
    pub attachments: Vec<Attachment>,
    pub included_models: Vec<IncludedModel>,
    pub surface_prop: String,
    pub key_values: Option<KeyValue>,
    /// Failures that only cost part of the model (a mesh, a body-part model or a clip).
    pub rejected: Vec<ImportError>,
}
