use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use crate::{
    keyvalues::KeyValuesError, loader::anim::AnimationError, skeleton::SkeletonError,
};

/// The independently versioned files one model import reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Model,
    AnimationBlocks,
    HardwareMesh,
    VertexData,
    Collision,
}

impl Display for FileKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Model => write!(f, "model descriptor (.mdl)"),
            FileKind::AnimationBlocks => write!(f, "animation blocks (.ani)"),
            FileKind::HardwareMesh => write!(f, "hardware mesh (.vtx)"),
            FileKind::VertexData => write!(f, "vertex data (.vvd)"),
            FileKind::Collision => write!(f, "collision (.phy)"),
        }
    }
}

/// Bad magic, version, checksum or header size. Always aborts the import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub file: FileKind,
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bad {} in {}: expected {}, but got {}",
            self.field, self.file, self.expected, self.actual
        )
    }
}

impl Error for ValidationError {}

/// Where inside a file a cross-reference failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    pub body_part: Option<usize>,
    pub model: Option<usize>,
    pub lod: Option<usize>,
    pub mesh: Option<usize>,
    pub clip: Option<usize>,
    pub solid: Option<usize>,
}

impl Location {
    pub fn body_part(index: usize) -> Self {
        Self {
            body_part: Some(index),
            ..Default::default()
        }
    }

    pub fn clip(index: usize) -> Self {
        Self {
            clip: Some(index),
            ..Default::default()
        }
    }

    pub fn solid(index: usize) -> Self {
        Self {
            solid: Some(index),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, index: usize) -> Self {
        self.model = Some(index);
        self
    }

    pub fn with_lod(mut self, index: usize) -> Self {
        self.lod = Some(index);
        self
    }

    pub fn with_mesh(mut self, index: usize) -> Self {
        self.mesh = Some(index);
        self
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let parts = [
            ("body part", self.body_part),
            ("model", self.model),
            ("LOD", self.lod),
            ("mesh", self.mesh),
            ("clip", self.clip),
            ("solid", self.solid),
        ];
        let mut written = false;
        for (name, index) in parts {
            if let Some(index) = index {
                if written {
                    write!(f, ", ")?;
                }
                write!(f, "{} {}", name, index)?;
                written = true;
            }
        }
        if !written {
            write!(f, "file level")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossReferenceKind {
    BodyPartCount,
    ModelCount,
    LodCount,
    MeshCount,
    MaterialIndex,
    StripIndex,
    VertexIndex,
    BoneIndex,
    SolidIndex,
    AnimationBlock,
    MissingFile,
}

impl CrossReferenceKind {
    fn is_count(&self) -> bool {
        matches!(
            self,
            CrossReferenceKind::BodyPartCount
                | CrossReferenceKind::ModelCount
                | CrossReferenceKind::LodCount
                | CrossReferenceKind::MeshCount
        )
    }
}

impl Display for CrossReferenceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CrossReferenceKind::BodyPartCount => write!(f, "Body part count"),
            CrossReferenceKind::ModelCount => write!(f, "Model count"),
            CrossReferenceKind::LodCount => write!(f, "LOD count"),
            CrossReferenceKind::MeshCount => write!(f, "Mesh count"),
            CrossReferenceKind::MaterialIndex => write!(f, "Material index"),
            CrossReferenceKind::StripIndex => write!(f, "Strip vertex index"),
            CrossReferenceKind::VertexIndex => write!(f, "Vertex index"),
            CrossReferenceKind::BoneIndex => write!(f, "Bone index"),
            CrossReferenceKind::SolidIndex => write!(f, "Solid index"),
            CrossReferenceKind::AnimationBlock => write!(f, "Animation block"),
            CrossReferenceKind::MissingFile => write!(f, "Required file"),
        }
    }
}

/// Two sibling files (or two tables of one file) disagree. Fatal only for the containing
/// model, mesh or clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossReferenceError {
    pub file: FileKind,
    pub location: Location,
    pub kind: CrossReferenceKind,
    pub expected: i64,
    pub actual: i64,
}

impl Display for CrossReferenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.kind == CrossReferenceKind::MissingFile {
            write!(f, "{} is missing, needed at {}", self.file, self.location)
        } else if self.kind.is_count() {
            write!(
                f,
                "{} mismatch in {} at {}: expected {}, but got {}",
                self.kind, self.file, self.location, self.expected, self.actual
            )
        } else {
            write!(
                f,
                "{} out of range in {} at {}: expected below {}, but got {}",
                self.kind, self.file, self.location, self.expected, self.actual
            )
        }
    }
}

impl Error for CrossReferenceError {}

#[derive(Debug)]
pub enum ImportError {
    Structural(ValidationError),
    CrossReference(CrossReferenceError),
    Format { file: FileKind, error: binrw::Error },
    Skeleton(SkeletonError),
    Animation { clip: String, error: AnimationError },
    KeyValues { file: FileKind, error: KeyValuesError },
}

impl ImportError {
    pub(crate) fn format(file: FileKind) -> impl FnOnce(binrw::Error) -> ImportError {
        move |error| ImportError::Format { file, error }
    }
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Structural(error) => Display::fmt(error, f),
            ImportError::CrossReference(error) => Display::fmt(error, f),
            ImportError::Format { file, error } => write!(f, "Bad {}: {}", file, error),
            ImportError::Skeleton(error) => Display::fmt(error, f),
            ImportError::Animation { clip, error } => {
                write!(f, "Bad animation {:?}: {}", clip, error)
            }
            ImportError::KeyValues { file, error } => {
                write!(f, "Bad key values in {}: {}", file, error)
            }
        }
    }
}

impl Error for ImportError {}

impl From<ValidationError> for ImportError {
    fn from(value: ValidationError) -> Self {
        ImportError::Structural(value)
    }
}

impl From<CrossReferenceError> for ImportError {
    fn from(value: CrossReferenceError) -> Self {
        ImportError::CrossReference(value)
    }
}

impl From<SkeletonError> for ImportError {
    fn from(value: SkeletonError) -> Self {
        ImportError::Skeleton(value)
    }
}

#[cfg(test)]
mod test {
    use super::{CrossReferenceError, CrossReferenceKind, FileKind, Location};

    #[test]
    fn cross_reference_message_names_location() {
        let error = CrossReferenceError {
            file: FileKind::HardwareMesh,
            location: Location::body_part(1).with_model(0).with_lod(2),
            kind: CrossReferenceKind::LodCount,
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            error.to_string(),
            "LOD count mismatch in hardware mesh (.vtx) at body part 1, model 0, LOD 2: expected 3, but got 2"
        );
    }
}
