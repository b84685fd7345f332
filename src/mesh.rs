pub type Position = Vec<[f32; 3]>;
pub type Normal = Vec<[f32; 3]>;
pub type Tangent = Vec<[f32; 4]>;
pub type TexCoord = Vec<[f32; 2]>;
pub type Joints = Vec<[u16; 4]>;
pub type Weights = Vec<[f32; 4]>;

/// Per-vertex arrays of one section. All arrays have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshSectionAttributes {
    pub position: Position,
    pub normal: Normal,
    pub tangent: Tangent,
    pub tex_coord: TexCoord,
    pub joints: Joints,
    pub weights: Weights,
}

impl MeshSectionAttributes {
    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }
}

/// Triangles of one LOD sharing a material.
///
/// Every model of every body part that uses the material adds to the same section, so one
/// section can hold triangles of several models.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshSection {
    /// `{body part}_{model index}_{material}` of the first model that used the material,
    /// suffixed when that name is already taken in the LOD. Later models sharing the material
    /// do not rename it.
    pub name: String,
    pub material: usize,
    pub attributes: MeshSectionAttributes,
    pub indices: Vec<u32>,
}

impl MeshSection {
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|triangle| [triangle[0], triangle[1], triangle[2]])
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshLod {
    pub switch_point: f32,
    pub sections: Vec<MeshSection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialSlot {
    pub name: String,
    pub search_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodygroupChoice {
    pub name: String,
    /// Indices into the sections of LOD 0.
    pub sections: Vec<usize>,
}

/// Mutually exclusive alternatives; exactly one choice is shown at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bodygroup {
    pub name: String,
    pub choices: Vec<BodygroupChoice>,
}

/// Material replacements applied on top of the default material assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skin {
    pub name: String,
    /// `(material, replacement)` pairs.
    pub overrides: Vec<(usize, usize)>,
}

impl Skin {
    pub fn resolve(&self, material: usize) -> usize {
        self.overrides
            .iter()
            .find(|(from, _)| *from == material)
            .map_or(material, |(_, to)| *to)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshAsset {
    pub lods: Vec<MeshLod>,
    pub materials: Vec<MaterialSlot>,
    pub bodygroups: Vec<Bodygroup>,
    pub skins: Vec<Skin>,
}
